//! BAM alignment scan support for Apache DataFusion.
//!
//! This crate exposes BAM files (BAI/CSI indexed) as queryable DataFusion
//! tables. The scan engine partitions indexed full scans across worker
//! threads by contig, supports explicit region restriction, and
//! materializes only the projected columns.
//!
//! # Schema
//!
//! **Core columns:** `name`, `flags`, `chrom`, `pos` (1-based), `mapq`,
//! `cigar`, `mate_chrom`, `mate_pos`, `template_len`, `sequence`,
//! `quality_scores` (Phred+33 text), `read_group` and `sample_id` (the
//! `SM` field of the record's read group).
//!
//! **Standard tag columns:** when enabled, one typed column per standard
//! SAM auxiliary tag (`NM`, `AS`, `MD`, ...), named after the tag.
//!
//! **Tags column:** when enabled, a `tags` list of `{tag, value}` structs
//! holding every auxiliary field other than `RG` (and, with standard tag
//! columns enabled, other than the standard tags), values rendered as text.
//!
//! Unplaced records (unmapped, with no reference sequence) are always part
//! of full scans, including contig-partitioned indexed ones.
//!
//! # Example
//!
//! ```rust,no_run
//! use datafusion::prelude::*;
//! use datafusion_bio_scan_bam::table_provider::{BamScanOptions, BamScanProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> datafusion::error::Result<()> {
//! let ctx = SessionContext::new();
//! let table = BamScanProvider::new(
//!     "data/alignments.bam".to_string(),
//!     BamScanOptions::default(),
//! )?;
//! ctx.register_table("alignments", Arc::new(table))?;
//!
//! let df = ctx
//!     .sql("SELECT name, chrom, pos, cigar FROM alignments WHERE mapq >= 30")
//!     .await?;
//! df.show().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Physical execution plan and per-thread scan cursors.
mod physical_exec;
/// Reader construction for sequential and indexed BAM access.
pub mod storage;
/// Standard auxiliary tag registry for typed tag columns.
mod tag_registry;
/// DataFusion table provider and schema construction for BAM files.
pub mod table_provider;

pub use table_provider::{BamScanOptions, BamScanProvider};
