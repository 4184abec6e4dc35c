//! VCF (Variant Call Format) scan support for Apache DataFusion.
//!
//! This crate exposes VCF files (plain text or BGZF-compressed, TBI/CSI
//! indexed) as queryable DataFusion tables. The scan engine partitions
//! indexed full scans across worker threads by contig, supports explicit
//! region restriction, and materializes only the projected columns.
//!
//! # Schema
//!
//! **Core columns:** `chrom`, `pos` (1-based), `id`, `ref`, `alt`, `qual`,
//! `filter`.
//!
//! **Annotation columns:** when the header declares a recognized structured
//! annotation field (`CSQ`, `BCSQ` or `ANN`) with a `Format:` description,
//! one list column per declared sub-field (e.g. `CSQ_Consequence`,
//! `CSQ_IMPACT`), one list entry per transcript.
//!
//! **INFO columns:** one column per header-declared INFO field, shaped
//! scalar or list by the declared Number, corrected for reserved fields
//! with a known arity.
//!
//! **FORMAT columns:** per sample in wide layout (`{sample}_{field}`), or
//! behind a `sample_id` column with one row per variant×sample in tidy
//! layout.
//!
//! # Example
//!
//! ```rust,no_run
//! use datafusion::prelude::*;
//! use datafusion_bio_scan_vcf::table_provider::{VcfScanOptions, VcfScanProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> datafusion::error::Result<()> {
//! let ctx = SessionContext::new();
//! let table = VcfScanProvider::new(
//!     "data/variants.vcf.gz".to_string(),
//!     VcfScanOptions::default(),
//! )?;
//! ctx.register_table("variants", Arc::new(table))?;
//!
//! let df = ctx
//!     .sql("SELECT chrom, pos, ref, alt FROM variants WHERE qual > 30")
//!     .await?;
//! df.show().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Structured-annotation (`CSQ`/`BCSQ`/`ANN`) schema and record parsing.
pub mod annotation;
/// Reserved INFO/FORMAT field specifications and header validation.
pub mod field_spec;
/// Physical execution plan and per-thread scan cursors.
mod physical_exec;
/// Reader construction for sequential and indexed VCF access.
pub mod storage;
/// DataFusion table provider and schema resolution for VCF files.
pub mod table_provider;

pub use table_provider::{VcfScanOptions, VcfScanProvider};
