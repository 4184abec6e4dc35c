//! Shared building blocks for the bio-scan DataFusion table providers.
//!
//! The format-specific reader crates (`datafusion-bio-scan-vcf`,
//! `datafusion-bio-scan-bam`) share the same scan machinery: an atomic
//! contig queue that partitions indexed scans across worker threads,
//! region-list parsing, sibling-file index discovery, a tagged column
//! builder over the closed set of output column kinds, and JSON schema
//! metadata helpers.

#![warn(missing_docs)]

/// Index file discovery for scan inputs (TBI/CSI/BAI sibling conventions).
pub mod index_utils;
/// Arrow schema metadata keys and JSON helpers.
pub mod metadata;
/// Region-list parsing and whole-contig region construction.
pub mod regions;
/// Work coordination: parallelism decision and the atomic contig queue.
pub mod scan_planner;
/// Tagged column builders for assembling record batches.
pub mod table_utils;
