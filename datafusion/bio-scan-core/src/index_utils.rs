use log::debug;
use std::path::{Path, PathBuf};

/// Index flavors recognized during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// Tabix index (`.tbi`), used with BGZF-compressed variant files.
    Tbi,
    /// Coordinate-sorted index (`.csi`), used with variant and alignment files.
    Csi,
    /// BAM index (`.bai`).
    Bai,
}

/// Returns the first existing candidate, if any.
fn probe(candidates: Vec<(PathBuf, IndexFormat)>) -> Option<(String, IndexFormat)> {
    candidates.into_iter().find_map(|(path, format)| {
        if path.is_file() {
            debug!("discovered {format:?} index at {}", path.display());
            Some((path.to_string_lossy().into_owned(), format))
        } else {
            None
        }
    })
}

/// Candidate with the data file's extension replaced by the index extension
/// (`sample.vcf.gz` -> `sample.csi`).
fn swapped_extension(file_path: &str, ext: &str) -> PathBuf {
    Path::new(file_path).with_extension(ext)
}

/// Discovers a variant-file index next to `file_path`.
///
/// Probes the conventional sibling names in order: appended `.tbi`,
/// appended `.csi`, then extension-swapped `.tbi`/`.csi`. Returns the first
/// existing path together with its format, or `None` when no index exists.
pub fn discover_variant_index(file_path: &str) -> Option<(String, IndexFormat)> {
    let found = probe(vec![
        (PathBuf::from(format!("{file_path}.tbi")), IndexFormat::Tbi),
        (PathBuf::from(format!("{file_path}.csi")), IndexFormat::Csi),
        (swapped_extension(file_path, "tbi"), IndexFormat::Tbi),
        (swapped_extension(file_path, "csi"), IndexFormat::Csi),
    ]);
    if found.is_none() {
        debug!("no variant index found next to {file_path}");
    }
    found
}

/// Discovers an alignment-file index next to `file_path`.
///
/// Probes appended `.bai`, appended `.csi`, then extension-swapped
/// `.bai`/`.csi`.
pub fn discover_alignment_index(file_path: &str) -> Option<(String, IndexFormat)> {
    let found = probe(vec![
        (PathBuf::from(format!("{file_path}.bai")), IndexFormat::Bai),
        (PathBuf::from(format!("{file_path}.csi")), IndexFormat::Csi),
        (swapped_extension(file_path, "bai"), IndexFormat::Bai),
        (swapped_extension(file_path, "csi"), IndexFormat::Csi),
    ]);
    if found.is_none() {
        debug!("no alignment index found next to {file_path}");
    }
    found
}
