use serde::{Deserialize, Serialize};

/// Schema metadata key holding the JSON-encoded contig list.
pub const CONTIGS_METADATA_KEY: &str = "bio.scan.contigs";

/// Schema metadata key holding the JSON-encoded sample name list.
pub const SAMPLES_METADATA_KEY: &str = "bio.scan.samples";

/// Contig entry stored in schema metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContigMetadata {
    /// Contig name as declared by the file header.
    pub id: String,
    /// Declared contig length, when the header carries one.
    pub length: Option<u64>,
}

/// Serializes a value to a JSON string for schema metadata.
///
/// Falls back to an empty string on serialization failure so metadata never
/// blocks schema construction.
pub fn to_json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
