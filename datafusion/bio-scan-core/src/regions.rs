use noodles_core::Region;
use std::io;

/// Parses a comma-separated list of region specs into [`Region`]s.
///
/// Each spec is `name` or `name:start-end` with 1-based, inclusive
/// coordinates (e.g. `chr1:1000-2000,chrX`). Empty segments are skipped.
pub fn parse_region_list(spec: &str) -> io::Result<Vec<Region>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Region>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid region '{s}': {e}"),
                )
            })
        })
        .collect()
}

/// Builds a region spanning the whole of a named contig.
pub fn whole_contig(name: &str) -> Region {
    Region::new(name, ..)
}
