use noodles_bam as bam;
use noodles_bgzf as bgzf;
use noodles_core::Region;
use noodles_csi as csi;
use noodles_sam as sam;
use std::fs::File;
use std::io;

/// A sequential BAM reader over BGZF-compressed input.
pub type SequentialBamReader = bam::io::Reader<bgzf::io::Reader<File>>;

/// Opens a BAM for a full sequential pass and reads its header.
pub fn open_sequential_bam(file_path: &str) -> io::Result<(SequentialBamReader, sam::Header)> {
    let file = File::open(file_path)?;
    let mut reader = bam::io::Reader::new(file);
    let header = reader.read_header()?;
    Ok((reader, header))
}

/// Reads just the header of a BAM file.
pub fn read_bam_header(file_path: &str) -> io::Result<sam::Header> {
    open_sequential_bam(file_path).map(|(_, header)| header)
}

/// An indexed BAM reader owned by a single scan cursor.
///
/// Each cursor opens its own file and index handles; index structures are
/// not shared across threads.
pub struct IndexedBamReader {
    reader: bam::io::IndexedReader<bgzf::io::Reader<File>>,
    header: sam::Header,
}

impl IndexedBamReader {
    /// Opens `file_path` with the BAI or CSI index at `index_path`.
    pub fn new(file_path: &str, index_path: &str) -> io::Result<Self> {
        let builder = bam::io::indexed_reader::Builder::default();
        let builder = if index_path.ends_with(".csi") {
            builder.set_index(csi::fs::read(index_path)?)
        } else {
            builder.set_index(bam::bai::fs::read(index_path)?)
        };
        let mut reader = builder.build_from_path(file_path)?;
        let header = reader.read_header()?;
        Ok(Self { reader, header })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    /// Queries records overlapping a region.
    pub fn query(
        &mut self,
        region: &Region,
    ) -> io::Result<impl Iterator<Item = io::Result<bam::Record>> + '_> {
        self.reader.query(&self.header, region)
    }

    /// Returns the unplaced records at the end of the file, which no
    /// region query can reach.
    pub fn query_unmapped(
        &mut self,
    ) -> io::Result<impl Iterator<Item = io::Result<bam::Record>> + '_> {
        self.reader.query_unmapped()
    }
}
