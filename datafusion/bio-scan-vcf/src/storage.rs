use noodles_bgzf as bgzf;
use noodles_core::Region;
use noodles_csi as csi;
use noodles_tabix as tabix;
use noodles_vcf as vcf;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// A sequential VCF reader over plain or BGZF-compressed input.
pub type SequentialVcfReader = vcf::io::Reader<Box<dyn BufRead + Send>>;

fn is_bgzf_path(file_path: &str) -> bool {
    file_path.ends_with(".gz") || file_path.ends_with(".bgz")
}

/// Opens a VCF for a full sequential pass and reads its header.
///
/// Compression is chosen from the file extension: `.gz`/`.bgz` inputs go
/// through a BGZF reader, anything else is read as plain text.
pub fn open_sequential_vcf(file_path: &str) -> io::Result<(SequentialVcfReader, vcf::Header)> {
    let file = File::open(file_path)?;
    let inner: Box<dyn BufRead + Send> = if is_bgzf_path(file_path) {
        Box::new(bgzf::io::Reader::new(file))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut reader = vcf::io::Reader::new(inner);
    let header = reader.read_header()?;
    Ok((reader, header))
}

/// Reads just the header of a VCF file.
pub fn read_vcf_header(file_path: &str) -> io::Result<vcf::Header> {
    open_sequential_vcf(file_path).map(|(_, header)| header)
}

/// An indexed VCF reader owned by a single scan cursor.
///
/// Each cursor opens its own file and index handles; index structures are
/// not shared across threads.
pub struct IndexedVcfReader {
    reader: vcf::io::IndexedReader<bgzf::io::Reader<File>>,
    header: vcf::Header,
}

impl IndexedVcfReader {
    /// Opens `file_path` with the TBI or CSI index at `index_path`.
    pub fn new(file_path: &str, index_path: &str) -> io::Result<Self> {
        let builder = vcf::io::indexed_reader::Builder::default();
        let builder = if index_path.ends_with(".csi") {
            builder.set_index(csi::fs::read(index_path)?)
        } else {
            builder.set_index(tabix::fs::read(index_path)?)
        };
        let mut reader = builder.build_from_path(file_path)?;
        let header = reader.read_header()?;
        Ok(Self { reader, header })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &vcf::Header {
        &self.header
    }

    /// Queries records overlapping a region.
    pub fn query(
        &mut self,
        region: &Region,
    ) -> io::Result<impl Iterator<Item = io::Result<vcf::Record>> + '_> {
        self.reader.query(&self.header, region)
    }
}
