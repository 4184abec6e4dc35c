use datafusion::arrow::array::{Array, Int32Array, Int64Array, ListArray, StringArray, StructArray};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use datafusion_bio_scan_bam::{BamScanOptions, BamScanProvider};
use noodles_bam as bam;
use noodles_core::Position;
use noodles_csi::binning_index::Indexer;
use noodles_csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles_sam as sam;
use noodles_sam::alignment::record::cigar::op::{Kind, Op};
use noodles_sam::alignment::record::data::field::Tag;
use noodles_sam::alignment::record::{Flags, MappingQuality};
use noodles_sam::alignment::record_buf::data::field::Value;
use noodles_sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
use noodles_sam::alignment::io::Write as _;
use noodles_sam::alignment::{Record as _, RecordBuf};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const HEADER_TEXT: &str = "\
@HD\tVN:1.6
@SQ\tSN:chr1\tLN:1000
@RG\tID:rg0\tSM:sampleA
";

fn fixture_records() -> Vec<RecordBuf> {
    let mapped = RecordBuf::builder()
        .set_name("r1")
        .set_flags(Flags::empty())
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::new(100).unwrap())
        .set_mapping_quality(MappingQuality::new(60).unwrap())
        .set_cigar(Cigar::from(vec![Op::new(Kind::Match, 4)]))
        .set_sequence(Sequence::from(b"ACGT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![40, 40, 40, 40]))
        .set_template_length(200)
        .set_data(
            [
                (Tag::READ_GROUP, Value::String("rg0".into())),
                (Tag::from([b'N', b'M']), Value::Int32(2)),
                (Tag::from([b'X', b'X']), Value::String("custom".into())),
            ]
            .into_iter()
            .collect(),
        )
        .build();

    let unmapped = RecordBuf::builder()
        .set_name("r2")
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(b"GGCC".to_vec()))
        .set_quality_scores(QualityScores::from(vec![30, 30, 30, 30]))
        .set_data(
            [(Tag::READ_GROUP, Value::String("rg0".into()))]
                .into_iter()
                .collect(),
        )
        .build();

    vec![mapped, unmapped]
}

fn write_fixture(dir: &TempDir) -> String {
    let path = dir.path().join("alignments.bam");
    let header: sam::Header = HEADER_TEXT.parse().unwrap();

    let mut writer = bam::io::Writer::new(File::create(&path).unwrap());
    writer.write_header(&header).unwrap();
    for record in fixture_records() {
        writer.write_alignment_record(&header, &record).unwrap();
    }
    writer.try_finish().unwrap();

    path.to_string_lossy().into_owned()
}

async fn scan_context(options: BamScanOptions, dir: &TempDir) -> SessionContext {
    let path = write_fixture(dir);
    let ctx = SessionContext::new();
    let table = BamScanProvider::new(path, options).unwrap();
    ctx.register_table("alignments", Arc::new(table)).unwrap();
    ctx
}

async fn collect_single(ctx: &SessionContext, sql: &str) -> RecordBatch {
    let df = ctx.sql(sql).await.unwrap();
    let schema = Arc::new(df.schema().as_arrow().clone());
    let batches = df.collect().await.unwrap();
    concat_batches(&schema, &batches).unwrap()
}

fn string_column(batch: &RecordBatch, idx: usize) -> &StringArray {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
}

fn int_column(batch: &RecordBatch, idx: usize) -> &Int32Array {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Int32Array>()
        .unwrap()
}

#[tokio::test]
async fn scan_reads_core_columns() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(BamScanOptions::default(), &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT name, flags, chrom, pos, mapq, cigar, template_len FROM alignments",
    )
    .await;
    assert_eq!(batch.num_rows(), 2);

    let names = string_column(&batch, 0);
    assert_eq!(names.value(0), "r1");
    assert_eq!(names.value(1), "r2");

    let flags = int_column(&batch, 1);
    assert_eq!(flags.value(0), 0);
    assert_eq!(flags.value(1), i32::from(Flags::UNMAPPED.bits()));

    let chroms = string_column(&batch, 2);
    assert_eq!(chroms.value(0), "chr1");
    assert!(chroms.is_null(1));

    let positions = batch
        .column(3)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(positions.value(0), 100);
    assert!(positions.is_null(1));

    let mapqs = int_column(&batch, 4);
    assert_eq!(mapqs.value(0), 60);
    assert!(mapqs.is_null(1));

    let cigars = string_column(&batch, 5);
    assert_eq!(cigars.value(0), "4M");
    assert!(cigars.is_null(1));

    let template_lens = batch
        .column(6)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(template_lens.value(0), 200);
    assert_eq!(template_lens.value(1), 0);
}

#[tokio::test]
async fn sequence_and_quality_render_as_text() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(BamScanOptions::default(), &dir).await;

    let batch = collect_single(&ctx, "SELECT sequence, quality_scores FROM alignments").await;

    let sequences = string_column(&batch, 0);
    assert_eq!(sequences.value(0), "ACGT");
    assert_eq!(sequences.value(1), "GGCC");

    // Phred+33: 40 renders as 'I', 30 as '?'.
    let quals = string_column(&batch, 1);
    assert_eq!(quals.value(0), "IIII");
    assert_eq!(quals.value(1), "????");
}

#[tokio::test]
async fn read_group_resolves_to_sample() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(BamScanOptions::default(), &dir).await;

    let batch = collect_single(&ctx, "SELECT read_group, sample_id FROM alignments").await;

    let read_groups = string_column(&batch, 0);
    assert_eq!(read_groups.value(0), "rg0");
    assert_eq!(read_groups.value(1), "rg0");

    let samples = string_column(&batch, 1);
    assert_eq!(samples.value(0), "sampleA");
    assert_eq!(samples.value(1), "sampleA");
}

#[tokio::test]
async fn tags_column_holds_non_rg_auxiliary_fields() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(BamScanOptions::default(), &dir).await;

    let batch = collect_single(&ctx, "SELECT tags FROM alignments").await;
    let tags = batch
        .column(0)
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();

    let row0 = tags.value(0);
    let entries = row0.as_any().downcast_ref::<StructArray>().unwrap();
    assert_eq!(entries.len(), 2);
    let tag_names = entries
        .column_by_name("tag")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(tag_names.value(0), "NM");
    assert_eq!(tag_names.value(1), "XX");
    let tag_values = entries
        .column_by_name("value")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(tag_values.value(0), "2");
    assert_eq!(tag_values.value(1), "custom");

    // RG routes to its own column, so r2 has no remaining tags.
    assert_eq!(tags.value(1).len(), 0);
}

#[tokio::test]
async fn standard_tags_split_into_typed_columns() {
    let dir = TempDir::new().unwrap();
    let options = BamScanOptions {
        standard_tags: true,
        ..Default::default()
    };
    let ctx = scan_context(options, &dir).await;

    let batch = collect_single(&ctx, "SELECT \"NM\", tags FROM alignments").await;

    let nm = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(nm.value(0), 2);
    assert!(nm.is_null(1));

    // NM routes to its typed column; only the non-standard XX remains.
    let tags = batch
        .column(1)
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();
    let row0 = tags.value(0);
    let entries = row0.as_any().downcast_ref::<StructArray>().unwrap();
    assert_eq!(entries.len(), 1);
    let tag_names = entries
        .column_by_name("tag")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(tag_names.value(0), "XX");
}

#[tokio::test]
async fn tags_column_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let options = BamScanOptions {
        include_tags: false,
        ..Default::default()
    };
    let ctx = scan_context(options, &dir).await;

    let df = ctx.sql("SELECT * FROM alignments").await.unwrap();
    let columns: Vec<String> = df
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    assert!(!columns.contains(&"tags".to_string()));
}

#[tokio::test]
async fn count_star_and_filters_work() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(BamScanOptions::default(), &dir).await;

    let batch = collect_single(&ctx, "SELECT COUNT(*) FROM alignments").await;
    let counts = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 2);

    let batch = collect_single(&ctx, "SELECT name FROM alignments WHERE mapq >= 30").await;
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(string_column(&batch, 0).value(0), "r1");
}

const MULTI_CONTIG_HEADER_TEXT: &str = "\
@HD\tVN:1.6\tSO:coordinate
@SQ\tSN:chr1\tLN:1000
@SQ\tSN:chr2\tLN:800
@SQ\tSN:chr3\tLN:600
@RG\tID:rg0\tSM:sampleA
";

fn placed_record(name: &str, reference_sequence_id: usize, start: usize) -> RecordBuf {
    RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::empty())
        .set_reference_sequence_id(reference_sequence_id)
        .set_alignment_start(Position::new(start).unwrap())
        .set_mapping_quality(MappingQuality::new(60).unwrap())
        .set_cigar(Cigar::from(vec![Op::new(Kind::Match, 4)]))
        .set_sequence(Sequence::from(b"ACGT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![40, 40, 40, 40]))
        .set_data(
            [(Tag::READ_GROUP, Value::String("rg0".into()))]
                .into_iter()
                .collect(),
        )
        .build()
}

/// Coordinate-sorted records over chr1 and chr3, leaving chr2 empty, with
/// one unplaced record at the end.
fn sorted_records() -> Vec<RecordBuf> {
    let unplaced = RecordBuf::builder()
        .set_name("u1")
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(b"GGCC".to_vec()))
        .set_quality_scores(QualityScores::from(vec![30, 30, 30, 30]))
        .build();

    vec![
        placed_record("a1", 0, 100),
        placed_record("a2", 0, 200),
        placed_record("c1", 2, 50),
        unplaced,
    ]
}

fn write_bam(path: &Path, header: &sam::Header, records: &[RecordBuf]) {
    let mut writer = bam::io::Writer::new(File::create(path).unwrap());
    writer.write_header(header).unwrap();
    for record in records {
        writer.write_alignment_record(header, record).unwrap();
    }
    writer.try_finish().unwrap();
}

fn write_bai(path: &str) {
    let mut reader = bam::io::Reader::new(File::open(path).unwrap());
    let header = reader.read_header().unwrap();

    let mut indexer = Indexer::default();
    let mut start_position = reader.get_ref().virtual_position();
    let mut record = bam::Record::default();

    while reader.read_record(&mut record).unwrap() != 0 {
        let end_position = reader.get_ref().virtual_position();
        let chunk = Chunk::new(start_position, end_position);

        let alignment_context = match (
            record.reference_sequence_id().transpose().unwrap(),
            record.alignment_start().transpose().unwrap(),
            record.alignment_end().transpose().unwrap(),
        ) {
            (Some(id), Some(start), Some(end)) => {
                Some((id, start, end, !record.flags().is_unmapped()))
            }
            _ => None,
        };

        indexer.add_record(alignment_context, chunk).unwrap();
        start_position = end_position;
    }

    let index = indexer.build(header.reference_sequences().len());
    let file = File::create(format!("{path}.bai")).unwrap();
    let mut writer = bam::bai::io::Writer::new(file);
    writer.write_index(&index).unwrap();
}

async fn sorted_names(path: String, options: BamScanOptions) -> Vec<String> {
    let ctx = SessionContext::new();
    let table = BamScanProvider::new(path, options).unwrap();
    ctx.register_table("alignments", Arc::new(table)).unwrap();
    let batch = collect_single(&ctx, "SELECT name FROM alignments ORDER BY name").await;
    let names = string_column(&batch, 0);
    (0..names.len()).map(|i| names.value(i).to_string()).collect()
}

#[tokio::test]
async fn indexed_parallel_scan_matches_sequential_scan() {
    let dir = TempDir::new().unwrap();
    let header: sam::Header = MULTI_CONTIG_HEADER_TEXT.parse().unwrap();
    let records = sorted_records();

    // Same content twice; only one copy gets an index, so it scans with
    // one partition per contig while the other makes a sequential pass.
    let indexed = dir.path().join("sorted.bam");
    write_bam(&indexed, &header, &records);
    let indexed = indexed.to_string_lossy().into_owned();
    write_bai(&indexed);

    let plain = dir.path().join("plain.bam");
    write_bam(&plain, &header, &records);
    let plain = plain.to_string_lossy().into_owned();

    // The unplaced u1 belongs to no contig but still scans; chr2 has no
    // records and claims of it yield no rows.
    let expected = ["a1", "a2", "c1", "u1"];
    assert_eq!(sorted_names(indexed, BamScanOptions::default()).await, expected);
    assert_eq!(sorted_names(plain, BamScanOptions::default()).await, expected);
}

#[tokio::test]
async fn region_query_with_index_returns_overlapping_records() {
    let dir = TempDir::new().unwrap();
    let header: sam::Header = MULTI_CONTIG_HEADER_TEXT.parse().unwrap();

    let path = dir.path().join("sorted.bam");
    write_bam(&path, &header, &sorted_records());
    let path = path.to_string_lossy().into_owned();
    write_bai(&path);

    let options = BamScanOptions {
        regions: Some("chr1:150-250,chr2".to_string()),
        ..Default::default()
    };
    assert_eq!(sorted_names(path, options).await, ["a2"]);
}

#[tokio::test]
async fn region_query_without_index_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir);
    let options = BamScanOptions {
        regions: Some("chr1:50-150".to_string()),
        ..Default::default()
    };
    let table = BamScanProvider::new(path, options).unwrap();

    let ctx = SessionContext::new();
    ctx.register_table("alignments", Arc::new(table)).unwrap();

    let result = ctx.sql("SELECT name FROM alignments").await;
    let err = match result {
        Err(e) => e.to_string(),
        Ok(df) => match df.collect().await {
            Err(e) => e.to_string(),
            Ok(_) => panic!("region scan without an index should fail"),
        },
    };
    assert!(err.contains("index"), "unexpected error: {err}");
}
