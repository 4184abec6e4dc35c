use datafusion::arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, ListArray,
    StringArray,
};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use datafusion_bio_scan_vcf::{VcfScanOptions, VcfScanProvider};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const FIXTURE: &str = "\
##fileformat=VCFv4.2
##contig=<ID=chr1,length=1000>
##contig=<ID=chr2,length=1000>
##FILTER=<ID=q10,Description=\"Quality below 10\">
##FILTER=<ID=s50,Description=\"Less than 50% of samples have data\">
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"Consequence annotations from Ensembl VEP. Format: Allele|Consequence|IMPACT\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allelic depths\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002
chr1\t100\trs1\tA\tG\t50\tPASS\tDP=10;DB;CSQ=G|missense_variant|MODERATE,G|stop_gained|HIGH\tGT:DP:AD\t0/1:10:7,3\t1|1:12:0,12
chr1\t200\t.\tT\tC\t.\tPASS\tDP=8;AF=0.5\tGT:DP:AD\t./1:8:4,4\t0/0:9:5,.
chr2\t50\trs3\tG\tA,C\t30\tq10;s50\tAF=0.3,0.1\tGT:DP:AD\t1/2:15:15,0,0\t0/0:.:.
";

fn write_fixture(dir: &TempDir) -> String {
    let path = dir.path().join("variants.vcf");
    fs::write(&path, FIXTURE).unwrap();
    path.to_string_lossy().into_owned()
}

async fn scan_context(options: VcfScanOptions, dir: &TempDir) -> SessionContext {
    let path = write_fixture(dir);
    let ctx = SessionContext::new();
    let table = VcfScanProvider::new(path, options).unwrap();
    ctx.register_table("variants", Arc::new(table)).unwrap();
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

fn list_column(batch: &RecordBatch, idx: usize) -> &ListArray {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap()
}

#[tokio::test]
async fn wide_scan_reads_core_columns() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT chrom, pos, id, ref, qual FROM variants ORDER BY chrom, pos",
    )
    .await;
    assert_eq!(batch.num_rows(), 3);

    let chroms = string_column(&batch, 0);
    assert_eq!(chroms.value(0), "chr1");
    assert_eq!(chroms.value(1), "chr1");
    assert_eq!(chroms.value(2), "chr2");

    let positions = batch
        .column(1)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(positions.value(0), 100);
    assert_eq!(positions.value(1), 200);
    assert_eq!(positions.value(2), 50);

    let ids = string_column(&batch, 2);
    assert_eq!(ids.value(0), "rs1");
    assert!(ids.is_null(1));
    assert_eq!(ids.value(2), "rs3");

    let refs = string_column(&batch, 3);
    assert_eq!(refs.value(2), "G");

    let quals = batch
        .column(4)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(quals.value(0), 50.0);
    assert!(quals.is_null(1));
    assert_eq!(quals.value(2), 30.0);
}

#[tokio::test]
async fn alt_and_filter_are_lists() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT alt, filter FROM variants WHERE chrom = 'chr2'",
    )
    .await;
    assert_eq!(batch.num_rows(), 1);

    let alt = list_column(&batch, 0).value(0);
    let alt = alt.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(alt.len(), 2);
    assert_eq!(alt.value(0), "A");
    assert_eq!(alt.value(1), "C");

    let filters = list_column(&batch, 1).value(0);
    let filters = filters.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters.value(0), "q10");
    assert_eq!(filters.value(1), "s50");
}

#[tokio::test]
async fn info_columns_decode_per_header_type() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT \"DP\", \"AF\", \"DB\" FROM variants ORDER BY chrom, pos",
    )
    .await;

    let dp = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int32Array>()
        .unwrap();
    assert_eq!(dp.value(0), 10);
    assert_eq!(dp.value(1), 8);
    assert!(dp.is_null(2));

    let af = list_column(&batch, 1);
    assert!(af.is_null(0));
    let af_row3 = af.value(2);
    let af_row3 = af_row3.as_any().downcast_ref::<Float32Array>().unwrap();
    assert_eq!(af_row3.len(), 2);
    assert_eq!(af_row3.value(0), 0.3);
    assert_eq!(af_row3.value(1), 0.1);

    let db = batch
        .column(2)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(db.value(0));
    assert!(!db.value(1));
    assert!(!db.value(2));
}

#[tokio::test]
async fn annotation_columns_split_per_transcript() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    // The annotation tag itself is not a column once parsed.
    let schema = ctx.table("variants").await.unwrap().schema().clone();
    assert!(schema.field_with_unqualified_name("CSQ").is_err());

    let batch = collect_single(
        &ctx,
        "SELECT \"CSQ_IMPACT\", \"CSQ_Consequence\" FROM variants WHERE pos = 100",
    )
    .await;
    assert_eq!(batch.num_rows(), 1);

    let impact = list_column(&batch, 0).value(0);
    let impact = impact.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(impact.len(), 2);
    assert_eq!(impact.value(0), "MODERATE");
    assert_eq!(impact.value(1), "HIGH");

    let consequence = list_column(&batch, 1).value(0);
    let consequence = consequence.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(consequence.value(0), "missense_variant");
    assert_eq!(consequence.value(1), "stop_gained");

    // Records without the tag get null annotation columns.
    let batch = collect_single(
        &ctx,
        "SELECT \"CSQ_IMPACT\" FROM variants WHERE pos = 200",
    )
    .await;
    assert!(list_column(&batch, 0).is_null(0));
}

#[tokio::test]
async fn wide_genotypes_are_per_sample_columns() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT \"NA00001_GT\", \"NA00002_GT\", \"NA00002_AD\" FROM variants ORDER BY chrom, pos",
    )
    .await;

    let gt1 = string_column(&batch, 0);
    assert_eq!(gt1.value(0), "0/1");
    assert_eq!(gt1.value(1), "./1");
    assert_eq!(gt1.value(2), "1/2");

    let gt2 = string_column(&batch, 1);
    assert_eq!(gt2.value(0), "1|1");
    assert_eq!(gt2.value(1), "0/0");
    assert_eq!(gt2.value(2), "0/0");

    // AD "5,." keeps only the observed entries.
    let ad = list_column(&batch, 2);
    let ad_row2 = ad.value(1);
    let ad_row2 = ad_row2.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ad_row2.len(), 1);
    assert_eq!(ad_row2.value(0), 5);
}

#[tokio::test]
async fn tidy_layout_emits_one_row_per_sample() {
    let dir = TempDir::new().unwrap();
    let options = VcfScanOptions {
        tidy_genotypes: true,
        ..Default::default()
    };
    let ctx = scan_context(options, &dir).await;

    let batch = collect_single(
        &ctx,
        "SELECT chrom, pos, sample_id, \"GT\" FROM variants ORDER BY chrom, pos, sample_id",
    )
    .await;
    assert_eq!(batch.num_rows(), 6);

    let samples = string_column(&batch, 2);
    let genotypes = string_column(&batch, 3);
    let expected = [
        ("NA00001", "0/1"),
        ("NA00002", "1|1"),
        ("NA00001", "./1"),
        ("NA00002", "0/0"),
        ("NA00001", "1/2"),
        ("NA00002", "0/0"),
    ];
    for (row, (sample, genotype)) in expected.iter().enumerate() {
        assert_eq!(samples.value(row), *sample, "row {row}");
        assert_eq!(genotypes.value(row), *genotype, "row {row}");
    }
}

#[tokio::test]
async fn count_star_matches_layout() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;
    let batch = collect_single(&ctx, "SELECT COUNT(*) FROM variants").await;
    let counts = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 3);

    let dir = TempDir::new().unwrap();
    let options = VcfScanOptions {
        tidy_genotypes: true,
        ..Default::default()
    };
    let ctx = scan_context(options, &dir).await;
    let batch = collect_single(&ctx, "SELECT COUNT(*) FROM variants").await;
    let counts = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 6);
}

#[tokio::test]
async fn projection_subsets_match_full_scan() {
    let dir = TempDir::new().unwrap();
    let ctx = scan_context(VcfScanOptions::default(), &dir).await;

    let narrow = collect_single(&ctx, "SELECT pos FROM variants ORDER BY pos").await;
    let wide = collect_single(&ctx, "SELECT chrom, pos, ref FROM variants ORDER BY pos").await;

    let narrow_pos = narrow
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let wide_pos = wide
        .column(1)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(narrow_pos.values(), wide_pos.values());
}

#[tokio::test]
async fn region_query_without_index_fails() {
    let dir = TempDir::new().unwrap();
    let options = VcfScanOptions {
        regions: Some("chr1:1-500".to_string()),
        ..Default::default()
    };
    let ctx = scan_context(options, &dir).await;
    let result = ctx.sql("SELECT chrom FROM variants").await;
    let err = match result {
        Ok(df) => df.collect().await.err(),
        Err(e) => Some(e),
    };
    let err = err.expect("region scan without an index should fail");
    assert!(err.to_string().contains("index"));
}
