use crate::physical_exec::BamExec;
use crate::storage::read_bam_header;
use crate::tag_registry::STANDARD_TAGS;
use async_trait::async_trait;
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::catalog::{Session, TableProvider};
use datafusion::common::{DataFusionError, Result};
use datafusion::datasource::TableType;
use datafusion::logical_expr::Expr;
use datafusion::physical_expr::{EquivalenceProperties, Partitioning};
use datafusion::physical_plan::{
    ExecutionPlan, PlanProperties,
    execution_plan::{Boundedness, EmissionType},
};
use datafusion_bio_scan_core::index_utils::discover_alignment_index;
use datafusion_bio_scan_core::metadata::{
    CONTIGS_METADATA_KEY, ContigMetadata, SAMPLES_METADATA_KEY, to_json_string,
};
use datafusion_bio_scan_core::regions::parse_region_list;
use datafusion_bio_scan_core::scan_planner::{ContigQueue, decide_worker_count};
use datafusion_bio_scan_core::table_utils::attributes_data_type;
use log::debug;
use noodles_core::Region;
use noodles_sam as sam;
use noodles_sam::header::record::value::map::read_group::tag;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Options controlling how a BAM file is exposed as a table.
#[derive(Debug, Clone)]
pub struct BamScanOptions {
    /// Comma-separated region list (`chr1:100-200,chr2`). Region-restricted
    /// scans require an index.
    pub regions: Option<String>,
    /// Explicit index path. Auto-discovered next to the data file when
    /// `None`.
    pub index_path: Option<String>,
    /// Whether to add one typed column per standard SAM auxiliary tag,
    /// named after the tag. Standard tags then no longer appear in the
    /// `tags` column. Off by default.
    pub standard_tags: bool,
    /// Whether to expose auxiliary fields as a `tags` list column.
    pub include_tags: bool,
}

impl Default for BamScanOptions {
    fn default() -> Self {
        Self {
            regions: None,
            index_path: None,
            standard_tags: false,
            include_tags: true,
        }
    }
}

/// What one resolved column holds, used to route record fields to column
/// builders during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Name,
    Flags,
    Chrom,
    Pos,
    Mapq,
    Cigar,
    MateChrom,
    MatePos,
    TemplateLen,
    Sequence,
    QualityScores,
    ReadGroup,
    SampleId,
    /// A typed standard tag column; the payload indexes
    /// [`crate::tag_registry::STANDARD_TAGS`].
    StandardTag(usize),
    Tags,
}

/// Fully resolved table schema plus the per-column routing information the
/// scan needs to fill it.
#[derive(Debug)]
pub(crate) struct ScanSchema {
    pub schema: SchemaRef,
    /// One entry per schema column, aligned by index.
    pub kinds: Vec<ColumnKind>,
    /// Whether standard tags route to typed columns instead of `tags`.
    pub standard_tags: bool,
}

/// Resolves the table schema from a parsed header.
///
/// The alignment column layout is fixed; only the trailing `tags` column is
/// optional. Contig and read-group sample metadata from the header land in
/// the schema metadata.
fn resolve_schema(header: &sam::Header, options: &BamScanOptions) -> ScanSchema {
    let mut fields = vec![
        Field::new("name", DataType::Utf8, true),
        Field::new("flags", DataType::Int32, false),
        Field::new("chrom", DataType::Utf8, true),
        Field::new("pos", DataType::Int64, true),
        Field::new("mapq", DataType::Int32, true),
        Field::new("cigar", DataType::Utf8, true),
        Field::new("mate_chrom", DataType::Utf8, true),
        Field::new("mate_pos", DataType::Int64, true),
        Field::new("template_len", DataType::Int64, false),
        Field::new("sequence", DataType::Utf8, true),
        Field::new("quality_scores", DataType::Utf8, true),
        Field::new("read_group", DataType::Utf8, true),
        Field::new("sample_id", DataType::Utf8, true),
    ];
    let mut kinds = vec![
        ColumnKind::Name,
        ColumnKind::Flags,
        ColumnKind::Chrom,
        ColumnKind::Pos,
        ColumnKind::Mapq,
        ColumnKind::Cigar,
        ColumnKind::MateChrom,
        ColumnKind::MatePos,
        ColumnKind::TemplateLen,
        ColumnKind::Sequence,
        ColumnKind::QualityScores,
        ColumnKind::ReadGroup,
        ColumnKind::SampleId,
    ];

    if options.standard_tags {
        for (idx, entry) in STANDARD_TAGS.iter().enumerate() {
            fields.push(Field::new(
                entry.name(),
                entry.column_type.data_type(),
                true,
            ));
            kinds.push(ColumnKind::StandardTag(idx));
        }
    }

    if options.include_tags {
        fields.push(Field::new("tags", attributes_data_type(), true));
        kinds.push(ColumnKind::Tags);
    }

    let contigs: Vec<ContigMetadata> = header
        .reference_sequences()
        .iter()
        .map(|(name, map)| ContigMetadata {
            id: String::from_utf8_lossy(name.as_ref()).to_string(),
            length: Some(map.length().get() as u64),
        })
        .collect();

    let mut samples = Vec::new();
    for (_, map) in header.read_groups() {
        if let Some(sample) = map.other_fields().get(&tag::SAMPLE) {
            let sample = String::from_utf8_lossy(sample.as_ref()).to_string();
            if !samples.contains(&sample) {
                samples.push(sample);
            }
        }
    }

    let mut metadata = HashMap::new();
    metadata.insert(CONTIGS_METADATA_KEY.to_string(), to_json_string(&contigs));
    metadata.insert(SAMPLES_METADATA_KEY.to_string(), to_json_string(&samples));

    ScanSchema {
        schema: Arc::new(Schema::new_with_metadata(fields, metadata)),
        kinds,
        standard_tags: options.standard_tags,
    }
}

/// A DataFusion table provider for BAM files.
///
/// The provider resolves the table schema from the file header at
/// construction time. Indexed full scans are partitioned across worker
/// threads by contig; region-restricted scans run against the index
/// directly.
#[derive(Debug)]
pub struct BamScanProvider {
    file_path: String,
    index_path: Option<String>,
    regions: Vec<Region>,
    scan_schema: Arc<ScanSchema>,
    contig_names: Vec<String>,
}

impl BamScanProvider {
    /// Creates a provider for `file_path`, reading the header to resolve
    /// the schema.
    pub fn new(file_path: String, options: BamScanOptions) -> Result<Self> {
        let header = read_bam_header(&file_path)?;
        let scan_schema = resolve_schema(&header, &options);
        let contig_names: Vec<String> = header
            .reference_sequences()
            .keys()
            .map(|name| String::from_utf8_lossy(name.as_ref()).to_string())
            .collect();

        let regions = match options.regions {
            Some(ref spec) => parse_region_list(spec)?,
            None => Vec::new(),
        };

        let index_path = options
            .index_path
            .clone()
            .or_else(|| discover_alignment_index(&file_path).map(|(path, _)| path));

        Ok(Self {
            file_path,
            index_path,
            regions,
            scan_schema: Arc::new(scan_schema),
            contig_names,
        })
    }
}

pub(crate) fn project_schema(schema: &SchemaRef, projection: Option<&Vec<usize>>) -> SchemaRef {
    match projection {
        Some(indices) if indices.is_empty() => {
            // COUNT(*) projects no columns; keep the metadata.
            Arc::new(Schema::new_with_metadata(
                Vec::<Field>::new(),
                schema.metadata().clone(),
            ))
        }
        Some(indices) => {
            let projected: Vec<Field> = indices.iter().map(|&i| schema.field(i).clone()).collect();
            Arc::new(Schema::new_with_metadata(projected, schema.metadata().clone()))
        }
        None => schema.clone(),
    }
}

#[async_trait]
impl TableProvider for BamScanProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.scan_schema.schema.clone()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        limit: Option<usize>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        debug!("BamScanProvider::scan");

        if !self.regions.is_empty() && self.index_path.is_none() {
            return Err(DataFusionError::Execution(
                "region query requires an index file (.bai or .csi)".to_string(),
            ));
        }

        let projected_schema = project_schema(&self.scan_schema.schema, projection);

        let worker_count = decide_worker_count(
            self.index_path.is_some(),
            self.contig_names.len(),
            !self.regions.is_empty(),
        );
        let contig_queue =
            (worker_count > 1).then(|| Arc::new(ContigQueue::new(self.contig_names.clone())));
        debug!(
            "BAM scan over {} with {worker_count} partition(s)",
            self.file_path
        );

        Ok(Arc::new(BamExec {
            cache: PlanProperties::new(
                EquivalenceProperties::new(projected_schema.clone()),
                Partitioning::UnknownPartitioning(worker_count),
                EmissionType::Final,
                Boundedness::Bounded,
            ),
            file_path: self.file_path.clone(),
            index_path: self.index_path.clone(),
            scan_schema: Arc::clone(&self.scan_schema),
            projected_schema,
            projection: projection.cloned(),
            regions: self.regions.clone(),
            contig_queue,
            limit,
        }))
    }
}
