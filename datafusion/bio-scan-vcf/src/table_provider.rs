use crate::annotation::{AnnotationKind, AnnotationSchema};
use crate::field_spec::{
    ScalarKind, format_arity, format_kind, info_arity, info_kind, validate_format_field,
    validate_info_field,
};
use crate::physical_exec::VcfExec;
use crate::storage::read_vcf_header;
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
use datafusion_bio_scan_core::index_utils::discover_variant_index;
use datafusion_bio_scan_core::metadata::{
    CONTIGS_METADATA_KEY, ContigMetadata, SAMPLES_METADATA_KEY, to_json_string,
};
use datafusion_bio_scan_core::regions::parse_region_list;
use datafusion_bio_scan_core::scan_planner::{ContigQueue, decide_worker_count};
use log::debug;
use noodles_core::Region;
use noodles_vcf as vcf;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Options controlling how a VCF file is exposed as a table.
#[derive(Debug, Clone)]
pub struct VcfScanOptions {
    /// Comma-separated region list (`chr1:100-200,chr2`). Region-restricted
    /// scans require an index.
    pub regions: Option<String>,
    /// Explicit index path. Auto-discovered next to the data file when
    /// `None`.
    pub index_path: Option<String>,
    /// Whether to expose header-declared INFO fields as columns.
    pub include_info: bool,
    /// Whether to parse structured annotations (`CSQ`/`BCSQ`/`ANN`) into
    /// typed per-sub-field columns.
    pub parse_annotations: bool,
    /// Tidy genotype layout: one output row per variant and sample, with a
    /// `sample_id` column, instead of per-sample wide columns.
    pub tidy_genotypes: bool,
}

impl Default for VcfScanOptions {
    fn default() -> Self {
        Self {
            regions: None,
            index_path: None,
            include_info: true,
            parse_annotations: true,
            tidy_genotypes: false,
        }
    }
}

/// What one resolved column holds, used to route record fields to column
/// builders during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Chrom,
    Pos,
    Id,
    Ref,
    Alt,
    Qual,
    Filter,
    /// Annotation sub-field, by index into the annotation schema.
    Annotation(usize),
    /// INFO field, by index into the resolved INFO plan list.
    Info(usize),
    /// Sample name column emitted in tidy layout.
    SampleId,
    /// FORMAT field for one sample (wide layout) or the row's sample (tidy
    /// layout, `sample: None`).
    Format {
        sample: Option<usize>,
        field: usize,
    },
}

/// Decoding plan for one INFO field.
#[derive(Debug, Clone)]
pub(crate) struct InfoFieldPlan {
    pub name: String,
    pub kind: ScalarKind,
    pub is_list: bool,
}

/// Decoding plan for one FORMAT field.
#[derive(Debug, Clone)]
pub(crate) struct FormatFieldPlan {
    pub name: String,
    pub kind: ScalarKind,
    pub is_list: bool,
}

/// Fully resolved table schema plus the per-column routing information the
/// scan needs to fill it.
#[derive(Debug)]
pub(crate) struct ScanSchema {
    pub schema: SchemaRef,
    /// One entry per schema column, aligned by index.
    pub kinds: Vec<ColumnKind>,
    pub info_fields: Vec<InfoFieldPlan>,
    pub format_fields: Vec<FormatFieldPlan>,
    pub annotation: Option<AnnotationSchema>,
    pub sample_names: Vec<String>,
    pub tidy: bool,
}

fn scalar_data_type(kind: ScalarKind) -> DataType {
    match kind {
        ScalarKind::Flag => DataType::Boolean,
        ScalarKind::Integer => DataType::Int32,
        ScalarKind::Float => DataType::Float32,
        ScalarKind::Text => DataType::Utf8,
    }
}

fn list_of(inner: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", inner, true)))
}

fn annotation_data_type(kind: AnnotationKind) -> DataType {
    match kind {
        AnnotationKind::Integer => list_of(DataType::Int32),
        AnnotationKind::Float => list_of(DataType::Float32),
        AnnotationKind::Text => list_of(DataType::Utf8),
    }
}

/// Resolves the table schema from a parsed header.
///
/// Column order is fixed: the seven core columns, then one list column per
/// annotation sub-field, then INFO columns in header order (the annotation
/// tag itself is skipped), then genotype columns. Reserved INFO/FORMAT
/// fields are validated against the VCF specification and their arity
/// corrected where the header disagrees.
fn resolve_schema(header: &vcf::Header, options: &VcfScanOptions) -> ScanSchema {
    let mut fields = vec![
        Field::new("chrom", DataType::Utf8, false),
        Field::new("pos", DataType::Int64, false),
        Field::new("id", DataType::Utf8, true),
        Field::new("ref", DataType::Utf8, false),
        Field::new("alt", list_of(DataType::Utf8), false),
        Field::new("qual", DataType::Float64, true),
        Field::new("filter", list_of(DataType::Utf8), true),
    ];
    let mut kinds = vec![
        ColumnKind::Chrom,
        ColumnKind::Pos,
        ColumnKind::Id,
        ColumnKind::Ref,
        ColumnKind::Alt,
        ColumnKind::Qual,
        ColumnKind::Filter,
    ];

    let annotation = if options.parse_annotations {
        AnnotationSchema::from_header(header)
    } else {
        None
    };
    if let Some(ref annotation) = annotation {
        for (idx, sub_field) in annotation.fields.iter().enumerate() {
            if sub_field.name.is_empty() {
                continue;
            }
            fields.push(Field::new(
                format!("{}_{}", annotation.tag, sub_field.name),
                annotation_data_type(sub_field.kind),
                true,
            ));
            kinds.push(ColumnKind::Annotation(idx));
        }
    }

    let mut info_fields = Vec::new();
    if options.include_info {
        for (name, info) in header.infos() {
            if annotation
                .as_ref()
                .is_some_and(|annotation| annotation.tag == *name)
            {
                continue;
            }
            let kind = info_kind(info.ty());
            let arity = validate_info_field(name, info_arity(info.number()), kind);
            let is_list = kind != ScalarKind::Flag && arity.is_list();
            let inner = scalar_data_type(kind);
            let data_type = if is_list { list_of(inner) } else { inner };
            // Flags decode as present/absent, so the column itself is never
            // null.
            fields.push(Field::new(name, data_type, kind != ScalarKind::Flag));
            kinds.push(ColumnKind::Info(info_fields.len()));
            info_fields.push(InfoFieldPlan {
                name: name.to_string(),
                kind,
                is_list,
            });
        }
    }

    let sample_names: Vec<String> = header.sample_names().iter().cloned().collect();
    let mut format_fields = Vec::new();
    if !sample_names.is_empty() {
        for (name, format) in header.formats() {
            let kind = format_kind(format.ty());
            // GT stays a single phased/unphased allele string.
            let is_list = name != "GT"
                && validate_format_field(name, format_arity(format.number()), kind).is_list();
            let data_type = if name == "GT" {
                DataType::Utf8
            } else {
                let inner = scalar_data_type(kind);
                if is_list { list_of(inner) } else { inner }
            };
            format_fields.push(FormatFieldPlan {
                name: name.to_string(),
                kind,
                is_list,
            });

            if options.tidy_genotypes {
                fields.push(Field::new(name, data_type, true));
                kinds.push(ColumnKind::Format {
                    sample: None,
                    field: format_fields.len() - 1,
                });
            } else {
                for (sample_idx, sample_name) in sample_names.iter().enumerate() {
                    fields.push(Field::new(
                        format!("{sample_name}_{name}"),
                        data_type.clone(),
                        true,
                    ));
                    kinds.push(ColumnKind::Format {
                        sample: Some(sample_idx),
                        field: format_fields.len() - 1,
                    });
                }
            }
        }
        if options.tidy_genotypes {
            // sample_id goes right before the per-field genotype columns.
            let first_format = fields.len() - format_fields.len();
            fields.insert(
                first_format,
                Field::new("sample_id", DataType::Utf8, false),
            );
            kinds.insert(first_format, ColumnKind::SampleId);
        }
    }

    let contigs: Vec<ContigMetadata> = header
        .contigs()
        .iter()
        .map(|(id, contig)| ContigMetadata {
            id: id.to_string(),
            length: contig.length().map(|l| l as u64),
        })
        .collect();

    let mut metadata = HashMap::new();
    metadata.insert(CONTIGS_METADATA_KEY.to_string(), to_json_string(&contigs));
    metadata.insert(
        SAMPLES_METADATA_KEY.to_string(),
        to_json_string(&sample_names),
    );

    ScanSchema {
        schema: Arc::new(Schema::new_with_metadata(fields, metadata)),
        kinds,
        info_fields,
        format_fields,
        annotation,
        sample_names,
        tidy: options.tidy_genotypes,
    }
}

/// A DataFusion table provider for VCF files.
///
/// The provider resolves the table schema from the file header at
/// construction time. Indexed full scans are partitioned across worker
/// threads by contig; region-restricted scans run against the index
/// directly.
#[derive(Debug)]
pub struct VcfScanProvider {
    file_path: String,
    index_path: Option<String>,
    regions: Vec<Region>,
    scan_schema: Arc<ScanSchema>,
    contig_names: Vec<String>,
}

impl VcfScanProvider {
    /// Creates a provider for `file_path`, reading the header to resolve
    /// the schema.
    pub fn new(file_path: String, options: VcfScanOptions) -> Result<Self> {
        let header = read_vcf_header(&file_path)?;
        let scan_schema = resolve_schema(&header, &options);
        let contig_names: Vec<String> =
            header.contigs().iter().map(|(id, _)| id.to_string()).collect();

        let regions = match options.regions {
            Some(ref spec) => parse_region_list(spec)?,
            None => Vec::new(),
        };

        let index_path = options
            .index_path
            .clone()
            .or_else(|| discover_variant_index(&file_path).map(|(path, _)| path));

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
impl TableProvider for VcfScanProvider {
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
        debug!("VcfScanProvider::scan");

        if !self.regions.is_empty() && self.index_path.is_none() {
            return Err(DataFusionError::Execution(
                "region query requires an index file (.tbi or .csi)".to_string(),
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
            "VCF scan over {} with {worker_count} partition(s)",
            self.file_path
        );

        Ok(Arc::new(VcfExec {
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
