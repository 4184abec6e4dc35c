use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Write as _};
use std::io;
use std::sync::Arc;

use crate::annotation::{AnnotationKind, AnnotationRecord, AnnotationValue};
use crate::field_spec::ScalarKind;
use crate::storage::{IndexedVcfReader, open_sequential_vcf};
use crate::table_provider::{ColumnKind, ScanSchema};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use datafusion::common::DataFusionError;
use datafusion::execution::TaskContext;
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, PlanProperties, SendableRecordBatchStream,
};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion_bio_scan_core::regions::whole_contig;
use datafusion_bio_scan_core::scan_planner::ContigQueue;
use datafusion_bio_scan_core::table_utils::{ColumnBuilder, builders_to_arrays};
use futures::StreamExt;
use log::{debug, warn};
use noodles_core::Region;
use noodles_vcf as vcf;
use noodles_vcf::Header;
use noodles_vcf::variant::Record as VariantRecord;
use noodles_vcf::variant::record::info::field::{Value as InfoValue, value::Array as InfoArray};
use noodles_vcf::variant::record::samples::Sample;
use noodles_vcf::variant::record::samples::series::Value as SampleValue;
use noodles_vcf::variant::record::samples::series::value::Array as SampleArray;
use noodles_vcf::variant::record::samples::series::value::genotype::Phasing;
use noodles_vcf::variant::record::{AlternateBases, Filters, Ids, Samples};

type BatchSender = futures::channel::mpsc::Sender<Result<RecordBatch, ArrowError>>;

/// One decoded field value, scalar or list, shared by INFO and FORMAT
/// decoding.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Missing,
    Flag(bool),
    Int(i32),
    Float(f32),
    Text(String),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Texts(Vec<String>),
}

const MISSING: FieldValue = FieldValue::Missing;

/// A variant record decoded exactly once; every projected column and every
/// tidy row is written from this cache without touching the raw record
/// again.
#[derive(Debug)]
struct DecodedVariant {
    chrom: String,
    pos: i64,
    id: Option<String>,
    reference: String,
    alt: Vec<String>,
    qual: Option<f64>,
    filters: Vec<String>,
    /// Aligned with the plan's INFO field list.
    info: Vec<FieldValue>,
    annotation: Option<AnnotationRecord>,
    /// `samples[sample][format field]`, aligned with the plan's FORMAT
    /// field list.
    samples: Vec<Vec<FieldValue>>,
}

/// Which parts of a record the projected columns actually need.
#[derive(Debug, Default, Clone, Copy)]
struct DecodeMask {
    chrom: bool,
    id: bool,
    reference: bool,
    alt: bool,
    qual: bool,
    filter: bool,
    info: bool,
    annotation: bool,
    format: bool,
}

impl DecodeMask {
    fn from_kinds(kinds: &[ColumnKind]) -> Self {
        let mut mask = Self::default();
        for kind in kinds {
            match kind {
                ColumnKind::Chrom => mask.chrom = true,
                ColumnKind::Pos => {}
                ColumnKind::Id => mask.id = true,
                ColumnKind::Ref => mask.reference = true,
                ColumnKind::Alt => mask.alt = true,
                ColumnKind::Qual => mask.qual = true,
                ColumnKind::Filter => mask.filter = true,
                ColumnKind::Annotation(_) => mask.annotation = true,
                ColumnKind::Info(_) => mask.info = true,
                ColumnKind::SampleId => {}
                ColumnKind::Format { .. } => mask.format = true,
            }
        }
        mask
    }
}

/// Per-thread decoding state shared by all scan paths.
struct DecodeContext<'a> {
    plan: &'a ScanSchema,
    mask: DecodeMask,
    info_index: HashMap<String, usize>,
    format_index: HashMap<String, usize>,
}

impl<'a> DecodeContext<'a> {
    fn new(plan: &'a ScanSchema, projected_kinds: &[ColumnKind]) -> Self {
        let info_index = plan
            .info_fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let format_index = plan
            .format_fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            plan,
            mask: DecodeMask::from_kinds(projected_kinds),
            info_index,
            format_index,
        }
    }

    fn decode(
        &self,
        record: &vcf::Record,
        header: &Header,
    ) -> Result<DecodedVariant, DataFusionError> {
        let mask = &self.mask;

        let pos = record
            .variant_start()
            .ok_or_else(|| DataFusionError::Execution("missing variant position".to_string()))?
            .map_err(|e| DataFusionError::Execution(format!("invalid variant position: {e}")))?
            .get() as i64;

        let chrom = if mask.chrom {
            record.reference_sequence_name().to_string()
        } else {
            String::new()
        };

        let id = if mask.id {
            let ids = record.ids();
            if ids.is_empty() {
                None
            } else {
                let mut buf = String::new();
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        buf.push(';');
                    }
                    buf.push_str(id);
                }
                Some(buf)
            }
        } else {
            None
        };

        let reference = if mask.reference {
            record.reference_bases().to_string()
        } else {
            String::new()
        };

        let mut alt = Vec::new();
        if mask.alt {
            for result in record.alternate_bases().iter() {
                let allele = result.map_err(|e| {
                    DataFusionError::Execution(format!("invalid alternate allele: {e}"))
                })?;
                alt.push(allele.to_string());
            }
        }

        let qual = if mask.qual {
            record
                .quality_score()
                .transpose()
                .map_err(|e| DataFusionError::Execution(format!("invalid quality score: {e}")))?
                .map(f64::from)
        } else {
            None
        };

        let mut filters = Vec::new();
        if mask.filter {
            for result in record.filters().iter(header) {
                let filter = result
                    .map_err(|e| DataFusionError::Execution(format!("invalid filter: {e}")))?;
                filters.push(filter.to_string());
            }
        }

        let mut info = vec![MISSING; self.plan.info_fields.len()];
        let mut annotation = None;
        if mask.info || mask.annotation {
            let record_info = VariantRecord::info(record);
            for result in record_info.iter(header) {
                let (key, value) = result.map_err(|e| {
                    DataFusionError::Execution(format!("error reading INFO field: {e}"))
                })?;

                if mask.annotation {
                    if let Some(schema) = self
                        .plan
                        .annotation
                        .as_ref()
                        .filter(|schema| schema.tag == key)
                    {
                        let raw = annotation_raw(value).map_err(|e| {
                            DataFusionError::Execution(format!(
                                "error reading INFO/{key}: {e}"
                            ))
                        })?;
                        annotation = raw.and_then(|raw| schema.parse_record(&raw));
                        continue;
                    }
                }

                if !mask.info {
                    continue;
                }
                if let Some(&idx) = self.info_index.get(key) {
                    info[idx] = decode_info_value(value).map_err(|e| {
                        DataFusionError::Execution(format!("error reading INFO/{key}: {e}"))
                    })?;
                }
            }
        }

        let mut samples = Vec::new();
        if mask.format && !self.plan.sample_names.is_empty() {
            let record_samples = VariantRecord::samples(record)
                .map_err(|e| DataFusionError::Execution(format!("error reading samples: {e}")))?;
            for sample in record_samples.iter().take(self.plan.sample_names.len()) {
                let mut values = vec![MISSING; self.plan.format_fields.len()];
                for result in sample.iter(header) {
                    let (key, value) = result.map_err(|e| {
                        DataFusionError::Execution(format!("error reading FORMAT field: {e}"))
                    })?;
                    if let Some(&idx) = self.format_index.get(key) {
                        values[idx] = decode_sample_value(key, value).map_err(|e| {
                            DataFusionError::Execution(format!(
                                "error reading FORMAT/{key}: {e}"
                            ))
                        })?;
                    }
                }
                samples.push(values);
            }
        }

        Ok(DecodedVariant {
            chrom,
            pos,
            id,
            reference,
            alt,
            qual,
            filters,
            info,
            annotation,
            samples,
        })
    }
}

/// Collects array elements, dropping missing entries: `[5,3,.,.]` decodes
/// as `[5,3]`.
fn non_missing<T>(values: impl Iterator<Item = io::Result<Option<T>>>) -> io::Result<Vec<T>> {
    let mut out = Vec::new();
    for value in values {
        if let Some(value) = value? {
            out.push(value);
        }
    }
    Ok(out)
}

fn decode_info_value(value: Option<InfoValue<'_>>) -> io::Result<FieldValue> {
    let value = match value {
        Some(value) => value,
        None => return Ok(FieldValue::Missing),
    };
    match value {
        InfoValue::Flag => Ok(FieldValue::Flag(true)),
        InfoValue::Integer(v) => Ok(FieldValue::Int(v)),
        InfoValue::Float(v) => Ok(FieldValue::Float(v)),
        InfoValue::Character(c) => Ok(FieldValue::Text(c.to_string())),
        InfoValue::String(s) => Ok(FieldValue::Text(s.to_string())),
        InfoValue::Array(InfoArray::Integer(values)) => {
            Ok(FieldValue::Ints(non_missing(values.iter())?))
        }
        InfoValue::Array(InfoArray::Float(values)) => {
            Ok(FieldValue::Floats(non_missing(values.iter())?))
        }
        InfoValue::Array(InfoArray::Character(values)) => Ok(FieldValue::Texts(
            non_missing(values.iter())?
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
        )),
        InfoValue::Array(InfoArray::String(values)) => Ok(FieldValue::Texts(
            non_missing(values.iter())?
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
        )),
    }
}

fn decode_sample_value(key: &str, value: Option<SampleValue<'_>>) -> io::Result<FieldValue> {
    // GT renders as a single allele string ("0/1", "1|1", "./1").
    if key == "GT" {
        return match value {
            Some(SampleValue::Genotype(genotype)) => {
                let alleles = genotype.iter().collect::<io::Result<Vec<_>>>()?;
                Ok(FieldValue::Text(format_genotype(&alleles)))
            }
            _ => Ok(FieldValue::Missing),
        };
    }

    let value = match value {
        Some(value) => value,
        None => return Ok(FieldValue::Missing),
    };
    match value {
        SampleValue::Integer(v) => Ok(FieldValue::Int(v)),
        SampleValue::Float(v) => Ok(FieldValue::Float(v)),
        SampleValue::Character(c) => Ok(FieldValue::Text(c.to_string())),
        SampleValue::String(s) => Ok(FieldValue::Text(s.to_string())),
        SampleValue::Array(SampleArray::Integer(values)) => {
            Ok(FieldValue::Ints(non_missing(values.iter())?))
        }
        SampleValue::Array(SampleArray::Float(values)) => {
            Ok(FieldValue::Floats(non_missing(values.iter())?))
        }
        SampleValue::Array(SampleArray::Character(values)) => Ok(FieldValue::Texts(
            non_missing(values.iter())?
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
        )),
        SampleValue::Array(SampleArray::String(values)) => Ok(FieldValue::Texts(
            non_missing(values.iter())?
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
        )),
        SampleValue::Genotype(_) => Ok(FieldValue::Missing),
    }
}

/// Renders a genotype as a separator-joined allele string. The separator
/// before each allele reflects that allele's phasing.
fn format_genotype(alleles: &[(Option<usize>, Phasing)]) -> String {
    let mut out = String::new();
    for (i, (allele, phasing)) in alleles.iter().enumerate() {
        if i > 0 {
            out.push(match phasing {
                Phasing::Phased => '|',
                Phasing::Unphased => '/',
            });
        }
        match allele {
            Some(allele) => {
                let _ = write!(out, "{allele}");
            }
            None => out.push('.'),
        }
    }
    out
}

/// The raw annotation text for a record. `Number=.` headers make noodles
/// split the value on commas; rejoining restores the per-transcript form.
fn annotation_raw(value: Option<InfoValue<'_>>) -> io::Result<Option<String>> {
    match value {
        Some(InfoValue::String(s)) => Ok(Some(s.to_string())),
        Some(InfoValue::Array(InfoArray::String(values))) => {
            let parts: Vec<String> = non_missing(values.iter())?
                .into_iter()
                .map(|s| s.to_string())
                .collect();
            if parts.is_empty() {
                Ok(None)
            } else {
                Ok(Some(parts.join(",")))
            }
        }
        _ => Ok(None),
    }
}

/// Accumulates projected columns for one output batch.
struct BatchAssembler {
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl BatchAssembler {
    fn new(
        projected_schema: SchemaRef,
        projected_kinds: Vec<ColumnKind>,
        batch_size: usize,
    ) -> Result<Self, ArrowError> {
        let builders = projected_schema
            .fields()
            .iter()
            .map(|field| ColumnBuilder::new(field.data_type(), batch_size))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema: projected_schema,
            kinds: projected_kinds,
            builders,
            rows: 0,
        })
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn push_row(
        &mut self,
        plan: &ScanSchema,
        variant: &DecodedVariant,
        sample: Option<usize>,
    ) -> Result<(), ArrowError> {
        for (kind, builder) in self.kinds.iter().zip(self.builders.iter_mut()) {
            write_column(*kind, builder, plan, variant, sample)?;
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<RecordBatch, ArrowError> {
        let rows = self.rows;
        self.rows = 0;
        if self.builders.is_empty() {
            // COUNT(*) projects no columns; the batch carries only a row
            // count.
            let options = RecordBatchOptions::new().with_row_count(Some(rows));
            RecordBatch::try_new_with_options(self.schema.clone(), Vec::new(), &options)
        } else {
            RecordBatch::try_new(self.schema.clone(), builders_to_arrays(&mut self.builders))
        }
    }
}

fn write_column(
    kind: ColumnKind,
    builder: &mut ColumnBuilder,
    plan: &ScanSchema,
    variant: &DecodedVariant,
    sample: Option<usize>,
) -> Result<(), ArrowError> {
    match kind {
        ColumnKind::Chrom => builder.append_string(&variant.chrom),
        ColumnKind::Pos => builder.append_long(variant.pos),
        ColumnKind::Id => match &variant.id {
            Some(id) => builder.append_string(id),
            None => {
                builder.append_null();
                Ok(())
            }
        },
        ColumnKind::Ref => builder.append_string(&variant.reference),
        ColumnKind::Alt => builder.append_array_string(&variant.alt),
        ColumnKind::Qual => match variant.qual {
            Some(qual) => builder.append_double(qual),
            None => {
                builder.append_null();
                Ok(())
            }
        },
        ColumnKind::Filter => {
            if variant.filters.is_empty() {
                builder.append_null();
                Ok(())
            } else {
                builder.append_array_string(&variant.filters)
            }
        }
        ColumnKind::Annotation(idx) => write_annotation(builder, plan, variant, idx),
        ColumnKind::Info(idx) => {
            let field = &plan.info_fields[idx];
            let value = variant.info.get(idx).unwrap_or(&MISSING);
            write_field(builder, field.kind, field.is_list, value)
        }
        ColumnKind::SampleId => {
            let sample = sample.ok_or_else(|| {
                ArrowError::SchemaError("sample_id column outside tidy layout".to_string())
            })?;
            builder.append_string(&plan.sample_names[sample])
        }
        ColumnKind::Format {
            sample: fixed,
            field,
        } => {
            let sample = fixed.or(sample).ok_or_else(|| {
                ArrowError::SchemaError("genotype column without a sample".to_string())
            })?;
            let value = variant
                .samples
                .get(sample)
                .and_then(|values| values.get(field))
                .unwrap_or(&MISSING);
            let field = &plan.format_fields[field];
            write_field(builder, field.kind, field.is_list, value)
        }
    }
}

/// Writes one decoded value into a column, reconciling scalar-vs-list shape
/// mismatches between the header-derived schema and the record: a scalar
/// column takes the first element of an array value, a list column wraps a
/// lone scalar.
fn write_field(
    builder: &mut ColumnBuilder,
    kind: ScalarKind,
    is_list: bool,
    value: &FieldValue,
) -> Result<(), ArrowError> {
    match value {
        FieldValue::Missing => {
            if kind == ScalarKind::Flag {
                builder.append_boolean(false)
            } else {
                builder.append_null();
                Ok(())
            }
        }
        FieldValue::Flag(v) => builder.append_boolean(*v),
        FieldValue::Int(v) => {
            if is_list {
                builder.append_array_int(&[*v])
            } else {
                builder.append_int(*v)
            }
        }
        FieldValue::Float(v) => {
            if is_list {
                builder.append_array_float(&[*v])
            } else {
                builder.append_float(*v)
            }
        }
        FieldValue::Text(v) => {
            if is_list {
                builder.append_array_string(&[v.as_str()])
            } else {
                builder.append_string(v)
            }
        }
        FieldValue::Ints(values) => {
            if is_list {
                builder.append_array_int(values)
            } else {
                match values.first() {
                    Some(v) => builder.append_int(*v),
                    None => {
                        builder.append_null();
                        Ok(())
                    }
                }
            }
        }
        FieldValue::Floats(values) => {
            if is_list {
                builder.append_array_float(values)
            } else {
                match values.first() {
                    Some(v) => builder.append_float(*v),
                    None => {
                        builder.append_null();
                        Ok(())
                    }
                }
            }
        }
        FieldValue::Texts(values) => {
            if is_list {
                builder.append_array_string(values)
            } else {
                match values.first() {
                    Some(v) => builder.append_string(v),
                    None => {
                        builder.append_null();
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Annotation lists keep one element per transcript; a sub-field missing in
/// one transcript becomes a null element so transcripts stay aligned across
/// columns.
fn write_annotation(
    builder: &mut ColumnBuilder,
    plan: &ScanSchema,
    variant: &DecodedVariant,
    idx: usize,
) -> Result<(), ArrowError> {
    let Some(schema) = &plan.annotation else {
        builder.append_null();
        return Ok(());
    };
    let Some(column) = variant
        .annotation
        .as_ref()
        .and_then(|record| record.columns.get(idx))
    else {
        builder.append_null();
        return Ok(());
    };

    match schema.fields[idx].kind {
        AnnotationKind::Integer => {
            let values: Vec<Option<i32>> = column
                .iter()
                .map(|value| match value {
                    AnnotationValue::Integer(v) => Some(*v),
                    _ => None,
                })
                .collect();
            builder.append_array_int_nullable(&values)
        }
        AnnotationKind::Float => {
            let values: Vec<Option<f32>> = column
                .iter()
                .map(|value| match value {
                    AnnotationValue::Float(v) => Some(*v),
                    _ => None,
                })
                .collect();
            builder.append_array_float_nullable(&values)
        }
        AnnotationKind::Text => {
            let values: Vec<Option<String>> = column
                .iter()
                .map(|value| match value {
                    AnnotationValue::Text(v) => Some(v.clone()),
                    _ => None,
                })
                .collect();
            builder.append_array_string_nullable(&values)
        }
    }
}

/// Sends assembled batches over the bounded channel, expanding tidy rows
/// and enforcing the row limit.
struct RowSink<'a> {
    tx: &'a mut BatchSender,
    assembler: BatchAssembler,
    batch_size: usize,
    limit: Option<usize>,
    rows_emitted: usize,
    disconnected: bool,
}

impl<'a> RowSink<'a> {
    fn new(
        tx: &'a mut BatchSender,
        assembler: BatchAssembler,
        batch_size: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            tx,
            assembler,
            batch_size,
            limit,
            rows_emitted: 0,
            disconnected: false,
        }
    }

    fn done(&self) -> bool {
        self.disconnected || self.limit.is_some_and(|limit| self.rows_emitted >= limit)
    }

    /// Emits the output rows for one variant: one row in wide layout, one
    /// row per sample in tidy layout. Returns `false` when the scan should
    /// stop.
    fn push_variant(
        &mut self,
        plan: &ScanSchema,
        variant: &DecodedVariant,
    ) -> Result<bool, DataFusionError> {
        if plan.tidy && !plan.sample_names.is_empty() {
            for sample in 0..plan.sample_names.len() {
                if !self.push_row(plan, variant, Some(sample))? {
                    return Ok(false);
                }
            }
            Ok(!self.done())
        } else {
            self.push_row(plan, variant, None)
        }
    }

    fn push_row(
        &mut self,
        plan: &ScanSchema,
        variant: &DecodedVariant,
        sample: Option<usize>,
    ) -> Result<bool, DataFusionError> {
        if self.done() {
            return Ok(false);
        }
        self.assembler
            .push_row(plan, variant, sample)
            .map_err(|e| DataFusionError::ArrowError(Box::new(e), None))?;
        self.rows_emitted += 1;
        if self.assembler.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(!self.done())
    }

    fn flush(&mut self) -> Result<(), DataFusionError> {
        if self.assembler.is_empty() || self.disconnected {
            return Ok(());
        }
        let batch = self
            .assembler
            .finish()
            .map_err(|e| DataFusionError::ArrowError(Box::new(e), None))?;
        loop {
            match self.tx.try_send(Ok(batch.clone())) {
                Ok(()) => break,
                Err(e) if e.is_disconnected() => {
                    self.disconnected = true;
                    break;
                }
                Err(_) => std::thread::yield_now(),
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DataFusionError> {
        self.flush()
    }
}

/// Everything one scan cursor thread needs, captured by value.
struct ScanTask {
    file_path: String,
    index_path: Option<String>,
    plan: Arc<ScanSchema>,
    projected_schema: SchemaRef,
    projection: Option<Vec<usize>>,
    regions: Vec<Region>,
    contig_queue: Option<Arc<ContigQueue>>,
    limit: Option<usize>,
    batch_size: usize,
    partition: usize,
}

/// Delivers the scan's terminal error over the bounded channel. The channel
/// may be full of pending batches, so a dropped `try_send` would silently
/// truncate the result; retry until the error lands or the receiver is gone.
fn send_terminal_error(tx: &mut BatchSender, e: DataFusionError) {
    let mut item = Err(ArrowError::ExternalError(Box::new(e)));
    loop {
        match tx.try_send(item) {
            Ok(()) => break,
            Err(e) if e.is_disconnected() => break,
            Err(e) => {
                item = e.into_inner();
                std::thread::yield_now();
            }
        }
    }
}

fn run_scan(task: &ScanTask, tx: &mut BatchSender) -> Result<(), DataFusionError> {
    let plan = task.plan.as_ref();
    let projected_kinds: Vec<ColumnKind> = match &task.projection {
        Some(indices) => indices.iter().map(|&i| plan.kinds[i]).collect(),
        None => plan.kinds.clone(),
    };
    let ctx = DecodeContext::new(plan, &projected_kinds);
    let assembler =
        BatchAssembler::new(task.projected_schema.clone(), projected_kinds, task.batch_size)
            .map_err(|e| DataFusionError::ArrowError(Box::new(e), None))?;
    let mut sink = RowSink::new(tx, assembler, task.batch_size, task.limit);

    if !task.regions.is_empty() {
        return scan_regions(task, &ctx, &mut sink);
    }

    if let Some(queue) = &task.contig_queue {
        let index_path = task.index_path.as_deref().ok_or_else(|| {
            DataFusionError::Internal("contig-partitioned scan without an index".to_string())
        })?;
        return match IndexedVcfReader::new(&task.file_path, index_path) {
            Ok(reader) => scan_claimed_contigs(task, reader, queue, &ctx, &mut sink),
            Err(e) if task.partition == 0 => {
                warn!(
                    "failed to open index {index_path} ({e}); falling back to a sequential scan"
                );
                scan_sequential(task, &ctx, &mut sink)
            }
            Err(e) => {
                warn!(
                    "failed to open index {index_path} on partition {} ({e}); emitting no rows",
                    task.partition
                );
                sink.finish()
            }
        };
    }

    if task.partition == 0 {
        scan_sequential(task, &ctx, &mut sink)
    } else {
        sink.finish()
    }
}

/// Scans the explicit region list through the index. Overlapping regions
/// are not deduplicated; a record overlapping two regions appears twice.
fn scan_regions(
    task: &ScanTask,
    ctx: &DecodeContext<'_>,
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let index_path = task.index_path.as_deref().ok_or_else(|| {
        DataFusionError::Internal("region scan without an index".to_string())
    })?;
    let mut reader = IndexedVcfReader::new(&task.file_path, index_path)
        .map_err(|e| DataFusionError::Execution(format!("failed to open indexed VCF: {e}")))?;
    let header = reader.header().clone();

    if task.regions.len() > 1 {
        warn!(
            "scanning {} regions; records overlapping multiple regions are emitted once per region",
            task.regions.len()
        );
    }

    for region in &task.regions {
        let records = reader
            .query(region)
            .map_err(|e| DataFusionError::Execution(format!("region query failed: {e}")))?;
        for result in records {
            let record = result
                .map_err(|e| DataFusionError::Execution(format!("VCF read error: {e}")))?;
            let variant = ctx.decode(&record, &header)?;
            if !sink.push_variant(ctx.plan, &variant)? {
                return sink.finish();
            }
        }
    }
    sink.finish()
}

/// Parallel full scan: workers claim contigs from the shared queue until it
/// drains. A contig the index cannot serve is skipped, not fatal.
fn scan_claimed_contigs(
    task: &ScanTask,
    mut reader: IndexedVcfReader,
    queue: &ContigQueue,
    ctx: &DecodeContext<'_>,
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let header = reader.header().clone();

    while let Some((idx, contig)) = queue.claim() {
        debug!(
            "partition {} claimed contig {contig} ({}/{})",
            task.partition,
            idx + 1,
            queue.len()
        );
        let region = whole_contig(contig);
        let records = match reader.query(&region) {
            Ok(records) => records,
            Err(e) => {
                warn!("contig {contig} not covered by the index ({e}); skipping");
                continue;
            }
        };
        for result in records {
            let record = result
                .map_err(|e| DataFusionError::Execution(format!("VCF read error: {e}")))?;
            let variant = ctx.decode(&record, &header)?;
            if !sink.push_variant(ctx.plan, &variant)? {
                return sink.finish();
            }
        }
    }
    sink.finish()
}

/// Single-cursor full pass, reusing one record buffer across reads.
fn scan_sequential(
    task: &ScanTask,
    ctx: &DecodeContext<'_>,
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let (mut reader, header) = open_sequential_vcf(&task.file_path)
        .map_err(|e| DataFusionError::Execution(format!("failed to open VCF: {e}")))?;

    let mut record = vcf::Record::default();
    loop {
        match reader.read_record(&mut record) {
            Ok(0) => break,
            Ok(_) => {
                let variant = ctx.decode(&record, &header)?;
                if !sink.push_variant(ctx.plan, &variant)? {
                    break;
                }
            }
            Err(e) => {
                return Err(DataFusionError::Execution(format!("VCF read error: {e}")));
            }
        }
    }
    sink.finish()
}

pub struct VcfExec {
    pub(crate) cache: PlanProperties,
    pub(crate) file_path: String,
    pub(crate) index_path: Option<String>,
    pub(crate) scan_schema: Arc<ScanSchema>,
    pub(crate) projected_schema: SchemaRef,
    pub(crate) projection: Option<Vec<usize>>,
    pub(crate) regions: Vec<Region>,
    pub(crate) contig_queue: Option<Arc<ContigQueue>>,
    pub(crate) limit: Option<usize>,
}

impl Debug for VcfExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcfExec")
            .field("file_path", &self.file_path)
            .field("projection", &self.projection)
            .finish()
    }
}

impl DisplayAs for VcfExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<&str> = self
            .projected_schema
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect();
        write!(f, "VcfExec: projection=[{}]", columns.join(", "))
    }
}

impl ExecutionPlan for VcfExec {
    fn name(&self) -> &str {
        "VcfExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.cache
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        _children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> datafusion::common::Result<Arc<dyn ExecutionPlan>> {
        Ok(self)
    }

    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> datafusion::common::Result<SendableRecordBatchStream> {
        debug!("{}: executing partition {partition}", self.name());

        let task = ScanTask {
            file_path: self.file_path.clone(),
            index_path: self.index_path.clone(),
            plan: Arc::clone(&self.scan_schema),
            projected_schema: self.projected_schema.clone(),
            projection: self.projection.clone(),
            regions: self.regions.clone(),
            contig_queue: self.contig_queue.clone(),
            limit: self.limit,
            batch_size: context.session_config().batch_size(),
            partition,
        };

        let (mut tx, rx) = futures::channel::mpsc::channel::<Result<RecordBatch, ArrowError>>(2);

        std::thread::spawn(move || {
            let mut read_and_send = || -> Result<(), DataFusionError> { run_scan(&task, &mut tx) };
            if let Err(e) = read_and_send() {
                send_terminal_error(&mut tx, e);
            }
        });

        let stream = rx.map(|item| item.map_err(|e| DataFusionError::ArrowError(Box::new(e), None)));
        Ok(Box::pin(RecordBatchStreamAdapter::new(
            self.projected_schema.clone(),
            stream,
        )))
    }
}
