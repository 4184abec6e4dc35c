use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Write as _};
use std::io;
use std::sync::Arc;

use crate::storage::{IndexedBamReader, open_sequential_bam};
use crate::table_provider::{ColumnKind, ScanSchema};
use crate::tag_registry::{STANDARD_TAGS, TagColumnType, standard_tag_index};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use datafusion::common::DataFusionError;
use datafusion::execution::TaskContext;
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, PlanProperties, SendableRecordBatchStream,
};
use datafusion_bio_scan_core::regions::whole_contig;
use datafusion_bio_scan_core::scan_planner::ContigQueue;
use datafusion_bio_scan_core::table_utils::{Attribute, ColumnBuilder, builders_to_arrays};
use futures::StreamExt;
use log::{debug, warn};
use noodles_bam as bam;
use noodles_core::Region;
use noodles_sam as sam;
use noodles_sam::alignment::record::cigar::op::Kind;
use noodles_sam::alignment::record::data::field::value::Array as TagArray;
use noodles_sam::alignment::record::data::field::{Tag, Value as TagValue};
use noodles_sam::header::record::value::map::read_group::tag as rg_tag;

type BatchSender = futures::channel::mpsc::Sender<Result<RecordBatch, ArrowError>>;

/// An alignment record decoded exactly once; every projected column is
/// written from this cache without touching the raw record again.
#[derive(Debug)]
struct DecodedAlignment {
    name: Option<String>,
    flags: i32,
    chrom: Option<String>,
    pos: Option<i64>,
    mapq: Option<i32>,
    cigar: Option<String>,
    mate_chrom: Option<String>,
    mate_pos: Option<i64>,
    template_len: i64,
    sequence: Option<String>,
    quality_scores: Option<String>,
    read_group: Option<String>,
    sample_id: Option<String>,
    /// Aligned with [`STANDARD_TAGS`]; empty unless typed tag columns are
    /// projected.
    standard_tags: Vec<Option<StandardTagValue>>,
    tags: Vec<Attribute>,
}

/// A standard tag decoded into its typed column shape.
#[derive(Debug)]
enum StandardTagValue {
    Text(String),
    Int(i64),
    IntArray(Vec<i64>),
}

/// Which parts of a record the projected columns actually need.
#[derive(Debug, Default, Clone, Copy)]
struct DecodeMask {
    name: bool,
    chrom: bool,
    mapq: bool,
    cigar: bool,
    mate_chrom: bool,
    mate_pos: bool,
    sequence: bool,
    quality: bool,
    read_group: bool,
    sample: bool,
    standard_tags: bool,
    tags: bool,
}

impl DecodeMask {
    fn from_kinds(kinds: &[ColumnKind]) -> Self {
        let mut mask = Self::default();
        for kind in kinds {
            match kind {
                ColumnKind::Name => mask.name = true,
                ColumnKind::Flags => {}
                ColumnKind::Chrom => mask.chrom = true,
                ColumnKind::Pos => {}
                ColumnKind::Mapq => mask.mapq = true,
                ColumnKind::Cigar => mask.cigar = true,
                ColumnKind::MateChrom => mask.mate_chrom = true,
                ColumnKind::MatePos => mask.mate_pos = true,
                ColumnKind::TemplateLen => {}
                ColumnKind::Sequence => mask.sequence = true,
                ColumnKind::QualityScores => mask.quality = true,
                ColumnKind::ReadGroup => mask.read_group = true,
                ColumnKind::SampleId => mask.sample = true,
                ColumnKind::StandardTag(_) => mask.standard_tags = true,
                ColumnKind::Tags => mask.tags = true,
            }
        }
        mask
    }

    fn needs_data(&self) -> bool {
        self.read_group || self.sample || self.standard_tags || self.tags
    }
}

/// Per-thread decoding state built from the header each reader parsed.
struct DecodeContext {
    mask: DecodeMask,
    /// Whether the table routes standard tags to typed columns. This is a
    /// table-level property, not a projection-level one: standard tags stay
    /// out of the catch-all even when no typed column is projected.
    route_standard_tags: bool,
    reference_names: Vec<String>,
    /// Read group ID to `SM` sample name.
    rg_samples: HashMap<String, String>,
}

impl DecodeContext {
    fn new(
        projected_kinds: &[ColumnKind],
        route_standard_tags: bool,
        header: &sam::Header,
    ) -> Self {
        let reference_names = header
            .reference_sequences()
            .keys()
            .map(|name| String::from_utf8_lossy(name.as_ref()).to_string())
            .collect();
        let mut rg_samples = HashMap::new();
        for (id, map) in header.read_groups() {
            if let Some(sample) = map.other_fields().get(&rg_tag::SAMPLE) {
                rg_samples.insert(
                    String::from_utf8_lossy(id.as_ref()).to_string(),
                    String::from_utf8_lossy(sample.as_ref()).to_string(),
                );
            }
        }
        Self {
            mask: DecodeMask::from_kinds(projected_kinds),
            route_standard_tags,
            reference_names,
            rg_samples,
        }
    }

    fn reference_name(&self, id: usize) -> Result<String, DataFusionError> {
        self.reference_names.get(id).cloned().ok_or_else(|| {
            DataFusionError::Execution(format!(
                "reference sequence id {id} not declared in the header"
            ))
        })
    }

    fn decode(&self, record: &bam::Record) -> Result<DecodedAlignment, DataFusionError> {
        let mask = &self.mask;

        let name = if mask.name {
            record.name().map(|name| name.to_string())
        } else {
            None
        };

        let flags = i32::from(record.flags().bits());

        let chrom = if mask.chrom {
            record
                .reference_sequence_id()
                .transpose()
                .map_err(|e| {
                    DataFusionError::Execution(format!("invalid reference sequence id: {e}"))
                })?
                .map(|id| self.reference_name(id))
                .transpose()?
        } else {
            None
        };

        let pos = record
            .alignment_start()
            .transpose()
            .map_err(|e| DataFusionError::Execution(format!("invalid alignment start: {e}")))?
            .map(|pos| pos.get() as i64);

        let mapq = if mask.mapq {
            record.mapping_quality().map(|mapq| i32::from(mapq.get()))
        } else {
            None
        };

        let cigar = if mask.cigar {
            let cigar = record.cigar();
            if cigar.is_empty() {
                None
            } else {
                Some(render_cigar(cigar.iter()).map_err(|e| {
                    DataFusionError::Execution(format!("invalid CIGAR: {e}"))
                })?)
            }
        } else {
            None
        };

        let mate_chrom = if mask.mate_chrom {
            record
                .mate_reference_sequence_id()
                .transpose()
                .map_err(|e| {
                    DataFusionError::Execution(format!(
                        "invalid mate reference sequence id: {e}"
                    ))
                })?
                .map(|id| self.reference_name(id))
                .transpose()?
        } else {
            None
        };

        let mate_pos = if mask.mate_pos {
            record
                .mate_alignment_start()
                .transpose()
                .map_err(|e| {
                    DataFusionError::Execution(format!("invalid mate alignment start: {e}"))
                })?
                .map(|pos| pos.get() as i64)
        } else {
            None
        };

        let template_len = i64::from(record.template_length());

        let sequence = if mask.sequence {
            let sequence = record.sequence();
            if sequence.is_empty() {
                None
            } else {
                let mut out = string_with_capacity(sequence.len())?;
                for base in sequence.iter() {
                    out.push(char::from(base));
                }
                Some(out)
            }
        } else {
            None
        };

        let quality_scores = if mask.quality {
            let scores = record.quality_scores();
            if scores.is_empty() {
                None
            } else {
                let mut out = string_with_capacity(scores.len())?;
                for score in scores.iter() {
                    out.push(char::from(score.saturating_add(b'!')));
                }
                Some(out)
            }
        } else {
            None
        };

        let mut read_group = None;
        let mut standard_tags: Vec<Option<StandardTagValue>> = Vec::new();
        if mask.standard_tags {
            standard_tags.resize_with(STANDARD_TAGS.len(), || None);
        }
        let mut tags = Vec::new();
        if mask.needs_data() {
            for result in record.data().iter() {
                let (tag, value) = result.map_err(|e| {
                    DataFusionError::Execution(format!("error reading auxiliary field: {e}"))
                })?;
                let field_error = |e: io::Error| {
                    DataFusionError::Execution(format!(
                        "error reading auxiliary field {}: {e}",
                        tag_name(tag)
                    ))
                };
                if tag == Tag::READ_GROUP {
                    read_group = render_tag_value(&value).map_err(field_error)?;
                    continue;
                }
                if self.route_standard_tags {
                    if let Some(idx) = standard_tag_index(*tag.as_ref()) {
                        if mask.standard_tags {
                            standard_tags[idx] =
                                coerce_standard_tag(STANDARD_TAGS[idx].column_type, &value)
                                    .map_err(field_error)?;
                        }
                        continue;
                    }
                }
                if mask.tags {
                    let rendered = render_tag_value(&value).map_err(field_error)?;
                    tags.push(Attribute {
                        tag: tag_name(tag),
                        value: rendered,
                    });
                }
            }
        }
        let sample_id = read_group
            .as_ref()
            .and_then(|rg| self.rg_samples.get(rg))
            .cloned();

        Ok(DecodedAlignment {
            name,
            flags,
            chrom,
            pos,
            mapq,
            cigar,
            mate_chrom,
            mate_pos,
            template_len,
            sequence,
            quality_scores,
            read_group,
            sample_id,
            standard_tags,
            tags,
        })
    }
}

/// Converts an auxiliary field value into the declared column shape of a
/// standard tag. A value whose stored type does not match the declared one
/// yields null rather than an error.
fn coerce_standard_tag(
    column_type: TagColumnType,
    value: &TagValue<'_>,
) -> io::Result<Option<StandardTagValue>> {
    let coerced = match column_type {
        TagColumnType::Text => match value {
            TagValue::Character(c) => Some(StandardTagValue::Text(char::from(*c).to_string())),
            TagValue::String(s) | TagValue::Hex(s) => Some(StandardTagValue::Text(
                String::from_utf8_lossy(s).into_owned(),
            )),
            _ => None,
        },
        TagColumnType::Int => tag_int(value).map(StandardTagValue::Int),
        TagColumnType::IntArray => match value {
            TagValue::Array(array) => tag_int_array(array)?.map(StandardTagValue::IntArray),
            _ => None,
        },
    };
    Ok(coerced)
}

fn tag_int(value: &TagValue<'_>) -> Option<i64> {
    match value {
        TagValue::Int8(v) => Some(i64::from(*v)),
        TagValue::UInt8(v) => Some(i64::from(*v)),
        TagValue::Int16(v) => Some(i64::from(*v)),
        TagValue::UInt16(v) => Some(i64::from(*v)),
        TagValue::Int32(v) => Some(i64::from(*v)),
        TagValue::UInt32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn tag_int_array(array: &TagArray<'_>) -> io::Result<Option<Vec<i64>>> {
    let values: io::Result<Vec<i64>> = match array {
        TagArray::Int8(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::UInt8(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::Int16(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::UInt16(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::Int32(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::UInt32(values) => values.iter().map(|v| v.map(i64::from)).collect(),
        TagArray::Float(_) => return Ok(None),
    };
    values.map(Some)
}

/// Allocates a string buffer up front, surfacing allocation failure instead
/// of aborting on a corrupt length.
fn string_with_capacity(len: usize) -> Result<String, DataFusionError> {
    let mut out = String::new();
    out.try_reserve(len).map_err(|_| {
        DataFusionError::ResourcesExhausted(format!(
            "failed to allocate {len} bytes decoding an alignment record"
        ))
    })?;
    Ok(out)
}

fn cigar_op_char(kind: Kind) -> char {
    match kind {
        Kind::Match => 'M',
        Kind::Insertion => 'I',
        Kind::Deletion => 'D',
        Kind::Skip => 'N',
        Kind::SoftClip => 'S',
        Kind::HardClip => 'H',
        Kind::Pad => 'P',
        Kind::SequenceMatch => '=',
        Kind::SequenceMismatch => 'X',
    }
}

fn render_cigar(
    ops: impl Iterator<Item = io::Result<sam::alignment::record::cigar::Op>>,
) -> io::Result<String> {
    let mut out = String::new();
    for op in ops {
        let op = op?;
        let _ = write!(out, "{}{}", op.len(), cigar_op_char(op.kind()));
    }
    Ok(out)
}

fn tag_name(tag: Tag) -> String {
    let bytes: &[u8; 2] = tag.as_ref();
    format!("{}{}", bytes[0] as char, bytes[1] as char)
}

fn join_values<T: Display>(values: impl Iterator<Item = io::Result<T>>) -> io::Result<String> {
    let mut out = String::new();
    for value in values {
        let value = value?;
        if !out.is_empty() {
            out.push(',');
        }
        let _ = write!(out, "{value}");
    }
    Ok(out)
}

/// Renders an auxiliary field value as text. Numeric arrays join their
/// elements with commas.
fn render_tag_value(value: &TagValue<'_>) -> io::Result<Option<String>> {
    let rendered = match value {
        TagValue::Character(c) => char::from(*c).to_string(),
        TagValue::Int8(v) => v.to_string(),
        TagValue::UInt8(v) => v.to_string(),
        TagValue::Int16(v) => v.to_string(),
        TagValue::UInt16(v) => v.to_string(),
        TagValue::Int32(v) => v.to_string(),
        TagValue::UInt32(v) => v.to_string(),
        TagValue::Float(v) => v.to_string(),
        TagValue::String(s) => String::from_utf8_lossy(s).into_owned(),
        TagValue::Hex(s) => String::from_utf8_lossy(s).into_owned(),
        TagValue::Array(TagArray::Int8(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::UInt8(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::Int16(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::UInt16(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::Int32(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::UInt32(values)) => join_values(values.iter())?,
        TagValue::Array(TagArray::Float(values)) => join_values(values.iter())?,
    };
    Ok(Some(rendered))
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

    fn push_row(&mut self, alignment: &DecodedAlignment) -> Result<(), ArrowError> {
        for (kind, builder) in self.kinds.iter().zip(self.builders.iter_mut()) {
            write_column(*kind, builder, alignment)?;
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

fn append_opt_string(
    builder: &mut ColumnBuilder,
    value: Option<&String>,
) -> Result<(), ArrowError> {
    match value {
        Some(value) => builder.append_string(value),
        None => {
            builder.append_null();
            Ok(())
        }
    }
}

fn write_column(
    kind: ColumnKind,
    builder: &mut ColumnBuilder,
    alignment: &DecodedAlignment,
) -> Result<(), ArrowError> {
    match kind {
        ColumnKind::Name => append_opt_string(builder, alignment.name.as_ref()),
        ColumnKind::Flags => builder.append_int(alignment.flags),
        ColumnKind::Chrom => append_opt_string(builder, alignment.chrom.as_ref()),
        ColumnKind::Pos => match alignment.pos {
            Some(pos) => builder.append_long(pos),
            None => {
                builder.append_null();
                Ok(())
            }
        },
        ColumnKind::Mapq => match alignment.mapq {
            Some(mapq) => builder.append_int(mapq),
            None => {
                builder.append_null();
                Ok(())
            }
        },
        ColumnKind::Cigar => append_opt_string(builder, alignment.cigar.as_ref()),
        ColumnKind::MateChrom => append_opt_string(builder, alignment.mate_chrom.as_ref()),
        ColumnKind::MatePos => match alignment.mate_pos {
            Some(pos) => builder.append_long(pos),
            None => {
                builder.append_null();
                Ok(())
            }
        },
        ColumnKind::TemplateLen => builder.append_long(alignment.template_len),
        ColumnKind::Sequence => append_opt_string(builder, alignment.sequence.as_ref()),
        ColumnKind::QualityScores => {
            append_opt_string(builder, alignment.quality_scores.as_ref())
        }
        ColumnKind::ReadGroup => append_opt_string(builder, alignment.read_group.as_ref()),
        ColumnKind::SampleId => append_opt_string(builder, alignment.sample_id.as_ref()),
        ColumnKind::StandardTag(idx) => {
            match alignment.standard_tags.get(idx).and_then(Option::as_ref) {
                Some(StandardTagValue::Text(v)) => builder.append_string(v),
                Some(StandardTagValue::Int(v)) => builder.append_long(*v),
                Some(StandardTagValue::IntArray(v)) => builder.append_array_long(v),
                None => {
                    builder.append_null();
                    Ok(())
                }
            }
        }
        ColumnKind::Tags => builder.append_attributes(&alignment.tags),
    }
}

/// Sends assembled batches over the bounded channel, enforcing the row
/// limit.
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

    /// Emits one output row. Returns `false` when the scan should stop.
    fn push_row(&mut self, alignment: &DecodedAlignment) -> Result<bool, DataFusionError> {
        if self.done() {
            return Ok(false);
        }
        self.assembler
            .push_row(alignment)
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
    let assembler = BatchAssembler::new(
        task.projected_schema.clone(),
        projected_kinds.clone(),
        task.batch_size,
    )
    .map_err(|e| DataFusionError::ArrowError(Box::new(e), None))?;
    let mut sink = RowSink::new(tx, assembler, task.batch_size, task.limit);

    if !task.regions.is_empty() {
        return scan_regions(task, &projected_kinds, &mut sink);
    }

    if let Some(queue) = &task.contig_queue {
        let index_path = task.index_path.as_deref().ok_or_else(|| {
            DataFusionError::Internal("contig-partitioned scan without an index".to_string())
        })?;
        return match IndexedBamReader::new(&task.file_path, index_path) {
            Ok(reader) => scan_claimed_contigs(task, reader, queue, &projected_kinds, &mut sink),
            Err(e) if task.partition == 0 => {
                warn!(
                    "failed to open index {index_path} ({e}); falling back to a sequential scan"
                );
                scan_sequential(task, &projected_kinds, &mut sink)
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
        scan_sequential(task, &projected_kinds, &mut sink)
    } else {
        sink.finish()
    }
}

/// Scans the explicit region list through the index. Overlapping regions
/// are not deduplicated; a record overlapping two regions appears twice.
fn scan_regions(
    task: &ScanTask,
    projected_kinds: &[ColumnKind],
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let index_path = task
        .index_path
        .as_deref()
        .ok_or_else(|| DataFusionError::Internal("region scan without an index".to_string()))?;
    let mut reader = IndexedBamReader::new(&task.file_path, index_path)
        .map_err(|e| DataFusionError::Execution(format!("failed to open indexed BAM: {e}")))?;
    let ctx = DecodeContext::new(projected_kinds, task.plan.standard_tags, reader.header());

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
                .map_err(|e| DataFusionError::Execution(format!("BAM read error: {e}")))?;
            let alignment = ctx.decode(&record)?;
            if !sink.push_row(&alignment)? {
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
    mut reader: IndexedBamReader,
    queue: &ContigQueue,
    projected_kinds: &[ColumnKind],
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let ctx = DecodeContext::new(projected_kinds, task.plan.standard_tags, reader.header());

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
                .map_err(|e| DataFusionError::Execution(format!("BAM read error: {e}")))?;
            let alignment = ctx.decode(&record)?;
            if !sink.push_row(&alignment)? {
                return sink.finish();
            }
        }
    }

    // Unplaced records belong to no contig, so no claim ever reaches them;
    // the first partition drains them once the queue is empty.
    if task.partition == 0 {
        let records = reader.query_unmapped().map_err(|e| {
            DataFusionError::Execution(format!("unplaced record query failed: {e}"))
        })?;
        for result in records {
            let record = result
                .map_err(|e| DataFusionError::Execution(format!("BAM read error: {e}")))?;
            let alignment = ctx.decode(&record)?;
            if !sink.push_row(&alignment)? {
                break;
            }
        }
    }
    sink.finish()
}

/// Single-cursor full pass, reusing one record buffer across reads.
fn scan_sequential(
    task: &ScanTask,
    projected_kinds: &[ColumnKind],
    sink: &mut RowSink<'_>,
) -> Result<(), DataFusionError> {
    let (mut reader, header) = open_sequential_bam(&task.file_path)
        .map_err(|e| DataFusionError::Execution(format!("failed to open BAM: {e}")))?;
    let ctx = DecodeContext::new(projected_kinds, task.plan.standard_tags, &header);

    let mut record = bam::Record::default();
    loop {
        match reader.read_record(&mut record) {
            Ok(0) => break,
            Ok(_) => {
                let alignment = ctx.decode(&record)?;
                if !sink.push_row(&alignment)? {
                    break;
                }
            }
            Err(e) => {
                return Err(DataFusionError::Execution(format!("BAM read error: {e}")));
            }
        }
    }
    sink.finish()
}

pub struct BamExec {
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

impl Debug for BamExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamExec")
            .field("file_path", &self.file_path)
            .field("projection", &self.projection)
            .finish()
    }
}

impl DisplayAs for BamExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<&str> = self
            .projected_schema
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect();
        write!(f, "BamExec: projection=[{}]", columns.join(", "))
    }
}

impl ExecutionPlan for BamExec {
    fn name(&self) -> &str {
        "BamExec"
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
