use log::debug;
use noodles_vcf::Header;

/// Recognized structured-annotation INFO tags, in detection priority order.
pub const ANNOTATION_TAGS: [&str; 3] = ["CSQ", "BCSQ", "ANN"];

/// Inferred type of one annotation sub-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Whole-number sub-field (distances, strands, offsets).
    Integer,
    /// Fractional sub-field (allele frequencies, scores).
    Float,
    /// Free-text sub-field.
    Text,
}

/// One declared annotation sub-field.
#[derive(Debug, Clone)]
pub struct AnnotationField {
    /// Sub-field name as declared in the `Format:` hint.
    pub name: String,
    /// Inferred value type.
    pub kind: AnnotationKind,
    /// Whether the sub-field holds `&`-joined multi-values per transcript
    /// (consequence terms, flags, clinical significance).
    pub is_list: bool,
}

/// Parsed annotation schema for one file: the detected tag and its ordered
/// sub-field list.
#[derive(Debug, Clone)]
pub struct AnnotationSchema {
    /// The INFO tag the annotations live under.
    pub tag: String,
    /// Declared sub-fields, in pipe order.
    pub fields: Vec<AnnotationField>,
}

/// Infers a sub-field's type from its name, following the bcftools
/// split-vep conventions.
pub fn infer_kind(name: &str) -> AnnotationKind {
    if matches!(
        name,
        "DISTANCE" | "STRAND" | "TSL" | "GENE_PHENO" | "HGVS_OFFSET"
    ) || name.starts_with("MOTIF_POS")
    {
        return AnnotationKind::Integer;
    }
    // Multi-value text names take precedence over the frequency patterns.
    if is_list_name(name) {
        return AnnotationKind::Text;
    }
    if name.contains("_AF")
        || name.contains("AF_")
        || name.contains("MOTIF_SCORE_CHANGE")
        || name.starts_with("SpliceAI_pred_DS_")
    {
        return AnnotationKind::Float;
    }
    AnnotationKind::Text
}

fn is_list_name(name: &str) -> bool {
    matches!(name, "Consequence" | "FLAGS" | "CLIN_SIG")
}

impl AnnotationSchema {
    /// Detects and parses the annotation schema from a header.
    ///
    /// Tags are probed in [`ANNOTATION_TAGS`] order; the first one that is
    /// declared as an INFO field and carries a `Format:` hint in its
    /// description wins. Absence is soft: `None` means the annotation
    /// columns are simply omitted.
    pub fn from_header(header: &Header) -> Option<Self> {
        for tag in ANNOTATION_TAGS {
            if let Some(info) = header.infos().get(tag) {
                if let Some(schema) = Self::from_description(tag, info.description()) {
                    return Some(schema);
                }
                debug!("INFO/{tag} present but has no 'Format:' hint; skipping annotation parse");
            }
        }
        None
    }

    /// Parses a schema from a field description's `Format: a|b|c` hint.
    pub fn from_description(tag: &str, description: &str) -> Option<Self> {
        let format = description.split_once("Format: ")?.1;
        // The hint ends at the closing quote when the description text was
        // extracted verbatim from the header line.
        let format = format.split('"').next().unwrap_or(format);

        let fields: Vec<AnnotationField> = format
            .split('|')
            .map(|name| {
                let name = name.trim();
                AnnotationField {
                    name: name.to_string(),
                    kind: infer_kind(name),
                    is_list: is_list_name(name),
                }
            })
            .collect();

        if fields.iter().all(|f| f.name.is_empty()) {
            return None;
        }

        Some(Self {
            tag: tag.to_string(),
            fields,
        })
    }

    /// Parses one record's raw annotation value.
    ///
    /// The value is split on `,` into transcripts and each transcript on
    /// `|` into at most `fields.len()` sub-fields; surplus sub-fields are
    /// ignored and absent ones are missing. Returns `None` for an empty
    /// value.
    pub fn parse_record(&self, raw: &str) -> Option<AnnotationRecord> {
        if raw.is_empty() {
            return None;
        }
        let mut columns: Vec<Vec<AnnotationValue>> = vec![Vec::new(); self.fields.len()];
        for transcript in raw.split(',') {
            let mut tokens = transcript.split('|');
            for (field, column) in self.fields.iter().zip(columns.iter_mut()) {
                let token = tokens.next().unwrap_or("").trim();
                column.push(parse_value(field.kind, token));
            }
        }
        Some(AnnotationRecord { columns })
    }
}

/// One parsed sub-field value.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// Empty, `.`, or failed strict numeric parse.
    Missing,
    /// Parsed integer.
    Integer(i32),
    /// Parsed float.
    Float(f32),
    /// Verbatim text.
    Text(String),
}

/// Column-oriented parse of one record's annotation value: one vector per
/// schema field, one entry per transcript.
#[derive(Debug)]
pub struct AnnotationRecord {
    /// `columns[field][transcript]`, aligned with the schema's field order.
    pub columns: Vec<Vec<AnnotationValue>>,
}

impl AnnotationRecord {
    /// Number of transcripts in this record.
    pub fn transcript_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Numeric sub-fields use strict whole-string parsing: any trailing
/// non-numeric content makes the value missing, never a partial parse.
fn parse_value(kind: AnnotationKind, token: &str) -> AnnotationValue {
    if token.is_empty() || token == "." {
        return AnnotationValue::Missing;
    }
    match kind {
        AnnotationKind::Integer => token
            .parse::<i32>()
            .map(AnnotationValue::Integer)
            .unwrap_or(AnnotationValue::Missing),
        AnnotationKind::Float => token
            .parse::<f32>()
            .map(AnnotationValue::Float)
            .unwrap_or(AnnotationValue::Missing),
        AnnotationKind::Text => AnnotationValue::Text(token.to_string()),
    }
}
