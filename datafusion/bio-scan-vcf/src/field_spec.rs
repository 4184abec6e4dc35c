use log::warn;
use noodles_vcf::header::record::value::map::format::{
    Number as FormatNumber, Type as FormatType,
};
use noodles_vcf::header::record::value::map::info::{Number as InfoNumber, Type as InfoType};
use std::fmt;

/// Arity class of an annotatable field, per the VCF specification's
/// `Number` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityClass {
    /// A fixed element count (`Number=<n>`).
    Fixed(usize),
    /// One value per alternate allele (`Number=A`).
    PerAltAllele,
    /// One value per allele, reference included (`Number=R`).
    PerAllele,
    /// One value per genotype combination (`Number=G`).
    PerGenotype,
    /// Unknown or variable count (`Number=.`).
    Variable,
}

impl ArityClass {
    /// Whether a field of this arity is shaped as a list column.
    pub fn is_list(self) -> bool {
        !matches!(self, ArityClass::Fixed(0) | ArityClass::Fixed(1))
    }
}

impl fmt::Display for ArityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArityClass::Fixed(n) => write!(f, "{n}"),
            ArityClass::PerAltAllele => f.write_str("A"),
            ArityClass::PerAllele => f.write_str("R"),
            ArityClass::PerGenotype => f.write_str("G"),
            ArityClass::Variable => f.write_str("."),
        }
    }
}

/// Scalar kind of an annotatable field, per the `Type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// Presence flag.
    Flag,
    /// 32-bit integer.
    Integer,
    /// 32-bit float.
    Float,
    /// Text (`String` and `Character` both decode as text).
    Text,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Flag => f.write_str("Flag"),
            ScalarKind::Integer => f.write_str("Integer"),
            ScalarKind::Float => f.write_str("Float"),
            ScalarKind::Text => f.write_str("String"),
        }
    }
}

/// Maps a header INFO `Number` to an arity class.
pub fn info_arity(number: InfoNumber) -> ArityClass {
    match number {
        InfoNumber::Count(n) => ArityClass::Fixed(n),
        InfoNumber::AlternateBases => ArityClass::PerAltAllele,
        InfoNumber::ReferenceAlternateBases => ArityClass::PerAllele,
        InfoNumber::Samples => ArityClass::PerGenotype,
        InfoNumber::Unknown => ArityClass::Variable,
    }
}

/// Maps a header FORMAT `Number` to an arity class.
///
/// The local-allele and ploidy-dependent counts added by VCF 4.4+ have no
/// entry in the reserved-field table and shape as variable-length lists.
pub fn format_arity(number: FormatNumber) -> ArityClass {
    match number {
        FormatNumber::Count(n) => ArityClass::Fixed(n),
        FormatNumber::AlternateBases => ArityClass::PerAltAllele,
        FormatNumber::ReferenceAlternateBases => ArityClass::PerAllele,
        FormatNumber::Samples => ArityClass::PerGenotype,
        FormatNumber::Unknown => ArityClass::Variable,
        _ => ArityClass::Variable,
    }
}

/// Maps a header INFO `Type` to a scalar kind.
pub fn info_kind(ty: InfoType) -> ScalarKind {
    match ty {
        InfoType::Flag => ScalarKind::Flag,
        InfoType::Integer => ScalarKind::Integer,
        InfoType::Float => ScalarKind::Float,
        InfoType::String | InfoType::Character => ScalarKind::Text,
    }
}

/// Maps a header FORMAT `Type` to a scalar kind.
pub fn format_kind(ty: FormatType) -> ScalarKind {
    match ty {
        FormatType::Integer => ScalarKind::Integer,
        FormatType::Float => ScalarKind::Float,
        FormatType::String | FormatType::Character => ScalarKind::Text,
    }
}

struct FieldSpec {
    name: &'static str,
    arity: ArityClass,
    kind: ScalarKind,
}

/// Reserved INFO fields, per the VCF specification.
const INFO_SPECS: &[FieldSpec] = &[
    FieldSpec { name: "AD", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "ADF", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "ADR", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "AC", arity: ArityClass::PerAltAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "AF", arity: ArityClass::PerAltAllele, kind: ScalarKind::Float },
    FieldSpec { name: "CIGAR", arity: ArityClass::PerAltAllele, kind: ScalarKind::Text },
    FieldSpec { name: "AA", arity: ArityClass::Fixed(1), kind: ScalarKind::Text },
    FieldSpec { name: "AN", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "BQ", arity: ArityClass::Fixed(1), kind: ScalarKind::Float },
    FieldSpec { name: "DB", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
    FieldSpec { name: "DP", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "END", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "H2", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
    FieldSpec { name: "H3", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
    FieldSpec { name: "MQ", arity: ArityClass::Fixed(1), kind: ScalarKind::Float },
    FieldSpec { name: "MQ0", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "NS", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "SB", arity: ArityClass::Fixed(4), kind: ScalarKind::Integer },
    FieldSpec { name: "SOMATIC", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
    FieldSpec { name: "VALIDATED", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
    FieldSpec { name: "1000G", arity: ArityClass::Fixed(0), kind: ScalarKind::Flag },
];

/// Reserved FORMAT fields, per the VCF specification.
const FORMAT_SPECS: &[FieldSpec] = &[
    FieldSpec { name: "AD", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "ADF", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "ADR", arity: ArityClass::PerAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "EC", arity: ArityClass::PerAltAllele, kind: ScalarKind::Integer },
    FieldSpec { name: "GL", arity: ArityClass::PerGenotype, kind: ScalarKind::Float },
    FieldSpec { name: "GP", arity: ArityClass::PerGenotype, kind: ScalarKind::Float },
    FieldSpec { name: "PL", arity: ArityClass::PerGenotype, kind: ScalarKind::Integer },
    FieldSpec { name: "PP", arity: ArityClass::PerGenotype, kind: ScalarKind::Integer },
    FieldSpec { name: "DP", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "LEN", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "FT", arity: ArityClass::Fixed(1), kind: ScalarKind::Text },
    FieldSpec { name: "GQ", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "GT", arity: ArityClass::Fixed(1), kind: ScalarKind::Text },
    FieldSpec { name: "HQ", arity: ArityClass::Fixed(2), kind: ScalarKind::Integer },
    FieldSpec { name: "MQ", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "PQ", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
    FieldSpec { name: "PS", arity: ArityClass::Fixed(1), kind: ScalarKind::Integer },
];

fn lookup(table: &'static [FieldSpec], name: &str) -> Option<&'static FieldSpec> {
    table.iter().find(|spec| spec.name == name)
}

/// A fixed-arity spec mismatches any non-fixed header arity; other spec
/// arities tolerate a header that declares variable count.
fn arity_mismatch(spec: ArityClass, header: ArityClass) -> bool {
    match spec {
        ArityClass::Fixed(_) => !matches!(header, ArityClass::Fixed(_)),
        other => header != other && header != ArityClass::Variable,
    }
}

fn validate(
    field_class: &str,
    name: &str,
    spec: Option<&'static FieldSpec>,
    header_arity: ArityClass,
    header_kind: ScalarKind,
) -> ArityClass {
    let Some(spec) = spec else {
        return header_arity;
    };

    let mut corrected = header_arity;
    if arity_mismatch(spec.arity, header_arity) {
        warn!(
            "{field_class}/{name} should be Number={} per VCF spec; correcting schema",
            spec.arity
        );
        corrected = spec.arity;
    }
    if spec.kind != header_kind {
        warn!(
            "{field_class}/{name} should be Type={} per VCF spec, but header declares Type={}; using header type",
            spec.kind, header_kind
        );
    }
    corrected
}

/// Validates a header-declared INFO field against the reserved-field table.
///
/// Returns the corrected arity class (used for list-vs-scalar column
/// shaping). A mismatch emits a warning; the header's scalar type remains
/// authoritative for decoding. Fields outside the table pass through
/// unchanged.
pub fn validate_info_field(
    name: &str,
    header_arity: ArityClass,
    header_kind: ScalarKind,
) -> ArityClass {
    validate(
        "INFO",
        name,
        lookup(INFO_SPECS, name),
        header_arity,
        header_kind,
    )
}

/// Validates a header-declared FORMAT field against the reserved-field
/// table; see [`validate_info_field`].
pub fn validate_format_field(
    name: &str,
    header_arity: ArityClass,
    header_kind: ScalarKind,
) -> ArityClass {
    validate(
        "FORMAT",
        name,
        lookup(FORMAT_SPECS, name),
        header_arity,
        header_kind,
    )
}
