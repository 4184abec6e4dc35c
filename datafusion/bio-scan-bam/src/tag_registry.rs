//! Registry of the standard SAM auxiliary tags and their column types.
//!
//! When typed tag columns are enabled, every tag listed here gets its own
//! result column; the catch-all `tags` column then only carries tags the
//! registry does not know. `RG` is absent because it always routes to the
//! `read_group` column.

use datafusion::arrow::datatypes::{DataType, Field};
use std::sync::Arc;

/// Column shape of a standard auxiliary tag. The standard list declares
/// only text, integer, and integer-array tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagColumnType {
    /// `A`, `Z`, and `H` typed tags.
    Text,
    /// `i` typed tags, widened to cover every integer width.
    Int,
    /// `B` arrays; every standard array tag has an integer subtype.
    IntArray,
}

impl TagColumnType {
    pub(crate) fn data_type(self) -> DataType {
        match self {
            Self::Text => DataType::Utf8,
            Self::Int => DataType::Int64,
            Self::IntArray => {
                DataType::List(Arc::new(Field::new("item", DataType::Int64, true)))
            }
        }
    }
}

/// A tag defined by the SAM specification's standard tag list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StandardTag {
    pub tag: [u8; 2],
    pub column_type: TagColumnType,
}

impl StandardTag {
    /// The tag's two-character name, used verbatim as the column name.
    pub(crate) fn name(&self) -> String {
        format!("{}{}", self.tag[0] as char, self.tag[1] as char)
    }
}

const fn t(tag: &[u8; 2], column_type: TagColumnType) -> StandardTag {
    StandardTag {
        tag: *tag,
        column_type,
    }
}

use TagColumnType as T;

/// Standard tags in column order.
pub(crate) const STANDARD_TAGS: &[StandardTag] = &[
    t(b"AM", T::Int),
    t(b"AS", T::Int),
    t(b"BC", T::Text),
    t(b"BQ", T::Text),
    t(b"BZ", T::Text),
    t(b"CB", T::Text),
    t(b"CC", T::Text),
    t(b"CG", T::IntArray),
    t(b"CM", T::Int),
    t(b"CO", T::Text),
    t(b"CP", T::Int),
    t(b"CQ", T::Text),
    t(b"CR", T::Text),
    t(b"CS", T::Text),
    t(b"CT", T::Text),
    t(b"CY", T::Text),
    t(b"E2", T::Text),
    t(b"FI", T::Int),
    t(b"FS", T::Text),
    t(b"FZ", T::IntArray),
    t(b"H0", T::Int),
    t(b"H1", T::Int),
    t(b"H2", T::Int),
    t(b"HI", T::Int),
    t(b"IH", T::Int),
    t(b"LB", T::Text),
    t(b"MC", T::Text),
    t(b"MD", T::Text),
    t(b"MI", T::Text),
    t(b"ML", T::IntArray),
    t(b"MM", T::Text),
    t(b"MN", T::Int),
    t(b"MQ", T::Int),
    t(b"NH", T::Int),
    t(b"NM", T::Int),
    t(b"OA", T::Text),
    t(b"OC", T::Text),
    t(b"OP", T::Int),
    t(b"OQ", T::Text),
    t(b"OX", T::Text),
    t(b"PG", T::Text),
    t(b"PQ", T::Int),
    t(b"PT", T::Text),
    t(b"PU", T::Text),
    t(b"Q2", T::Text),
    t(b"QT", T::Text),
    t(b"QX", T::Text),
    t(b"R2", T::Text),
    t(b"RX", T::Text),
    t(b"SA", T::Text),
    t(b"SM", T::Int),
    t(b"TC", T::Int),
    t(b"TS", T::Text),
    t(b"U2", T::Text),
    t(b"UQ", T::Int),
];

/// Position of a tag in [`STANDARD_TAGS`], or `None` for non-standard tags.
pub(crate) fn standard_tag_index(tag: [u8; 2]) -> Option<usize> {
    STANDARD_TAGS.iter().position(|st| st.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_resolve_to_their_entry() {
        let idx = standard_tag_index(*b"NM").unwrap();
        let entry = &STANDARD_TAGS[idx];
        assert_eq!(entry.name(), "NM");
        assert_eq!(entry.column_type, TagColumnType::Int);

        let idx = standard_tag_index(*b"SA").unwrap();
        assert_eq!(STANDARD_TAGS[idx].column_type, TagColumnType::Text);

        let idx = standard_tag_index(*b"FZ").unwrap();
        assert_eq!(STANDARD_TAGS[idx].column_type, TagColumnType::IntArray);
    }

    #[test]
    fn unknown_and_read_group_tags_are_not_listed() {
        assert_eq!(standard_tag_index(*b"XX"), None);
        assert_eq!(standard_tag_index(*b"RG"), None);
    }

    #[test]
    fn column_types_map_to_arrow_types() {
        assert_eq!(TagColumnType::Text.data_type(), DataType::Utf8);
        assert_eq!(TagColumnType::Int.data_type(), DataType::Int64);
        assert!(matches!(
            TagColumnType::IntArray.data_type(),
            DataType::List(_)
        ));
    }
}
