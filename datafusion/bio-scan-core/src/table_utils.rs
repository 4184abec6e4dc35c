use datafusion::arrow::array::{
    ArrayBuilder, ArrayRef, BooleanBuilder, Float32Builder, Float64Builder, Int32Builder,
    Int64Builder, ListBuilder, StringBuilder, StructBuilder,
};
use datafusion::arrow::datatypes::{DataType, Field, Fields};
use datafusion::arrow::error::ArrowError;
use std::sync::Arc;

/// A key-value pair destined for a catch-all tag column.
#[derive(Debug)]
pub struct Attribute {
    /// Tag name.
    pub tag: String,
    /// Optional tag value, rendered to text.
    pub value: Option<String>,
}

fn attribute_fields() -> Fields {
    Fields::from(vec![
        Field::new("tag", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, true),
    ])
}

/// Arrow type of the `{tag, value}` struct-list column.
pub fn attributes_data_type() -> DataType {
    DataType::List(Arc::new(Field::new(
        "item",
        DataType::Struct(attribute_fields()),
        true,
    )))
}

/// Tagged column writer over the closed set of output column kinds.
///
/// Every output column a reader can produce is one of these kinds; the
/// append/null/finish logic for each kind lives here exactly once and the
/// materializers dispatch on the column's kind tag.
pub enum ColumnBuilder {
    /// Scalar Int32 values (flags, counts, mapping qualities).
    Int32(Int32Builder),
    /// Scalar Int64 values (1-based genomic positions, template lengths).
    Int64(Int64Builder),
    /// Scalar Float32 values.
    Float32(Float32Builder),
    /// Scalar Float64 values (variant quality scores).
    Float64(Float64Builder),
    /// Scalar Boolean values (presence flags).
    Boolean(BooleanBuilder),
    /// Scalar UTF-8 values.
    Utf8(StringBuilder),
    /// Variable-length Int32 lists.
    ArrayInt32(ListBuilder<Int32Builder>),
    /// Variable-length Int64 lists (integer-typed auxiliary tag arrays).
    ArrayInt64(ListBuilder<Int64Builder>),
    /// Variable-length Float32 lists.
    ArrayFloat32(ListBuilder<Float32Builder>),
    /// Variable-length UTF-8 lists.
    ArrayUtf8(ListBuilder<StringBuilder>),
    /// Lists of `{tag, value}` structs for catch-all tag columns.
    ArrayStruct(ListBuilder<StructBuilder>),
}

impl ColumnBuilder {
    /// Creates a builder for the given Arrow type.
    ///
    /// # Errors
    ///
    /// Returns an error for types outside the supported kind set.
    pub fn new(data_type: &DataType, batch_size: usize) -> Result<Self, ArrowError> {
        match data_type {
            DataType::Int32 => Ok(Self::Int32(Int32Builder::with_capacity(batch_size))),
            DataType::Int64 => Ok(Self::Int64(Int64Builder::with_capacity(batch_size))),
            DataType::Float32 => Ok(Self::Float32(Float32Builder::with_capacity(batch_size))),
            DataType::Float64 => Ok(Self::Float64(Float64Builder::with_capacity(batch_size))),
            DataType::Boolean => Ok(Self::Boolean(BooleanBuilder::with_capacity(batch_size))),
            DataType::Utf8 => Ok(Self::Utf8(StringBuilder::with_capacity(
                batch_size,
                batch_size * 10,
            ))),
            DataType::List(inner) => match inner.data_type() {
                DataType::Int32 => Ok(Self::ArrayInt32(ListBuilder::with_capacity(
                    Int32Builder::with_capacity(batch_size),
                    batch_size,
                ))),
                DataType::Int64 => Ok(Self::ArrayInt64(ListBuilder::with_capacity(
                    Int64Builder::with_capacity(batch_size),
                    batch_size,
                ))),
                DataType::Float32 => Ok(Self::ArrayFloat32(ListBuilder::with_capacity(
                    Float32Builder::with_capacity(batch_size),
                    batch_size,
                ))),
                DataType::Utf8 => Ok(Self::ArrayUtf8(ListBuilder::with_capacity(
                    StringBuilder::with_capacity(batch_size, batch_size * 10),
                    batch_size,
                ))),
                DataType::Struct(_) => {
                    let struct_builder = StructBuilder::new(
                        attribute_fields(),
                        vec![
                            Box::new(StringBuilder::with_capacity(batch_size, batch_size * 4))
                                as Box<dyn ArrayBuilder>,
                            Box::new(StringBuilder::with_capacity(batch_size, batch_size * 4))
                                as Box<dyn ArrayBuilder>,
                        ],
                    );
                    Ok(Self::ArrayStruct(ListBuilder::with_capacity(
                        struct_builder,
                        batch_size,
                    )))
                }
                other => Err(ArrowError::SchemaError(format!(
                    "unsupported list element type {other}"
                ))),
            },
            other => Err(ArrowError::SchemaError(format!(
                "unsupported column type {other}"
            ))),
        }
    }

    /// Appends a scalar Int32 value.
    pub fn append_int(&mut self, value: i32) -> Result<(), ArrowError> {
        match self {
            Self::Int32(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Int32")),
        }
    }

    /// Appends a scalar Int64 value.
    pub fn append_long(&mut self, value: i64) -> Result<(), ArrowError> {
        match self {
            Self::Int64(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Int64")),
        }
    }

    /// Appends a scalar Float32 value.
    pub fn append_float(&mut self, value: f32) -> Result<(), ArrowError> {
        match self {
            Self::Float32(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Float32")),
        }
    }

    /// Appends a scalar Float64 value.
    pub fn append_double(&mut self, value: f64) -> Result<(), ArrowError> {
        match self {
            Self::Float64(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Float64")),
        }
    }

    /// Appends a scalar Boolean value.
    pub fn append_boolean(&mut self, value: bool) -> Result<(), ArrowError> {
        match self {
            Self::Boolean(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Boolean")),
        }
    }

    /// Appends a scalar string value.
    pub fn append_string(&mut self, value: &str) -> Result<(), ArrowError> {
        match self {
            Self::Utf8(b) => {
                b.append_value(value);
                Ok(())
            }
            other => Err(other.kind_error("Utf8")),
        }
    }

    /// Appends one Int32 list entry.
    pub fn append_array_int(&mut self, values: &[i32]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayInt32(b) => {
                b.values().append_slice(values);
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Int32>")),
        }
    }

    /// Appends one Int32 list entry preserving per-element nulls.
    pub fn append_array_int_nullable(&mut self, values: &[Option<i32>]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayInt32(b) => {
                for v in values {
                    b.values().append_option(*v);
                }
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Int32>")),
        }
    }

    /// Appends one Int64 list entry.
    pub fn append_array_long(&mut self, values: &[i64]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayInt64(b) => {
                b.values().append_slice(values);
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Int64>")),
        }
    }

    /// Appends one Float32 list entry.
    pub fn append_array_float(&mut self, values: &[f32]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayFloat32(b) => {
                b.values().append_slice(values);
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Float32>")),
        }
    }

    /// Appends one Float32 list entry preserving per-element nulls.
    pub fn append_array_float_nullable(
        &mut self,
        values: &[Option<f32>],
    ) -> Result<(), ArrowError> {
        match self {
            Self::ArrayFloat32(b) => {
                for v in values {
                    b.values().append_option(*v);
                }
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Float32>")),
        }
    }

    /// Appends one string list entry.
    pub fn append_array_string<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayUtf8(b) => {
                for v in values {
                    b.values().append_value(v.as_ref());
                }
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Utf8>")),
        }
    }

    /// Appends one string list entry preserving per-element nulls.
    pub fn append_array_string_nullable(
        &mut self,
        values: &[Option<String>],
    ) -> Result<(), ArrowError> {
        match self {
            Self::ArrayUtf8(b) => {
                for v in values {
                    b.values().append_option(v.as_deref());
                }
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Utf8>")),
        }
    }

    /// Appends one `{tag, value}` struct-list entry.
    pub fn append_attributes(&mut self, items: &[Attribute]) -> Result<(), ArrowError> {
        match self {
            Self::ArrayStruct(b) => {
                let struct_builder = b.values();
                for Attribute { tag, value } in items {
                    struct_builder
                        .field_builder::<StringBuilder>(0)
                        .ok_or_else(|| {
                            ArrowError::SchemaError("attribute tag builder missing".into())
                        })?
                        .append_value(tag);
                    struct_builder
                        .field_builder::<StringBuilder>(1)
                        .ok_or_else(|| {
                            ArrowError::SchemaError("attribute value builder missing".into())
                        })?
                        .append_option(value.as_deref());
                    struct_builder.append(true);
                }
                b.append(true);
                Ok(())
            }
            other => Err(other.kind_error("List<Struct>")),
        }
    }

    /// Appends a null to whichever kind this builder holds.
    pub fn append_null(&mut self) {
        match self {
            Self::Int32(b) => b.append_null(),
            Self::Int64(b) => b.append_null(),
            Self::Float32(b) => b.append_null(),
            Self::Float64(b) => b.append_null(),
            Self::Boolean(b) => b.append_null(),
            Self::Utf8(b) => b.append_null(),
            Self::ArrayInt32(b) => b.append_null(),
            Self::ArrayInt64(b) => b.append_null(),
            Self::ArrayFloat32(b) => b.append_null(),
            Self::ArrayUtf8(b) => b.append_null(),
            Self::ArrayStruct(b) => b.append_null(),
        }
    }

    /// Finalizes the builder into an Arrow array, resetting it for reuse.
    pub fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Int32(b) => Arc::new(b.finish()),
            Self::Int64(b) => Arc::new(b.finish()),
            Self::Float32(b) => Arc::new(b.finish()),
            Self::Float64(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
            Self::Utf8(b) => Arc::new(b.finish()),
            Self::ArrayInt32(b) => Arc::new(b.finish()),
            Self::ArrayInt64(b) => Arc::new(b.finish()),
            Self::ArrayFloat32(b) => Arc::new(b.finish()),
            Self::ArrayUtf8(b) => Arc::new(b.finish()),
            Self::ArrayStruct(b) => Arc::new(b.finish()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Float32(_) => "Float32",
            Self::Float64(_) => "Float64",
            Self::Boolean(_) => "Boolean",
            Self::Utf8(_) => "Utf8",
            Self::ArrayInt32(_) => "List<Int32>",
            Self::ArrayInt64(_) => "List<Int64>",
            Self::ArrayFloat32(_) => "List<Float32>",
            Self::ArrayUtf8(_) => "List<Utf8>",
            Self::ArrayStruct(_) => "List<Struct>",
        }
    }

    fn kind_error(&self, expected: &str) -> ArrowError {
        ArrowError::SchemaError(format!(
            "expected {expected} column builder, found {}",
            self.kind_name()
        ))
    }
}

/// Finalizes a slice of builders into their Arrow arrays.
pub fn builders_to_arrays(builders: &mut [ColumnBuilder]) -> Vec<ArrayRef> {
    builders.iter_mut().map(|b| b.finish()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{Array, Int32Array, Int64Array, ListArray, StringArray};

    #[test]
    fn scalar_appends_and_nulls() {
        let mut b = ColumnBuilder::new(&DataType::Int32, 4).unwrap();
        b.append_int(7).unwrap();
        b.append_null();
        let array = b.finish();
        let array = array.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.value(0), 7);
        assert!(array.is_null(1));
    }

    #[test]
    fn list_appends_preserve_lengths() {
        let list_type = DataType::List(Arc::new(Field::new("item", DataType::Int32, true)));
        let mut b = ColumnBuilder::new(&list_type, 4).unwrap();
        b.append_array_int(&[5, 3]).unwrap();
        b.append_array_int_nullable(&[Some(1), None]).unwrap();
        b.append_null();
        let array = b.finish();
        let array = array.as_any().downcast_ref::<ListArray>().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.value(0).len(), 2);
        assert_eq!(array.value(1).len(), 2);
        assert!(array.is_null(2));
    }

    #[test]
    fn wide_numeric_list_appends() {
        let list_type = DataType::List(Arc::new(Field::new("item", DataType::Int64, true)));
        let mut b = ColumnBuilder::new(&list_type, 4).unwrap();
        b.append_array_long(&[1, u32::MAX as i64]).unwrap();
        b.append_null();
        let array = b.finish();
        let array = array.as_any().downcast_ref::<ListArray>().unwrap();
        let first = array.value(0);
        let first = first.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(first.value(1), u32::MAX as i64);
        assert!(array.is_null(1));
    }

    #[test]
    fn string_list_appends() {
        let list_type = DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
        let mut b = ColumnBuilder::new(&list_type, 4).unwrap();
        b.append_array_string(&["PASS"]).unwrap();
        let array = b.finish();
        let array = array.as_any().downcast_ref::<ListArray>().unwrap();
        let first = array.value(0);
        let first = first.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(first.value(0), "PASS");
    }

    #[test]
    fn attribute_lists_round_trip() {
        let mut b = ColumnBuilder::new(&attributes_data_type(), 4).unwrap();
        b.append_attributes(&[
            Attribute {
                tag: "NM".into(),
                value: Some("2".into()),
            },
            Attribute {
                tag: "XX".into(),
                value: None,
            },
        ])
        .unwrap();
        b.append_null();
        let array = b.finish();
        let array = array.as_any().downcast_ref::<ListArray>().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.value(0).len(), 2);
        assert!(array.is_null(1));
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let mut b = ColumnBuilder::new(&DataType::Utf8, 4).unwrap();
        assert!(b.append_int(1).is_err());
    }
}
