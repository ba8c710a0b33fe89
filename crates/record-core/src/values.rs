//! Structured record values.

use crate::error::{RecordError, Result};
use crate::logical::LogicalType;
use crate::schema::Schema;
use crate::types::SchemaType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A value conforming to some structured [`Schema`].
///
/// Date, time and timestamp values all use [`Value::DateTime`]; the schema
/// name decides which calendar fields are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Key/value pairs in insertion order.
    Map(Vec<(Value, Value)>),
    Struct(Struct),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of any numeric value. Floats truncate toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Float32(v) => Some(*v as i64),
            Value::Float64(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Floating point view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int8(v) => Some(*v as f64),
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Short variant name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    bool => Boolean,
    String => String,
    Vec<u8> => Bytes,
    Vec<Value> => Array,
    Struct => Struct,
    Decimal => Decimal,
    DateTime<Utc> => DateTime,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A struct value: one slot per field of its schema, `Null` until set.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    schema: Schema,
    values: Vec<Value>,
}

impl Struct {
    pub fn new(schema: &Schema) -> Result<Self> {
        if schema.schema_type() != SchemaType::Struct {
            return Err(RecordError::NotAStruct(schema.schema_type()));
        }
        Ok(Self {
            schema: schema.clone(),
            values: vec![Value::Null; schema.field_count()],
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn put(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let index = self
            .schema
            .field(field)
            .ok_or_else(|| RecordError::UnknownField(field.to_string()))?
            .index();
        self.values[index] = value.into();
        Ok(self)
    }

    /// By-value variant of [`Struct::put`] for chained construction.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.put(field, value)?;
        Ok(self)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .field(field)
            .and_then(|f| self.values.get(f.index()))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Check every field value against its field schema, recursing into
    /// nested structs, arrays and maps.
    pub fn validate(&self) -> Result<()> {
        for field in self.schema.fields() {
            let value = &self.values[field.index()];
            check_value(field.name(), field.schema(), value)?;
        }
        Ok(())
    }
}

fn check_value(field: &str, schema: &Schema, value: &Value) -> Result<()> {
    let invalid = || RecordError::InvalidValue {
        field: field.to_string(),
        expected: schema.name().map_or_else(
            || schema.schema_type().to_string(),
            str::to_string,
        ),
        found: value.kind(),
    };

    if value.is_null() {
        return if schema.is_optional() {
            Ok(())
        } else {
            Err(invalid())
        };
    }
    if let Some(logical) = LogicalType::of(schema) {
        let accepted = match logical {
            LogicalType::Decimal => matches!(value, Value::Decimal(_)),
            LogicalType::Date | LogicalType::Time | LogicalType::Timestamp => {
                matches!(value, Value::DateTime(_))
            }
        };
        return if accepted { Ok(()) } else { Err(invalid()) };
    }

    match (schema.schema_type(), value) {
        (SchemaType::Int8, Value::Int8(_))
        | (SchemaType::Int16, Value::Int16(_))
        | (SchemaType::Int32, Value::Int32(_))
        | (SchemaType::Int64, Value::Int64(_))
        | (SchemaType::Float32, Value::Float32(_))
        | (SchemaType::Float64, Value::Float64(_))
        | (SchemaType::Boolean, Value::Boolean(_))
        | (SchemaType::String, Value::String(_))
        | (SchemaType::Bytes, Value::Bytes(_)) => Ok(()),
        (SchemaType::Array, Value::Array(items)) => {
            let element = schema.value_schema().ok_or_else(invalid)?;
            items
                .iter()
                .try_for_each(|item| check_value(field, &element, item))
        }
        (SchemaType::Map, Value::Map(entries)) => {
            let (Some(key), Some(element)) = (schema.key_schema(), schema.value_schema()) else {
                return Err(invalid());
            };
            for (k, v) in entries {
                check_value(field, &key, k)?;
                check_value(field, &element, v)?;
            }
            Ok(())
        }
        (SchemaType::Struct, Value::Struct(nested)) => nested.validate(),
        _ => Err(invalid()),
    }
}
