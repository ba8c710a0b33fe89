//! Type mapping rules shared by both translation directions.
//!
//! Parameter keys and well-known type names follow the Confluent protobuf
//! converter so that schemas stay interchangeable with it.

use crate::error::{ConversionError, Result};
use protobuf::descriptor::field_descriptor_proto::Type;
use record_core::{LogicalType, Schema, SchemaType};

pub const NAMESPACE: &str = "io.confluent.connect.protobuf";
pub const DEFAULT_SCHEMA_NAME: &str = "ConnectDefault";
pub const MAP_ENTRY_SUFFIX: &str = "Entry";
pub const KEY_FIELD: &str = "key";
pub const VALUE_FIELD: &str = "value";

pub const PROTOBUF_TYPE_ENUM: &str = "io.confluent.connect.protobuf.Enum";
pub const PROTOBUF_TYPE_ENUM_PREFIX: &str = "io.confluent.connect.protobuf.Enum.";
pub const PROTOBUF_TYPE_UNION: &str = "io.confluent.connect.protobuf.Union";
pub const PROTOBUF_TYPE_UNION_PREFIX: &str = "io.confluent.connect.protobuf.Union.";
pub const PROTOBUF_TYPE_TAG: &str = "io.confluent.connect.protobuf.Tag";
pub const PROTOBUF_TYPE_PROP: &str = "io.confluent.connect.protobuf.Type";

/// Field metadata keys for decimals.
pub const PROTOBUF_PRECISION_PROP: &str = "precision";
pub const PROTOBUF_SCALE_PROP: &str = "scale";

pub const CONNECT_PRECISION_PROP: &str = record_core::logical::DECIMAL_PRECISION_PARAMETER;
pub const CONNECT_SCALE_PROP: &str = record_core::logical::DECIMAL_SCALE_PARAMETER;
pub const CONNECT_TYPE_PROP: &str = "connect.type";
pub const CONNECT_TYPE_INT8: &str = "int8";
pub const CONNECT_TYPE_INT16: &str = "int16";

pub const PROTOBUF_DECIMAL_LOCATION: &str = "confluent/type/decimal.proto";
pub const PROTOBUF_DATE_LOCATION: &str = "google/type/date.proto";
pub const PROTOBUF_TIME_LOCATION: &str = "google/type/timeofday.proto";
pub const PROTOBUF_TIMESTAMP_LOCATION: &str = "google/protobuf/timestamp.proto";
pub const PROTOBUF_WRAPPER_LOCATION: &str = "google/protobuf/wrappers.proto";

/// Message types that live in dependency files rather than in the generated
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    Decimal,
    Date,
    TimeOfDay,
    Timestamp,
    DoubleValue,
    FloatValue,
    Int64Value,
    UInt64Value,
    Int32Value,
    UInt32Value,
    BoolValue,
    StringValue,
    BytesValue,
}

impl WellKnownType {
    const ALL: [WellKnownType; 13] = [
        WellKnownType::Decimal,
        WellKnownType::Date,
        WellKnownType::TimeOfDay,
        WellKnownType::Timestamp,
        WellKnownType::DoubleValue,
        WellKnownType::FloatValue,
        WellKnownType::Int64Value,
        WellKnownType::UInt64Value,
        WellKnownType::Int32Value,
        WellKnownType::UInt32Value,
        WellKnownType::BoolValue,
        WellKnownType::StringValue,
        WellKnownType::BytesValue,
    ];

    /// Fully-qualified message name, without the leading dot.
    pub fn full_name(self) -> &'static str {
        match self {
            WellKnownType::Decimal => "confluent.type.Decimal",
            WellKnownType::Date => "google.type.Date",
            WellKnownType::TimeOfDay => "google.type.TimeOfDay",
            WellKnownType::Timestamp => "google.protobuf.Timestamp",
            WellKnownType::DoubleValue => "google.protobuf.DoubleValue",
            WellKnownType::FloatValue => "google.protobuf.FloatValue",
            WellKnownType::Int64Value => "google.protobuf.Int64Value",
            WellKnownType::UInt64Value => "google.protobuf.UInt64Value",
            WellKnownType::Int32Value => "google.protobuf.Int32Value",
            WellKnownType::UInt32Value => "google.protobuf.UInt32Value",
            WellKnownType::BoolValue => "google.protobuf.BoolValue",
            WellKnownType::StringValue => "google.protobuf.StringValue",
            WellKnownType::BytesValue => "google.protobuf.BytesValue",
        }
    }

    /// Name of the file defining the message.
    pub fn location(self) -> &'static str {
        match self {
            WellKnownType::Decimal => PROTOBUF_DECIMAL_LOCATION,
            WellKnownType::Date => PROTOBUF_DATE_LOCATION,
            WellKnownType::TimeOfDay => PROTOBUF_TIME_LOCATION,
            WellKnownType::Timestamp => PROTOBUF_TIMESTAMP_LOCATION,
            _ => PROTOBUF_WRAPPER_LOCATION,
        }
    }

    pub fn from_full_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('.').unwrap_or(name);
        Self::ALL.into_iter().find(|t| t.full_name() == name)
    }

    pub fn is_wrapper(self) -> bool {
        !matches!(
            self,
            WellKnownType::Decimal
                | WellKnownType::Date
                | WellKnownType::TimeOfDay
                | WellKnownType::Timestamp
        )
    }

    pub fn for_logical(logical: LogicalType) -> Self {
        match logical {
            LogicalType::Decimal => WellKnownType::Decimal,
            LogicalType::Date => WellKnownType::Date,
            LogicalType::Time => WellKnownType::TimeOfDay,
            LogicalType::Timestamp => WellKnownType::Timestamp,
        }
    }

    /// Structured type a wrapper unwraps to.
    pub fn unwrapped_type(self) -> Option<SchemaType> {
        match self {
            WellKnownType::DoubleValue => Some(SchemaType::Float64),
            WellKnownType::FloatValue => Some(SchemaType::Float32),
            WellKnownType::Int64Value
            | WellKnownType::UInt64Value
            | WellKnownType::UInt32Value => Some(SchemaType::Int64),
            WellKnownType::Int32Value => Some(SchemaType::Int32),
            WellKnownType::BoolValue => Some(SchemaType::Boolean),
            WellKnownType::StringValue => Some(SchemaType::String),
            WellKnownType::BytesValue => Some(SchemaType::Bytes),
            _ => None,
        }
    }

    /// Integer width an unsigned wrapper implies on its unwrapped `int64`.
    pub fn unwrapped_width(self) -> Option<&'static str> {
        match self {
            WellKnownType::UInt32Value => Some("uint32"),
            WellKnownType::UInt64Value => Some("uint64"),
            _ => None,
        }
    }
}

/// Lowercase protobuf spelling of a scalar type, as used in `.proto` files
/// and in the Type parameter.
pub fn scalar_type_name(wire: Type) -> &'static str {
    match wire {
        Type::TYPE_DOUBLE => "double",
        Type::TYPE_FLOAT => "float",
        Type::TYPE_INT64 => "int64",
        Type::TYPE_UINT64 => "uint64",
        Type::TYPE_INT32 => "int32",
        Type::TYPE_FIXED64 => "fixed64",
        Type::TYPE_FIXED32 => "fixed32",
        Type::TYPE_BOOL => "bool",
        Type::TYPE_STRING => "string",
        Type::TYPE_GROUP => "group",
        Type::TYPE_MESSAGE => "message",
        Type::TYPE_BYTES => "bytes",
        Type::TYPE_UINT32 => "uint32",
        Type::TYPE_ENUM => "enum",
        Type::TYPE_SFIXED32 => "sfixed32",
        Type::TYPE_SFIXED64 => "sfixed64",
        Type::TYPE_SINT32 => "sint32",
        Type::TYPE_SINT64 => "sint64",
    }
}

/// Parse an integer width override from the Type parameter.
pub fn integer_type_from_name(name: &str) -> Option<Type> {
    Some(match name {
        "int32" => Type::TYPE_INT32,
        "sint32" => Type::TYPE_SINT32,
        "sfixed32" => Type::TYPE_SFIXED32,
        "uint32" => Type::TYPE_UINT32,
        "fixed32" => Type::TYPE_FIXED32,
        "int64" => Type::TYPE_INT64,
        "sint64" => Type::TYPE_SINT64,
        "sfixed64" => Type::TYPE_SFIXED64,
        "uint64" => Type::TYPE_UINT64,
        "fixed64" => Type::TYPE_FIXED64,
        _ => return None,
    })
}

/// Wire representation chosen for a primitive or logical structured type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMapping {
    Scalar(Type),
    Message(WellKnownType),
}

/// Forward mapping of a non-container schema. Field metadata the mapping
/// needs (narrow integer widths, decimal precision) is appended to `params`.
pub fn primitive_to_wire(
    schema: &Schema,
    wrapper_for_nullables: bool,
    params: &mut Vec<(String, String)>,
) -> Result<PrimitiveMapping> {
    if let Some(logical) = LogicalType::of(schema) {
        if logical == LogicalType::Decimal {
            if let Some(precision) = schema.parameter(CONNECT_PRECISION_PROP) {
                params.push((PROTOBUF_PRECISION_PROP.to_string(), precision.to_string()));
            }
            if let Some(scale) = schema.parameter(CONNECT_SCALE_PROP) {
                params.push((PROTOBUF_SCALE_PROP.to_string(), scale.to_string()));
            }
        }
        return Ok(PrimitiveMapping::Message(WellKnownType::for_logical(logical)));
    }

    let wrap = wrapper_for_nullables && schema.is_optional();
    let pick = |scalar: Type, wrapper: WellKnownType| {
        if wrap {
            PrimitiveMapping::Message(wrapper)
        } else {
            PrimitiveMapping::Scalar(scalar)
        }
    };

    let width = |default: Type| -> Result<Type> {
        match schema.parameter(PROTOBUF_TYPE_PROP) {
            Some(name) => integer_type_from_name(name).ok_or_else(|| {
                ConversionError::UnsupportedSchemaType(format!("integer width {name}"))
            }),
            None => Ok(default),
        }
    };

    let mapping = match schema.schema_type() {
        SchemaType::Int8 => {
            params.push((CONNECT_TYPE_PROP.to_string(), CONNECT_TYPE_INT8.to_string()));
            pick(Type::TYPE_INT32, WellKnownType::Int32Value)
        }
        SchemaType::Int16 => {
            params.push((CONNECT_TYPE_PROP.to_string(), CONNECT_TYPE_INT16.to_string()));
            pick(Type::TYPE_INT32, WellKnownType::Int32Value)
        }
        SchemaType::Int32 => pick(width(Type::TYPE_INT32)?, WellKnownType::Int32Value),
        SchemaType::Int64 => {
            let scalar = width(Type::TYPE_INT64)?;
            let wrapper = match scalar {
                Type::TYPE_UINT32 | Type::TYPE_FIXED32 => WellKnownType::UInt32Value,
                Type::TYPE_UINT64 | Type::TYPE_FIXED64 => WellKnownType::UInt64Value,
                _ => WellKnownType::Int64Value,
            };
            pick(scalar, wrapper)
        }
        SchemaType::Float32 => pick(Type::TYPE_FLOAT, WellKnownType::FloatValue),
        SchemaType::Float64 => pick(Type::TYPE_DOUBLE, WellKnownType::DoubleValue),
        SchemaType::Boolean => pick(Type::TYPE_BOOL, WellKnownType::BoolValue),
        SchemaType::String => pick(Type::TYPE_STRING, WellKnownType::StringValue),
        SchemaType::Bytes => pick(Type::TYPE_BYTES, WellKnownType::BytesValue),
        other @ (SchemaType::Array | SchemaType::Map | SchemaType::Struct) => {
            return Err(ConversionError::UnsupportedSchemaType(other.to_string()))
        }
    };
    Ok(mapping)
}

/// Reverse mapping of an integer wire type: the structured type plus the
/// Type parameter to record when the width is not the default one.
pub fn integer_from_wire(wire: Type) -> Option<(SchemaType, Option<&'static str>)> {
    match wire {
        Type::TYPE_INT32 => Some((SchemaType::Int32, None)),
        Type::TYPE_SINT32 | Type::TYPE_SFIXED32 => {
            Some((SchemaType::Int32, Some(scalar_type_name(wire))))
        }
        Type::TYPE_INT64 => Some((SchemaType::Int64, None)),
        Type::TYPE_UINT32
        | Type::TYPE_FIXED32
        | Type::TYPE_UINT64
        | Type::TYPE_SINT64
        | Type::TYPE_FIXED64
        | Type::TYPE_SFIXED64 => Some((SchemaType::Int64, Some(scalar_type_name(wire)))),
        _ => None,
    }
}

/// Reverse mapping of the remaining scalar wire types.
pub fn scalar_from_wire(wire: Type) -> Option<SchemaType> {
    match wire {
        Type::TYPE_FLOAT => Some(SchemaType::Float32),
        Type::TYPE_DOUBLE => Some(SchemaType::Float64),
        Type::TYPE_BOOL => Some(SchemaType::Boolean),
        Type::TYPE_STRING => Some(SchemaType::String),
        Type::TYPE_BYTES => Some(SchemaType::Bytes),
        _ => integer_from_wire(wire).map(|(t, _)| t),
    }
}
