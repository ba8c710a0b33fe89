//! Reverse value conversion: wire message → structured value.
//!
//! Decoding walks the structured schema and reads each field from the
//! message through reflection. Unset message fields and unset proto3
//! `optional` scalars decode to null; other unset scalars decode to their
//! zero value.

use crate::config::ConverterConfig;
use crate::decimal;
use crate::error::{ConversionError, Result};
use crate::forward::schema::is_union;
use crate::names::scrub_name;
use crate::types::{KEY_FIELD, VALUE_FIELD};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use protobuf::reflect::{FieldDescriptor, ReflectValueRef, RuntimeFieldType, RuntimeType};
use protobuf::MessageDyn;
use record_core::{LogicalType, Schema, SchemaType, Struct, Value};
use tracing::trace;

/// Decode `message` into a struct value of `schema`.
pub fn to_record_value(
    config: &ConverterConfig,
    schema: &Schema,
    message: &dyn MessageDyn,
) -> Result<Value> {
    if schema.schema_type() != SchemaType::Struct {
        return Err(ConversionError::UnsupportedRootType(schema.schema_type()));
    }
    let decoder = Decoder { config };
    decoder.record(schema, message).map(Value::Struct)
}

/// Midnight UTC of a calendar date.
pub(crate) fn date_time_at_midnight(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

struct Decoder<'a> {
    config: &'a ConverterConfig,
}

impl Decoder<'_> {
    fn find_field(&self, message: &dyn MessageDyn, name: &str) -> Result<FieldDescriptor> {
        let descriptor = message.descriptor_dyn();
        descriptor
            .field_by_name(name)
            .or_else(|| {
                self.config
                    .scrub_invalid_names
                    .then(|| descriptor.field_by_name(&scrub_name(name)))
                    .flatten()
            })
            .ok_or_else(|| {
                ConversionError::SchemaMismatch(format!(
                    "Cannot find field with name {name} in {}",
                    descriptor.full_name()
                ))
            })
    }

    fn record(&self, schema: &Schema, message: &dyn MessageDyn) -> Result<Struct> {
        trace!(message = message.descriptor_dyn().full_name(), "decoding message");
        let mut record = Struct::new(schema)?;
        for field in schema.fields() {
            let field_schema = field.schema();
            let value = if is_union(field_schema) {
                self.union(field_schema, message)?
            } else {
                let descriptor = self.find_field(message, field.name())?;
                self.field(field_schema, &descriptor, message)?
            };
            record.put(field.name(), value)?;
        }
        Ok(record)
    }

    /// The case that is set, or null when none is.
    fn union(&self, schema: &Schema, message: &dyn MessageDyn) -> Result<Value> {
        for case in schema.fields() {
            let descriptor = self.find_field(message, case.name())?;
            if descriptor.has_field(message) {
                let value = self.field(case.schema(), &descriptor, message)?;
                let mut union = Struct::new(schema)?;
                union.put(case.name(), value)?;
                return Ok(Value::Struct(union));
            }
        }
        Ok(Value::Null)
    }

    fn field(
        &self,
        schema: &Schema,
        field: &FieldDescriptor,
        message: &dyn MessageDyn,
    ) -> Result<Value> {
        match field.runtime_field_type() {
            RuntimeFieldType::Map(..) => {
                let (key_schema, value_schema) = map_schemas(schema)?;
                let map = field.get_map(message);
                let mut entries = Vec::new();
                for (key, value) in &map {
                    entries.push((
                        self.value(&key_schema, key)?,
                        self.value(&value_schema, value)?,
                    ));
                }
                Ok(Value::Map(entries))
            }
            RuntimeFieldType::Repeated(_) => {
                let repeated = field.get_repeated(message);
                match schema.schema_type() {
                    SchemaType::Map => {
                        let (key_schema, value_schema) = map_schemas(schema)?;
                        let mut entries = Vec::with_capacity(repeated.len());
                        for i in 0..repeated.len() {
                            let ReflectValueRef::Message(entry) = repeated.get(i) else {
                                return Err(ConversionError::type_mismatch(
                                    "map entry message",
                                    field.full_name(),
                                ));
                            };
                            entries.push(self.map_entry(&key_schema, &value_schema, &*entry)?);
                        }
                        Ok(Value::Map(entries))
                    }
                    SchemaType::Array => {
                        let element = schema.value_schema().ok_or_else(|| {
                            ConversionError::UnsupportedSchemaType(
                                "array without element".to_string(),
                            )
                        })?;
                        let mut items = Vec::with_capacity(repeated.len());
                        for i in 0..repeated.len() {
                            items.push(self.value(&element, repeated.get(i))?);
                        }
                        Ok(Value::Array(items))
                    }
                    other => Err(ConversionError::type_mismatch(other, "repeated field")),
                }
            }
            RuntimeFieldType::Singular(runtime) => {
                let presence = matches!(runtime, RuntimeType::Message(_))
                    || field.proto().has_oneof_index();
                if presence && !field.has_field(message) {
                    return Ok(Value::Null);
                }
                self.value(schema, field.get_singular_field_or_default(message))
            }
        }
    }

    fn map_entry(
        &self,
        key_schema: &Schema,
        value_schema: &Schema,
        entry: &dyn MessageDyn,
    ) -> Result<(Value, Value)> {
        let key = self.find_field(entry, KEY_FIELD)?;
        let value = self.find_field(entry, VALUE_FIELD)?;
        Ok((
            self.field(key_schema, &key, entry)?,
            self.field(value_schema, &value, entry)?,
        ))
    }

    fn value(&self, schema: &Schema, value: ReflectValueRef<'_>) -> Result<Value> {
        if let Some(logical) = LogicalType::of(schema) {
            let ReflectValueRef::Message(message) = value else {
                return Err(ConversionError::type_mismatch("message", schema.schema_type()));
            };
            return logical_value(logical, &*message);
        }

        match (schema.schema_type(), value) {
            (SchemaType::Struct, ReflectValueRef::Message(message)) => {
                self.record(schema, &*message).map(Value::Struct)
            }
            (SchemaType::Struct, _) => {
                Err(ConversionError::type_mismatch(SchemaType::Struct, "scalar"))
            }
            (_, ReflectValueRef::Message(wrapper)) => {
                let inner = self.find_field(&*wrapper, VALUE_FIELD)?;
                scalar(schema, inner.get_singular_field_or_default(&*wrapper))
            }
            (_, value) => scalar(schema, value),
        }
    }
}

fn map_schemas(schema: &Schema) -> Result<(Schema, Schema)> {
    match (schema.key_schema(), schema.value_schema()) {
        (Some(key), Some(value)) if schema.schema_type() == SchemaType::Map => Ok((key, value)),
        _ => Err(ConversionError::type_mismatch(SchemaType::Map, schema.schema_type())),
    }
}

fn scalar(schema: &Schema, value: ReflectValueRef<'_>) -> Result<Value> {
    let schema_type = schema.schema_type();
    let out_of_range = |v: i64| ConversionError::type_mismatch(schema_type, v);
    let converted = match (schema_type, value) {
        (SchemaType::Int8, ReflectValueRef::I32(v)) => {
            Value::Int8(i8::try_from(v).map_err(|_| out_of_range(v.into()))?)
        }
        (SchemaType::Int16, ReflectValueRef::I32(v)) => {
            Value::Int16(i16::try_from(v).map_err(|_| out_of_range(v.into()))?)
        }
        (SchemaType::Int32, ReflectValueRef::I32(v)) => Value::Int32(v),
        (SchemaType::Int64, ReflectValueRef::I32(v)) => Value::Int64(v.into()),
        (SchemaType::Int64, ReflectValueRef::U32(v)) => Value::Int64(v.into()),
        (SchemaType::Int64, ReflectValueRef::I64(v)) => Value::Int64(v),
        (SchemaType::Int64, ReflectValueRef::U64(v)) => Value::Int64(v as i64),
        (SchemaType::Float32, ReflectValueRef::F32(v)) => Value::Float32(v),
        (SchemaType::Float64, ReflectValueRef::F64(v)) => Value::Float64(v),
        (SchemaType::Float64, ReflectValueRef::F32(v)) => Value::Float64(v.into()),
        (SchemaType::Boolean, ReflectValueRef::Bool(v)) => Value::Boolean(v),
        (SchemaType::String, ReflectValueRef::String(v)) => Value::String(v.to_string()),
        (SchemaType::String, ReflectValueRef::Enum(descriptor, number)) => {
            match descriptor.value_by_number(number) {
                Some(symbol) => Value::String(symbol.name().to_string()),
                None => Value::String(number.to_string()),
            }
        }
        (SchemaType::Bytes, ReflectValueRef::Bytes(v)) => Value::Bytes(v.to_vec()),
        (expected, other) => {
            return Err(ConversionError::type_mismatch(expected, format!("{other:?}")))
        }
    };
    Ok(converted)
}

fn read<'a>(message: &'a dyn MessageDyn, name: &str) -> Result<ReflectValueRef<'a>> {
    let descriptor = message.descriptor_dyn();
    let field = descriptor.field_by_name(name).ok_or_else(|| {
        ConversionError::SchemaMismatch(format!(
            "Cannot find field with name {name} in {}",
            descriptor.full_name()
        ))
    })?;
    Ok(field.get_singular_field_or_default(message))
}

fn read_i32(message: &dyn MessageDyn, name: &str) -> Result<i32> {
    read(message, name)?
        .to_i32()
        .ok_or_else(|| ConversionError::type_mismatch("int32", name))
}

fn logical_value(logical: LogicalType, message: &dyn MessageDyn) -> Result<Value> {
    let get = |name: &str| read(message, name);
    let int = |name: &str| read_i32(message, name);

    match logical {
        LogicalType::Decimal => {
            let scale = int("scale")?;
            let value = get("value")?;
            let bytes = value
                .to_bytes()
                .ok_or_else(|| ConversionError::type_mismatch("bytes", "value"))?;
            decimal::decode(bytes, scale).map(Value::Decimal)
        }
        LogicalType::Date => {
            let (year, month, day) = (int("year")?, int("month")?, int("day")?);
            let date = u32::try_from(month)
                .ok()
                .zip(u32::try_from(day).ok())
                .and_then(|(month, day)| date_time_at_midnight(year, month, day))
                .ok_or_else(|| {
                    ConversionError::InvalidDateTimeValue(format!(
                        "invalid date {year}-{month}-{day}"
                    ))
                })?;
            Ok(Value::DateTime(date))
        }
        LogicalType::Time => {
            let parts = [int("hours")?, int("minutes")?, int("seconds")?, int("nanos")?];
            let time = match parts.map(u32::try_from) {
                [Ok(h), Ok(m), Ok(s), Ok(n)] => NaiveTime::from_hms_nano_opt(h, m, s, n),
                _ => None,
            }
            .ok_or_else(|| {
                ConversionError::InvalidDateTimeValue(format!("invalid time of day {parts:?}"))
            })?;
            Ok(Value::DateTime(NaiveDate::default().and_time(time).and_utc()))
        }
        LogicalType::Timestamp => {
            let seconds = get("seconds")?
                .to_i64()
                .ok_or_else(|| ConversionError::type_mismatch("int64", "seconds"))?;
            let nanos = int("nanos")?;
            let timestamp = u32::try_from(nanos)
                .ok()
                .and_then(|nanos| DateTime::from_timestamp(seconds, nanos))
                .ok_or_else(|| {
                    ConversionError::InvalidDateTimeValue(format!(
                        "invalid timestamp {seconds}s {nanos}ns"
                    ))
                })?;
            Ok(Value::DateTime(timestamp))
        }
    }
}
