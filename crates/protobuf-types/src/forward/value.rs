//! Forward value conversion: structured value → dynamic wire message.
//!
//! Values are converted against the compiled descriptor, so the produced
//! reflect values always carry the exact runtime type of their target field
//! (an `int64` schema stored as `uint32` on the wire becomes a `u32`).

use super::schema::is_union;
use crate::config::ConverterConfig;
use crate::decimal;
use crate::error::{ConversionError, Result};
use crate::names::scrub_name;
use crate::types::{WellKnownType, KEY_FIELD, PROTOBUF_TYPE_ENUM_PREFIX, VALUE_FIELD};
use crate::wire::WireSchema;
use chrono::{Datelike, Timelike};
use protobuf::reflect::{
    FieldDescriptor, MessageDescriptor, ReflectValueBox, RuntimeFieldType, RuntimeType,
};
use protobuf::MessageDyn;
use record_core::{LogicalType, Schema, SchemaType, Struct, Value};
use tracing::{trace, warn};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Build the wire message for `value`, a struct of `schema`. A null value
/// has no message.
pub fn to_wire_value(
    config: &ConverterConfig,
    wire: &WireSchema,
    schema: &Schema,
    value: &Value,
) -> Result<Option<Box<dyn MessageDyn>>> {
    let encoder = Encoder { config };
    match value {
        Value::Null => Ok(None),
        Value::Struct(record) => {
            check_struct_schema(schema, record)?;
            encoder.message(wire.descriptor(), schema, record).map(Some)
        }
        other => Err(ConversionError::type_mismatch(SchemaType::Struct, other.kind())),
    }
}

/// A struct value must carry the schema of the slot it is stored in, up to
/// field-level annotations such as tags and optionality.
fn check_struct_schema(expected: &Schema, record: &Struct) -> Result<()> {
    let actual = record.schema();
    let same = actual.same_definition(expected)
        || (actual.name() == expected.name()
            && actual.version() == expected.version()
            && actual.fields() == expected.fields());
    if same {
        Ok(())
    } else {
        Err(ConversionError::SchemaMismatch(format!(
            "Mismatching struct schema: expected {}, found {}",
            expected.name().unwrap_or("<anonymous>"),
            actual.name().unwrap_or("<anonymous>")
        )))
    }
}

struct Encoder<'a> {
    config: &'a ConverterConfig,
}

impl Encoder<'_> {
    fn field_name(&self, name: &str) -> String {
        if self.config.scrub_invalid_names {
            scrub_name(name)
        } else {
            name.to_string()
        }
    }

    fn message(
        &self,
        descriptor: &MessageDescriptor,
        schema: &Schema,
        record: &Struct,
    ) -> Result<Box<dyn MessageDyn>> {
        trace!(message = descriptor.full_name(), "encoding struct");
        let mut message = descriptor.new_instance();
        for field in schema.fields() {
            let value = record.get_by_index(field.index()).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }

            let field_schema = field.schema();
            if is_union(field_schema) {
                let union = value.as_struct().ok_or_else(|| {
                    ConversionError::type_mismatch(SchemaType::Struct, value.kind())
                })?;
                check_struct_schema(field_schema, union)?;
                let (case, case_value) = union
                    .schema()
                    .fields()
                    .into_iter()
                    .zip(union.values())
                    .find(|(_, v)| !v.is_null())
                    .ok_or_else(|| {
                        ConversionError::SchemaMismatch(format!(
                            "Cannot find non-null field in union {}",
                            field.name()
                        ))
                    })?;
                let target = self.find_field(descriptor, case.name())?;
                self.set_field(&mut *message, &target, case.schema(), case_value)?;
                continue;
            }

            let target = self.find_field(descriptor, field.name())?;
            self.set_field(&mut *message, &target, field_schema, value)?;
        }
        Ok(message)
    }

    fn find_field(&self, descriptor: &MessageDescriptor, name: &str) -> Result<FieldDescriptor> {
        descriptor
            .field_by_name(&self.field_name(name))
            .ok_or_else(|| {
                ConversionError::SchemaMismatch(format!("Cannot find field with name {name}"))
            })
    }

    fn set_field(
        &self,
        message: &mut dyn MessageDyn,
        field: &FieldDescriptor,
        schema: &Schema,
        value: &Value,
    ) -> Result<()> {
        match field.runtime_field_type() {
            RuntimeFieldType::Singular(runtime) => {
                if let Some(converted) = self.convert(schema, value, &runtime)? {
                    field.set_singular_field(message, converted);
                }
            }
            RuntimeFieldType::Repeated(runtime) => match (schema.schema_type(), value) {
                (SchemaType::Array, Value::Array(items)) => {
                    let element = schema.value_schema().ok_or_else(|| {
                        ConversionError::UnsupportedSchemaType("array without element".to_string())
                    })?;
                    let mut converted = Vec::with_capacity(items.len());
                    for item in items {
                        let item = self.convert(&element, item, &runtime)?.ok_or_else(|| {
                            ConversionError::type_mismatch(element.schema_type(), "null")
                        })?;
                        converted.push(item);
                    }
                    let mut repeated = field.mut_repeated(message);
                    for item in converted {
                        repeated.push(item);
                    }
                }
                (SchemaType::Map, Value::Map(entries)) => {
                    let RuntimeType::Message(entry) = &runtime else {
                        return Err(ConversionError::type_mismatch(
                            "map entry message",
                            describe(&runtime),
                        ));
                    };
                    let mut converted = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        converted.push(ReflectValueBox::Message(
                            self.map_entry(entry, schema, key, value)?,
                        ));
                    }
                    let mut repeated = field.mut_repeated(message);
                    for item in converted {
                        repeated.push(item);
                    }
                }
                (expected, other) => {
                    return Err(ConversionError::type_mismatch(expected, other.kind()));
                }
            },
            RuntimeFieldType::Map(key_type, value_type) => {
                let Value::Map(entries) = value else {
                    return Err(ConversionError::type_mismatch(SchemaType::Map, value.kind()));
                };
                let (Some(key_schema), Some(value_schema)) =
                    (schema.key_schema(), schema.value_schema())
                else {
                    return Err(ConversionError::type_mismatch(
                        SchemaType::Map,
                        schema.schema_type(),
                    ));
                };
                let mut converted = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self
                        .convert(&key_schema, key, &key_type)?
                        .ok_or_else(|| ConversionError::type_mismatch("map key", "null"))?;
                    let value = self
                        .convert(&value_schema, value, &value_type)?
                        .ok_or_else(|| ConversionError::type_mismatch("map value", "null"))?;
                    converted.push((key, value));
                }
                let mut map = field.mut_map(message);
                for (key, value) in converted {
                    map.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn map_entry(
        &self,
        entry: &MessageDescriptor,
        schema: &Schema,
        key: &Value,
        value: &Value,
    ) -> Result<Box<dyn MessageDyn>> {
        let (Some(key_schema), Some(value_schema)) = (schema.key_schema(), schema.value_schema())
        else {
            return Err(ConversionError::type_mismatch(SchemaType::Map, schema.schema_type()));
        };
        let mut message = entry.new_instance();
        for (name, field_schema, field_value) in
            [(KEY_FIELD, key_schema, key), (VALUE_FIELD, value_schema, value)]
        {
            if field_value.is_null() {
                continue;
            }
            let field = entry.field_by_name(name).ok_or_else(|| {
                ConversionError::SchemaMismatch(format!(
                    "Cannot find field with name {name} in {}",
                    entry.full_name()
                ))
            })?;
            self.set_field(&mut *message, &field, &field_schema, field_value)?;
        }
        Ok(message)
    }

    /// Convert one non-repeated value to the runtime type of its target.
    fn convert(
        &self,
        schema: &Schema,
        value: &Value,
        runtime: &RuntimeType,
    ) -> Result<Option<ReflectValueBox>> {
        if value.is_null() {
            return Ok(None);
        }
        if let Some(logical) = LogicalType::of(schema) {
            let RuntimeType::Message(descriptor) = runtime else {
                return Err(ConversionError::type_mismatch("message", describe(runtime)));
            };
            return self.logical(logical, descriptor, value).map(Some);
        }

        match schema.schema_type() {
            SchemaType::Struct => {
                let RuntimeType::Message(descriptor) = runtime else {
                    return Err(ConversionError::type_mismatch("message", describe(runtime)));
                };
                let record = value
                    .as_struct()
                    .ok_or_else(|| ConversionError::type_mismatch(SchemaType::Struct, value.kind()))?;
                check_struct_schema(schema, record)?;
                Ok(Some(ReflectValueBox::Message(
                    self.message(descriptor, schema, record)?,
                )))
            }
            SchemaType::Array | SchemaType::Map => Err(ConversionError::UnsupportedSchemaType(
                format!("{} cannot be nested here", schema.schema_type()),
            )),
            _ => self.primitive(schema, value, runtime).map(Some),
        }
    }

    fn primitive(
        &self,
        schema: &Schema,
        value: &Value,
        runtime: &RuntimeType,
    ) -> Result<ReflectValueBox> {
        let schema_type = schema.schema_type();
        let mismatch = || ConversionError::type_mismatch(schema_type, value.kind());
        let accepted = match schema_type {
            SchemaType::Int8
            | SchemaType::Int16
            | SchemaType::Int32
            | SchemaType::Int64
            | SchemaType::Float32
            | SchemaType::Float64 => value.as_f64().is_some(),
            SchemaType::Boolean => matches!(value, Value::Boolean(_)),
            SchemaType::String => matches!(value, Value::String(_)),
            SchemaType::Bytes => matches!(value, Value::Bytes(_)),
            _ => false,
        };
        if !accepted {
            return Err(mismatch());
        }

        let converted = match runtime {
            RuntimeType::I32 => ReflectValueBox::I32(value.as_i64().ok_or_else(mismatch)? as i32),
            RuntimeType::I64 => ReflectValueBox::I64(value.as_i64().ok_or_else(mismatch)?),
            RuntimeType::U32 => ReflectValueBox::U32(value.as_i64().ok_or_else(mismatch)? as u32),
            RuntimeType::U64 => ReflectValueBox::U64(value.as_i64().ok_or_else(mismatch)? as u64),
            RuntimeType::F32 => ReflectValueBox::F32(value.as_f64().ok_or_else(mismatch)? as f32),
            RuntimeType::F64 => ReflectValueBox::F64(value.as_f64().ok_or_else(mismatch)?),
            RuntimeType::Bool => match value {
                Value::Boolean(b) => ReflectValueBox::Bool(*b),
                _ => return Err(mismatch()),
            },
            RuntimeType::String => match value {
                Value::String(s) => ReflectValueBox::String(s.clone()),
                _ => return Err(mismatch()),
            },
            RuntimeType::VecU8 => match value {
                Value::Bytes(b) => ReflectValueBox::Bytes(b.clone()),
                _ => return Err(mismatch()),
            },
            RuntimeType::Enum(descriptor) => {
                let symbol = value.as_str().ok_or_else(mismatch)?;
                let number = match schema
                    .parameter(&format!("{PROTOBUF_TYPE_ENUM_PREFIX}{symbol}"))
                    .and_then(|tag| tag.parse().ok())
                {
                    Some(number) => number,
                    None => {
                        warn!(
                            symbol,
                            enum_type = descriptor.full_name(),
                            "enum symbol has no tag parameter, looking it up by name"
                        );
                        descriptor
                            .value_by_name(symbol)
                            .map(|v| v.value())
                            .ok_or_else(|| {
                                ConversionError::type_mismatch(descriptor.full_name(), symbol)
                            })?
                    }
                };
                ReflectValueBox::Enum(descriptor.clone(), number)
            }
            RuntimeType::Message(descriptor) => {
                // Wrapper message around a single `value` field.
                let inner = descriptor.field_by_name(VALUE_FIELD).ok_or_else(|| {
                    ConversionError::type_mismatch(schema_type, descriptor.full_name())
                })?;
                let RuntimeFieldType::Singular(inner_type) = inner.runtime_field_type() else {
                    return Err(ConversionError::type_mismatch(schema_type, descriptor.full_name()));
                };
                let mut wrapper = descriptor.new_instance();
                let inner_value = self.primitive(schema, value, &inner_type)?;
                inner.set_singular_field(&mut *wrapper, inner_value);
                ReflectValueBox::Message(wrapper)
            }
        };
        Ok(converted)
    }

    fn logical(
        &self,
        logical: LogicalType,
        descriptor: &MessageDescriptor,
        value: &Value,
    ) -> Result<ReflectValueBox> {
        let expected = WellKnownType::for_logical(logical);
        if WellKnownType::from_full_name(descriptor.full_name()) != Some(expected) {
            return Err(ConversionError::type_mismatch(
                expected.full_name(),
                descriptor.full_name(),
            ));
        }

        let mut message = descriptor.new_instance();
        let mut set = |name: &str, v: ReflectValueBox| -> Result<()> {
            let field = descriptor.field_by_name(name).ok_or_else(|| {
                ConversionError::SchemaMismatch(format!(
                    "Cannot find field with name {name} in {}",
                    descriptor.full_name()
                ))
            })?;
            field.set_singular_field(&mut *message, v);
            Ok(())
        };

        match (logical, value) {
            (LogicalType::Decimal, Value::Decimal(d)) => {
                let parts = decimal::encode(d);
                set("value", ReflectValueBox::Bytes(parts.value))?;
                set("precision", ReflectValueBox::U32(parts.precision))?;
                set("scale", ReflectValueBox::I32(parts.scale))?;
            }
            (LogicalType::Date, Value::DateTime(dt)) => {
                if dt.num_seconds_from_midnight() != 0 || dt.nanosecond() != 0 {
                    return Err(ConversionError::InvalidDateTimeValue(format!(
                        "date {dt} has a non-zero time of day"
                    )));
                }
                set("year", ReflectValueBox::I32(dt.year()))?;
                set("month", ReflectValueBox::I32(dt.month() as i32))?;
                set("day", ReflectValueBox::I32(dt.day() as i32))?;
            }
            (LogicalType::Time, Value::DateTime(dt)) => {
                let millis = dt.timestamp_millis();
                if !(0..MILLIS_PER_DAY).contains(&millis) {
                    return Err(ConversionError::InvalidDateTimeValue(format!(
                        "time {dt} is outside of the first day"
                    )));
                }
                set("hours", ReflectValueBox::I32(dt.hour() as i32))?;
                set("minutes", ReflectValueBox::I32(dt.minute() as i32))?;
                set("seconds", ReflectValueBox::I32(dt.second() as i32))?;
                set("nanos", ReflectValueBox::I32(dt.nanosecond() as i32))?;
            }
            (LogicalType::Timestamp, Value::DateTime(dt)) => {
                set("seconds", ReflectValueBox::I64(dt.timestamp()))?;
                set("nanos", ReflectValueBox::I32(dt.timestamp_subsec_nanos() as i32))?;
            }
            (_, other) => {
                return Err(ConversionError::type_mismatch(
                    expected.full_name(),
                    other.kind(),
                ));
            }
        }
        Ok(ReflectValueBox::Message(message))
    }
}

fn describe(runtime: &RuntimeType) -> String {
    format!("{runtime:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::schema::to_wire_schema;
    use crate::names::DefaultNames;
    use crate::types::{PROTOBUF_TYPE_ENUM, PROTOBUF_TYPE_PROP, PROTOBUF_TYPE_TAG};
    use chrono::{TimeZone, Utc};
    use protobuf::reflect::ReflectValueRef;
    use record_core::{logical, SchemaBuilder};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn encode(config: &ConverterConfig, schema: &Schema, value: Value) -> Result<Box<dyn MessageDyn>> {
        let wire = to_wire_schema(config, &DefaultNames::new(), schema)?;
        Ok(to_wire_value(config, &wire, schema, &value)?.unwrap())
    }

    fn get<'a>(message: &'a dyn MessageDyn, name: &str) -> ReflectValueRef<'a> {
        message
            .descriptor_dyn()
            .field_by_name(name)
            .unwrap()
            .get_singular_field_or_default(message)
    }

    #[test]
    fn test_scalars_follow_wire_width() {
        let schema = SchemaBuilder::struct_()
            .name("Row")
            .field("id", SchemaBuilder::int32().build().unwrap())
            .field(
                "counter",
                SchemaBuilder::int64()
                    .parameter(PROTOBUF_TYPE_PROP, "uint32")
                    .build()
                    .unwrap(),
            )
            .field("tiny", SchemaBuilder::int8().build().unwrap())
            .build()
            .unwrap();
        let record = Struct::new(&schema)
            .unwrap()
            .with("id", 7)
            .unwrap()
            .with("counter", 4_000_000_000i64)
            .unwrap()
            .with("tiny", -3i8)
            .unwrap();

        let message = encode(&ConverterConfig::default(), &schema, Value::Struct(record)).unwrap();
        assert_eq!(get(&*message, "id").to_i32(), Some(7));
        assert_eq!(get(&*message, "counter").to_u32(), Some(4_000_000_000));
        assert_eq!(get(&*message, "tiny").to_i32(), Some(-3));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = SchemaBuilder::struct_()
            .name("Row")
            .field("id", SchemaBuilder::int32().build().unwrap())
            .build()
            .unwrap();
        let record = Struct::new(&schema).unwrap().with("id", "seven").unwrap();
        assert!(matches!(
            encode(&ConverterConfig::default(), &schema, Value::Struct(record)),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrapper_distinguishes_absent_from_zero() {
        let config = ConverterConfig::default().with_wrapper_for_nullables(true);
        let schema = SchemaBuilder::struct_()
            .name("Row")
            .field("a", SchemaBuilder::int32().optional().build().unwrap())
            .field("b", SchemaBuilder::int32().optional().build().unwrap())
            .build()
            .unwrap();
        let record = Struct::new(&schema).unwrap().with("b", 0).unwrap();

        let message = encode(&config, &schema, Value::Struct(record)).unwrap();
        let descriptor = message.descriptor_dyn();
        assert!(!descriptor.field_by_name("a").unwrap().has_field(&*message));
        assert!(descriptor.field_by_name("b").unwrap().has_field(&*message));
    }

    #[test]
    fn test_empty_array_is_absent() {
        let schema = SchemaBuilder::struct_()
            .name("Row")
            .field(
                "tags",
                SchemaBuilder::array(SchemaBuilder::string().build().unwrap())
                    .optional()
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let record = Struct::new(&schema)
            .unwrap()
            .with("tags", Vec::<Value>::new())
            .unwrap();
        let message = encode(&ConverterConfig::default(), &schema, Value::Struct(record)).unwrap();
        let tags = message.descriptor_dyn().field_by_name("tags").unwrap();
        assert_eq!(tags.get_repeated(&*message).len(), 0);
    }

    #[test]
    fn test_enum_symbol() {
        let status = SchemaBuilder::string()
            .name("Status")
            .parameter(PROTOBUF_TYPE_ENUM, "Status")
            .parameter(format!("{PROTOBUF_TYPE_ENUM_PREFIX}ACTIVE"), "0")
            .parameter(format!("{PROTOBUF_TYPE_ENUM_PREFIX}DISABLED"), "1")
            .optional()
            .build()
            .unwrap();
        let schema = SchemaBuilder::struct_()
            .name("Account")
            .field("status", status)
            .build()
            .unwrap();
        let record = Struct::new(&schema).unwrap().with("status", "DISABLED").unwrap();
        let message = encode(&ConverterConfig::default(), &schema, Value::Struct(record)).unwrap();
        match get(&*message, "status") {
            ReflectValueRef::Enum(_, number) => assert_eq!(number, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_logical_values() {
        let schema = SchemaBuilder::struct_()
            .name("Event")
            .field("amount", logical::decimal(2).build().unwrap())
            .field("day", logical::date().build().unwrap())
            .field("at", logical::time().build().unwrap())
            .field("when", logical::timestamp().build().unwrap())
            .build()
            .unwrap();
        let record = Struct::new(&schema)
            .unwrap()
            .with("amount", Decimal::from_str("12.34").unwrap())
            .unwrap()
            .with("day", Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
            .unwrap()
            .with("at", Utc.with_ymd_and_hms(1970, 1, 1, 13, 45, 30).unwrap())
            .unwrap()
            .with("when", Utc.timestamp_opt(1_700_000_000, 5).unwrap())
            .unwrap();

        let message = encode(&ConverterConfig::default(), &schema, Value::Struct(record)).unwrap();

        let amount = get(&*message, "amount").to_message().unwrap();
        assert_eq!(get(&*amount, "value").to_bytes(), Some(&[0x04u8, 0xD2][..]));
        assert_eq!(get(&*amount, "scale").to_i32(), Some(2));

        let day = get(&*message, "day").to_message().unwrap();
        assert_eq!(get(&*day, "year").to_i32(), Some(2024));
        assert_eq!(get(&*day, "day").to_i32(), Some(29));

        let at = get(&*message, "at").to_message().unwrap();
        assert_eq!(get(&*at, "hours").to_i32(), Some(13));
        assert_eq!(get(&*at, "seconds").to_i32(), Some(30));

        let when = get(&*message, "when").to_message().unwrap();
        assert_eq!(get(&*when, "seconds").to_i64(), Some(1_700_000_000));
        assert_eq!(get(&*when, "nanos").to_i32(), Some(5));
    }

    #[test]
    fn test_invalid_date_and_time() {
        let schema = SchemaBuilder::struct_()
            .name("Event")
            .field("day", logical::date().optional().build().unwrap())
            .field("at", logical::time().optional().build().unwrap())
            .build()
            .unwrap();

        let bad_date = Struct::new(&schema)
            .unwrap()
            .with("day", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap())
            .unwrap();
        assert!(matches!(
            encode(&ConverterConfig::default(), &schema, Value::Struct(bad_date)),
            Err(ConversionError::InvalidDateTimeValue(_))
        ));

        let bad_time = Struct::new(&schema)
            .unwrap()
            .with("at", Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap())
            .unwrap();
        assert!(matches!(
            encode(&ConverterConfig::default(), &schema, Value::Struct(bad_time)),
            Err(ConversionError::InvalidDateTimeValue(_))
        ));
    }

    #[test]
    fn test_union_without_value_is_rejected() {
        let union = SchemaBuilder::struct_()
            .name("io.confluent.connect.protobuf.Union.choice")
            .field(
                "a",
                SchemaBuilder::string().optional().parameter(PROTOBUF_TYPE_TAG, "1").build().unwrap(),
            )
            .optional()
            .build()
            .unwrap();
        let schema = SchemaBuilder::struct_()
            .name("Holder")
            .field("choice_0", union.clone())
            .build()
            .unwrap();
        let empty_union = Struct::new(&union).unwrap();
        let record = Struct::new(&schema)
            .unwrap()
            .with("choice_0", empty_union)
            .unwrap();
        assert!(matches!(
            encode(&ConverterConfig::default(), &schema, Value::Struct(record)),
            Err(ConversionError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_mismatching_struct_schema() {
        let inner = SchemaBuilder::struct_()
            .name("Inner")
            .field("x", SchemaBuilder::int32().build().unwrap())
            .optional()
            .build()
            .unwrap();
        let other = SchemaBuilder::struct_()
            .name("Other")
            .field("y", SchemaBuilder::int32().build().unwrap())
            .build()
            .unwrap();
        let schema = SchemaBuilder::struct_()
            .name("Outer")
            .field("inner", inner)
            .build()
            .unwrap();
        let record = Struct::new(&schema)
            .unwrap()
            .with("inner", Struct::new(&other).unwrap())
            .unwrap();
        assert!(matches!(
            encode(&ConverterConfig::default(), &schema, Value::Struct(record)),
            Err(ConversionError::SchemaMismatch(_))
        ));
    }
}
