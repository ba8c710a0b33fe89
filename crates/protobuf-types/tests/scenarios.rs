//! End-to-end conversions through `ProtobufConverter`.

use anyhow::{Context, Result};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf_types::types::{PROTOBUF_TYPE_TAG, PROTOBUF_TYPE_UNION_PREFIX};
use protobuf_types::{ConverterConfig, ProtobufConverter};
use record_core::{logical, Schema, SchemaBuilder, Struct, Value};
use rust_decimal::Decimal;
use std::str::FromStr;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn tagged(builder: SchemaBuilder, tag: i32) -> Schema {
    builder
        .parameter(PROTOBUF_TYPE_TAG, tag.to_string())
        .build()
        .unwrap()
}

fn struct_value(value: &Value) -> &Struct {
    value.as_struct().expect("struct value")
}

#[test]
fn test_struct_with_id_and_name() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let schema = SchemaBuilder::struct_()
        .name("com.example.User")
        .field("id", tagged(SchemaBuilder::int32(), 1))
        .field("name", SchemaBuilder::string().optional().build()?)
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    assert_eq!(wire.name(), "com.example.User");
    let fields: Vec<_> = wire
        .descriptor()
        .fields()
        .map(|f| (f.name().to_string(), f.number(), f.proto().type_()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("id".to_string(), 1, Type::TYPE_INT32),
            ("name".to_string(), 2, Type::TYPE_STRING),
        ]
    );

    let value = Struct::new(&schema)?.with("id", 42)?.with("name", "ada")?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let back = converter.to_record_data(&converted.schema, message)?;

    assert_eq!(back.schema.name(), Some("User"));
    let record = struct_value(&back.value);
    assert_eq!(record.get("id"), Some(&Value::Int32(42)));
    assert_eq!(record.get("name"), Some(&Value::String("ada".into())));
    Ok(())
}

#[test]
fn test_map_field_uses_entry_message() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let counts = SchemaBuilder::map(
        SchemaBuilder::string().build()?,
        SchemaBuilder::int64().build()?,
    )
    .optional()
    .build()?;
    let schema = SchemaBuilder::struct_()
        .name("Stats")
        .field("counts", counts)
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    let field = wire.descriptor().field_by_name("counts").context("counts field")?;
    assert_eq!(field.proto().label(), Label::LABEL_REPEATED);
    assert_eq!(field.proto().type_name(), ".Stats.CountsEntry");

    let entry = wire
        .descriptor()
        .nested_messages()
        .find(|m| m.name() == "CountsEntry")
        .context("entry message")?;
    let entry_fields: Vec<_> = entry
        .fields()
        .map(|f| (f.name().to_string(), f.number(), f.proto().type_()))
        .collect();
    assert_eq!(
        entry_fields,
        vec![
            ("key".to_string(), 1, Type::TYPE_STRING),
            ("value".to_string(), 2, Type::TYPE_INT64),
        ]
    );

    let entries = vec![
        (Value::from("a"), Value::Int64(1)),
        (Value::from("b"), Value::Int64(-2)),
    ];
    let value = Struct::new(&schema)?.with("counts", Value::Map(entries.clone()))?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let back = converter.to_record_data(&converted.schema, message)?;
    assert_eq!(struct_value(&back.value).get("counts"), Some(&Value::Map(entries)));
    Ok(())
}

#[test]
fn test_decimal_round_trip() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let schema = SchemaBuilder::struct_()
        .name("Invoice")
        .field("amount", logical::decimal(2).optional().build()?)
        .build()?;
    let amount = Decimal::from_str("12.34")?;

    let value = Struct::new(&schema)?.with("amount", amount)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let back = converter.to_record_data(&converted.schema, message)?;

    let amount_schema = back.schema.field("amount").context("amount field")?;
    assert_eq!(amount_schema.schema().name(), Some(logical::DECIMAL_LOGICAL_NAME));
    assert_eq!(amount_schema.schema().parameter("scale"), Some("2"));
    assert_eq!(
        struct_value(&back.value).get("amount"),
        Some(&Value::Decimal(amount))
    );
    Ok(())
}

#[test]
fn test_wrapper_mode_distinguishes_null_from_zero() -> Result<()> {
    init_logging();
    let converter =
        ProtobufConverter::new(ConverterConfig::default().with_wrapper_for_nullables(true))?;
    let schema = SchemaBuilder::struct_()
        .name("Counter")
        .field("count", SchemaBuilder::int32().optional().build()?)
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    let field = wire.descriptor().field_by_name("count").context("count field")?;
    assert_eq!(field.proto().type_name(), ".google.protobuf.Int32Value");

    let absent = Struct::new(&schema)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(absent))?;
    let message = converted.message.as_deref().context("message")?;
    assert!(!field.has_field(message));
    let back = converter.to_record_data(&converted.schema, message)?;
    assert_eq!(struct_value(&back.value).get("count"), Some(&Value::Null));

    let zero = Struct::new(&schema)?.with("count", 0)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(zero))?;
    let message = converted.message.as_deref().context("message")?;
    assert!(field.has_field(message));
    let back = converter.to_record_data(&converted.schema, message)?;
    assert_eq!(struct_value(&back.value).get("count"), Some(&Value::Int32(0)));
    Ok(())
}

#[test]
fn test_union_keeps_single_branch() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let union = SchemaBuilder::struct_()
        .name(format!("{PROTOBUF_TYPE_UNION_PREFIX}contact"))
        .field("email", tagged(SchemaBuilder::string().optional(), 1))
        .field("phone", tagged(SchemaBuilder::string().optional(), 2))
        .optional()
        .build()?;
    let schema = SchemaBuilder::struct_()
        .name("Person")
        .field("contact", union.clone())
        .field("id", SchemaBuilder::int32().build()?)
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    let oneof = wire.descriptor().oneofs().next().context("oneof")?;
    assert_eq!(oneof.name(), "contact");
    assert_eq!(
        wire.descriptor().field_by_name("id").context("id field")?.number(),
        3
    );

    let branch = Struct::new(&union)?.with("phone", "555-0100")?;
    let value = Struct::new(&schema)?.with("contact", branch)?.with("id", 9)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let email = wire.descriptor().field_by_name("email").context("email field")?;
    let phone = wire.descriptor().field_by_name("phone").context("phone field")?;
    assert!(!email.has_field(message));
    assert!(phone.has_field(message));

    let back = converter.to_record_data(&converted.schema, message)?;
    let record = struct_value(&back.value);
    let contact = record
        .get("contact_0")
        .and_then(Value::as_struct)
        .context("union value")?;
    assert_eq!(contact.get("phone"), Some(&Value::String("555-0100".into())));
    assert_eq!(contact.get("email"), Some(&Value::Null));
    assert_eq!(record.get("id"), Some(&Value::Int32(9)));
    Ok(())
}

#[test]
fn test_binary_encoding_round_trip() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let schema = SchemaBuilder::struct_()
        .name("Ping")
        .field("seq", SchemaBuilder::int64().build()?)
        .field("payload", SchemaBuilder::bytes().build()?)
        .build()?;
    let value = Struct::new(&schema)?
        .with("seq", 7i64)?
        .with("payload", vec![1u8, 2, 3])?;

    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let bytes = converted.to_bytes()?.context("encoded message")?;
    let mut decoded = converted.schema.new_message();
    decoded.merge_from_bytes_dyn(&bytes)?;

    let back = converter.to_record_data(&converted.schema, &*decoded)?;
    let record = struct_value(&back.value);
    assert_eq!(record.get("seq"), Some(&Value::Int64(7)));
    assert_eq!(record.get("payload"), Some(&Value::Bytes(vec![1, 2, 3])));
    Ok(())
}

#[test]
fn test_maps_sharing_a_name_keep_their_types() -> Result<()> {
    init_logging();
    let converter = ProtobufConverter::default();
    let map = |value: Schema| -> Result<Schema> {
        Ok(SchemaBuilder::map(SchemaBuilder::string().build()?, value)
            .name("M")
            .optional()
            .build()?)
    };
    let schema = SchemaBuilder::struct_()
        .name("R")
        .field("a", map(SchemaBuilder::int64().build()?)?)
        .field("b", map(SchemaBuilder::string().build()?)?)
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    let b = wire.descriptor().field_by_name("b").context("b field")?;
    assert_eq!(b.proto().type_name(), ".R.M2Entry");

    let value = Struct::new(&schema)?
        .with("a", Value::Map(vec![(Value::from("n"), Value::Int64(1))]))?
        .with("b", Value::Map(vec![(Value::from("k"), Value::from("v"))]))?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let back = converter.to_record_data(&converted.schema, message)?;

    let b_schema = back.schema.field("b").context("b field")?;
    let b_value = b_schema.schema().value_schema().context("map value")?;
    assert_eq!(b_value.schema_type(), record_core::SchemaType::String);
    let record = struct_value(&back.value);
    assert_eq!(
        record.get("a"),
        Some(&Value::Map(vec![(Value::from("n"), Value::Int64(1))]))
    );
    assert_eq!(
        record.get("b"),
        Some(&Value::Map(vec![(Value::from("k"), Value::from("v"))]))
    );
    Ok(())
}

#[test]
fn test_unsigned_wrapper_keeps_its_width() -> Result<()> {
    init_logging();
    let converter =
        ProtobufConverter::new(ConverterConfig::default().with_wrapper_for_nullables(true))?;
    let schema = SchemaBuilder::struct_()
        .name("Meter")
        .field(
            "reading",
            SchemaBuilder::int64()
                .optional()
                .parameter(protobuf_types::types::PROTOBUF_TYPE_PROP, "uint32")
                .parameter(PROTOBUF_TYPE_TAG, "3")
                .build()?,
        )
        .build()?;

    let wire = converter.from_record_schema(&schema)?;
    let field = wire.descriptor().field_by_name("reading").context("reading field")?;
    assert_eq!(field.proto().type_name(), ".google.protobuf.UInt32Value");

    let back = converter.to_record_schema(&wire)?;
    assert_eq!(back, schema);
    let again = ProtobufConverter::new(converter.config().clone())?.from_record_schema(&back)?;
    let field = again.descriptor().field_by_name("reading").context("reading field")?;
    assert_eq!(field.proto().type_name(), ".google.protobuf.UInt32Value");

    let value = Struct::new(&schema)?.with("reading", 4_000_000_000i64)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(value))?;
    let message = converted.message.as_deref().context("message")?;
    let decoded = converter.to_record_data(&converted.schema, message)?;
    assert_eq!(
        struct_value(&decoded.value).get("reading"),
        Some(&Value::Int64(4_000_000_000))
    );
    Ok(())
}
