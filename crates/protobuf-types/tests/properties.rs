//! Schema translation properties: round-trip identity, cache idempotence,
//! tag stability and cycle safety.

use anyhow::{Context, Result};
use proptest::prelude::*;
use protobuf_types::types::{
    PROTOBUF_TYPE_ENUM, PROTOBUF_TYPE_PROP, PROTOBUF_TYPE_TAG, PROTOBUF_TYPE_UNION_PREFIX,
};
use protobuf_types::{ConverterConfig, ProtobufConverter};
use record_core::{logical, Schema, SchemaBuilder, SchemaGraphBuilder, SchemaType, Struct, Value};

fn tag(builder: SchemaBuilder, tag: i32) -> SchemaBuilder {
    builder.optional().parameter(PROTOBUF_TYPE_TAG, tag.to_string())
}

/// A schema in the shape the reverse translation produces: every field
/// optional and tagged.
fn canonical_user() -> Result<Schema> {
    let address = tag(SchemaBuilder::struct_().name("Address"), 6)
        .field("city", tag(SchemaBuilder::string(), 1).build()?)
        .build()?;
    let counts = tag(
        SchemaBuilder::map(
            tag(SchemaBuilder::string(), 1).build()?,
            tag(SchemaBuilder::int64(), 2).build()?,
        )
        .name("counts"),
        5,
    )
    .build()?;
    let status = tag(
        SchemaBuilder::string()
            .name("Status")
            .parameter(PROTOBUF_TYPE_ENUM, "Status")
            .parameter(format!("{PROTOBUF_TYPE_ENUM}.ACTIVE"), "0")
            .parameter(format!("{PROTOBUF_TYPE_ENUM}.DISABLED"), "1"),
        8,
    )
    .build()?;

    Ok(SchemaBuilder::struct_()
        .name("User")
        .field("id", tag(SchemaBuilder::int32(), 1).build()?)
        .field("name", tag(SchemaBuilder::string().doc("display name"), 2).build()?)
        .field("score", tag(SchemaBuilder::float64(), 3).build()?)
        .field(
            "tags",
            tag(SchemaBuilder::array(SchemaBuilder::string().optional().build()?), 4).build()?,
        )
        .field("counts", counts)
        .field("address", address)
        .field("amount", tag(logical::decimal(2), 7).build()?)
        .field("status", status)
        .field("small", tag(SchemaBuilder::int16(), 9).build()?)
        .field(
            "delta",
            tag(SchemaBuilder::int32().parameter(PROTOBUF_TYPE_PROP, "sint32"), 10).build()?,
        )
        .field("born", tag(logical::date(), 11).build()?)
        .field("seen", tag(logical::timestamp(), 12).build()?)
        .build()?)
}

#[test]
fn test_round_trip_schema_identity() -> Result<()> {
    let converter = ProtobufConverter::default();
    let schema = canonical_user()?;
    let wire = converter.from_record_schema(&schema)?;
    let back = converter.to_record_schema(&wire)?;
    assert_eq!(back, schema);
    Ok(())
}

fn required(builder: SchemaBuilder, tag: i32) -> SchemaBuilder {
    builder.parameter(PROTOBUF_TYPE_TAG, tag.to_string())
}

/// With wrapper messages only message-typed fields come back optional.
fn wrapped_reading() -> Result<Schema> {
    let address = tag(SchemaBuilder::struct_().name("Address"), 10)
        .field("city", required(SchemaBuilder::string(), 1).build()?)
        .build()?;
    let counts = tag(
        SchemaBuilder::map(
            required(SchemaBuilder::string(), 1).build()?,
            required(SchemaBuilder::int64(), 2).build()?,
        )
        .name("counts"),
        11,
    )
    .build()?;

    Ok(SchemaBuilder::struct_()
        .name("Reading")
        .field("id", required(SchemaBuilder::int32(), 1).build()?)
        .field("label", tag(SchemaBuilder::string(), 2).build()?)
        .field(
            "count",
            tag(SchemaBuilder::int64().parameter(PROTOBUF_TYPE_PROP, "uint32"), 3).build()?,
        )
        .field(
            "total",
            tag(SchemaBuilder::int64().parameter(PROTOBUF_TYPE_PROP, "uint64"), 4).build()?,
        )
        .field("level", tag(SchemaBuilder::int8(), 5).build()?)
        .field("amount", tag(logical::decimal(2), 6).build()?)
        .field("at", tag(logical::time(), 7).build()?)
        .field("seen", tag(logical::timestamp(), 8).build()?)
        .field("born", tag(logical::date(), 9).build()?)
        .field("address", address)
        .field("counts", counts)
        .build()?)
}

/// Oneofs come back first, named after the oneof and its index.
fn person_with_union() -> Result<Schema> {
    let contact = SchemaBuilder::struct_()
        .name(format!("{PROTOBUF_TYPE_UNION_PREFIX}contact"))
        .field("email", tag(SchemaBuilder::string(), 1).build()?)
        .field("phone", tag(SchemaBuilder::string(), 2).build()?)
        .optional()
        .build()?;
    Ok(SchemaBuilder::struct_()
        .name("Person")
        .field("contact_0", contact)
        .field("id", tag(SchemaBuilder::int32(), 3).build()?)
        .build()?)
}

fn schedule() -> Result<Schema> {
    Ok(SchemaBuilder::struct_()
        .name("Schedule")
        .field("day", tag(logical::date(), 1).build()?)
        .field("at", tag(logical::time(), 2).build()?)
        .field("seen", tag(logical::timestamp(), 3).build()?)
        .field("amount", tag(logical::decimal(3), 4).build()?)
        .build()?)
}

fn inventory() -> Result<Schema> {
    let map = |name: &str, value: SchemaBuilder, field_tag: i32| -> Result<Schema> {
        Ok(tag(
            SchemaBuilder::map(
                tag(SchemaBuilder::string(), 1).build()?,
                tag(value, 2).build()?,
            )
            .name(name),
            field_tag,
        )
        .build()?)
    };
    Ok(SchemaBuilder::struct_()
        .name("Inventory")
        .field("stock", map("stock", SchemaBuilder::int64(), 1)?)
        .field("prices", map("prices", SchemaBuilder::float64(), 2)?)
        .build()?)
}

#[test]
fn test_round_trip_schema_identity_across_shapes() -> Result<()> {
    let wrapped = ConverterConfig::default().with_wrapper_for_nullables(true);
    let cases = vec![
        ("wrapper messages", wrapped, wrapped_reading()?),
        ("union", ConverterConfig::default(), person_with_union()?),
        ("logical types", ConverterConfig::default(), schedule()?),
        ("two maps", ConverterConfig::default(), inventory()?),
    ];

    for (label, config, schema) in cases {
        let converter = ProtobufConverter::new(config)?;
        let wire = converter
            .from_record_schema(&schema)
            .with_context(|| format!("forward translation of {label}"))?;
        let back = converter
            .to_record_schema(&wire)
            .with_context(|| format!("reverse translation of {label}"))?;
        assert_eq!(back, schema, "{label}");

        let again = converter.from_record_schema(&back)?;
        assert_eq!(again.to_text(), wire.to_text(), "{label}");
    }
    Ok(())
}

#[test]
fn test_cache_idempotence() -> Result<()> {
    let converter = ProtobufConverter::default();
    let schema = canonical_user()?;

    let first = converter.from_record_schema(&schema)?;
    let second = converter.from_record_schema(&canonical_user()?)?;
    assert_eq!(first, second);

    let reverse_first = converter.to_record_schema(&first)?;
    let reverse_second = converter.to_record_schema(&second)?;
    assert!(Schema::ptr_eq(&reverse_first, &reverse_second));
    assert_eq!(converter.cached_schemas(), (1, 1));
    Ok(())
}

#[test]
fn test_separate_converters_agree() -> Result<()> {
    let schema = canonical_user()?;
    let a = ProtobufConverter::default().from_record_schema(&schema)?;
    let b = ProtobufConverter::default().from_record_schema(&schema)?;
    assert_eq!(a, b);
    assert_eq!(a.to_text(), b.to_text());
    Ok(())
}

#[test]
fn test_tag_stability() -> Result<()> {
    let converter = ProtobufConverter::default();
    let numbers = |schema: &Schema| -> Result<Vec<(String, i32)>> {
        let wire = converter.from_record_schema(schema)?;
        Ok(wire
            .descriptor()
            .fields()
            .map(|f| (f.name().to_string(), f.number()))
            .collect())
    };

    let v1 = SchemaBuilder::struct_()
        .name("Event")
        .field("id", tag(SchemaBuilder::int64(), 1).build()?)
        .field("kind", tag(SchemaBuilder::string(), 7).build()?)
        .field("note", SchemaBuilder::string().optional().build()?)
        .build()?;
    assert_eq!(
        numbers(&v1)?,
        vec![
            ("id".to_string(), 1),
            ("kind".to_string(), 7),
            ("note".to_string(), 2)
        ]
    );

    let v2 = SchemaBuilder::struct_()
        .name("Event")
        .field("extra", SchemaBuilder::boolean().optional().build()?)
        .field("id", tag(SchemaBuilder::int64(), 1).build()?)
        .field("kind", tag(SchemaBuilder::string(), 7).build()?)
        .build()?;
    let v2_numbers = numbers(&v2)?;
    assert!(v2_numbers.contains(&("id".to_string(), 1)));
    assert!(v2_numbers.contains(&("kind".to_string(), 7)));
    assert!(v2_numbers.contains(&("extra".to_string(), 2)));
    Ok(())
}

fn linked_list() -> Result<Schema> {
    let mut graph = SchemaGraphBuilder::new();
    let node = graph.struct_();
    graph.set_name(node, "Node");
    let value = graph.primitive(SchemaType::Int32)?;
    graph.set_optional(value, true);
    graph.set_parameter(value, PROTOBUF_TYPE_TAG, "1");
    graph.add_field(node, "value", value)?;
    let next = graph.proxy(node);
    graph.set_optional(next, true);
    graph.set_parameter(next, PROTOBUF_TYPE_TAG, "2");
    graph.add_field(node, "next", next)?;
    Ok(graph.build(node))
}

#[test]
fn test_cycle_safety() -> Result<()> {
    let converter = ProtobufConverter::default();
    let schema = linked_list()?;

    let wire = converter.from_record_schema(&schema)?;
    let next = wire.descriptor().field_by_name("next").context("next field")?;
    assert_eq!(next.proto().type_name(), ".Node");

    let back = converter.to_record_schema(&wire)?;
    assert_eq!(back, schema);
    let back_next = back.field("next").context("next field")?;
    assert!(back_next.schema().same_definition(&back));

    let tail = Struct::new(&schema)?.with("value", 2)?;
    let head = Struct::new(&schema)?.with("value", 1)?.with("next", tail)?;
    let converted = converter.from_record_data(&schema, &Value::Struct(head))?;
    let message = converted.message.as_deref().context("message")?;
    let decoded = converter.to_record_data(&converted.schema, message)?;

    let head = decoded.value.as_struct().context("head")?;
    assert_eq!(head.get("value"), Some(&Value::Int32(1)));
    let tail = head.get("next").and_then(Value::as_struct).context("tail")?;
    assert_eq!(tail.get("value"), Some(&Value::Int32(2)));
    assert_eq!(tail.get("next"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_mutual_recursion_through_proto_source() -> Result<()> {
    let converter = ProtobufConverter::new(
        ConverterConfig::default().with_enhanced_schema_support(true),
    )?;
    let wire = protobuf_types::WireSchema::from_proto_source(
        r#"
        syntax = "proto3";
        package org;
        message Employee {
          string name = 1;
          Team team = 2;
        }
        message Team {
          repeated Employee members = 1;
          Employee lead = 2;
        }
        "#,
        "Employee",
    )?;

    let schema = converter.to_record_schema(&wire)?;
    assert_eq!(schema.name(), Some("org.Employee"));
    let team = schema.field("team").context("team field")?;
    let team = team.schema();
    assert_eq!(team.name(), Some("org.Team"));
    let lead = team.field("lead").context("lead field")?;
    assert!(lead.schema().same_definition(&schema));
    let members = team.field("members").context("members field")?;
    let element = members.schema().value_schema().context("element")?;
    assert!(element.same_definition(&schema));

    let forward = converter.from_record_schema(&schema)?;
    assert_eq!(forward.name(), "org.Employee");
    Ok(())
}

fn record_schema() -> Schema {
    SchemaBuilder::struct_()
        .name("Sample")
        .field("id", SchemaBuilder::int32().build().unwrap())
        .field("label", SchemaBuilder::string().build().unwrap())
        .field("ratio", SchemaBuilder::float64().build().unwrap())
        .field("flag", SchemaBuilder::boolean().build().unwrap())
        .field(
            "tags",
            SchemaBuilder::array(SchemaBuilder::string().build().unwrap())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_values_survive_round_trip(
        id in any::<i32>(),
        label in "[a-zA-Z0-9 ]{0,16}",
        ratio in -1.0e9f64..1.0e9,
        flag in any::<bool>(),
        tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
    ) {
        let converter = ProtobufConverter::default();
        let schema = record_schema();
        let tag_values: Vec<Value> = tags.iter().map(|t| Value::from(t.as_str())).collect();
        let value = Struct::new(&schema).unwrap()
            .with("id", id).unwrap()
            .with("label", label.as_str()).unwrap()
            .with("ratio", ratio).unwrap()
            .with("flag", flag).unwrap()
            .with("tags", tag_values.clone()).unwrap();

        let converted = converter.from_record_data(&schema, &Value::Struct(value)).unwrap();
        let message = converted.message.as_deref().unwrap();
        let back = converter.to_record_data(&converted.schema, message).unwrap();
        let record = back.value.as_struct().unwrap();

        prop_assert_eq!(record.get("id"), Some(&Value::Int32(id)));
        prop_assert_eq!(record.get("label"), Some(&Value::String(label)));
        prop_assert_eq!(record.get("ratio"), Some(&Value::Float64(ratio)));
        prop_assert_eq!(record.get("flag"), Some(&Value::Boolean(flag)));
        prop_assert_eq!(record.get("tags"), Some(&Value::Array(tag_values)));
    }
}
