//! Reverse schema translation: wire schema → structured schema.
//!
//! Messages are translated into one arena. A message seen a second time, its
//! own root included, becomes a proxy of the node created the first time, so
//! recursive descriptors produce recursive schemas instead of unbounded
//! expansion.

use crate::config::ConverterConfig;
use crate::error::{ConversionError, Result};
use crate::meta::FieldMeta;
use crate::names::to_map_field;
use crate::types::{
    integer_from_wire, scalar_from_wire, WellKnownType, CONNECT_PRECISION_PROP,
    CONNECT_TYPE_INT16, CONNECT_TYPE_INT8, CONNECT_TYPE_PROP, KEY_FIELD, MAP_ENTRY_SUFFIX,
    PROTOBUF_PRECISION_PROP, PROTOBUF_SCALE_PROP, PROTOBUF_TYPE_ENUM, PROTOBUF_TYPE_ENUM_PREFIX,
    PROTOBUF_TYPE_PROP, PROTOBUF_TYPE_TAG, PROTOBUF_TYPE_UNION_PREFIX, VALUE_FIELD,
};
use crate::wire::WireSchema;
use protobuf::descriptor::field_descriptor_proto::Type;
use protobuf::reflect::{FieldDescriptor, MessageDescriptor, RuntimeFieldType, RuntimeType};
use record_core::{logical, NodeId, Schema, SchemaGraphBuilder, SchemaType, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Translate a wire schema into a structured struct schema.
pub fn to_record_schema(config: &ConverterConfig, wire: &WireSchema) -> Result<Schema> {
    let descriptor = wire.descriptor();
    let mut ctx = Context {
        config,
        graph: SchemaGraphBuilder::new(),
        messages: HashMap::new(),
    };

    let root = ctx.graph.struct_();
    ctx.messages.insert(descriptor.full_name().to_string(), root);
    ctx.fill_struct(root, descriptor)?;
    if let Some(version) = wire.version() {
        ctx.graph.set_version(root, version);
    }

    debug!(
        root = descriptor.full_name(),
        messages = ctx.messages.len(),
        "translated wire schema to structured schema"
    );
    Ok(ctx.graph.build(root))
}

/// Whether a message follows the map-entry convention.
pub(crate) fn is_map_entry(descriptor: &MessageDescriptor) -> bool {
    let fields: Vec<_> = descriptor.fields().collect();
    descriptor.name().ends_with(MAP_ENTRY_SUFFIX)
        && fields.len() == 2
        && fields[0].name() == KEY_FIELD
        && fields[1].name() == VALUE_FIELD
}

struct Context<'a> {
    config: &'a ConverterConfig,
    graph: SchemaGraphBuilder,
    /// Message full name → struct node.
    messages: HashMap<String, NodeId>,
}

impl Context<'_> {
    fn fill_struct(&mut self, id: NodeId, descriptor: &MessageDescriptor) -> Result<()> {
        trace!(message = descriptor.full_name(), "translating message");
        let name = if self.config.enhanced_schema_support {
            descriptor.full_name()
        } else {
            descriptor.name()
        };
        self.graph.set_name(id, name);

        let real_oneofs = descriptor.oneofs().filter(|o| !o.is_synthetic());
        for (index, oneof) in real_oneofs.enumerate() {
            let union = self.graph.struct_();
            self.graph
                .set_name(union, format!("{PROTOBUF_TYPE_UNION_PREFIX}{}", oneof.name()));
            for case in oneof.fields() {
                let node = self.field(&case)?;
                self.graph.add_field(union, case.name(), node)?;
            }
            self.graph.set_optional(union, true);
            self.graph
                .add_field(id, format!("{}_{index}", oneof.name()), union)?;
        }

        for field in descriptor.fields() {
            if field.containing_oneof().is_some() {
                continue;
            }
            let node = self.field(&field)?;
            self.graph.add_field(id, field.name(), node)?;
        }
        Ok(())
    }

    fn field(&mut self, field: &FieldDescriptor) -> Result<NodeId> {
        let meta = FieldMeta::of_field(field)?.unwrap_or_default();
        let wire = field.proto().type_();

        let mut node = match wire {
            Type::TYPE_ENUM => self.enum_string(field)?,
            Type::TYPE_MESSAGE => self.message_field(field, &meta)?,
            Type::TYPE_GROUP => {
                return Err(ConversionError::UnsupportedSchemaType(format!(
                    "group field {}",
                    field.full_name()
                )))
            }
            Type::TYPE_INT32 | Type::TYPE_SINT32 | Type::TYPE_SFIXED32
                if meta.param(CONNECT_TYPE_PROP) == Some(CONNECT_TYPE_INT8) =>
            {
                self.graph.primitive(SchemaType::Int8)?
            }
            Type::TYPE_INT32 | Type::TYPE_SINT32 | Type::TYPE_SFIXED32
                if meta.param(CONNECT_TYPE_PROP) == Some(CONNECT_TYPE_INT16) =>
            {
                self.graph.primitive(SchemaType::Int16)?
            }
            _ => match integer_from_wire(wire) {
                Some((schema_type, width)) => {
                    let node = self.graph.primitive(schema_type)?;
                    if let Some(width) = width {
                        self.graph.set_parameter(node, PROTOBUF_TYPE_PROP, width);
                    }
                    node
                }
                None => {
                    let schema_type = scalar_from_wire(wire).ok_or_else(|| {
                        ConversionError::UnsupportedSchemaType(format!("{wire:?}"))
                    })?;
                    self.graph.primitive(schema_type)?
                }
            },
        };

        if field.proto().has_default_value() && wire != Type::TYPE_MESSAGE {
            if let Some(default) =
                parse_default(self.graph.schema_type(node), field.proto().default_value())
            {
                self.graph.set_default(node, default);
            }
        }
        if let Some(doc) = meta.doc {
            self.graph.set_doc(node, doc);
        }

        if field.is_repeated() && self.graph.schema_type(node) != SchemaType::Map {
            self.graph.set_optional(node, true);
            node = self.graph.array(node);
            self.graph.set_optional(node, true);
        }
        if !self.config.wrapper_for_nullables {
            self.graph.set_optional(node, true);
        }
        self.graph
            .set_parameter(node, PROTOBUF_TYPE_TAG, field.number().to_string());
        Ok(node)
    }

    fn enum_string(&mut self, field: &FieldDescriptor) -> Result<NodeId> {
        let descriptor = match field.runtime_field_type() {
            RuntimeFieldType::Singular(RuntimeType::Enum(e))
            | RuntimeFieldType::Repeated(RuntimeType::Enum(e)) => e,
            _ => {
                return Err(ConversionError::type_mismatch(
                    "enum",
                    field.full_name(),
                ))
            }
        };
        let node = self.graph.primitive(SchemaType::String)?;
        self.graph.set_name(node, descriptor.name());
        self.graph
            .set_parameter(node, PROTOBUF_TYPE_ENUM, descriptor.name());
        for value in descriptor.values() {
            self.graph.set_parameter(
                node,
                format!("{PROTOBUF_TYPE_ENUM_PREFIX}{}", value.name()),
                value.value().to_string(),
            );
        }
        self.graph.set_optional(node, true);
        Ok(node)
    }

    fn message_field(&mut self, field: &FieldDescriptor, meta: &FieldMeta) -> Result<NodeId> {
        let descriptor = message_type(field)?;
        let node = match WellKnownType::from_full_name(descriptor.full_name()) {
            Some(WellKnownType::Decimal) => {
                let scale = meta
                    .param(PROTOBUF_SCALE_PROP)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let node = self.graph.import(&logical::decimal(scale).build()?);
                if let Some(precision) = meta
                    .param(PROTOBUF_PRECISION_PROP)
                    .and_then(|p| p.parse::<u32>().ok())
                {
                    self.graph
                        .set_parameter(node, CONNECT_PRECISION_PROP, precision.to_string());
                }
                node
            }
            Some(WellKnownType::Date) => self.graph.import(&logical::date().build()?),
            Some(WellKnownType::TimeOfDay) => self.graph.import(&logical::time().build()?),
            Some(WellKnownType::Timestamp) => self.graph.import(&logical::timestamp().build()?),
            Some(wrapper) if self.config.wrapper_for_nullables => {
                match wrapper.unwrapped_type() {
                    Some(SchemaType::Int32)
                        if meta.param(CONNECT_TYPE_PROP) == Some(CONNECT_TYPE_INT8) =>
                    {
                        self.graph.primitive(SchemaType::Int8)?
                    }
                    Some(SchemaType::Int32)
                        if meta.param(CONNECT_TYPE_PROP) == Some(CONNECT_TYPE_INT16) =>
                    {
                        self.graph.primitive(SchemaType::Int16)?
                    }
                    Some(schema_type) => {
                        let node = self.graph.primitive(schema_type)?;
                        if let Some(width) = wrapper.unwrapped_width() {
                            self.graph.set_parameter(node, PROTOBUF_TYPE_PROP, width);
                        }
                        node
                    }
                    None => self.message_schema(&descriptor)?,
                }
            }
            _ => self.message_schema(&descriptor)?,
        };
        self.graph.set_optional(node, true);
        Ok(node)
    }

    fn message_schema(&mut self, descriptor: &MessageDescriptor) -> Result<NodeId> {
        if is_map_entry(descriptor) {
            let fields: Vec<_> = descriptor.fields().collect();
            let key = self.field(&fields[0])?;
            let value = self.field(&fields[1])?;
            let node = self.graph.map(key, value);
            self.graph.set_name(node, to_map_field(descriptor.name()));
            return Ok(node);
        }

        if let Some(&existing) = self.messages.get(descriptor.full_name()) {
            trace!(message = descriptor.full_name(), "reusing message through a proxy");
            return Ok(self.graph.proxy(existing));
        }

        let node = self.graph.struct_();
        self.messages.insert(descriptor.full_name().to_string(), node);
        self.fill_struct(node, descriptor)?;
        Ok(node)
    }
}

/// Message type of a message-typed field, including real `map<>` fields
/// whose entry type is only reachable through the containing message.
fn message_type(field: &FieldDescriptor) -> Result<MessageDescriptor> {
    match field.runtime_field_type() {
        RuntimeFieldType::Singular(RuntimeType::Message(m))
        | RuntimeFieldType::Repeated(RuntimeType::Message(m)) => Ok(m),
        RuntimeFieldType::Map(..) => {
            let type_name = field.proto().type_name();
            let type_name = type_name.strip_prefix('.').unwrap_or(type_name);
            field
                .containing_message()
                .nested_messages()
                .find(|m| m.full_name() == type_name)
                .ok_or_else(|| ConversionError::MessageNotFound(type_name.to_string()))
        }
        _ => Err(ConversionError::type_mismatch("message", field.full_name())),
    }
}

fn parse_default(schema_type: SchemaType, text: &str) -> Option<Value> {
    Some(match schema_type {
        SchemaType::Int8 => Value::Int8(text.parse().ok()?),
        SchemaType::Int16 => Value::Int16(text.parse().ok()?),
        SchemaType::Int32 => Value::Int32(text.parse().ok()?),
        SchemaType::Int64 => Value::Int64(text.parse().ok()?),
        SchemaType::Float32 => Value::Float32(text.parse().ok()?),
        SchemaType::Float64 => Value::Float64(text.parse().ok()?),
        SchemaType::Boolean => Value::Boolean(text.parse().ok()?),
        SchemaType::String => Value::String(text.to_string()),
        _ => return None,
    })
}
