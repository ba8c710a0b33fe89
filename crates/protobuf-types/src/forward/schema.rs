//! Forward schema translation: structured schema → wire schema.
//!
//! Every struct becomes a message nested inside the message that first
//! references it. Struct names already emitted in the current call resolve to
//! the existing message, which is what stops self-referential schemas from
//! expanding forever.

use crate::config::ConverterConfig;
use crate::error::{ConversionError, Result};
use crate::meta::FieldMeta;
use crate::names::{scrub_name, split_name, to_map_entry, unqualified, DefaultNames};
use crate::types::{
    primitive_to_wire, PrimitiveMapping, WellKnownType, KEY_FIELD, PROTOBUF_TYPE_ENUM,
    PROTOBUF_TYPE_ENUM_PREFIX, PROTOBUF_TYPE_TAG, PROTOBUF_TYPE_UNION_PREFIX, VALUE_FIELD,
};
use crate::well_known;
use crate::wire::{file_name_for, WireSchema};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, OneofDescriptorProto,
};
use protobuf::MessageField;
use record_core::{Schema, SchemaType, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Whether a struct schema stands for a oneof group.
pub(crate) fn is_union(schema: &Schema) -> bool {
    schema.schema_type() == SchemaType::Struct
        && schema
            .name()
            .is_some_and(|n| n.starts_with(PROTOBUF_TYPE_UNION_PREFIX))
}

/// Explicit field tag carried by a schema, if any.
pub(crate) fn explicit_tag(schema: &Schema) -> Result<Option<i32>> {
    match schema.parameter(PROTOBUF_TYPE_TAG) {
        Some(tag) => tag.parse().map(Some).map_err(|_| {
            ConversionError::DescriptorValidation(format!("invalid field tag \"{tag}\""))
        }),
        None => Ok(None),
    }
}

/// Per-call translation state.
struct Context<'a> {
    config: &'a ConverterConfig,
    names: &'a DefaultNames,
    /// Struct name → fully-qualified message name.
    named: HashMap<String, String>,
    /// Anonymous structs already emitted, by definition identity.
    anonymous: Vec<(Schema, String)>,
    /// Map entry message full name → the map schema it was emitted for.
    entries: HashMap<String, Schema>,
    dependencies: Vec<WellKnownType>,
}

/// Translate a struct schema into a compiled wire schema.
pub fn to_wire_schema(
    config: &ConverterConfig,
    names: &DefaultNames,
    schema: &Schema,
) -> Result<WireSchema> {
    if schema.schema_type() != SchemaType::Struct {
        return Err(ConversionError::UnsupportedRootType(schema.schema_type()));
    }

    let mut ctx = Context {
        config,
        names,
        named: HashMap::new(),
        anonymous: Vec::new(),
        entries: HashMap::new(),
        dependencies: Vec::new(),
    };

    let full_name = names.name_or_default(schema.name());
    let (package, local) = split_name(&full_name);
    let local = ctx.scrub(local);
    let qualified = match package {
        Some(package) => format!(".{package}.{local}"),
        None => format!(".{local}"),
    };
    match schema.name() {
        Some(name) => {
            ctx.named.insert(name.to_string(), qualified.clone());
        }
        None => ctx.anonymous.push((schema.clone(), qualified.clone())),
    }

    let root = ctx.message(schema, &local, &qualified)?;

    let mut file = FileDescriptorProto::new();
    file.set_name(file_name_for(&local));
    if let Some(package) = package {
        file.set_package(package.to_string());
    }
    file.set_syntax("proto3".to_string());
    file.message_type.push(root);

    let mut dependencies = Vec::new();
    for well_known in &ctx.dependencies {
        if !file.dependency.iter().any(|d| d == well_known.location()) {
            file.dependency.push(well_known.location().to_string());
            dependencies.push(well_known::file_descriptor(*well_known)?);
        }
    }

    debug!(
        root = %&qualified[1..],
        dependencies = file.dependency.len(),
        "translated structured schema to wire schema"
    );
    let wire = WireSchema::compile(file, &dependencies, &qualified[1..])?;
    Ok(wire.with_version(schema.version()))
}

impl Context<'_> {
    fn scrub(&self, name: &str) -> String {
        if self.config.scrub_invalid_names {
            scrub_name(name)
        } else {
            name.to_string()
        }
    }

    fn message(&mut self, schema: &Schema, local: &str, full: &str) -> Result<DescriptorProto> {
        trace!(message = %&full[1..], "emitting message");
        let mut message = DescriptorProto::new();
        message.set_name(local.to_string());

        let fields = schema.fields();
        let mut used = HashSet::new();
        for field in &fields {
            if is_union(field.schema()) {
                for case in field.schema().fields() {
                    used.extend(explicit_tag(case.schema())?);
                }
            } else {
                used.extend(explicit_tag(field.schema())?);
            }
        }

        let mut next_tag = 1;
        for field in &fields {
            let field_schema = field.schema();
            if is_union(field_schema) {
                self.oneof(&mut message, full, field_schema)?;
                continue;
            }
            let tag = match explicit_tag(field_schema)? {
                Some(tag) => tag,
                None => {
                    while used.contains(&next_tag) {
                        next_tag += 1;
                    }
                    used.insert(next_tag);
                    next_tag
                }
            };
            let name = self.scrub(field.name());
            let definition = self.field(&mut message, full, field_schema, &name, tag, None)?;
            message.field.push(definition);
        }
        Ok(message)
    }

    fn oneof(&mut self, message: &mut DescriptorProto, scope: &str, union: &Schema) -> Result<()> {
        let union_name = union
            .name()
            .and_then(|n| n.strip_prefix(PROTOBUF_TYPE_UNION_PREFIX))
            .map(unqualified)
            .unwrap_or_default();
        let index = message.oneof_decl.len() as i32;
        let mut oneof = OneofDescriptorProto::new();
        oneof.set_name(self.scrub(union_name));
        message.oneof_decl.push(oneof);

        for case in union.fields() {
            // Cases without an explicit tag are left at 0 and rejected by validation.
            let tag = explicit_tag(case.schema())?.unwrap_or(0);
            let name = self.scrub(case.name());
            let definition = self.field(message, scope, case.schema(), &name, tag, Some(index))?;
            message.field.push(definition);
        }
        Ok(())
    }

    fn field(
        &mut self,
        message: &mut DescriptorProto,
        scope: &str,
        schema: &Schema,
        name: &str,
        tag: i32,
        oneof_index: Option<i32>,
    ) -> Result<FieldDescriptorProto> {
        let (label, element) = match schema.schema_type() {
            SchemaType::Array => {
                let element = schema.value_schema().ok_or_else(|| {
                    ConversionError::UnsupportedSchemaType("array without element".to_string())
                })?;
                if element.schema_type() == SchemaType::Array {
                    return Err(ConversionError::UnsupportedSchemaType(
                        "Array cannot be nested".to_string(),
                    ));
                }
                (Label::LABEL_REPEATED, element)
            }
            SchemaType::Map => (Label::LABEL_REPEATED, schema.clone()),
            _ => (Label::LABEL_OPTIONAL, schema.clone()),
        };
        if oneof_index.is_some() && label == Label::LABEL_REPEATED {
            return Err(ConversionError::UnsupportedSchemaType(format!(
                "{} cannot be a union case",
                schema.schema_type()
            )));
        }

        let mut field = FieldDescriptorProto::new();
        field.set_name(name.to_string());
        field.set_number(tag);
        field.set_label(label);
        if let Some(index) = oneof_index {
            field.set_oneof_index(index);
        }

        let mut params = Vec::new();
        match element.schema_type() {
            SchemaType::Struct if is_union(&element) => {
                return Err(ConversionError::UnsupportedSchemaType(format!(
                    "union {} must be a direct struct field",
                    element.name().unwrap_or_default()
                )));
            }
            SchemaType::Struct => {
                let type_name = self.struct_type(message, scope, &element, name)?;
                field.set_type(Type::TYPE_MESSAGE);
                field.set_type_name(type_name);
            }
            SchemaType::Map => {
                let type_name = self.map_entry(message, scope, &element, name)?;
                field.set_type(Type::TYPE_MESSAGE);
                field.set_type_name(type_name);
            }
            SchemaType::String if element.parameter(PROTOBUF_TYPE_ENUM).is_some() => {
                let type_name = self.enum_type(message, scope, &element)?;
                field.set_type(Type::TYPE_ENUM);
                field.set_type_name(type_name);
                self.set_default(&mut field, &element);
            }
            _ => match primitive_to_wire(&element, self.config.wrapper_for_nullables, &mut params)? {
                PrimitiveMapping::Scalar(wire) => {
                    field.set_type(wire);
                    if wire != Type::TYPE_BYTES {
                        self.set_default(&mut field, &element);
                    }
                }
                PrimitiveMapping::Message(well_known) => {
                    field.set_type(Type::TYPE_MESSAGE);
                    field.set_type_name(format!(".{}", well_known.full_name()));
                    if !self.dependencies.contains(&well_known) {
                        self.dependencies.push(well_known);
                    }
                }
            },
        }

        let meta = FieldMeta {
            doc: element.doc().map(str::to_string),
            params,
        };
        if !meta.is_empty() {
            let mut options = FieldOptions::new();
            meta.write(&mut options)?;
            field.options = MessageField::some(options);
        }
        Ok(field)
    }

    fn set_default(&self, field: &mut FieldDescriptorProto, schema: &Schema) {
        if field.label() == Label::LABEL_REPEATED {
            return;
        }
        // Rust spells NaN differently from protobuf; infinities already match.
        let float = |text: String| if text == "NaN" { "nan".to_string() } else { text };
        let text = match schema.default_value() {
            Some(Value::Int8(v)) => v.to_string(),
            Some(Value::Int16(v)) => v.to_string(),
            Some(Value::Int32(v)) => v.to_string(),
            Some(Value::Int64(v)) => v.to_string(),
            Some(Value::Float32(v)) => float(v.to_string()),
            Some(Value::Float64(v)) => float(v.to_string()),
            Some(Value::Boolean(v)) => v.to_string(),
            Some(Value::String(v)) => v.clone(),
            _ => return,
        };
        field.set_default_value(text);
    }

    /// Fully-qualified name of the message for a struct, emitting it nested
    /// in `message` on first use.
    fn struct_type(
        &mut self,
        message: &mut DescriptorProto,
        scope: &str,
        schema: &Schema,
        field_name: &str,
    ) -> Result<String> {
        let existing = match schema.name() {
            Some(name) => self.named.get(name).cloned(),
            None => self
                .anonymous
                .iter()
                .find(|(s, _)| s.same_definition(schema))
                .map(|(_, full)| full.clone()),
        };
        if let Some(full) = existing {
            return Ok(full);
        }

        let mut local = self.scrub(&self.names.unqualified_name(schema.name()));
        if local == field_name {
            local.push_str("Message");
        }
        let local = unique_name(message, local);
        let full = format!("{scope}.{local}");
        match schema.name() {
            Some(name) => {
                self.named.insert(name.to_string(), full.clone());
            }
            None => self.anonymous.push((schema.clone(), full.clone())),
        }

        let nested = self.message(schema, &local, &full)?;
        message.nested_type.push(nested);
        Ok(full)
    }

    fn map_entry(
        &mut self,
        message: &mut DescriptorProto,
        scope: &str,
        schema: &Schema,
        field_name: &str,
    ) -> Result<String> {
        let stem = schema.name().map(unqualified).unwrap_or(field_name);
        let mut suffix = 1;
        let local = loop {
            // Counters go before the suffix so the entry still reads as one.
            let local = match suffix {
                1 => to_map_entry(stem),
                n => to_map_entry(&format!("{stem}{n}")),
            };
            let full = format!("{scope}.{local}");
            match self.entries.get(&full) {
                Some(emitted) if same_entry(emitted, schema) => return Ok(full),
                Some(_) => {}
                None if !is_taken(message, &local) => break local,
                None => {}
            }
            suffix += 1;
        };
        let full = format!("{scope}.{local}");
        self.entries.insert(full.clone(), schema.clone());

        let (Some(key), Some(value)) = (schema.key_schema(), schema.value_schema()) else {
            return Err(ConversionError::UnsupportedSchemaType(
                "map without key or value schema".to_string(),
            ));
        };
        let mut entry = DescriptorProto::new();
        entry.set_name(local);
        let key = self.field(&mut entry, &full, &key, KEY_FIELD, 1, None)?;
        let value = self.field(&mut entry, &full, &value, VALUE_FIELD, 2, None)?;
        entry.field.push(key);
        entry.field.push(value);
        message.nested_type.push(entry);
        Ok(full)
    }

    fn enum_type(
        &mut self,
        message: &mut DescriptorProto,
        scope: &str,
        schema: &Schema,
    ) -> Result<String> {
        let enum_name = schema.parameter(PROTOBUF_TYPE_ENUM).unwrap_or_default();
        let local = self.scrub(unqualified(enum_name));
        let full = format!("{scope}.{local}");
        if message.enum_type.iter().any(|e| e.name() == local) {
            return Ok(full);
        }

        let mut definition = EnumDescriptorProto::new();
        definition.set_name(local);
        for (key, tag) in schema.parameters() {
            let Some(symbol) = key.strip_prefix(PROTOBUF_TYPE_ENUM_PREFIX) else {
                continue;
            };
            let number = tag.parse().map_err(|_| {
                ConversionError::DescriptorValidation(format!(
                    "invalid tag \"{tag}\" for enum value {symbol}"
                ))
            })?;
            let mut value = EnumValueDescriptorProto::new();
            value.set_name(symbol.to_string());
            value.set_number(number);
            definition.value.push(value);
        }
        message.enum_type.push(definition);
        Ok(full)
    }
}

fn same_entry(a: &Schema, b: &Schema) -> bool {
    a.key_schema() == b.key_schema() && a.value_schema() == b.value_schema()
}

/// `candidate`, or `candidate` plus a counter when the message already has
/// a nested type or field of that name.
fn unique_name(message: &DescriptorProto, candidate: String) -> String {
    if !is_taken(message, &candidate) {
        return candidate;
    }
    (2..)
        .map(|n| format!("{candidate}{n}"))
        .find(|name| !is_taken(message, name))
        .unwrap_or(candidate)
}

fn is_taken(message: &DescriptorProto, name: &str) -> bool {
    message.nested_type.iter().any(|m| m.name() == name)
        || message.enum_type.iter().any(|e| e.name() == name)
        || message.field.iter().any(|f| f.name() == name)
}
