//! Serializable schema definitions.
//!
//! [`SchemaDef`] is the on-disk form of a [`Schema`], read from YAML or JSON.
//! Recursive schemas are written with `ref`, which names an enclosing or
//! previously defined struct:
//!
//! ```yaml
//! type: struct
//! name: LinkedList
//! fields:
//!   value:
//!     type: int32
//!   next:
//!     ref: LinkedList
//!     optional: true
//! ```

use crate::builder::SchemaGraphBuilder;
use crate::error::{RecordError, Result};
use crate::logical::{
    DATE_LOGICAL_NAME, DECIMAL_LOGICAL_NAME, TIMESTAMP_LOGICAL_NAME, TIME_LOGICAL_NAME,
};
use crate::schema::{NodeId, Schema};
use crate::types::SchemaType;
use crate::values::Value;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    /// Name of a struct defined by an enclosing or earlier definition.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "ordered_parameters"
    )]
    pub parameters: Vec<(String, String)>,

    /// Element schema of an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaDef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Box<SchemaDef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<SchemaDef>>,

    /// Struct fields, written as an ordered map from field name to schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "ordered_fields")]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub schema: SchemaDef,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Parameters keep their declaration order, which a `HashMap` would lose.
mod ordered_parameters {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        parameters: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(parameters.len()))?;
        for (key, value) in parameters {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct ParametersVisitor;

        impl<'de> Visitor<'de> for ParametersVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut parameters = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    parameters.push((key, value));
                }
                Ok(parameters)
            }
        }

        deserializer.deserialize_map(ParametersVisitor)
    }
}

mod ordered_fields {
    use super::{FieldDef, SchemaDef};
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(fields: &[FieldDef], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(&field.name, &field.schema)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<FieldDef>, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Vec<FieldDef>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to schemas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::new();
                while let Some((name, schema)) = access.next_entry::<String, SchemaDef>()? {
                    fields.push(FieldDef { name, schema });
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

impl SchemaDef {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a definition; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_schema(&self) -> Result<Schema> {
        let mut graph = SchemaGraphBuilder::new();
        let mut named = HashMap::new();
        let root = build_node(self, &mut graph, &mut named)?;
        Ok(graph.build(root))
    }

    /// Describe an existing schema. Recursive references become `ref`
    /// entries, which requires every recursive struct to be named.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let mut defined = HashSet::new();
        describe(schema, &mut defined)
    }
}

fn build_node(
    def: &SchemaDef,
    graph: &mut SchemaGraphBuilder,
    named: &mut HashMap<String, NodeId>,
) -> Result<NodeId> {
    let id = match (&def.reference, def.schema_type) {
        (Some(_), Some(_)) => {
            return Err(RecordError::InvalidDefinition(
                "`ref` and `type` are mutually exclusive".into(),
            ))
        }
        (None, None) => {
            return Err(RecordError::InvalidDefinition(
                "schema needs either `type` or `ref`".into(),
            ))
        }
        (Some(reference), None) => {
            let target = named.get(reference).copied().ok_or_else(|| {
                RecordError::InvalidDefinition(format!("unknown struct reference: {reference}"))
            })?;
            graph.proxy(target)
        }
        (None, Some(schema_type)) => build_definition(def, schema_type, graph, named)?,
    };

    graph.set_optional(id, def.optional);
    for (key, value) in &def.parameters {
        graph.set_parameter(id, key.clone(), value.clone());
    }
    Ok(id)
}

fn build_definition(
    def: &SchemaDef,
    schema_type: SchemaType,
    graph: &mut SchemaGraphBuilder,
    named: &mut HashMap<String, NodeId>,
) -> Result<NodeId> {
    if !def.fields.is_empty() && schema_type != SchemaType::Struct {
        return Err(RecordError::NotAStruct(schema_type));
    }
    if def.items.is_some() && schema_type != SchemaType::Array {
        return Err(RecordError::InvalidDefinition(format!(
            "`items` is not allowed on {schema_type}"
        )));
    }
    if (def.key.is_some() || def.value.is_some()) && schema_type != SchemaType::Map {
        return Err(RecordError::InvalidDefinition(format!(
            "`key` and `value` are not allowed on {schema_type}"
        )));
    }

    let id = match schema_type {
        SchemaType::Struct => {
            let id = graph.struct_();
            if let Some(name) = &def.name {
                named.insert(name.clone(), id);
            }
            for field in &def.fields {
                let field_id = build_node(&field.schema, graph, named)?;
                graph.add_field(id, field.name.clone(), field_id)?;
            }
            id
        }
        SchemaType::Array => {
            let items = def.items.as_ref().ok_or_else(|| {
                RecordError::InvalidDefinition("array schema needs `items`".into())
            })?;
            let value = build_node(items, graph, named)?;
            graph.array(value)
        }
        SchemaType::Map => match (&def.key, &def.value) {
            (Some(key), Some(value)) => {
                let key = build_node(key, graph, named)?;
                let value = build_node(value, graph, named)?;
                graph.map(key, value)
            }
            _ => {
                return Err(RecordError::InvalidDefinition(
                    "map schema needs `key` and `value`".into(),
                ))
            }
        },
        primitive => graph.primitive(primitive)?,
    };

    if let Some(name) = &def.name {
        graph.set_name(id, name.clone());
    }
    if let Some(version) = def.version {
        graph.set_version(id, version);
    }
    if let Some(doc) = &def.doc {
        graph.set_doc(id, doc.clone());
    }
    if let Some(default) = &def.default {
        let value = default_from_json(schema_type, def.name.as_deref(), default)?;
        graph.set_default(id, value);
    }
    Ok(id)
}

fn describe(schema: &Schema, defined: &mut HashSet<NodeId>) -> Result<SchemaDef> {
    let resolved = schema.graph().resolve(schema.id());
    let mut def = SchemaDef {
        optional: schema.is_optional(),
        parameters: schema.parameters().to_vec(),
        ..SchemaDef::default()
    };

    if schema.schema_type() == SchemaType::Struct && defined.contains(&resolved) {
        let name = schema.name().ok_or_else(|| {
            RecordError::InvalidDefinition("recursive struct must be named".into())
        })?;
        def.reference = Some(name.to_string());
        return Ok(def);
    }

    let schema_type = schema.schema_type();
    def.schema_type = Some(schema_type);
    def.name = schema.name().map(str::to_string);
    def.version = schema.version();
    def.doc = schema.doc().map(str::to_string);
    def.default = schema.default_value().map(default_to_json).transpose()?;

    match schema_type {
        SchemaType::Struct => {
            defined.insert(resolved);
            def.fields = schema
                .fields()
                .iter()
                .map(|field| {
                    Ok(FieldDef {
                        name: field.name().to_string(),
                        schema: describe(field.schema(), defined)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }
        SchemaType::Array => {
            if let Some(items) = schema.value_schema() {
                def.items = Some(Box::new(describe(&items, defined)?));
            }
        }
        SchemaType::Map => {
            if let (Some(key), Some(value)) = (schema.key_schema(), schema.value_schema()) {
                def.key = Some(Box::new(describe(&key, defined)?));
                def.value = Some(Box::new(describe(&value, defined)?));
            }
        }
        _ => {}
    }
    Ok(def)
}

fn invalid_default(schema_type: SchemaType, json: &serde_json::Value) -> RecordError {
    RecordError::InvalidDefinition(format!("invalid default for {schema_type}: {json}"))
}

fn default_from_json(
    schema_type: SchemaType,
    name: Option<&str>,
    json: &serde_json::Value,
) -> Result<Value> {
    let bad = || invalid_default(schema_type, json);

    match name {
        Some(DECIMAL_LOGICAL_NAME) => {
            let text = match json {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return Err(bad()),
            };
            return Decimal::from_str(&text).map(Value::Decimal).map_err(|_| bad());
        }
        Some(DATE_LOGICAL_NAME | TIME_LOGICAL_NAME | TIMESTAMP_LOGICAL_NAME) => {
            let text = json.as_str().ok_or_else(bad)?;
            return DateTime::parse_from_rfc3339(text)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| bad());
        }
        _ => {}
    }

    let value = match schema_type {
        SchemaType::Int8 => Value::Int8(json_int(json).ok_or_else(bad)?),
        SchemaType::Int16 => Value::Int16(json_int(json).ok_or_else(bad)?),
        SchemaType::Int32 => Value::Int32(json_int(json).ok_or_else(bad)?),
        SchemaType::Int64 => Value::Int64(json.as_i64().ok_or_else(bad)?),
        SchemaType::Float32 => Value::Float32(json.as_f64().ok_or_else(bad)? as f32),
        SchemaType::Float64 => Value::Float64(json.as_f64().ok_or_else(bad)?),
        SchemaType::Boolean => Value::Boolean(json.as_bool().ok_or_else(bad)?),
        SchemaType::String => Value::String(json.as_str().ok_or_else(bad)?.to_string()),
        SchemaType::Bytes => Value::Bytes(json.as_str().ok_or_else(bad)?.as_bytes().to_vec()),
        SchemaType::Array | SchemaType::Map | SchemaType::Struct => return Err(bad()),
    };
    Ok(value)
}

fn json_int<T: TryFrom<i64>>(json: &serde_json::Value) -> Option<T> {
    json.as_i64().and_then(|v| T::try_from(v).ok())
}

fn default_to_json(value: &Value) -> Result<serde_json::Value> {
    use serde_json::Value as Json;

    let json = match value {
        Value::Null => Json::Null,
        Value::Int8(v) => Json::from(*v),
        Value::Int16(v) => Json::from(*v),
        Value::Int32(v) => Json::from(*v),
        Value::Int64(v) => Json::from(*v),
        Value::Float32(v) => Json::from(*v as f64),
        Value::Float64(v) => Json::from(*v),
        Value::Boolean(v) => Json::from(*v),
        Value::String(v) => Json::from(v.as_str()),
        Value::Bytes(v) => Json::from(String::from_utf8_lossy(v).into_owned()),
        Value::Decimal(v) => Json::from(v.to_string()),
        Value::DateTime(v) => Json::from(v.to_rfc3339()),
        Value::Array(_) | Value::Map(_) | Value::Struct(_) => {
            return Err(RecordError::InvalidDefinition(format!(
                "defaults of kind {} cannot be described",
                value.kind()
            )))
        }
    };
    Ok(json)
}
