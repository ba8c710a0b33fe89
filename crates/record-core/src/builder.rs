//! Schema construction.
//!
//! [`SchemaBuilder`] is the fluent, tree-shaped builder used for ordinary
//! schemas. [`SchemaGraphBuilder`] works directly on arena ids and is the only
//! way to express recursive schemas: allocate a struct node first, then add
//! fields that point back at it through [`SchemaGraphBuilder::proxy`].

use crate::error::{RecordError, Result};
use crate::schema::{NodeBody, NodeId, Schema, SchemaGraph, SchemaNode};
use crate::types::SchemaType;
use crate::values::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutable arena of schema nodes, finalized once by [`SchemaGraphBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaGraphBuilder {
    nodes: Vec<SchemaNode>,
}

impl SchemaGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: SchemaNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn resolve(&self, mut id: NodeId) -> NodeId {
        while let NodeBody::Proxy { target } = self.nodes[id].body {
            id = target;
        }
        id
    }

    pub fn primitive(&mut self, schema_type: SchemaType) -> Result<NodeId> {
        if !schema_type.is_primitive() {
            return Err(RecordError::NotPrimitive(schema_type));
        }
        Ok(self.push(SchemaNode::new(schema_type, NodeBody::Primitive)))
    }

    pub fn array(&mut self, value: NodeId) -> NodeId {
        self.push(SchemaNode::new(SchemaType::Array, NodeBody::Array { value }))
    }

    pub fn map(&mut self, key: NodeId, value: NodeId) -> NodeId {
        self.push(SchemaNode::new(SchemaType::Map, NodeBody::Map { key, value }))
    }

    /// Allocate an empty struct; fields are added afterwards, so the node can
    /// be referenced before its definition is complete.
    pub fn struct_(&mut self) -> NodeId {
        self.push(SchemaNode::new(
            SchemaType::Struct,
            NodeBody::Struct { fields: Vec::new() },
        ))
    }

    /// Forwarding reference to `target` with its own optionality and parameters.
    pub fn proxy(&mut self, target: NodeId) -> NodeId {
        let target = self.resolve(target);
        let schema_type = self.nodes[target].schema_type;
        self.push(SchemaNode::new(schema_type, NodeBody::Proxy { target }))
    }

    pub fn add_field(&mut self, parent: NodeId, name: impl Into<String>, field: NodeId) -> Result<()> {
        let name = name.into();
        let parent = self.resolve(parent);
        let parent_type = self.nodes[parent].schema_type;
        match &mut self.nodes[parent].body {
            NodeBody::Struct { fields } => {
                if fields.iter().any(|(existing, _)| *existing == name) {
                    return Err(RecordError::DuplicateField(name));
                }
                fields.push((name, field));
                Ok(())
            }
            _ => Err(RecordError::NotAStruct(parent_type)),
        }
    }

    pub fn schema_type(&self, id: NodeId) -> SchemaType {
        self.nodes[self.resolve(id)].schema_type
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes[self.resolve(id)].name.as_deref()
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        let id = self.resolve(id);
        self.nodes[id].name = Some(name.into());
    }

    pub fn set_version(&mut self, id: NodeId, version: i32) {
        let id = self.resolve(id);
        self.nodes[id].version = Some(version);
    }

    pub fn set_doc(&mut self, id: NodeId, doc: impl Into<String>) {
        let id = self.resolve(id);
        self.nodes[id].doc = Some(doc.into());
    }

    pub fn set_default(&mut self, id: NodeId, value: Value) {
        let id = self.resolve(id);
        self.nodes[id].default = Some(value);
    }

    pub fn set_optional(&mut self, id: NodeId, optional: bool) {
        self.nodes[id].optional = optional;
    }

    /// Set or replace a parameter, keeping the position of an existing key.
    pub fn set_parameter(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let parameters = &mut self.nodes[id].parameters;
        match parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => parameters.push((key, value)),
        }
    }

    /// Copy every node reachable from `schema` into this arena.
    pub fn import(&mut self, schema: &Schema) -> NodeId {
        let mut remap = HashMap::new();
        self.import_node(schema.graph(), schema.id(), &mut remap)
    }

    fn import_node(
        &mut self,
        graph: &SchemaGraph,
        id: NodeId,
        remap: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(&mapped) = remap.get(&id) {
            return mapped;
        }
        let node = graph.nodes[id].clone();
        let body = node.body.clone();
        let new_id = self.push(node);
        remap.insert(id, new_id);

        let body = match body {
            NodeBody::Primitive => NodeBody::Primitive,
            NodeBody::Array { value } => NodeBody::Array {
                value: self.import_node(graph, value, remap),
            },
            NodeBody::Map { key, value } => NodeBody::Map {
                key: self.import_node(graph, key, remap),
                value: self.import_node(graph, value, remap),
            },
            NodeBody::Struct { fields } => NodeBody::Struct {
                fields: fields
                    .into_iter()
                    .map(|(name, field)| (name, self.import_node(graph, field, remap)))
                    .collect(),
            },
            NodeBody::Proxy { target } => NodeBody::Proxy {
                target: self.import_node(graph, target, remap),
            },
        };
        self.nodes[new_id].body = body;
        new_id
    }

    /// Freeze the arena and hand out the schema rooted at `root`.
    pub fn build(self, root: NodeId) -> Schema {
        Schema::from_graph(Arc::new(SchemaGraph { nodes: self.nodes }), root)
    }
}

/// Fluent builder for non-recursive schemas.
///
/// ```ignore
/// let user = SchemaBuilder::struct_()
///     .name("com.example.User")
///     .field("id", SchemaBuilder::int32().build()?)
///     .field("name", SchemaBuilder::string().optional().build()?)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema_type: SchemaType,
    name: Option<String>,
    version: Option<i32>,
    doc: Option<String>,
    optional: bool,
    default: Option<Value>,
    parameters: Vec<(String, String)>,
    key: Option<Schema>,
    value: Option<Schema>,
    fields: Vec<(String, Schema)>,
}

impl SchemaBuilder {
    fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            name: None,
            version: None,
            doc: None,
            optional: false,
            default: None,
            parameters: Vec::new(),
            key: None,
            value: None,
            fields: Vec::new(),
        }
    }

    /// Builder for a type known only at runtime. Arrays and maps created this
    /// way have no children and fail at `build` time.
    pub fn primitive(schema_type: SchemaType) -> Self {
        Self::new(schema_type)
    }

    pub fn int8() -> Self {
        Self::new(SchemaType::Int8)
    }

    pub fn int16() -> Self {
        Self::new(SchemaType::Int16)
    }

    pub fn int32() -> Self {
        Self::new(SchemaType::Int32)
    }

    pub fn int64() -> Self {
        Self::new(SchemaType::Int64)
    }

    pub fn float32() -> Self {
        Self::new(SchemaType::Float32)
    }

    pub fn float64() -> Self {
        Self::new(SchemaType::Float64)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn bytes() -> Self {
        Self::new(SchemaType::Bytes)
    }

    pub fn struct_() -> Self {
        Self::new(SchemaType::Struct)
    }

    pub fn array(value: Schema) -> Self {
        let mut builder = Self::new(SchemaType::Array);
        builder.value = Some(value);
        builder
    }

    pub fn map(key: Schema, value: Schema) -> Self {
        let mut builder = Self::new(SchemaType::Map);
        builder.key = Some(key);
        builder.value = Some(value);
        builder
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.parameters.push((key, value)),
        }
        self
    }

    pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in parameters {
            self = self.parameter(key, value);
        }
        self
    }

    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    pub fn build(self) -> Result<Schema> {
        if !self.fields.is_empty() && self.schema_type != SchemaType::Struct {
            return Err(RecordError::NotAStruct(self.schema_type));
        }

        let mut graph = SchemaGraphBuilder::new();
        let id = match self.schema_type {
            SchemaType::Struct => {
                let id = graph.struct_();
                for (name, schema) in &self.fields {
                    let field = graph.import(schema);
                    graph.add_field(id, name.clone(), field)?;
                }
                id
            }
            SchemaType::Array => {
                let value = self.value.as_ref().ok_or_else(|| {
                    RecordError::InvalidDefinition("array schema needs an element schema".into())
                })?;
                let value = graph.import(value);
                graph.array(value)
            }
            SchemaType::Map => match (&self.key, &self.value) {
                (Some(key), Some(value)) => {
                    let key = graph.import(key);
                    let value = graph.import(value);
                    graph.map(key, value)
                }
                _ => {
                    return Err(RecordError::InvalidDefinition(
                        "map schema needs key and value schemas".into(),
                    ))
                }
            },
            primitive => graph.primitive(primitive)?,
        };

        if let Some(name) = self.name {
            graph.set_name(id, name);
        }
        if let Some(version) = self.version {
            graph.set_version(id, version);
        }
        if let Some(doc) = self.doc {
            graph.set_doc(id, doc);
        }
        if let Some(default) = self.default {
            graph.set_default(id, default);
        }
        graph.set_optional(id, self.optional);
        for (key, value) in self.parameters {
            graph.set_parameter(id, key, value);
        }
        Ok(graph.build(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_field_rejected() {
        let result = SchemaBuilder::struct_()
            .field("a", SchemaBuilder::int32().build().unwrap())
            .field("a", SchemaBuilder::string().build().unwrap())
            .build();
        assert!(matches!(result, Err(RecordError::DuplicateField(name)) if name == "a"));
    }

    #[test]
    fn test_fields_on_primitive_rejected() {
        let result = SchemaBuilder::int32()
            .field("a", SchemaBuilder::int32().build().unwrap())
            .build();
        assert!(matches!(result, Err(RecordError::NotAStruct(SchemaType::Int32))));
    }

    #[test]
    fn test_parameter_replaced_in_place() {
        let schema = SchemaBuilder::string()
            .parameter("a", "1")
            .parameter("b", "2")
            .parameter("a", "3")
            .build()
            .unwrap();
        assert_eq!(
            schema.parameters(),
            &[("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_import_keeps_cycles() {
        let mut graph = SchemaGraphBuilder::new();
        let tree = graph.struct_();
        graph.set_name(tree, "Tree");
        let child = graph.proxy(tree);
        let children = graph.array(child);
        graph.add_field(tree, "children", children).unwrap();
        let tree = graph.build(tree);

        let wrapper = SchemaBuilder::struct_()
            .field("root", tree.clone())
            .build()
            .unwrap();
        let root = wrapper.field("root").unwrap();
        assert_eq!(root.schema(), &tree);

        let element = root
            .schema()
            .field("children")
            .unwrap()
            .schema()
            .value_schema()
            .unwrap();
        assert!(element.same_definition(root.schema()));
    }

    #[test]
    fn test_proxy_settings_are_local() {
        let mut graph = SchemaGraphBuilder::new();
        let node = graph.struct_();
        let proxy = graph.proxy(node);
        graph.set_optional(proxy, true);
        graph.set_parameter(proxy, "k", "v");
        graph.set_name(proxy, "Named");
        let x = graph.primitive(SchemaType::Int32).unwrap();
        graph.add_field(proxy, "x", x).unwrap();

        let schema = graph.build(node);
        assert!(!schema.is_optional());
        assert!(schema.parameters().is_empty());
        assert_eq!(schema.name(), Some("Named"));
        assert_eq!(schema.fields().len(), 1);
    }
}
