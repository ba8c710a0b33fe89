//! Structured schema graph.
//!
//! Schemas live in an arena ([`SchemaGraph`]) and reference each other by
//! index, which lets a struct contain a field of its own type without
//! infinite expansion. A [`Schema`] is a cheap handle: the shared arena plus
//! the id of one node in it.
//!
//! ## Proxy nodes
//!
//! A proxy node forwards the type, name, version, doc, default and children of
//! its target, but keeps its own `optional` flag and parameters. Recursive
//! references are always expressed through proxies, so a field pointing back
//! at its enclosing struct can carry field-level annotations (tags, widths)
//! without touching the struct definition itself.

use crate::types::SchemaType;
use crate::values::Value;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a node inside a schema arena.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeBody {
    Primitive,
    Array { value: NodeId },
    Map { key: NodeId, value: NodeId },
    Struct { fields: Vec<(String, NodeId)> },
    Proxy { target: NodeId },
}

#[derive(Debug, Clone)]
pub(crate) struct SchemaNode {
    pub(crate) schema_type: SchemaType,
    pub(crate) name: Option<String>,
    pub(crate) version: Option<i32>,
    pub(crate) doc: Option<String>,
    pub(crate) optional: bool,
    pub(crate) default: Option<Value>,
    pub(crate) parameters: Vec<(String, String)>,
    pub(crate) body: NodeBody,
}

impl SchemaNode {
    pub(crate) fn new(schema_type: SchemaType, body: NodeBody) -> Self {
        Self {
            schema_type,
            name: None,
            version: None,
            doc: None,
            optional: false,
            default: None,
            parameters: Vec::new(),
            body,
        }
    }
}

/// Arena holding every node reachable from a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaGraph {
    pub(crate) nodes: Vec<SchemaNode>,
}

impl SchemaGraph {
    /// Follow proxies until a concrete node is reached.
    ///
    /// Proxies are created against resolved targets, so this takes at most
    /// one hop; the loop only guards against hand-built arenas.
    pub(crate) fn resolve(&self, mut id: NodeId) -> NodeId {
        while let NodeBody::Proxy { target } = self.nodes[id].body {
            id = target;
        }
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Handle to one node of a shared schema arena.
#[derive(Clone)]
pub struct Schema {
    graph: Arc<SchemaGraph>,
    id: NodeId,
}

/// A named field of a struct schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    index: usize,
    schema: Schema,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the field in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Schema {
    pub(crate) fn from_graph(graph: Arc<SchemaGraph>, id: NodeId) -> Self {
        Self { graph, id }
    }

    pub(crate) fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    fn node(&self) -> &SchemaNode {
        &self.graph.nodes[self.id]
    }

    fn target(&self) -> &SchemaNode {
        &self.graph.nodes[self.graph.resolve(self.id)]
    }

    fn at(&self, id: NodeId) -> Schema {
        Schema {
            graph: Arc::clone(&self.graph),
            id,
        }
    }

    pub fn schema_type(&self) -> SchemaType {
        self.target().schema_type
    }

    /// Dotted name; also the marker of logical types.
    pub fn name(&self) -> Option<&str> {
        self.target().name.as_deref()
    }

    pub fn version(&self) -> Option<i32> {
        self.target().version
    }

    pub fn doc(&self) -> Option<&str> {
        self.target().doc.as_deref()
    }

    pub fn is_optional(&self) -> bool {
        self.node().optional
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.target().default.as_ref()
    }

    /// Ordered parameters of this node (not forwarded through proxies).
    pub fn parameters(&self) -> &[(String, String)] {
        &self.node().parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Fields in declaration order; empty for anything but a struct.
    pub fn fields(&self) -> Vec<Field> {
        match &self.target().body {
            NodeBody::Struct { fields } => fields
                .iter()
                .enumerate()
                .map(|(index, (name, id))| Field {
                    name: name.clone(),
                    index,
                    schema: self.at(*id),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        match &self.target().body {
            NodeBody::Struct { fields } => fields
                .iter()
                .enumerate()
                .find(|(_, (field_name, _))| field_name == name)
                .map(|(index, (field_name, id))| Field {
                    name: field_name.clone(),
                    index,
                    schema: self.at(*id),
                }),
            _ => None,
        }
    }

    pub(crate) fn field_count(&self) -> usize {
        match &self.target().body {
            NodeBody::Struct { fields } => fields.len(),
            _ => 0,
        }
    }

    pub fn key_schema(&self) -> Option<Schema> {
        match self.target().body {
            NodeBody::Map { key, .. } => Some(self.at(key)),
            _ => None,
        }
    }

    /// Element schema of an array, value schema of a map.
    pub fn value_schema(&self) -> Option<Schema> {
        match self.target().body {
            NodeBody::Array { value } | NodeBody::Map { value, .. } => Some(self.at(value)),
            _ => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.node().body, NodeBody::Proxy { .. })
    }

    /// Whether both handles point at the very same node of the same arena.
    pub fn ptr_eq(a: &Schema, b: &Schema) -> bool {
        Arc::ptr_eq(&a.graph, &b.graph) && a.id == b.id
    }

    /// Whether both handles resolve to the same definition, looking through
    /// proxies.
    pub fn same_definition(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
            && self.graph.resolve(self.id) == other.graph.resolve(other.id)
    }
}

/// Parameters compare as a map: keys are unique, order is not significant.
fn sorted_parameters(parameters: &[(String, String)]) -> Vec<&(String, String)> {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort();
    sorted
}

fn equal_nodes(
    left: &SchemaGraph,
    a: NodeId,
    right: &SchemaGraph,
    b: NodeId,
    assumed: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    if std::ptr::eq(left, right) && a == b {
        return true;
    }
    let (outer_a, outer_b) = (&left.nodes[a], &right.nodes[b]);
    if outer_a.optional != outer_b.optional
        || sorted_parameters(&outer_a.parameters) != sorted_parameters(&outer_b.parameters)
    {
        return false;
    }

    let (ra, rb) = (left.resolve(a), right.resolve(b));
    // Coinduction: a pair already under comparison is equal unless proven otherwise.
    if !assumed.insert((ra, rb)) {
        return true;
    }

    let (na, nb) = (&left.nodes[ra], &right.nodes[rb]);
    if na.schema_type != nb.schema_type
        || na.name != nb.name
        || na.version != nb.version
        || na.doc != nb.doc
        || na.default != nb.default
    {
        return false;
    }

    match (&na.body, &nb.body) {
        (NodeBody::Primitive, NodeBody::Primitive) => true,
        (NodeBody::Array { value: va }, NodeBody::Array { value: vb }) => {
            equal_nodes(left, *va, right, *vb, assumed)
        }
        (
            NodeBody::Map {
                key: ka,
                value: va,
            },
            NodeBody::Map {
                key: kb,
                value: vb,
            },
        ) => {
            equal_nodes(left, *ka, right, *kb, assumed)
                && equal_nodes(left, *va, right, *vb, assumed)
        }
        (NodeBody::Struct { fields: fa }, NodeBody::Struct { fields: fb }) => {
            fa.len() == fb.len()
                && fa.iter().zip(fb.iter()).all(|((name_a, ia), (name_b, ib))| {
                    name_a == name_b && equal_nodes(left, *ia, right, *ib, assumed)
                })
        }
        _ => false,
    }
}

/// Structural equality; recursive schemas compare equal when they unfold to
/// the same infinite tree.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        let mut assumed = HashSet::new();
        equal_nodes(&self.graph, self.id, &other.graph, other.id, &mut assumed)
    }
}

impl Eq for Schema {}

/// Shallow hash over the attributes that `PartialEq` compares first.
impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let node = self.node();
        let target = self.target();
        target.schema_type.hash(state);
        target.name.hash(state);
        target.version.hash(state);
        node.optional.hash(state);
        sorted_parameters(&node.parameters).hash(state);
        if let NodeBody::Struct { fields } = &target.body {
            for (name, _) in fields {
                name.hash(state);
            }
        }
    }
}

fn write_node(
    f: &mut fmt::Formatter<'_>,
    graph: &SchemaGraph,
    id: NodeId,
    path: &mut HashSet<NodeId>,
) -> fmt::Result {
    let outer = &graph.nodes[id];
    let resolved = graph.resolve(id);
    let node = &graph.nodes[resolved];
    write!(f, "{}", node.schema_type)?;
    if let Some(name) = &node.name {
        write!(f, "<{name}>")?;
    }
    if outer.optional {
        f.write_str("?")?;
    }
    if !path.insert(resolved) {
        return f.write_str(" {..}");
    }
    let result = match &node.body {
        NodeBody::Array { value } => {
            f.write_str("[")?;
            write_node(f, graph, *value, path)?;
            f.write_str("]")
        }
        NodeBody::Map { key, value } => {
            f.write_str("{")?;
            write_node(f, graph, *key, path)?;
            f.write_str(": ")?;
            write_node(f, graph, *value, path)?;
            f.write_str("}")
        }
        NodeBody::Struct { fields } => {
            f.write_str(" {")?;
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, " {name}: ")?;
                write_node(f, graph, *field, path)?;
            }
            f.write_str(" }")
        }
        NodeBody::Primitive | NodeBody::Proxy { .. } => Ok(()),
    };
    path.remove(&resolved);
    result
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = HashSet::new();
        write_node(f, &self.graph, self.id, &mut path)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{SchemaBuilder, SchemaGraphBuilder};
    use crate::types::SchemaType;
    use crate::Schema;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(schema: &Schema) -> u64 {
        let mut hasher = DefaultHasher::new();
        schema.hash(&mut hasher);
        hasher.finish()
    }

    fn linked_list(tag_next: &str) -> Schema {
        let mut graph = SchemaGraphBuilder::new();
        let node = graph.struct_();
        graph.set_name(node, "LinkedList");
        let value = graph.primitive(SchemaType::Int32).unwrap();
        graph.add_field(node, "value", value).unwrap();
        let next = graph.proxy(node);
        graph.set_optional(next, true);
        graph.set_parameter(next, "tag", tag_next);
        graph.add_field(node, "next", next).unwrap();
        graph.build(node)
    }

    #[test]
    fn test_accessors() {
        let schema = SchemaBuilder::struct_()
            .name("com.example.User")
            .field("id", SchemaBuilder::int32().build().unwrap())
            .field("name", SchemaBuilder::string().optional().build().unwrap())
            .build()
            .unwrap();

        assert_eq!(schema.schema_type(), SchemaType::Struct);
        assert_eq!(schema.name(), Some("com.example.User"));
        let fields = schema.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name(), "name");
        assert_eq!(fields[1].index(), 1);
        assert!(fields[1].schema().is_optional());
        assert!(schema.field("missing").is_none());
        assert!(schema.key_schema().is_none());
    }

    #[test]
    fn test_structural_equality_across_arenas() {
        let a = SchemaBuilder::map(
            SchemaBuilder::string().build().unwrap(),
            SchemaBuilder::int64().build().unwrap(),
        )
        .build()
        .unwrap();
        let b = SchemaBuilder::map(
            SchemaBuilder::string().build().unwrap(),
            SchemaBuilder::int64().build().unwrap(),
        )
        .build()
        .unwrap();
        let c = SchemaBuilder::map(
            SchemaBuilder::string().build().unwrap(),
            SchemaBuilder::int32().build().unwrap(),
        )
        .build()
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        assert!(!Schema::ptr_eq(&a, &b));
    }

    #[test]
    fn test_recursive_schema_equality_terminates() {
        let a = linked_list("2");
        let b = linked_list("2");
        let c = linked_list("3");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_parameter_order_is_not_significant() {
        let a = SchemaBuilder::int64()
            .parameter("a", "1")
            .parameter("b", "2")
            .build()
            .unwrap();
        let b = SchemaBuilder::int64()
            .parameter("b", "2")
            .parameter("a", "1")
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.parameters()[0].0, "a");
    }

    #[test]
    fn test_proxy_forwards_definition() {
        let schema = linked_list("2");
        let next = schema.field("next").unwrap();
        let next = next.schema();

        assert!(next.is_proxy());
        assert!(next.is_optional());
        assert!(!schema.is_optional());
        assert_eq!(next.name(), Some("LinkedList"));
        assert_eq!(next.parameter("tag"), Some("2"));
        assert!(schema.parameter("tag").is_none());
        assert_eq!(next.fields().len(), 2);
        assert!(next.same_definition(&schema));
    }

    #[test]
    fn test_debug_stops_at_cycles() {
        let schema = linked_list("2");
        let rendered = format!("{schema:?}");
        assert_eq!(
            rendered,
            "struct<LinkedList> { value: int32, next: struct<LinkedList>? {..} }"
        );
    }
}
