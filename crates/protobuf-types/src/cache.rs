//! Bounded memoization of both schema translation directions.
//!
//! Entries are immutable once inserted. Forward entries are keyed by the
//! structured schema (structural equality), reverse entries by the root
//! message name together with the compiled wire schema.

use crate::wire::WireSchema;
use quick_cache::sync::Cache;
use record_core::Schema;

pub(crate) struct SchemaCaches {
    forward: Cache<Schema, WireSchema>,
    reverse: Cache<(String, WireSchema), Schema>,
}

impl SchemaCaches {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            forward: Cache::new(capacity),
            reverse: Cache::new(capacity),
        }
    }

    pub(crate) fn wire_schema(&self, schema: &Schema) -> Option<WireSchema> {
        self.forward.get(schema)
    }

    pub(crate) fn put_wire_schema(&self, schema: Schema, wire: WireSchema) {
        self.forward.insert(schema, wire);
    }

    pub(crate) fn record_schema(&self, wire: &WireSchema) -> Option<Schema> {
        self.reverse.get(&reverse_key(wire))
    }

    pub(crate) fn put_record_schema(&self, wire: WireSchema, schema: Schema) {
        self.reverse.insert(reverse_key(&wire), schema);
    }

    pub(crate) fn len(&self) -> (usize, usize) {
        (self.forward.len(), self.reverse.len())
    }
}

fn reverse_key(wire: &WireSchema) -> (String, WireSchema) {
    (wire.name().to_string(), wire.clone())
}
