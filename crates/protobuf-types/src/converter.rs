//! The converter facade: one configuration, two schema caches and one
//! anonymous-name counter.

use crate::cache::SchemaCaches;
use crate::config::ConverterConfig;
use crate::error::{ConversionError, Result};
use crate::forward::{to_wire_schema, to_wire_value};
use crate::names::DefaultNames;
use crate::reverse::{to_record_schema, to_record_value};
use crate::wire::WireSchema;
use protobuf::text_format::print_to_string;
use protobuf::MessageDyn;
use record_core::{Schema, SchemaType, Value};
use std::fmt;
use tracing::debug;

/// A structured schema with a value of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaAndValue {
    pub schema: Schema,
    pub value: Value,
}

/// A wire schema with a message of it. A null value has no message.
pub struct WireSchemaAndValue {
    pub schema: WireSchema,
    pub message: Option<Box<dyn MessageDyn>>,
}

impl WireSchemaAndValue {
    /// Binary encoding of the message, or nothing for a null value.
    pub fn to_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.message
            .as_ref()
            .map(|m| m.write_to_bytes_dyn().map_err(ConversionError::from))
            .transpose()
    }
}

impl fmt::Debug for WireSchemaAndValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireSchemaAndValue")
            .field("schema", &self.schema)
            .field(
                "message",
                &self.message.as_ref().map(|m| print_to_string(&**m)),
            )
            .finish()
    }
}

/// Translates schemas and values between the structured and wire models.
///
/// Translations are memoized per instance, so translating the same schema
/// twice yields equal results without repeating the work.
pub struct ProtobufConverter {
    config: ConverterConfig,
    caches: SchemaCaches,
    names: DefaultNames,
}

impl ProtobufConverter {
    pub fn new(config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: ConverterConfig) -> Self {
        Self {
            caches: SchemaCaches::new(config.schemas_cache_size),
            config,
            names: DefaultNames::new(),
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Structured schema → wire schema.
    pub fn from_record_schema(&self, schema: &Schema) -> Result<WireSchema> {
        if schema.schema_type() != SchemaType::Struct {
            return Err(ConversionError::UnsupportedRootType(schema.schema_type()));
        }
        if let Some(cached) = self.caches.wire_schema(schema) {
            debug!(schema = schema.name(), "wire schema cache hit");
            return Ok(cached);
        }
        debug!(schema = schema.name(), "wire schema cache miss");
        let wire = to_wire_schema(&self.config, &self.names, schema)?;
        self.caches.put_wire_schema(schema.clone(), wire.clone());
        Ok(wire)
    }

    /// Wire schema → structured schema.
    pub fn to_record_schema(&self, wire: &WireSchema) -> Result<Schema> {
        if let Some(cached) = self.caches.record_schema(wire) {
            debug!(message = wire.name(), "structured schema cache hit");
            return Ok(cached);
        }
        debug!(message = wire.name(), "structured schema cache miss");
        let schema = to_record_schema(&self.config, wire)?;
        self.caches.put_record_schema(wire.clone(), schema.clone());
        Ok(schema)
    }

    /// Convert a struct value of `schema` into a message of the matching
    /// wire schema.
    pub fn from_record_data(&self, schema: &Schema, value: &Value) -> Result<WireSchemaAndValue> {
        let wire = self.from_record_schema(schema)?;
        let message = to_wire_value(&self.config, &wire, schema, value)?;
        Ok(WireSchemaAndValue {
            schema: wire,
            message,
        })
    }

    /// Convert a message of `wire` into a struct value of the matching
    /// structured schema.
    pub fn to_record_data(&self, wire: &WireSchema, message: &dyn MessageDyn) -> Result<SchemaAndValue> {
        let expected = wire.descriptor();
        let actual = message.descriptor_dyn();
        if actual.full_name() != expected.full_name() {
            return Err(ConversionError::SchemaMismatch(format!(
                "message {} does not belong to wire schema {}",
                actual.full_name(),
                expected.full_name()
            )));
        }
        let schema = self.to_record_schema(wire)?;
        let value = to_record_value(&self.config, &schema, message)?;
        Ok(SchemaAndValue { schema, value })
    }

    /// Number of (forward, reverse) cache entries.
    pub fn cached_schemas(&self) -> (usize, usize) {
        self.caches.len()
    }
}

impl Default for ProtobufConverter {
    fn default() -> Self {
        let config = ConverterConfig::default();
        debug_assert!(config.validate().is_ok());
        Self::with_valid_config(config)
    }
}

impl fmt::Debug for ProtobufConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtobufConverter")
            .field("config", &self.config)
            .field("cached_schemas", &self.cached_schemas())
            .finish()
    }
}
