//! Converter configuration.

use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};

/// Default capacity of each schema cache.
pub const DEFAULT_SCHEMAS_CACHE_SIZE: usize = 1000;

/// Settings shared by every translation made through one converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Capacity of the forward and of the reverse schema cache.
    pub schemas_cache_size: usize,

    /// Name reverse-translated structs by their fully-qualified message name
    /// instead of the short one.
    pub enhanced_schema_support: bool,

    /// Rewrite struct and field names into valid protobuf identifiers.
    pub scrub_invalid_names: bool,

    /// Represent optional primitives as `google.protobuf.*Value` wrappers so
    /// that null and the zero value stay distinguishable.
    pub wrapper_for_nullables: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            schemas_cache_size: DEFAULT_SCHEMAS_CACHE_SIZE,
            enhanced_schema_support: false,
            scrub_invalid_names: false,
            wrapper_for_nullables: false,
        }
    }
}

impl ConverterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas_cache_size(mut self, size: usize) -> Self {
        self.schemas_cache_size = size;
        self
    }

    pub fn with_enhanced_schema_support(mut self, enabled: bool) -> Self {
        self.enhanced_schema_support = enabled;
        self
    }

    pub fn with_scrub_invalid_names(mut self, enabled: bool) -> Self {
        self.scrub_invalid_names = enabled;
        self
    }

    pub fn with_wrapper_for_nullables(mut self, enabled: bool) -> Self {
        self.wrapper_for_nullables = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.schemas_cache_size == 0 {
            return Err(ConversionError::InvalidConfig(
                "schemas_cache_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
