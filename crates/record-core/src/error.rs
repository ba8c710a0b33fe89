//! Error types for record-core.

use crate::types::SchemaType;
use thiserror::Error;

/// Errors raised while building schemas, values or schema definitions.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Schema of type {0} cannot have fields")]
    NotAStruct(SchemaType),

    #[error("Type {0} is not a primitive type")]
    NotPrimitive(SchemaType),

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid value for field {field}: expected {expected}, found {found}")]
    InvalidValue {
        field: String,
        expected: String,
        found: &'static str,
    },

    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for record-core operations.
pub type Result<T> = std::result::Result<T, RecordError>;
