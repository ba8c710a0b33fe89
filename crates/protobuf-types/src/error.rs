//! Error types for protobuf-types crate.

use record_core::{RecordError, SchemaType};
use thiserror::Error;

/// Errors that can occur while translating schemas or values.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Unsupported root schema of type {0}")]
    UnsupportedRootType(SchemaType),

    #[error("Unsupported schema type: {0}")]
    UnsupportedSchemaType(String),

    #[error("Invalid type for {expected}: {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid date/time value: {0}")]
    InvalidDateTimeValue(String),

    #[error("Descriptor validation failed: {0}")]
    DescriptorValidation(String),

    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Invalid converter configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse proto source: {0}")]
    ProtoParse(String),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl ConversionError {
    pub(crate) fn type_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        ConversionError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl From<protobuf::Error> for ConversionError {
    fn from(e: protobuf::Error) -> Self {
        ConversionError::DescriptorValidation(e.to_string())
    }
}

/// Result type alias for protobuf-types operations.
pub type Result<T> = std::result::Result<T, ConversionError>;
