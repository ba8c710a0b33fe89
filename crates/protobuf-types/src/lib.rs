//! Protobuf descriptor conversion for structured records.
//!
//! This crate translates [`record_core::Schema`] graphs into protobuf
//! descriptors and back, and converts values between
//! [`record_core::Value`] and dynamic protobuf messages:
//!
//! - [`ProtobufConverter`] - cached entry point for both directions
//! - [`WireSchema`] - a compiled file descriptor rooted at one message
//! - [`forward`] / [`reverse`] - the uncached translators
//! - [`types`] - type mapping rules and parameter keys
//! - [`names`] - name scrubbing and default names
//!
//! # Example
//!
//! ```ignore
//! use protobuf_types::{ConverterConfig, ProtobufConverter};
//!
//! let converter = ProtobufConverter::new(ConverterConfig::default())?;
//! let wire = converter.from_record_schema(&schema)?;
//! println!("{}", wire.to_text());
//! let back = converter.to_record_schema(&wire)?;
//! ```

mod cache;
pub mod config;
pub mod converter;
pub mod decimal;
pub mod error;
pub mod forward;
pub mod meta;
pub mod names;
pub mod proto_source;
pub mod reverse;
pub mod types;
pub mod well_known;
pub mod wire;

// Re-export main types for convenient access
pub use config::ConverterConfig;
pub use converter::{ProtobufConverter, SchemaAndValue, WireSchemaAndValue};
pub use error::{ConversionError, Result};
pub use forward::{to_wire_schema, to_wire_value};
pub use meta::FieldMeta;
pub use names::DefaultNames;
pub use reverse::{to_record_schema, to_record_value};
pub use wire::WireSchema;
