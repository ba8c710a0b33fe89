//! Structured record model shared by proto-bridge.
//!
//! This crate defines the schema graph and value types that the protobuf
//! converter maps to and from descriptors:
//!
//! - [`Schema`] - handle to a node of a (possibly recursive) schema graph
//! - [`SchemaBuilder`] / [`SchemaGraphBuilder`] - construction
//! - [`Value`] / [`Struct`] - values conforming to a schema
//! - [`logical`] - decimal, date, time and timestamp conventions
//! - [`SchemaDef`] - YAML/JSON definitions of schemas
//!
//! # Example
//!
//! ```ignore
//! use record_core::{SchemaBuilder, Struct};
//!
//! let user = SchemaBuilder::struct_()
//!     .name("com.example.User")
//!     .field("id", SchemaBuilder::int32().build()?)
//!     .build()?;
//! let value = Struct::new(&user)?.with("id", 42)?;
//! ```

pub mod builder;
pub mod definition;
pub mod error;
pub mod logical;
pub mod schema;
pub mod types;
pub mod values;

// Re-export main types for convenient access
pub use builder::{SchemaBuilder, SchemaGraphBuilder};
pub use definition::{FieldDef, SchemaDef};
pub use error::{RecordError, Result};
pub use logical::LogicalType;
pub use schema::{Field, NodeId, Schema, SchemaGraph};
pub use types::SchemaType;
pub use values::{Struct, Value};
