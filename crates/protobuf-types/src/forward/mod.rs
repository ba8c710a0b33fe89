//! Structured → wire direction.

pub mod schema;
pub mod value;

pub use schema::to_wire_schema;
pub use value::to_wire_value;
