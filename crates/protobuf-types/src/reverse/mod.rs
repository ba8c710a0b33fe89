//! Wire → structured direction.

pub mod schema;
pub mod value;

pub use schema::to_record_schema;
pub use value::to_record_value;
