//! Logical types.
//!
//! A logical type is a primitive schema carrying a well-known name. The names
//! and parameters follow the Kafka Connect conventions so that schemas
//! exchanged with other tools keep their meaning.

use crate::builder::SchemaBuilder;
use crate::schema::Schema;

pub const DECIMAL_LOGICAL_NAME: &str = "org.apache.kafka.connect.data.Decimal";
pub const DATE_LOGICAL_NAME: &str = "org.apache.kafka.connect.data.Date";
pub const TIME_LOGICAL_NAME: &str = "org.apache.kafka.connect.data.Time";
pub const TIMESTAMP_LOGICAL_NAME: &str = "org.apache.kafka.connect.data.Timestamp";

/// Parameter holding the scale of a decimal schema.
pub const DECIMAL_SCALE_PARAMETER: &str = "scale";

/// Optional parameter holding the precision of a decimal schema.
pub const DECIMAL_PRECISION_PARAMETER: &str = "connect.decimal.precision";

/// Bytes schema for decimals with a fixed scale.
pub fn decimal(scale: u32) -> SchemaBuilder {
    SchemaBuilder::bytes()
        .name(DECIMAL_LOGICAL_NAME)
        .parameter(DECIMAL_SCALE_PARAMETER, scale.to_string())
        .version(1)
}

/// Days since the epoch, carried as a UTC date-time at midnight.
pub fn date() -> SchemaBuilder {
    SchemaBuilder::int32().name(DATE_LOGICAL_NAME).version(1)
}

/// Time of day, carried as a UTC date-time on 1970-01-01.
pub fn time() -> SchemaBuilder {
    SchemaBuilder::int32().name(TIME_LOGICAL_NAME).version(1)
}

pub fn timestamp() -> SchemaBuilder {
    SchemaBuilder::int64().name(TIMESTAMP_LOGICAL_NAME).version(1)
}

/// Which logical type, if any, a schema represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    Decimal,
    Date,
    Time,
    Timestamp,
}

impl LogicalType {
    pub fn of(schema: &Schema) -> Option<Self> {
        match schema.name()? {
            DECIMAL_LOGICAL_NAME => Some(LogicalType::Decimal),
            DATE_LOGICAL_NAME => Some(LogicalType::Date),
            TIME_LOGICAL_NAME => Some(LogicalType::Time),
            TIMESTAMP_LOGICAL_NAME => Some(LogicalType::Timestamp),
            _ => None,
        }
    }
}
