//! Dependency files for the well-known message types.
//!
//! Timestamp and the wrappers ship with the `protobuf` crate. `google.type`
//! Date/TimeOfDay and `confluent.type.Decimal` do not, so their descriptors
//! are built once at runtime.

use crate::error::Result;
use crate::types::WellKnownType;
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use protobuf::reflect::FileDescriptor;
use std::sync::OnceLock;

/// Source of the files that are not bundled with the `protobuf` crate, keyed
/// by import path. Used to make them importable from user `.proto` files.
pub const BUNDLED_SOURCES: &[(&str, &str)] = &[
    (
        "confluent/type/decimal.proto",
        r#"syntax = "proto3";
package confluent.type;

message Decimal {
  bytes value = 1;
  uint32 precision = 2;
  int32 scale = 3;
}
"#,
    ),
    (
        "google/type/date.proto",
        r#"syntax = "proto3";
package google.type;

message Date {
  int32 year = 1;
  int32 month = 2;
  int32 day = 3;
}
"#,
    ),
    (
        "google/type/timeofday.proto",
        r#"syntax = "proto3";
package google.type;

message TimeOfDay {
  int32 hours = 1;
  int32 minutes = 2;
  int32 seconds = 3;
  int32 nanos = 4;
}
"#,
    ),
    (
        "confluent/meta.proto",
        r#"syntax = "proto3";
package confluent;

import "google/protobuf/descriptor.proto";

message Meta {
  string doc = 1;
  map<string, string> params = 2;
}

extend google.protobuf.FieldOptions {
  Meta field_meta = 1088;
}
"#,
    ),
];

static DECIMAL: OnceLock<FileDescriptor> = OnceLock::new();
static DATE: OnceLock<FileDescriptor> = OnceLock::new();
static TIME_OF_DAY: OnceLock<FileDescriptor> = OnceLock::new();

/// File descriptor defining `well_known`.
pub fn file_descriptor(well_known: WellKnownType) -> Result<FileDescriptor> {
    match well_known {
        WellKnownType::Timestamp => {
            Ok(protobuf::well_known_types::timestamp::file_descriptor().clone())
        }
        WellKnownType::Decimal => cached(&DECIMAL, || {
            single_message_file(
                well_known,
                "Decimal",
                &[
                    ("value", 1, Type::TYPE_BYTES),
                    ("precision", 2, Type::TYPE_UINT32),
                    ("scale", 3, Type::TYPE_INT32),
                ],
            )
        }),
        WellKnownType::Date => cached(&DATE, || {
            single_message_file(
                well_known,
                "Date",
                &[
                    ("year", 1, Type::TYPE_INT32),
                    ("month", 2, Type::TYPE_INT32),
                    ("day", 3, Type::TYPE_INT32),
                ],
            )
        }),
        WellKnownType::TimeOfDay => cached(&TIME_OF_DAY, || {
            single_message_file(
                well_known,
                "TimeOfDay",
                &[
                    ("hours", 1, Type::TYPE_INT32),
                    ("minutes", 2, Type::TYPE_INT32),
                    ("seconds", 3, Type::TYPE_INT32),
                    ("nanos", 4, Type::TYPE_INT32),
                ],
            )
        }),
        _ => Ok(protobuf::well_known_types::wrappers::file_descriptor().clone()),
    }
}

fn cached(
    lock: &'static OnceLock<FileDescriptor>,
    build: impl FnOnce() -> FileDescriptorProto,
) -> Result<FileDescriptor> {
    if let Some(file) = lock.get() {
        return Ok(file.clone());
    }
    let file = FileDescriptor::new_dynamic(build(), &[])?;
    Ok(lock.get_or_init(|| file).clone())
}

fn single_message_file(
    well_known: WellKnownType,
    message_name: &str,
    fields: &[(&str, i32, Type)],
) -> FileDescriptorProto {
    let (package, _) = crate::names::split_name(well_known.full_name());

    let mut message = DescriptorProto::new();
    message.set_name(message_name.to_string());
    for (name, number, wire) in fields {
        let mut field = FieldDescriptorProto::new();
        field.set_name(name.to_string());
        field.set_number(*number);
        field.set_label(Label::LABEL_OPTIONAL);
        field.set_type(*wire);
        message.field.push(field);
    }

    let mut file = FileDescriptorProto::new();
    file.set_name(well_known.location().to_string());
    if let Some(package) = package {
        file.set_package(package.to_string());
    }
    file.set_syntax("proto3".to_string());
    file.message_type.push(message);
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_built_files() {
        for (well_known, first_field) in [
            (WellKnownType::Decimal, "value"),
            (WellKnownType::Date, "year"),
            (WellKnownType::TimeOfDay, "hours"),
        ] {
            let file = file_descriptor(well_known).unwrap();
            assert_eq!(file.proto().name(), well_known.location());
            let message = file
                .message_by_full_name(&format!(".{}", well_known.full_name()))
                .unwrap();
            assert_eq!(message.fields().next().unwrap().name(), first_field);
        }
    }

    #[test]
    fn test_bundled_files() {
        let timestamp = file_descriptor(WellKnownType::Timestamp).unwrap();
        assert_eq!(timestamp.proto().name(), "google/protobuf/timestamp.proto");

        let wrappers = file_descriptor(WellKnownType::Int32Value).unwrap();
        assert!(wrappers
            .message_by_full_name(".google.protobuf.Int32Value")
            .is_some());
    }

    #[test]
    fn test_descriptor_is_built_once() {
        let a = file_descriptor(WellKnownType::Date).unwrap();
        let b = file_descriptor(WellKnownType::Date).unwrap();
        assert_eq!(a, b);
    }
}
