//! Wire schema: a compiled protobuf file rooted at one message.

use crate::error::{ConversionError, Result};
use crate::names::split_name;
use protobuf::descriptor::field_descriptor_proto::Type;
use protobuf::descriptor::{DescriptorProto, EnumDescriptorProto, FileDescriptorProto};
use protobuf::reflect::{FileDescriptor, MessageDescriptor};
use protobuf::{Message, MessageDyn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const MAX_FIELD_NUMBER: i32 = 536_870_911;
const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<i32> = 19_000..=19_999;

/// A compiled protobuf file together with the message that represents the
/// record, and an optional schema version.
///
/// Two wire schemas are equal when their file descriptors serialize to the
/// same bytes and they name the same root message and version.
#[derive(Clone)]
pub struct WireSchema {
    file: FileDescriptor,
    root: MessageDescriptor,
    version: Option<i32>,
    serialized: Arc<[u8]>,
}

impl WireSchema {
    /// Wrap `file`, rooted at the message named `root_name`. The name is
    /// either fully-qualified or relative to the file's package.
    pub fn new(file: FileDescriptor, root_name: &str) -> Result<Self> {
        let full = root_name.strip_prefix('.').unwrap_or(root_name);
        let root = file
            .message_by_full_name(&format!(".{full}"))
            .or_else(|| file.message_by_package_relative_name(full))
            .ok_or_else(|| ConversionError::MessageNotFound(root_name.to_string()))?;
        let serialized = file.proto().write_to_bytes()?;
        Ok(Self {
            file,
            root,
            version: None,
            serialized: serialized.into(),
        })
    }

    pub fn from_descriptor(descriptor: &MessageDescriptor) -> Result<Self> {
        Self::new(descriptor.file_descriptor().clone(), descriptor.full_name())
    }

    /// Validate `proto` and compile it against its dependencies.
    pub fn compile(
        proto: FileDescriptorProto,
        dependencies: &[FileDescriptor],
        root_name: &str,
    ) -> Result<Self> {
        validate(&proto, dependencies)?;
        let file = FileDescriptor::new_dynamic(proto, dependencies)?;
        Self::new(file, root_name)
    }

    pub fn with_version(mut self, version: Option<i32>) -> Self {
        self.version = version;
        self
    }

    /// Fully-qualified name of the root message.
    pub fn name(&self) -> &str {
        self.root.full_name()
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.root
    }

    pub fn file_descriptor(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn file_proto(&self) -> &FileDescriptorProto {
        self.file.proto()
    }

    /// Empty instance of the root message.
    pub fn new_message(&self) -> Box<dyn MessageDyn> {
        self.root.new_instance()
    }

    /// The file descriptor in protobuf text format.
    pub fn to_text(&self) -> String {
        protobuf::text_format::print_to_string_pretty(self.file.proto())
    }
}

impl PartialEq for WireSchema {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.root.full_name() == other.root.full_name()
            && self.serialized == other.serialized
    }
}

impl Eq for WireSchema {}

impl Hash for WireSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.full_name().hash(state);
        self.version.hash(state);
        self.serialized.hash(state);
    }
}

impl fmt::Debug for WireSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireSchema")
            .field("file", &self.file.proto().name())
            .field("root", &self.root.full_name())
            .field("version", &self.version)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionKind {
    Message,
    Enum,
}

/// Structural checks the descriptor builder either skips or reports by
/// panicking: field numbers, name clashes inside a scope, and type references
/// that resolve to nothing.
pub fn validate(proto: &FileDescriptorProto, dependencies: &[FileDescriptor]) -> Result<()> {
    let mut known = HashMap::new();
    for dependency in dependencies {
        collect_file(dependency.proto(), &mut known);
    }
    collect_file(proto, &mut known);

    let package = package_prefix(proto);
    check_scope_names(
        &package,
        proto.message_type.iter().map(|m| m.name()),
        proto.enum_type.iter().map(|e| e.name()),
        std::iter::empty(),
    )?;
    for message in &proto.message_type {
        validate_message(&format!("{package}.{}", message.name()), message, &known)?;
    }
    for definition in &proto.enum_type {
        validate_enum(&format!("{package}.{}", definition.name()), definition)?;
    }
    Ok(())
}

fn package_prefix(proto: &FileDescriptorProto) -> String {
    match proto.package() {
        "" => String::new(),
        package => format!(".{package}"),
    }
}

fn collect_file(proto: &FileDescriptorProto, known: &mut HashMap<String, DefinitionKind>) {
    let package = package_prefix(proto);
    for message in &proto.message_type {
        collect_message(&package, message, known);
    }
    for definition in &proto.enum_type {
        known.insert(format!("{package}.{}", definition.name()), DefinitionKind::Enum);
    }
}

fn collect_message(
    scope: &str,
    message: &DescriptorProto,
    known: &mut HashMap<String, DefinitionKind>,
) {
    let full = format!("{scope}.{}", message.name());
    for nested in &message.nested_type {
        collect_message(&full, nested, known);
    }
    for definition in &message.enum_type {
        known.insert(format!("{full}.{}", definition.name()), DefinitionKind::Enum);
    }
    known.insert(full, DefinitionKind::Message);
}

fn check_scope_names<'a>(
    scope: &str,
    messages: impl Iterator<Item = &'a str>,
    enums: impl Iterator<Item = &'a str>,
    members: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in messages.chain(enums).chain(members) {
        if name.is_empty() {
            return Err(ConversionError::DescriptorValidation(format!(
                "empty name in {scope}"
            )));
        }
        if !seen.insert(name) {
            return Err(ConversionError::DescriptorValidation(format!(
                "\"{name}\" is already defined in {}",
                if scope.is_empty() { "file scope" } else { &scope[1..] }
            )));
        }
    }
    Ok(())
}

fn validate_message(
    full_name: &str,
    message: &DescriptorProto,
    known: &HashMap<String, DefinitionKind>,
) -> Result<()> {
    check_scope_names(
        full_name,
        message.nested_type.iter().map(|m| m.name()),
        message.enum_type.iter().map(|e| e.name()),
        message
            .field
            .iter()
            .map(|f| f.name())
            .chain(message.oneof_decl.iter().map(|o| o.name())),
    )?;

    let mut numbers = HashSet::new();
    for field in &message.field {
        let number = field.number();
        if number < 1 || number > MAX_FIELD_NUMBER || RESERVED_FIELD_NUMBERS.contains(&number) {
            return Err(ConversionError::DescriptorValidation(format!(
                "field {}.{} has invalid number {number}",
                &full_name[1..],
                field.name()
            )));
        }
        if !numbers.insert(number) {
            return Err(ConversionError::DescriptorValidation(format!(
                "field number {number} is used twice in {}",
                &full_name[1..]
            )));
        }
        if field.has_oneof_index() {
            let index = field.oneof_index();
            if index < 0 || index as usize >= message.oneof_decl.len() {
                return Err(ConversionError::DescriptorValidation(format!(
                    "field {}.{} references missing oneof {index}",
                    &full_name[1..],
                    field.name()
                )));
            }
        }

        let expected = match field.type_() {
            Type::TYPE_MESSAGE | Type::TYPE_GROUP => Some(DefinitionKind::Message),
            Type::TYPE_ENUM => Some(DefinitionKind::Enum),
            _ => None,
        };
        if let Some(expected) = expected {
            if known.get(field.type_name()) != Some(&expected) {
                return Err(ConversionError::DescriptorValidation(format!(
                    "field {}.{} references unknown type {}",
                    &full_name[1..],
                    field.name(),
                    field.type_name()
                )));
            }
        }
    }

    for nested in &message.nested_type {
        validate_message(&format!("{full_name}.{}", nested.name()), nested, known)?;
    }
    for definition in &message.enum_type {
        validate_enum(&format!("{full_name}.{}", definition.name()), definition)?;
    }
    Ok(())
}

fn validate_enum(full_name: &str, definition: &EnumDescriptorProto) -> Result<()> {
    if definition.value.is_empty() {
        return Err(ConversionError::DescriptorValidation(format!(
            "enum {} has no values",
            &full_name[1..]
        )));
    }
    let mut names = HashSet::new();
    for value in &definition.value {
        if !names.insert(value.name()) {
            return Err(ConversionError::DescriptorValidation(format!(
                "enum value {} is defined twice in {}",
                value.name(),
                &full_name[1..]
            )));
        }
    }
    Ok(())
}

/// Name of the generated file for a root message: its local name plus
/// `.proto`.
pub(crate) fn file_name_for(root_full_name: &str) -> String {
    format!("{}.proto", split_name(root_full_name).1)
}
