//! Name and scope utilities.

use crate::types::{DEFAULT_SCHEMA_NAME, MAP_ENTRY_SUFFIX};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::atomic::{AtomicU64, Ordering};

/// Characters left alone by form-urlencoding, besides alphanumerics.
const FORM_URLENCODED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

/// Split a dotted name into its namespace and its last component.
pub fn split_name(full_name: &str) -> (Option<&str>, &str) {
    match full_name.rfind('.') {
        Some(index) => (Some(&full_name[..index]), &full_name[index + 1..]),
        None => (None, full_name),
    }
}

/// Text after the last dot.
pub fn unqualified(name: &str) -> &str {
    split_name(name).1
}

/// Make an arbitrary string a valid protobuf identifier.
///
/// The name is form-urlencoded first, so distinct inputs rarely collide, then
/// prefixed with `x` unless it starts with a letter, and finally every
/// character outside `[A-Za-z0-9_]` becomes `_`.
pub fn scrub_name(name: &str) -> String {
    let encoded = name
        .split(' ')
        .map(|part| utf8_percent_encode(part, FORM_URLENCODED).to_string())
        .collect::<Vec<_>>()
        .join("+");

    let prefixed = if encoded.starts_with(|c: char| c.is_ascii_alphabetic()) {
        encoded
    } else {
        format!("x{encoded}")
    };

    prefixed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Message name of the synthesized entry type for a map.
pub fn to_map_entry(name: &str) -> String {
    let mut entry = String::with_capacity(name.len() + MAP_ENTRY_SUFFIX.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            entry.extend(c.to_uppercase());
            upper_next = false;
        } else {
            entry.push(c);
        }
    }
    entry.push_str(MAP_ENTRY_SUFFIX);
    entry
}

/// Inverse of [`to_map_entry`]: `MyMapEntry` becomes `my_map`. Names without
/// the entry suffix are returned unchanged.
pub fn to_map_field(entry_name: &str) -> String {
    let Some(stem) = entry_name.strip_suffix(MAP_ENTRY_SUFFIX) else {
        return entry_name.to_string();
    };
    let mut field = String::with_capacity(stem.len() + 4);
    for (i, c) in stem.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                field.push('_');
            }
            field.push(c.to_ascii_lowercase());
        } else {
            field.push(c);
        }
    }
    field
}

/// Generator of `ConnectDefault<N>` names for anonymous schemas.
///
/// Each converter owns one, so names are unique per converter instance only.
#[derive(Debug, Default)]
pub struct DefaultNames {
    counter: AtomicU64,
}

impl DefaultNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&self) -> String {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{DEFAULT_SCHEMA_NAME}{index}")
    }

    /// The given name, or a fresh default one when it is absent or empty.
    pub fn name_or_default(&self, name: Option<&str>) -> String {
        match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.next_name(),
        }
    }

    pub fn unqualified_name(&self, name: Option<&str>) -> String {
        unqualified(&self.name_or_default(name)).to_string()
    }
}
