//! Loading wire schemas from `.proto` sources.
//!
//! Sources may import the decimal, date, time-of-day and field metadata files
//! by their usual paths; those are provided from [`BUNDLED_SOURCES`]. The
//! `google/protobuf/*` files come with the parser.

use crate::error::{ConversionError, Result};
use crate::well_known::BUNDLED_SOURCES;
use crate::wire::WireSchema;
use protobuf::reflect::FileDescriptor;
use protobuf_parse::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

const SOURCE_FILE_NAME: &str = "schema.proto";

impl WireSchema {
    /// Parse `.proto` text and root the result at `message`.
    ///
    /// `message` may be fully-qualified or relative to the file's package.
    pub fn from_proto_source(source: &str, message: &str) -> Result<Self> {
        let includes = bundled_include_dir()?;
        let input = includes.path().join(SOURCE_FILE_NAME);
        fs::write(&input, source)
            .map_err(|e| ConversionError::ProtoParse(format!("Failed to write temp file: {e}")))?;
        compile(&input, &[includes.path().to_path_buf()], message)
    }

    /// Parse a `.proto` file. Imports resolve against the file's directory.
    pub fn from_proto_file<P: AsRef<Path>>(path: P, message: &str) -> Result<Self> {
        let path = path.as_ref();
        let includes = bundled_include_dir()?;
        let mut include_paths = Vec::new();
        if let Some(parent) = path.parent() {
            include_paths.push(parent.to_path_buf());
        }
        include_paths.push(includes.path().to_path_buf());
        compile(path, &include_paths, message)
    }
}

fn bundled_include_dir() -> Result<TempDir> {
    let dir = TempDir::new()
        .map_err(|e| ConversionError::ProtoParse(format!("Failed to create temp dir: {e}")))?;
    for (location, source) in BUNDLED_SOURCES {
        let path = dir.path().join(location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConversionError::ProtoParse(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        fs::write(&path, source).map_err(|e| {
            ConversionError::ProtoParse(format!("Failed to write {}: {e}", path.display()))
        })?;
    }
    Ok(dir)
}

fn compile(input: &Path, include_paths: &[PathBuf], message: &str) -> Result<WireSchema> {
    let mut parser = Parser::new();
    parser.input(input);
    for include in include_paths {
        parser.include(include);
    }

    let parsed = parser
        .parse_and_typecheck()
        .map_err(|e| ConversionError::ProtoParse(e.to_string()))?;

    let input_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(SOURCE_FILE_NAME)
        .to_string();
    let files = FileDescriptor::new_dynamic_fds(parsed.file_descriptors, &[])?;
    debug!(files = files.len(), input = %input_name, "parsed proto source");

    let file = files
        .into_iter()
        .rev()
        .find(|f| f.proto().name() == input_name || f.proto().name().ends_with(&format!("/{input_name}")))
        .ok_or_else(|| ConversionError::ProtoParse(format!("{input_name} was not parsed")))?;
    WireSchema::new(file, message)
}
