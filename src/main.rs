//! Command-line interface for proto-bridge
//!
//! # Usage Examples
//!
//! ## Structured schema to protobuf
//! ```bash
//! # Print the generated file descriptor in protobuf text format
//! proto-bridge to-proto --schema user.yaml
//!
//! # Use wrapper messages for optional primitives
//! proto-bridge --wrapper-for-nullables true to-proto --schema user.yaml
//! ```
//!
//! ## Protobuf to structured schema
//! ```bash
//! # Print the structured schema of a message as YAML
//! proto-bridge from-proto --proto user.proto --message com.example.User
//! ```
//!
//! Converter settings may also come from a YAML or JSON file (`--config`);
//! flags and `PROTO_BRIDGE_*` environment variables override it.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use protobuf_types::{ConverterConfig, ProtobufConverter, WireSchema};
use record_core::SchemaDef;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "proto-bridge")]
#[command(about = "Convert between structured record schemas and protobuf descriptors")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    converter: ConverterOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Converter settings. Unset flags keep the value from `--config` or the default.
#[derive(Args, Debug, Default)]
struct ConverterOpts {
    /// Converter configuration file (YAML or JSON)
    #[arg(long, global = true, env = "PROTO_BRIDGE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capacity of each schema cache
    #[arg(long, global = true, env = "PROTO_BRIDGE_SCHEMAS_CACHE_SIZE")]
    schemas_cache_size: Option<usize>,

    /// Name structs by their fully-qualified message name
    #[arg(long, global = true, env = "PROTO_BRIDGE_ENHANCED_SCHEMA_SUPPORT")]
    enhanced_schema_support: Option<bool>,

    /// Rewrite names into valid protobuf identifiers
    #[arg(long, global = true, env = "PROTO_BRIDGE_SCRUB_INVALID_NAMES")]
    scrub_invalid_names: Option<bool>,

    /// Represent optional primitives with google.protobuf wrapper messages
    #[arg(long, global = true, env = "PROTO_BRIDGE_WRAPPER_FOR_NULLABLES")]
    wrapper_for_nullables: Option<bool>,
}

impl ConverterOpts {
    fn load(&self) -> anyhow::Result<ConverterConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&source)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => ConverterConfig::default(),
        };
        if let Some(size) = self.schemas_cache_size {
            config.schemas_cache_size = size;
        }
        if let Some(enabled) = self.enhanced_schema_support {
            config.enhanced_schema_support = enabled;
        }
        if let Some(enabled) = self.scrub_invalid_names {
            config.scrub_invalid_names = enabled;
        }
        if let Some(enabled) = self.wrapper_for_nullables {
            config.wrapper_for_nullables = enabled;
        }
        config.validate().context("Invalid converter configuration")?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a structured schema file into a protobuf file descriptor
    ToProto {
        /// Structured schema definition (YAML, or JSON with a .json extension)
        #[arg(long, value_name = "PATH")]
        schema: PathBuf,
    },

    /// Translate a protobuf message into a structured schema definition
    FromProto {
        /// The .proto file; imports resolve against its directory
        #[arg(long, value_name = "PATH")]
        proto: PathBuf,

        /// Message to translate, fully-qualified or relative to the package
        #[arg(long)]
        message: String,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.converter.load()?;
    debug!(?config, "loaded converter configuration");
    let converter = ProtobufConverter::new(config)?;

    let output = match cli.command {
        Commands::ToProto { schema } => to_proto(&converter, &schema)?,
        Commands::FromProto { proto, message } => from_proto(&converter, &proto, &message)?,
    };
    print!("{output}");
    Ok(())
}

fn to_proto(converter: &ProtobufConverter, schema_path: &Path) -> anyhow::Result<String> {
    let schema = SchemaDef::from_file(schema_path)
        .with_context(|| format!("Failed to load schema {}", schema_path.display()))?
        .to_schema()
        .context("Invalid schema definition")?;
    let wire = converter
        .from_record_schema(&schema)
        .context("Failed to translate schema to protobuf")?;
    info!(message = wire.name(), "translated schema");
    Ok(wire.to_text())
}

fn from_proto(
    converter: &ProtobufConverter,
    proto_path: &Path,
    message: &str,
) -> anyhow::Result<String> {
    let wire = WireSchema::from_proto_file(proto_path, message)
        .with_context(|| format!("Failed to load {}", proto_path.display()))?;
    let schema = converter
        .to_record_schema(&wire)
        .context("Failed to translate protobuf to schema")?;
    info!(message = wire.name(), "translated message");
    let definition = SchemaDef::from_schema(&schema).context("Failed to describe schema")?;
    Ok(definition.to_yaml_string()?)
}
