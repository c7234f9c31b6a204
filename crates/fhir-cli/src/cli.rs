//! CLI argument definitions for the FHIR adapter tooling.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use fhir_model::{FhirResourceType, FhirVersion, SystemCodeValue, TransformDirection};

use fhir_cli::report::parse_resource_type;

#[derive(Parser)]
#[command(
    name = "fhir-adapter",
    version,
    about = "Inspect FHIR to DHIS2 rule metadata",
    long_about = "Inspect FHIR to DHIS2 rule metadata snapshots.\n\n\
                  Lists the rules that apply to a resource, resolves the argument\n\
                  values of executable scripts and verifies snapshot invariants."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Include argument and resource values in logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,

    /// Adapter configuration file (TOML).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the rules that apply to a resource, in evaluation order.
    Rules(RulesArgs),

    /// Resolve the argument values of an executable script.
    Args(ArgsArgs),

    /// Verify the invariants of a metadata snapshot.
    Check(CheckArgs),
}

#[derive(Parser)]
pub struct RulesArgs {
    /// Metadata snapshot (JSON).
    #[arg(long = "metadata", value_name = "FILE")]
    pub metadata: PathBuf,

    /// FHIR resource type, e.g. Observation.
    #[arg(long = "resource-type", value_parser = parse_resource_type)]
    pub resource_type: FhirResourceType,

    #[arg(long = "direction", default_value = "IMPORT")]
    pub direction: TransformDirection,

    /// Coded value of the resource as `system|code`. Repeatable.
    #[arg(long = "code", value_name = "SYSTEM|CODE")]
    pub codes: Vec<SystemCodeValue>,

    /// The resource is contained in another resource.
    #[arg(long = "contained")]
    pub contained: bool,
}

#[derive(Parser)]
pub struct ArgsArgs {
    /// Metadata snapshot (JSON).
    #[arg(long = "metadata", value_name = "FILE")]
    pub metadata: PathBuf,

    /// Id or code of the executable script.
    #[arg(long = "executable-script", value_name = "ID_OR_CODE")]
    pub executable_script: String,

    /// FHIR version (overrides the configuration file).
    #[arg(long = "fhir-version")]
    pub fhir_version: Option<FhirVersion>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Metadata snapshot (JSON).
    #[arg(long = "metadata", value_name = "FILE")]
    pub metadata: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
