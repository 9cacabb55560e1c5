//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `import`: Discover resources and generate HCL or Terraform state
//! - `graph`: Export the resolved resource graph
//! - `resources`: List the supported resource types
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Import every supported resource of a captured account
//! terracarto import --snapshot inventory.json
//!
//! # Import production instances and whatever they reference, as state
//! terracarto import --snapshot inventory.json --include aws_instance --tags env:prod --tf-state -o terraform.tfstate
//!
//! # One .tf file per category
//! terracarto import --snapshot inventory.json --layout by-category -o ./generated
//!
//! # Export the resource graph
//! terracarto graph --snapshot inventory.json --format mermaid
//!
//! # Initialize configuration
//! terracarto init
//! ```

use crate::types::{GraphFormat, HclLayout, OutputMode, ReportFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Terracarto - cloud resource discovery and Terraform code generation.
#[derive(Parser, Debug)]
#[command(
    name = "terracarto",
    author,
    version,
    about = "Generate Terraform HCL and state from existing cloud resources",
    long_about = "Terracarto discovers resources in a cloud account, filters them by type, \
                  tag or explicit target, pulls in whatever they reference, and writes a \
                  dependency-ordered Terraform configuration or state file."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TERRACARTO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover resources and generate Terraform HCL or state
    #[command(visible_alias = "i")]
    Import(ImportArgs),

    /// Export the resolved resource graph
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// List supported resource types
    Resources(ResourcesArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Discovery flags shared by `import` and `graph`.
#[derive(Args, Debug, Default)]
pub struct DiscoveryArgs {
    /// Account snapshot to replay (JSON or YAML)
    #[arg(long, value_name = "FILE", env = "TERRACARTO_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Resource types to import (repeatable)
    #[arg(short, long, value_name = "TYPE")]
    pub include: Vec<String>,

    /// Resource types to skip (repeatable)
    #[arg(short, long, value_name = "TYPE")]
    pub exclude: Vec<String>,

    /// Tag filters, all must match (repeatable)
    #[arg(short, long = "tags", value_name = "KEY:VALUE")]
    pub tags: Vec<String>,

    /// Import only these resources (repeatable)
    #[arg(long = "target", value_name = "TYPE.ID")]
    pub targets: Vec<String>,

    /// Maximum concurrent provider calls
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Do not fetch referenced resources that were filtered out
    #[arg(long)]
    pub no_follow_references: bool,

    /// Maximum number of dependency fetch rounds
    #[arg(long, value_name = "N")]
    pub max_dependency_depth: Option<usize>,

    /// Hide the discovery progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the import command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Discovery options
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Write Terraform state instead of HCL
    #[arg(long)]
    pub tf_state: bool,

    /// Output file or directory (stdout if not specified)
    #[arg(short, long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Render every reference as a literal value
    #[arg(long)]
    pub no_interpolate: bool,

    /// Interpolate references demoted to break cycles
    #[arg(long, conflicts_with = "no_interpolate")]
    pub interpolate_demoted: bool,

    /// Do not emit terraform/provider blocks
    #[arg(long)]
    pub no_provider_block: bool,

    /// HCL file layout
    #[arg(long, value_enum)]
    pub layout: Option<HclLayout>,

    /// Format of the run report (written to stderr)
    #[arg(short, long, default_value = "text", value_enum)]
    pub report: ReportFormat,
}

impl ImportArgs {
    /// Selected writer mode.
    #[must_use]
    pub fn mode(&self) -> OutputMode {
        if self.tf_state {
            OutputMode::State
        } else {
            OutputMode::Hcl
        }
    }
}

/// Arguments for the graph command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Discovery options
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Output format for the graph
    #[arg(short, long, default_value = "dot", value_enum)]
    pub format: GraphFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the resources command.
#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Only list types of this provider
    #[arg(short, long, value_name = "PROVIDER")]
    pub provider: Option<String>,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "terracarto.yaml")]
    pub file: PathBuf,
}
