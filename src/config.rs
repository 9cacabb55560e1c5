//! Configuration module for Terracarto.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`terracarto.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # terracarto.yaml
//!
//! # Where resources come from
//! provider:
//!   kind: snapshot
//!   snapshot: ${TERRACARTO_SNAPSHOT}  # Environment variable expansion
//!
//! # Discovery and closure options
//! import:
//!   concurrency: 8
//!   follow_references: true
//!   max_dependency_depth: 10
//!   include: [aws_instance]
//!   exclude: []
//!   tags: ["env:prod"]
//!   targets: []
//!
//! # HCL rendering
//! hcl:
//!   interpolate: true
//!   interpolate_demoted: false
//!   emit_provider_block: true
//!   layout: single
//!
//! # Terraform state rendering
//! state:
//!   terraform_version: "1.5.7"
//!
//! # Output options
//! output:
//!   colored: true
//!   pretty: true
//!   progress: true
//! ```

use crate::error::{Result, ResultExt, TerracartoError};
use crate::types::{FilterSpec, HclLayout, NodeId, TagFilter};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Provider adapter implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Replay a captured account inventory
    #[default]
    Snapshot,
}

/// Provider adapter selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Adapter implementation
    pub kind: ProviderKind,

    /// Snapshot file for the snapshot adapter (JSON or YAML)
    pub snapshot: Option<PathBuf>,
}

/// Discovery and closure options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Maximum concurrent adapter calls.
    pub concurrency: usize,

    /// Fetch resources referenced by imported ones.
    pub follow_references: bool,

    /// Maximum number of dependency fetch rounds.
    pub max_dependency_depth: usize,

    /// Resource types to include (empty = all).
    pub include: Vec<String>,

    /// Resource types to exclude.
    pub exclude: Vec<String>,

    /// Tag filters, as `key:value`.
    pub tags: Vec<String>,

    /// Explicit resources, as `type.id`.
    pub targets: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            follow_references: true,
            max_dependency_depth: 10,
            include: Vec::new(),
            exclude: Vec::new(),
            tags: Vec::new(),
            targets: Vec::new(),
        }
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    pub colored: bool,

    /// Verbose output mode.
    pub verbose: bool,

    /// Pretty-print JSON output.
    pub pretty: bool,

    /// Show a progress bar during discovery.
    pub progress: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            colored: true,
            verbose: false,
            pretty: true,
            progress: true,
        }
    }
}

/// HCL rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HclOptions {
    /// Render resolved references as traversals.
    pub interpolate: bool,

    /// Also render references demoted by cycle breaking as traversals.
    pub interpolate_demoted: bool,

    /// Emit `terraform { required_providers }` and provider blocks.
    pub emit_provider_block: bool,

    /// File layout.
    pub layout: HclLayout,
}

impl Default for HclOptions {
    fn default() -> Self {
        Self {
            interpolate: true,
            interpolate_demoted: false,
            emit_provider_block: true,
            layout: HclLayout::Single,
        }
    }
}

/// Terraform state rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateOptions {
    /// Value of the `terraform_version` field.
    pub terraform_version: String,

    /// Fixed lineage; derived from the resource set when unset.
    pub lineage: Option<String>,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            terraform_version: "1.5.7".to_string(),
            lineage: None,
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider adapter selection
    pub provider: ProviderOptions,

    /// Discovery and closure options
    pub import: ImportOptions,

    /// Output options
    pub output: OutputOptions,

    /// HCL rendering options
    pub hcl: HclOptions,

    /// State rendering options
    pub state: StateOptions,
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .to_config_parse_error("invalid configuration YAML".to_string())?;

        tracing::debug!(
            provider = ?config.provider.kind,
            concurrency = config.import.concurrency,
            include = config.import.include.len(),
            exclude = config.import.exclude.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Check values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns a [`TerracartoError::ConfigValue`] for a bad value, or
    /// [`TerracartoError::Multiple`] when several are wrong.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.import.concurrency == 0 {
            errors.push(crate::err!(ConfigValue {
                key: "import.concurrency".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if let Err(error) = self.filter_spec() {
            errors.push(error);
        }
        TerracartoError::collect(errors)
    }

    /// Filter specification built from the `import` section.
    ///
    /// # Errors
    ///
    /// Returns a [`TerracartoError::ConfigValue`] for a malformed tag filter
    /// or target.
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        let tag_filters = self
            .import
            .tags
            .iter()
            .map(|tag| {
                tag.parse::<TagFilter>().map_err(|message| {
                    crate::err!(ConfigValue {
                        key: "import.tags".to_string(),
                        message,
                    })
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let targets = self
            .import
            .targets
            .iter()
            .map(|target| {
                target.parse::<NodeId>().map_err(|message| {
                    crate::err!(ConfigValue {
                        key: "import.targets".to_string(),
                        message,
                    })
                })
            })
            .collect::<Result<_>>()?;

        Ok(FilterSpec {
            include: self.import.include.iter().cloned().collect(),
            exclude: self.import.exclude.iter().cloned().collect(),
            tag_filters,
            targets,
        })
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# Terracarto Configuration File

# Provider adapter
provider:
  # Only "snapshot" ships with terracarto: it replays an inventory captured
  # to JSON or YAML.
  kind: snapshot

  # Inventory file (can use environment variables)
  # snapshot: ${TERRACARTO_SNAPSHOT}

# Discovery and closure options
import:
  # Maximum concurrent provider calls
  concurrency: 8

  # Fetch resources referenced by imported ones, even if filtered out
  follow_references: true

  # Maximum number of dependency fetch rounds
  max_dependency_depth: 10

  # Resource types to import (empty = every type of the provider)
  # include:
  #   - aws_instance
  #   - aws_security_group

  # Resource types to skip (ignored when include is set)
  # exclude:
  #   - aws_iam_role

  # Tag filters, all must match
  # tags:
  #   - "env:prod"

  # Explicit resources to import
  # targets:
  #   - aws_instance.i-0abc123

# HCL output
hcl:
  # Render references as type.name.attribute traversals
  interpolate: true

  # Also interpolate references that were demoted to break a cycle
  interpolate_demoted: false

  # Emit terraform { required_providers } and provider blocks
  emit_provider_block: true

  # "single" or "by_category" (one file per category)
  layout: single

# Terraform state output
state:
  terraform_version: "1.5.7"
  # lineage: 00000000-0000-0000-0000-000000000000

# Output options
output:
  # Use colored output in terminal
  colored: true

  # Enable verbose output
  verbose: false

  # Pretty-print JSON output
  pretty: true

  # Show a progress bar during discovery
  progress: true
"#
        .to_string()
    }

    /// Merge discovery flags into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::DiscoveryArgs) {
        if let Some(snapshot) = &args.snapshot {
            self.provider.kind = ProviderKind::Snapshot;
            self.provider.snapshot = Some(snapshot.clone());
        }
        if !args.include.is_empty() {
            self.import.include = args.include.clone();
        }
        if !args.exclude.is_empty() {
            self.import.exclude.extend(args.exclude.iter().cloned());
        }
        self.import.tags.extend(args.tags.iter().cloned());
        self.import.targets.extend(args.targets.iter().cloned());
        if let Some(concurrency) = args.concurrency {
            self.import.concurrency = concurrency;
        }
        if args.no_follow_references {
            self.import.follow_references = false;
        }
        if let Some(depth) = args.max_dependency_depth {
            self.import.max_dependency_depth = depth;
        }
        if args.no_progress {
            self.output.progress = false;
        }
    }

    /// Merge `import` command flags into the configuration.
    pub fn merge_import_args(&mut self, args: &crate::cli::ImportArgs) {
        self.merge_cli_args(&args.discovery);
        if args.no_interpolate {
            self.hcl.interpolate = false;
        }
        if args.interpolate_demoted {
            self.hcl.interpolate_demoted = true;
        }
        if args.no_provider_block {
            self.hcl.emit_provider_block = false;
        }
        if let Some(layout) = args.layout {
            self.hcl.layout = layout;
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unset variables are left as is.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .to_config_parse_error("invalid environment variable pattern".to_string())?;

    Ok(re
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned())
}
