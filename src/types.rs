//! Core data types used throughout Terracarto.
//!
//! This module defines the fundamental data structures for representing:
//! - Raw resources as returned by a provider adapter
//! - Node identities shared by the graph, resolver and writers
//! - Filter specifications
//! - Output modes, report formats and the import report

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Attribute map of a raw resource, exactly as the provider returned it.
pub type RawAttributes = serde_json::Map<String, serde_json::Value>;

/// Normalized attributes of a graph node, keyed by Terraform attribute name.
///
/// A `BTreeMap` keeps iteration order stable, which the writers rely on.
pub type NormalizedAttributes = BTreeMap<String, serde_json::Value>;

/// A provider-native cloud object, pre-normalization.
///
/// # Example
///
/// ```rust
/// use terracarto::types::RawResource;
/// use serde_json::json;
///
/// let vpc = RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1"}));
/// assert_eq!(vpc.provider_id, "vpc-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResource {
    /// Terraform resource type (e.g. "aws_instance")
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Identifier assigned by the cloud provider
    #[serde(rename = "id")]
    pub provider_id: String,

    /// Provider-native attributes
    #[serde(default)]
    pub attributes: RawAttributes,
}

impl RawResource {
    /// Create a raw resource from any JSON value.
    ///
    /// Non-object values produce an empty attribute map.
    #[must_use]
    pub fn new(
        resource_type: impl Into<String>,
        provider_id: impl Into<String>,
        attributes: serde_json::Value,
    ) -> Self {
        let attributes = match attributes {
            serde_json::Value::Object(map) => map,
            _ => RawAttributes::new(),
        };
        Self {
            resource_type: resource_type.into(),
            provider_id: provider_id.into(),
            attributes,
        }
    }

    /// The node ID this resource maps to.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        NodeId::new(&self.resource_type, &self.provider_id)
    }
}

/// Unique identifier of a resource: its type plus its provider ID.
///
/// Ordering is lexicographic on `(resource_type, provider_id)`, which is
/// the canonical processing order everywhere in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Terraform resource type
    pub resource_type: String,
    /// Provider-assigned identifier
    pub provider_id: String,
}

impl NodeId {
    /// Create a node ID.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            provider_id: provider_id.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.provider_id)
    }
}

/// Parses `type.id` target notation (the form used by `--target`).
impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((resource_type, id)) if !resource_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(resource_type, id))
            }
            _ => Err(format!("expected '<resource_type>.<id>', got '{s}'")),
        }
    }
}

/// A single tag filter: the resource must carry `key` with exactly `value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagFilter {
    /// Tag key
    pub key: String,
    /// Expected tag value
    pub value: String,
}

impl TagFilter {
    /// Create a tag filter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parses `key:value` or `key=value`.
impl FromStr for TagFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s.split_once(':').or_else(|| s.split_once('='));
        match split {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(Self::new(key.trim(), value.trim()))
            }
            _ => Err(format!("expected '<key>:<value>', got '{s}'")),
        }
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// Which resources a discovery pass should consider.
///
/// If `include` is non-empty only those types are considered; otherwise
/// every type except those in `exclude`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Resource types to include (empty = all)
    pub include: BTreeSet<String>,
    /// Resource types to exclude (ignored when `include` is non-empty)
    pub exclude: BTreeSet<String>,
    /// Tags every included resource must carry
    pub tag_filters: Vec<TagFilter>,
    /// Explicit resources to import (empty = no restriction)
    pub targets: BTreeSet<NodeId>,
}

/// Serialization mode of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// HCL resource blocks
    #[default]
    Hcl,
    /// Terraform state document
    State,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hcl => write!(f, "hcl"),
            Self::State => write!(f, "state"),
        }
    }
}

/// How HCL output is split into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HclLayout {
    /// Everything in one document
    #[default]
    Single,
    /// One `<category>.tf` file per resource category
    ByCategory,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Graph export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    /// Graphviz DOT format
    #[default]
    Dot,
    /// JSON format
    Json,
    /// Mermaid diagram format
    Mermaid,
}

/// Kind of problem recorded in an import report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A resource type could not be listed
    Discovery,
    /// A resource was skipped because its data was malformed
    Normalization,
    /// A dependency target could not be fetched
    Unresolved,
    /// The output could not be written
    Serialization,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::Normalization => write!(f, "normalization"),
            Self::Unresolved => write!(f, "unresolved"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// A single non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIssue {
    /// Problem category
    pub kind: IssueKind,
    /// Affected resource ID, if the problem concerns a single resource
    pub resource_id: Option<String>,
    /// Human readable description
    pub message: String,
}

/// Aggregate counters of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    /// Resources returned by discovery
    pub discovered: usize,
    /// Discovered resources rejected by the filter
    pub filtered_out: usize,
    /// Resources that passed the filter and were normalized
    pub included: usize,
    /// Resources added only to satisfy references
    pub dependency_fetched: usize,
    /// References that could not be resolved
    pub unresolved: usize,
    /// Edges demoted to break reference cycles
    pub demoted: usize,
    /// Resources skipped because of malformed data
    pub skipped: usize,
}

/// Per resource type discovery summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    /// Resources returned by `list`
    pub discovered: usize,
    /// Resources kept after filtering
    pub included: usize,
    /// Resources dropped by the filter
    pub filtered_out: usize,
    /// Whether listing this type failed
    pub failed: bool,
}

/// Result of an import run.
///
/// Non-fatal problems are aggregated in `errors`, keyed by resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// Provider the adapter talks to
    pub provider: String,
    /// Writer mode used for the run
    pub mode: OutputMode,
    /// Aggregate counters
    pub counts: ImportCounts,
    /// Per-type discovery summaries
    pub types: BTreeMap<String, TypeSummary>,
    /// Non-fatal problems keyed by resource type
    pub errors: BTreeMap<String, Vec<ImportIssue>>,
    /// Set when the write step failed
    pub write_error: Option<String>,
    /// Set when the run was cancelled before completion
    pub cancelled: bool,
}

impl ImportReport {
    /// Create an empty report.
    #[must_use]
    pub fn new(provider: impl Into<String>, mode: OutputMode) -> Self {
        Self {
            provider: provider.into(),
            mode,
            ..Self::default()
        }
    }

    /// Record a non-fatal problem.
    pub fn record(
        &mut self,
        resource_type: impl Into<String>,
        kind: IssueKind,
        resource_id: Option<String>,
        message: impl Into<String>,
    ) {
        self.errors
            .entry(resource_type.into())
            .or_default()
            .push(ImportIssue {
                kind,
                resource_id,
                message: message.into(),
            });
    }

    /// Total number of recorded problems.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Number of recorded problems of one kind.
    #[must_use]
    pub fn issues_of(&self, kind: IssueKind) -> usize {
        self.errors
            .values()
            .flatten()
            .filter(|issue| issue.kind == kind)
            .count()
    }

    /// Whether the run produced its output.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.write_error.is_none()
    }

    /// Exit code for a run that did not fail fatally.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            130
        } else if self.write_error.is_some() {
            3
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering() {
        let a = NodeId::new("aws_subnet", "subnet-2");
        let b = NodeId::new("aws_vpc", "vpc-1");
        let c = NodeId::new("aws_subnet", "subnet-1");
        let mut ids = vec![a.clone(), b.clone(), c.clone()];
        ids.sort();
        assert_eq!(ids, vec![c, a, b]);
    }

    #[test]
    fn test_node_id_from_target() {
        let id: NodeId = "aws_instance.i-123".parse().unwrap();
        assert_eq!(id, NodeId::new("aws_instance", "i-123"));
        assert!("aws_instance".parse::<NodeId>().is_err());
        assert!(".i-1".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_tag_filter_parse() {
        assert_eq!("env:prod".parse::<TagFilter>().unwrap(), TagFilter::new("env", "prod"));
        assert_eq!("team=x".parse::<TagFilter>().unwrap(), TagFilter::new("team", "x"));
        assert!("novalue".parse::<TagFilter>().is_err());
        assert!(":prod".parse::<TagFilter>().is_err());
    }

    #[test]
    fn test_raw_resource_non_object_attributes() {
        let raw = RawResource::new("aws_vpc", "vpc-1", serde_json::json!("oops"));
        assert!(raw.attributes.is_empty());
    }

    #[test]
    fn test_report_exit_code() {
        let mut report = ImportReport::new("aws", OutputMode::Hcl);
        report.record("aws_vpc", IssueKind::Unresolved, Some("vpc-1".to_string()), "access denied");
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.issue_count(), 1);
        assert_eq!(report.issues_of(IssueKind::Unresolved), 1);

        report.write_error = Some("boom".to_string());
        assert_eq!(report.exit_code(), 3);
        assert!(!report.is_complete());
    }
}
