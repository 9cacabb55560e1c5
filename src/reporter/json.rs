//! JSON report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{ImportCounts, ImportIssue, ImportReport, OutputMode, TypeSummary};
use serde::Serialize;
use std::collections::BTreeMap;

/// JSON report generator.
pub struct JsonReporter {
    /// Whether to pretty-print the output
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            pretty: config.output.pretty,
        }
    }
}

impl ReportGenerator for JsonReporter {
    fn generate(&self, report: &ImportReport) -> Result<String> {
        let document = JsonReport::from(report);

        let json = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };

        json.map_err(|e| crate::err!(ReportGeneration {
            message: format!("Failed to serialize JSON report: {e}"),
        }))
    }
}

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Provider the run talked to
    pub provider: &'a str,
    /// Writer mode
    pub mode: OutputMode,
    /// Run outcome: "completed", "write_failed" or "cancelled"
    pub status: &'static str,
    /// Aggregate counters
    pub counts: &'a ImportCounts,
    /// Per-type discovery summaries
    pub types: &'a BTreeMap<String, TypeSummary>,
    /// Non-fatal problems keyed by resource type
    pub errors: &'a BTreeMap<String, Vec<ImportIssue>>,
    /// Why writing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<&'a str>,
}

impl<'a> From<&'a ImportReport> for JsonReport<'a> {
    fn from(report: &'a ImportReport) -> Self {
        let status = if report.cancelled {
            "cancelled"
        } else if report.write_error.is_some() {
            "write_failed"
        } else {
            "completed"
        };
        Self {
            metadata: ReportMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                issues: report.issue_count(),
            },
            provider: &report.provider,
            mode: report.mode,
            status,
            counts: &report.counts,
            types: &report.types,
            errors: &report.errors,
            write_error: report.write_error.as_deref(),
        }
    }
}

/// Report metadata.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    /// Terracarto version
    pub version: String,
    /// Report generation timestamp
    pub timestamp: String,
    /// Number of recorded problems
    pub issues: usize,
}
