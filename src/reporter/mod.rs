//! Run report rendering.
//!
//! This module renders an [`ImportReport`] in two formats:
//! - JSON: Machine-readable structured output
//! - Text: Human-readable CLI output
//!
//! # Example
//!
//! ```rust
//! use terracarto::reporter::Reporter;
//! use terracarto::types::{ImportReport, OutputMode, ReportFormat};
//! use terracarto::Config;
//!
//! let reporter = Reporter::new(&Config::default());
//! let report = ImportReport::new("aws", OutputMode::Hcl);
//! let json = reporter.generate(&report, ReportFormat::Json).unwrap();
//! assert!(json.contains("\"provider\": \"aws\""));
//! ```

mod json;
mod text;

use crate::config::Config;
use crate::error::Result;
use crate::types::{ImportReport, ReportFormat};

pub use json::JsonReporter;
pub use text::TextReporter;

/// Report generator that supports multiple output formats.
pub struct Reporter {
    config: Config,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate(&self, report: &ImportReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => JsonReporter::new(&self.config).generate(report),
            ReportFormat::Text => TextReporter::new(&self.config).generate(report),
        }
    }
}

/// Trait for report generators.
pub trait ReportGenerator {
    /// Render an import report.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, report: &ImportReport) -> Result<String>;
}
