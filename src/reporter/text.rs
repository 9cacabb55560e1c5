//! Plain text report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{ImportIssue, ImportReport, IssueKind, TypeSummary};
use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::fmt::Write as _;

/// Text report generator for CLI output.
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            use_colors: config.output.colored,
            verbose: config.output.verbose,
        }
    }
}

impl ReportGenerator for TextReporter {
    fn generate(&self, report: &ImportReport) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header(report));
        output.push('\n');

        output.push_str(&self.format_summary(report));
        output.push('\n');

        let types = self.format_types(report);
        if !types.is_empty() {
            output.push_str(&types);
            output.push('\n');
        }

        if !report.errors.is_empty() {
            output.push_str(&self.format_issues(report));
            output.push('\n');
        }

        output.push_str(&self.format_footer(report));

        Ok(output)
    }
}

impl TextReporter {
    fn section(&self, title: &str) -> String {
        let title = if self.use_colors {
            title.bright_cyan().bold().to_string()
        } else {
            title.to_string()
        };
        format!("\n{title}\n{}\n", "-".repeat(80))
    }

    fn format_header(&self, report: &ImportReport) -> String {
        let title = format!("Terracarto Import ({} -> {})", report.provider, report.mode);
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        if self.use_colors {
            format!(
                "\n{} {} {}\n{}\n",
                title.bright_white().bold(),
                version.dimmed(),
                format!("({timestamp})").dimmed(),
                "=".repeat(80).bright_blue(),
            )
        } else {
            format!("\n{title} {version} ({timestamp})\n{}\n", "=".repeat(80))
        }
    }

    fn format_summary(&self, report: &ImportReport) -> String {
        let mut output = self.section("Summary");
        let counts = &report.counts;

        let paint = |value: usize, warn: bool| {
            if !self.use_colors {
                value.to_string()
            } else if warn && value > 0 {
                value.to_string().yellow().bold().to_string()
            } else {
                value.to_string().bold().to_string()
            }
        };

        let _ = writeln!(
            output,
            "  {} discovered | {} filtered out | {} imported | {} dependencies",
            paint(counts.discovered, false),
            paint(counts.filtered_out, false),
            paint(counts.included, false),
            paint(counts.dependency_fetched, false),
        );
        let _ = writeln!(
            output,
            "  {} unresolved | {} cycle edges demoted | {} skipped",
            paint(counts.unresolved, true),
            paint(counts.demoted, true),
            paint(counts.skipped, true),
        );
        output
    }

    /// Per-type table. Without `verbose`, only types with activity or
    /// failures are listed.
    fn format_types(&self, report: &ImportReport) -> String {
        let rows: Vec<(&String, &TypeSummary)> = report
            .types
            .iter()
            .filter(|(_, summary)| self.verbose || summary.failed || summary.discovered > 0)
            .collect();
        if rows.is_empty() {
            return String::new();
        }

        let mut output = self.section("Resource types");
        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Type", "Discovered", "Imported", "Filtered out", "Status"]);

        for (resource_type, summary) in rows {
            let status = if summary.failed {
                self.colored_cell("FAILED", Color::Red)
            } else {
                self.colored_cell("ok", Color::Green)
            };
            table.add_row(vec![
                Cell::new(resource_type),
                Cell::new(summary.discovered),
                Cell::new(summary.included),
                Cell::new(summary.filtered_out),
                status,
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn colored_cell(&self, text: &str, color: Color) -> Cell {
        if self.use_colors {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    fn format_issues(&self, report: &ImportReport) -> String {
        let mut output = self.section("Issues");
        for (resource_type, issues) in &report.errors {
            let heading = if self.use_colors {
                resource_type.bold().to_string()
            } else {
                resource_type.clone()
            };
            let _ = writeln!(output, "\n  {heading}");
            for issue in issues {
                output.push_str(&self.format_issue(issue));
            }
        }
        output
    }

    fn format_issue(&self, issue: &ImportIssue) -> String {
        let label = issue.kind.to_string().to_uppercase();
        let label = if !self.use_colors {
            label
        } else {
            match issue.kind {
                IssueKind::Discovery | IssueKind::Serialization => label.red().to_string(),
                IssueKind::Unresolved | IssueKind::Normalization => label.yellow().to_string(),
            }
        };
        match &issue.resource_id {
            Some(id) => format!("    [{label}] {id}: {}\n", issue.message),
            None => format!("    [{label}] {}\n", issue.message),
        }
    }

    fn format_footer(&self, report: &ImportReport) -> String {
        let issues = report.issue_count();
        let status = if report.cancelled {
            let text = "CANCELLED - nothing written";
            if self.use_colors {
                text.red().bold().to_string()
            } else {
                text.to_string()
            }
        } else if let Some(error) = &report.write_error {
            let text = format!("FAILED - output not written: {error}");
            if self.use_colors {
                text.red().bold().to_string()
            } else {
                text
            }
        } else if issues > 0 {
            let text = format!("COMPLETED with {issues} issue{}", if issues == 1 { "" } else { "s" });
            if self.use_colors {
                text.yellow().to_string()
            } else {
                text
            }
        } else {
            "COMPLETED - no issues".to_string()
        };

        format!("\n{status}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputMode;

    fn plain_config() -> Config {
        let mut config = Config::default();
        config.output.colored = false;
        config
    }

    fn create_test_report() -> ImportReport {
        let mut report = ImportReport::new("aws", OutputMode::Hcl);
        report.counts.discovered = 4;
        report.counts.included = 3;
        report.types.insert(
            "aws_vpc".to_string(),
            TypeSummary {
                discovered: 4,
                included: 3,
                filtered_out: 1,
                failed: false,
            },
        );
        report.types.insert(
            "aws_iam_role".to_string(),
            TypeSummary {
                failed: true,
                ..TypeSummary::default()
            },
        );
        report.types.insert("aws_eip".to_string(), TypeSummary::default());
        report.record("aws_iam_role", IssueKind::Discovery, None, "throttled");
        report.record("aws_vpc", IssueKind::Unresolved, Some("vpc-9".to_string()), "not found");
        report
    }

    #[test]
    fn test_text_report_generation() {
        let text = TextReporter::new(&plain_config())
            .generate(&create_test_report())
            .unwrap();

        assert!(text.contains("Terracarto Import (aws -> hcl)"));
        assert!(text.contains("Summary"));
        assert!(text.contains("4 discovered"));
        assert!(text.contains("[DISCOVERY] throttled"));
        assert!(text.contains("[UNRESOLVED] vpc-9: not found"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("COMPLETED with 2 issues"));
        // Idle types are only listed in verbose mode.
        assert!(!text.contains("aws_eip"));
    }

    #[test]
    fn test_verbose_lists_every_type() {
        let mut config = plain_config();
        config.output.verbose = true;
        let text = TextReporter::new(&config).generate(&create_test_report()).unwrap();
        assert!(text.contains("aws_eip"));
    }

    #[test]
    fn test_cancelled_footer() {
        let mut report = ImportReport::new("aws", OutputMode::State);
        report.cancelled = true;
        let text = TextReporter::new(&plain_config()).generate(&report).unwrap();
        assert!(text.contains("CANCELLED - nothing written"));
    }
}
