//! Output formatting for dispatch reports and configuration
//!
//! Reports and configuration can be printed as JSON, YAML or human-readable
//! text. Machine formats carry the full report; the human format summarizes.
//!
//! # Example
//!
//! ```
//! use outdial::cli::output::{OutputFormat, OutputFormatter};
//! use outdial::dispatch::DispatchReport;
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_report(&DispatchReport::default()).unwrap();
//! assert!(output.contains("\"dispatched\""));
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::config::OutdialConfig;
use crate::dispatch::DispatchReport;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Formatter for command results
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a dispatch report
    pub fn format_report(&self, report: &DispatchReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize report to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    /// Formats the effective configuration
    pub fn format_config(&self, config: &OutdialConfig) -> Result<String> {
        let map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&map).context("Failed to serialize config to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(&map).context("Failed to serialize config to YAML")
            }
            OutputFormat::Human => Ok(config.to_string()),
        }
    }

    fn format_report_human(&self, report: &DispatchReport) -> String {
        let mut output = String::new();

        if report.is_clean() {
            output.push_str("\u{2713} All calls completed\n");
        } else {
            output.push_str("\u{26A0} Calls completed with problems\n");
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Dispatched:   {}\n", report.dispatched.len()));
        output.push_str(&format!("Completed:    {}\n", report.completed.len()));
        output.push_str(&format!("Timed out:    {}\n", report.timed_out.len()));
        output.push_str(&format!("Rejected:     {}\n", report.rejected.len()));
        output.push_str(&format!("Peak active:  {}\n", report.peak_active));

        if !report.dispatched.is_empty() {
            output.push_str("\nCalls:\n");
            for (i, call) in report.dispatched.iter().enumerate() {
                let connector = if i + 1 == report.dispatched.len() {
                    "\u{2514}\u{2500}"
                } else {
                    "\u{251C}\u{2500}"
                };
                let status = if report.timed_out.contains(&call.call_id) {
                    "timed out".to_string()
                } else if let Some(ref error) = call.error {
                    format!("failed: {}", error)
                } else {
                    "ok".to_string()
                };
                output.push_str(&format!(
                    "{} #{:<6} {}  {}\n",
                    connector, call.call_id, call.target, status
                ));
            }
        }

        if !report.rejected.is_empty() {
            output.push_str("\n\u{26A0} Rejected numbers:\n");
            for rejected in &report.rejected {
                output.push_str(&format!("  - {}: {}\n", rejected.input, rejected.reason));
            }
        }

        output
    }
}
