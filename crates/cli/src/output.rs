//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use beaconcheck_common::MatchResult;
use beaconcheck_e2e::RunSummary;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for MatchResult {
    fn headers() -> Vec<&'static str> {
        vec!["Row", "Field", "Expected", "Actual", "Status", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.row.to_string(),
            self.field_name.clone(),
            self.expected_value.clone(),
            self.actual_value.clone(),
            self.status.to_string(),
            self.reason.as_ref().map(|r| r.to_string()).unwrap_or_default(),
        ]
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No cases were run.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// One-line tally of a run
pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{}: {} passed, {} failed, {} skipped in {:.1}s ({})",
        summary.suite,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.duration_ms as f64 / 1000.0,
        summary.source
    )
}

/// Print the outcome of a suite run
pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(summary).unwrap_or_default());
        }
        OutputFormat::Table | OutputFormat::Plain => {
            print_list(&summary.results, format);
            println!();
            if summary.success() {
                print_success(&summary_line(summary));
            } else {
                print_failure(&summary_line(summary));
            }
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print failed-run message
pub fn print_failure(message: &str) {
    println!("{} {}", "✗".red(), message.bold());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconcheck_common::{FailureReason, SuiteName, TestCase};

    fn summary() -> RunSummary {
        let ok = TestCase::new(0, "https://a.test/", "pageName", "Home");
        let bad = TestCase::new(2, "https://a.test/", "c3", "foo");
        RunSummary {
            suite: SuiteName::Plain,
            source: "csv:fixtures/expectations.csv".to_string(),
            total: 2,
            passed: 1,
            failed: 1,
            skipped: 1,
            duration_ms: 12_500,
            results: vec![
                MatchResult::pass(&ok, "home".into(), 1),
                MatchResult::fail(&bad, "bar".into(), 1, FailureReason::Mismatch),
            ],
        }
    }

    #[test]
    fn test_result_row() {
        let summary = summary();
        let row = summary.results[1].row();
        assert_eq!(row.len(), MatchResult::headers().len());
        assert_eq!(row[0], "2");
        assert_eq!(row[3], "bar");
        assert_eq!(row[4], "Fail");
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            summary_line(&summary()),
            "plain: 1 passed, 1 failed, 1 skipped in 12.5s (csv:fixtures/expectations.csv)"
        );
    }
}
