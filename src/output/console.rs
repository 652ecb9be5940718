//! Colored console summary of a report

use super::Report;
use crate::models::Verdict;
use colored::*;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Renders the console summary printed after every command
pub struct ConsoleFormatter {
    enable_color: bool,
    color_scheme: ColorScheme,
}

impl ConsoleFormatter {
    pub fn new(enable_color: bool) -> Self {
        Self {
            enable_color,
            color_scheme: ColorScheme::default(),
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn verdict_color(&self, verdict: Verdict) -> Color {
        match verdict {
            Verdict::Pass => self.color_scheme.success,
            Verdict::Warn => self.color_scheme.warning,
            Verdict::Fail => self.color_scheme.error,
        }
    }

    pub fn format_header(&self, title: &str) -> String {
        let border = "═".repeat(title.chars().count() + 4);
        format!(
            "{}\n  {}\n{}",
            self.colorize(&border, self.color_scheme.border),
            self.bold(title).color(self.color_scheme.header),
            self.colorize(&border, self.color_scheme.border)
        )
    }

    pub fn format_verdict(&self, verdict: Verdict) -> String {
        let badge = format!("[ {} ]", verdict);
        if self.enable_color {
            badge.bold().color(self.verdict_color(verdict)).to_string()
        } else {
            badge
        }
    }

    /// Full summary: header, verdict, key figures, checks and error counts
    pub fn render<R: Report>(&self, report: &R) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "{}", self.format_header(&report.title()));
        let _ = writeln!(output, "Verdict: {}", self.format_verdict(report.verdict()));
        let _ = writeln!(output);

        let summary = report.summary_lines();
        if !summary.is_empty() {
            let width = summary.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in summary {
                let _ = writeln!(
                    output,
                    "  {:<width$}  {}",
                    key,
                    self.colorize(&value, self.color_scheme.info),
                    width = width
                );
            }
            let _ = writeln!(output);
        }

        let checks = report.checks();
        if !checks.is_empty() {
            let _ = writeln!(output, "{}", self.bold("Threshold checks"));
            let width = checks.iter().map(|c| c.name.len()).max().unwrap_or(0);
            for check in checks {
                let mark = if check.passed {
                    self.colorize("PASS", self.color_scheme.success)
                } else if check.level == crate::models::CheckLevel::Advisory {
                    self.colorize("WARN", self.color_scheme.warning)
                } else {
                    self.colorize("FAIL", self.color_scheme.error)
                };
                let _ = writeln!(
                    output,
                    "  {} {:<width$}  {:>12.3} {} {:<12.3}",
                    mark,
                    check.name,
                    check.actual,
                    check.comparison.symbol(),
                    check.limit,
                    width = width
                );
            }
            let _ = writeln!(output);
        }

        if let Some(errors) = report.errors() {
            if !errors.is_empty() {
                let _ = writeln!(
                    output,
                    "{} {}",
                    self.bold("Errors:"),
                    self.colorize(&errors.total().to_string(), self.color_scheme.error)
                );
                for (category, count) in errors.counts() {
                    let _ = writeln!(output, "  {:<14} {}", category.as_str(), count);
                }
                let _ = writeln!(output);
            }
        }

        output
    }

    pub fn format_written_files(&self, paths: &[PathBuf]) -> String {
        let mut output = String::new();
        for path in paths {
            let _ = writeln!(
                output,
                "{} {}",
                self.colorize("report:", self.color_scheme.muted),
                path.display()
            );
        }
        output
    }

    pub fn format_warning(&self, warning: &str) -> String {
        format!("{} {}", self.colorize("warning:", self.color_scheme.warning), warning)
    }

    /// Check if terminal supports colors
    pub fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && std::env::var("TERM").map(|term| term != "dumb").unwrap_or(true)
    }
}
