//! Report model and rendering
//!
//! Every tester produces a result type implementing [`Report`]. From it the
//! console summary, the JSON/Markdown/CSV files and the verdict are derived
//! the same way for all commands.

mod console;
mod markdown;
mod writer;

pub use console::{ColorScheme, ConsoleFormatter};
pub use markdown::render_markdown;
pub use writer::ReportWriter;

use crate::error::{AppError, ErrorLog, Result};
use crate::models::{ThresholdCheck, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Report file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Csv => "csv",
        }
    }

    /// Parse a comma-separated list such as `json,markdown`
    pub fn parse_list(value: &str) -> Result<Vec<Self>> {
        let mut formats = Vec::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let format: ReportFormat = item.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return Err(AppError::parse("No report format given"));
        }
        Ok(formats)
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            _ => Err(AppError::parse(format!("Unknown report format: {}", s))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Csv => "csv",
        })
    }
}

/// A free-form Markdown section of a report
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownSection {
    pub heading: String,
    pub body: String,
}

impl MarkdownSection {
    pub fn new<H: Into<String>, B: Into<String>>(heading: H, body: B) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }

    pub fn table<H: Into<String>>(heading: H, table: &ReportTable) -> Self {
        Self::new(heading, table.to_markdown())
    }
}

/// Rows of a report flattened for CSV and Markdown tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        if self.headers.is_empty() {
            return String::new();
        }
        let escape = |cell: &str| cell.replace('|', "\\|");

        let mut out = format!(
            "| {} |\n|{}|\n",
            self.headers.iter().map(|h| escape(h)).collect::<Vec<_>>().join(" | "),
            self.headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        );
        for row in &self.rows {
            out.push_str(&format!(
                "| {} |\n",
                row.iter().map(|c| escape(c)).collect::<Vec<_>>().join(" | ")
            ));
        }
        out
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::io(format!("CSV write error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::internal(format!("CSV output is not UTF-8: {}", e)))
    }
}

/// Result of a harness command
pub trait Report: Serialize {
    /// Short machine name used in file names (`soak`, `load`, ...)
    fn kind(&self) -> &'static str;

    fn title(&self) -> String;

    fn verdict(&self) -> Verdict;

    fn checks(&self) -> &[ThresholdCheck];

    /// Key figures shown at the top of the console and Markdown output
    fn summary_lines(&self) -> Vec<(String, String)>;

    fn markdown_sections(&self) -> Vec<MarkdownSection>;

    /// Main table of the report, written as CSV
    fn csv_table(&self) -> ReportTable;

    fn errors(&self) -> Option<&ErrorLog> {
        None
    }
}

/// Format milliseconds for tables
pub fn fmt_ms(value: f64) -> String {
    format!("{:.1}", value)
}

/// Format a 0..=1 rate as a percentage
pub fn fmt_pct(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}
