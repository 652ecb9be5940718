//! Report files on disk

use super::{render_markdown, Report, ReportFormat};
use crate::error::{AppError, ErrorContext, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Writes `<kind>-<YYYYmmdd-HHMMSS>.<ext>` files into one directory
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the report in each format and return the created paths
    pub fn write<R: Report>(&self, report: &R, formats: &[ReportFormat]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory {}", self.output_dir.display()))?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let mut written = Vec::with_capacity(formats.len());

        for format in formats {
            let path = self
                .output_dir
                .join(format!("{}-{}.{}", report.kind(), stamp, format.extension()));

            let content = match format {
                ReportFormat::Json => serde_json::to_string_pretty(report)?,
                ReportFormat::Markdown => render_markdown(report),
                ReportFormat::Csv => report.csv_table().to_csv()?,
            };

            std::fs::write(&path, content)
                .map_err(|e| AppError::io(format!("Failed to write {}: {}", path.display(), e)))?;
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ThresholdCheck, Verdict};
    use crate::output::{MarkdownSection, ReportTable};
    use serde::Serialize;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct SampleReport {
        checks: Vec<ThresholdCheck>,
    }

    impl Report for SampleReport {
        fn kind(&self) -> &'static str {
            "sample"
        }
        fn title(&self) -> String {
            "Sample report".to_string()
        }
        fn verdict(&self) -> Verdict {
            Verdict::from_checks(&self.checks)
        }
        fn checks(&self) -> &[ThresholdCheck] {
            &self.checks
        }
        fn summary_lines(&self) -> Vec<(String, String)> {
            vec![("Requests".to_string(), "10".to_string())]
        }
        fn markdown_sections(&self) -> Vec<MarkdownSection> {
            vec![MarkdownSection::new("Notes", "all good")]
        }
        fn csv_table(&self) -> ReportTable {
            let mut table = ReportTable::new(&["query", "p95_ms"]);
            table.push_row(vec!["up".to_string(), "12.0".to_string()]);
            table
        }
    }

    #[test]
    fn test_writes_all_formats() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports"));
        let report = SampleReport {
            checks: vec![ThresholdCheck::at_most("p95_ms", 12.0, 100.0)],
        };

        let paths = writer
            .write(&report, &[ReportFormat::Json, ReportFormat::Markdown, ReportFormat::Csv])
            .unwrap();
        assert_eq!(paths.len(), 3);

        let name = paths[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("sample-"));
        assert!(name.ends_with(".json"));

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["checks"][0]["name"], "p95_ms");

        let md = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(md.contains("# Sample report"));
        assert!(md.contains("**Verdict:** PASS"));
        assert!(md.contains("## Notes"));

        let csv = std::fs::read_to_string(&paths[2]).unwrap();
        assert_eq!(csv, "query,p95_ms\nup,12.0\n");
    }
}
