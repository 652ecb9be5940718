//! Markdown rendering of reports

use super::{Report, ReportTable};
use chrono::Utc;

pub fn render_markdown<R: Report>(report: &R) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", report.title()));
    out.push_str(&format!("**Verdict:** {}  \n", report.verdict()));
    out.push_str(&format!("**Generated:** {}\n\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));

    let summary = report.summary_lines();
    if !summary.is_empty() {
        out.push_str("## Summary\n\n");
        let mut table = ReportTable::new(&["Metric", "Value"]);
        for (key, value) in summary {
            table.push_row(vec![key, value]);
        }
        out.push_str(&table.to_markdown());
        out.push('\n');
    }

    let checks = report.checks();
    if !checks.is_empty() {
        out.push_str("## Threshold checks\n\n");
        let mut table = ReportTable::new(&["Check", "Actual", "Limit", "Result"]);
        for check in checks {
            table.push_row(vec![
                check.name.clone(),
                format!("{:.3}", check.actual),
                format!("{} {:.3}", check.comparison.symbol(), check.limit),
                if check.passed { "pass".to_string() } else { "**fail**".to_string() },
            ]);
        }
        out.push_str(&table.to_markdown());
        out.push('\n');
    }

    for section in report.markdown_sections() {
        out.push_str(&format!("## {}\n\n{}\n", section.heading, section.body.trim_end()));
        out.push('\n');
    }

    if let Some(errors) = report.errors() {
        if !errors.is_empty() {
            out.push_str("## Errors\n\n");
            let mut table = ReportTable::new(&["Category", "Count"]);
            for (category, count) in errors.counts() {
                table.push_row(vec![category.to_string(), count.to_string()]);
            }
            out.push_str(&table.to_markdown());
            if errors.dropped() > 0 {
                out.push_str(&format!("\n{} further errors were counted but not kept.\n", errors.dropped()));
            }
            out.push('\n');

            for error in errors.entries().iter().take(20) {
                out.push_str(&format!("- `{}` {}\n", error.timestamp.format("%H:%M:%S"), error));
            }
            out.push('\n');
        }
    }

    out
}
