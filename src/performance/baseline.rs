//! Comparison against a previous benchmark report

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize)]
struct BaselineReport {
    queries: Vec<BaselineQuery>,
}

#[derive(Deserialize)]
struct BaselineQuery {
    name: String,
    latency: BaselineLatency,
}

#[derive(Deserialize)]
struct BaselineLatency {
    p95_ms: Option<f64>,
}

/// p95 per query name from a benchmark JSON report
pub fn parse_baseline(content: &str) -> Result<BTreeMap<String, f64>> {
    let report: BaselineReport = serde_json::from_str(content)
        .map_err(|e| AppError::parse(format!("Baseline is not a benchmark report: {}", e)))?;

    Ok(report
        .queries
        .into_iter()
        .filter_map(|q| q.latency.p95_ms.filter(|v| v.is_finite()).map(|p95| (q.name, p95)))
        .collect())
}

pub fn load_baseline(path: &Path) -> Result<BTreeMap<String, f64>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Cannot read baseline {}: {}", path.display(), e)))?;
    parse_baseline(&content)
}

/// Percent change of `current` over `baseline`; `None` without a positive baseline
pub fn regression_pct(current: f64, baseline: f64) -> Option<f64> {
    if baseline > 0.0 && current.is_finite() {
        Some((current - baseline) / baseline * 100.0)
    } else {
        None
    }
}
