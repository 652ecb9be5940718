//! Parsing of `k6 run --summary-export` files

use crate::error::{AppError, Result};
use crate::models::ThresholdCheck;
use serde::{Deserialize, Serialize};

/// Figures taken from the k6 end-of-test summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K6Summary {
    pub requests: u64,
    /// Requests per second
    pub request_rate: f64,
    /// Share of failed HTTP requests, 0..=1
    pub failed_rate: f64,
    pub avg_ms: f64,
    pub med_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_ms: Option<f64>,
    pub max_ms: f64,
    pub iterations: u64,
    pub max_vus: u64,
}

fn metric<'a>(metrics: &'a serde_json::Value, name: &str) -> Option<&'a serde_json::Value> {
    metrics.get(name)
}

fn number(value: Option<&serde_json::Value>, field: &str) -> Option<f64> {
    value.and_then(|m| m.get(field)).and_then(|v| v.as_f64())
}

impl K6Summary {
    pub fn parse(content: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| AppError::parse(format!("Invalid k6 summary export: {}", e)))?;
        let metrics = root
            .get("metrics")
            .ok_or_else(|| AppError::parse("k6 summary export has no metrics"))?;

        let reqs = metric(metrics, "http_reqs");
        let failed = metric(metrics, "http_req_failed");
        let duration = metric(metrics, "http_req_duration");
        let iterations = metric(metrics, "iterations");
        let vus_max = metric(metrics, "vus_max");

        if reqs.is_none() || duration.is_none() {
            return Err(AppError::parse("k6 summary export lacks http_reqs or http_req_duration"));
        }

        Ok(Self {
            requests: number(reqs, "count").unwrap_or(0.0) as u64,
            request_rate: number(reqs, "rate").unwrap_or(0.0),
            failed_rate: number(failed, "value")
                .or_else(|| number(failed, "rate"))
                .unwrap_or(0.0),
            avg_ms: number(duration, "avg").unwrap_or(0.0),
            med_ms: number(duration, "med").unwrap_or(0.0),
            p90_ms: number(duration, "p(90)").unwrap_or(0.0),
            p95_ms: number(duration, "p(95)").unwrap_or(0.0),
            p99_ms: number(duration, "p(99)"),
            max_ms: number(duration, "max").unwrap_or(0.0),
            iterations: number(iterations, "count").unwrap_or(0.0) as u64,
            max_vus: number(vus_max, "max")
                .or_else(|| number(vus_max, "value"))
                .unwrap_or(0.0) as u64,
        })
    }

    pub fn success_rate(&self) -> f64 {
        1.0 - self.failed_rate
    }

    /// Latency and success checks shared by the k6-driven soak and load runs
    pub fn checks(&self, max_p95_ms: f64, max_p99_ms: f64, min_success_rate: f64) -> Vec<ThresholdCheck> {
        let mut checks = vec![
            ThresholdCheck::at_least("requests_sent", self.requests as f64, 1.0),
            ThresholdCheck::at_most("p95_latency_ms", self.p95_ms, max_p95_ms),
        ];
        if let Some(p99) = self.p99_ms {
            checks.push(ThresholdCheck::at_most("p99_latency_ms", p99, max_p99_ms));
        }
        checks.push(ThresholdCheck::at_least("success_rate", self.success_rate(), min_success_rate));
        checks
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_SUMMARY: &str = r#"{
  "root_group": {"name": "", "path": "", "checks": {}},
  "metrics": {
    "http_reqs": {"count": 1200, "rate": 19.98},
    "http_req_failed": {"passes": 6, "fails": 1194, "value": 0.005},
    "http_req_duration": {"avg": 42.1, "min": 3.2, "med": 35.0, "max": 910.4, "p(90)": 80.5, "p(95)": 120.25, "p(99)": 400.0},
    "iterations": {"count": 1200, "rate": 19.98},
    "vus_max": {"value": 10, "min": 10, "max": 10}
  }
}"#;
