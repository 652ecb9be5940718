//! Measurements of individual requests and their aggregation

use crate::error::{ErrorLog, TestError};
use crate::stats::LatencySummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a single HTTP request against the system under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    pub status_code: Option<u16>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    /// Number of series or samples in the result, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_count: Option<usize>,
}

impl RequestOutcome {
    pub fn success(latency: Duration, status_code: u16, series_count: Option<usize>) -> Self {
        Self {
            timestamp: Utc::now(),
            latency,
            status_code: Some(status_code),
            success: true,
            error: None,
            series_count,
        }
    }

    pub fn failure(latency: Duration, status_code: Option<u16>, error: TestError) -> Self {
        Self {
            timestamp: Utc::now(),
            latency,
            status_code,
            success: false,
            error: Some(error),
            series_count: None,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Accumulates outcomes into counts, latencies and an error log
///
/// Only successful requests contribute latency samples; failures are
/// counted and kept in the error log.
#[derive(Debug, Clone, Default)]
pub struct OutcomeRecorder {
    latencies_ms: Vec<f64>,
    total: u64,
    successes: u64,
    errors: ErrorLog,
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: RequestOutcome) {
        self.total += 1;
        if outcome.success {
            self.successes += 1;
            self.latencies_ms.push(outcome.latency_ms());
        } else if let Some(error) = outcome.error {
            self.errors.push(error);
        }
    }

    /// Record an outcome, labelling its error with what was being done
    pub fn record_for(&mut self, context: &str, mut outcome: RequestOutcome) {
        outcome.error = outcome.error.map(|e| e.with_context(context));
        self.record(outcome);
    }

    pub fn merge(&mut self, other: OutcomeRecorder) {
        self.total += other.total;
        self.successes += other.successes;
        self.latencies_ms.extend(other.latencies_ms);
        self.errors.extend(other.errors);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.total - self.successes
    }

    /// Share of successful requests; 0 when nothing was sent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures() as f64 / self.total as f64
        }
    }

    pub fn latencies_ms(&self) -> &[f64] {
        &self.latencies_ms
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary::from_samples(&self.latencies_ms)
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn into_errors(self) -> ErrorLog {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn ok(ms: u64) -> RequestOutcome {
        RequestOutcome::success(Duration::from_millis(ms), 200, Some(1))
    }

    fn failed(category: ErrorCategory) -> RequestOutcome {
        RequestOutcome::failure(Duration::from_millis(5), None, TestError::new(category, "boom"))
    }

    #[test]
    fn test_recorder_counts() {
        let mut recorder = OutcomeRecorder::new();
        recorder.record(ok(10));
        recorder.record(ok(30));
        recorder.record(failed(ErrorCategory::Timeout));
        recorder.record_for("up", failed(ErrorCategory::Connection));

        assert_eq!(recorder.total(), 4);
        assert_eq!(recorder.successes(), 2);
        assert_eq!(recorder.failures(), 2);
        assert_eq!(recorder.success_rate(), 0.5);
        assert_eq!(recorder.error_rate(), 0.5);
        assert_eq!(recorder.latencies_ms(), &[10.0, 30.0]);
        assert_eq!(recorder.errors().total(), 2);
        assert_eq!(recorder.errors().entries()[1].context.as_deref(), Some("up"));
        assert_eq!(recorder.summary().mean_ms, 20.0);
    }

    #[test]
    fn test_empty_recorder_rates() {
        let recorder = OutcomeRecorder::new();
        assert_eq!(recorder.success_rate(), 0.0);
        assert_eq!(recorder.error_rate(), 0.0);
        assert_eq!(recorder.summary().count, 0);
    }

    #[test]
    fn test_merge() {
        let mut a = OutcomeRecorder::new();
        a.record(ok(10));
        let mut b = OutcomeRecorder::new();
        b.record(ok(20));
        b.record(failed(ErrorCategory::HttpStatus));
        a.merge(b);
        assert_eq!(a.total(), 3);
        assert_eq!(a.successes(), 2);
        assert_eq!(a.errors().counts()[&ErrorCategory::HttpStatus], 1);
    }
}
