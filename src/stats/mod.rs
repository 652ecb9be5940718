//! Statistics shared by every tester: latency summaries, trends and
//! degradation/breaking-point detection

pub mod degradation;

pub use degradation::{
    classify_degradation, classify_degradation_points, detect_breaking_point, linear_regression, BreakingCriteria,
    BreakingPoint, BreakingReason, DegradationAnalysis, DegradationLevel, DegradationThresholds, LevelMeasurement,
    RegressionFit,
};

use serde::{Deserialize, Serialize};

/// Latency distribution of a set of requests, all values in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub std_dev_ms: f64,
}

impl LatencySummary {
    /// Summarize unsorted samples; an empty slice gives an all-zero summary
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;

        Self {
            count,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: mean,
            median_ms: percentile(&sorted, 50.0),
            p90_ms: percentile(&sorted, 90.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            std_dev_ms: standard_deviation(&sorted, mean),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Percentile of sorted values by linear interpolation between closest ranks
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let p = p.clamp(0.0, 100.0);
    let index = (p / 100.0) * (sorted_values.len() as f64 - 1.0);
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted_values[lower_index]
    } else {
        let lower_value = sorted_values[lower_index];
        let upper_value = sorted_values[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

/// Sample standard deviation
pub fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }

    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

    variance.sqrt()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median of unsorted values
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(percentile(&sorted, 50.0))
}

/// Relative change from `first` to `last` in percent; 0 when `first` is not positive
pub fn growth_percent(first: f64, last: f64) -> f64 {
    if first <= 0.0 {
        return 0.0;
    }
    (last - first) / first * 100.0
}

/// Growth rate per hour of `(elapsed seconds, value)` samples, from the regression slope
pub fn rate_per_hour(samples: &[(f64, f64)]) -> Option<f64> {
    linear_regression(samples).map(|fit| fit.slope * 3600.0)
}

/// Direction of a latency trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Latency is going down
    Improving,
    Stable,
    /// Latency is going up
    Degrading,
}

impl TrendDirection {
    /// Classify a latency slope; slopes within `tolerance` of zero are stable
    pub fn from_slope(slope: f64, tolerance: f64) -> Self {
        if slope > tolerance {
            TrendDirection::Degrading
        } else if slope < -tolerance {
            TrendDirection::Improving
        } else {
            TrendDirection::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        }
    }
}

/// Split samples into `windows` consecutive, nearly equal buckets
pub fn split_windows<T: Clone>(samples: &[T], windows: usize) -> Vec<Vec<T>> {
    if samples.is_empty() || windows == 0 {
        return Vec::new();
    }
    let windows = windows.min(samples.len());
    let base = samples.len() / windows;
    let extra = samples.len() % windows;

    let mut buckets = Vec::with_capacity(windows);
    let mut start = 0;
    for i in 0..windows {
        let len = base + usize::from(i < extra);
        buckets.push(samples[start..start + len].to_vec());
        start += len;
    }
    buckets
}
