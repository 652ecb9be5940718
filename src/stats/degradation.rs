//! Latency degradation and breaking-point detection
//!
//! Soak, scalability and stress runs all reduce to a series of latency
//! values (per time window or per load level). A least-squares line over
//! the series tells how much worse the end is than the start, and the
//! first level crossing an error-rate or latency limit is the breaking
//! point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Least-squares line `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl RegressionFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit a line through `(x, y)` points; `None` for fewer than two points or no x-variance
pub fn linear_regression(points: &[(f64, f64)]) -> Option<RegressionFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sum_x = points.iter().map(|&(x, _)| x).sum::<f64>();
    let sum_y = points.iter().map(|&(_, y)| y).sum::<f64>();
    let sum_xy = points.iter().map(|&(x, y)| x * y).sum::<f64>();
    let sum_x_sq = points.iter().map(|&(x, _)| x * x).sum::<f64>();

    let denominator = n * sum_x_sq - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let ss_tot = points.iter().map(|&(_, y)| (y - mean_y).powi(2)).sum::<f64>();
    let ss_res = points
        .iter()
        .map(|&(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum::<f64>();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    Some(RegressionFit {
        slope,
        intercept,
        r_squared,
    })
}

/// How much a latency series worsened from start to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    None,
    Mild,
    Significant,
    Severe,
}

impl DegradationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mild => "mild",
            Self::Significant => "significant",
            Self::Severe => "severe",
        }
    }

    /// Numeric rank used in threshold checks (None = 0 .. Severe = 3)
    pub fn rank(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Mild => 1.0,
            Self::Significant => 2.0,
            Self::Severe => 3.0,
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratios of projected to baseline latency separating the levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationThresholds {
    pub warn_ratio: f64,
    pub fail_ratio: f64,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            warn_ratio: 1.5,
            fail_ratio: 2.0,
        }
    }
}

/// Ratio below which a rising series still counts as flat
pub const NOISE_RATIO: f64 = 1.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationAnalysis {
    pub level: DegradationLevel,
    /// Latency increase per series step
    pub slope: f64,
    pub r_squared: f64,
    /// Fitted value at the first point
    pub baseline: f64,
    /// Fitted value at the last point
    pub projected: f64,
    pub ratio: f64,
}

impl DegradationAnalysis {
    fn flat(points: &[(f64, f64)]) -> Self {
        let baseline = points.first().map_or(0.0, |&(_, y)| y);
        Self {
            level: DegradationLevel::None,
            slope: 0.0,
            r_squared: 0.0,
            baseline,
            projected: baseline,
            ratio: 1.0,
        }
    }
}

/// Classify the trend of a series indexed 0..n
pub fn classify_degradation(series: &[f64], thresholds: DegradationThresholds) -> DegradationAnalysis {
    let points: Vec<(f64, f64)> = series.iter().enumerate().map(|(i, &y)| (i as f64, y)).collect();
    classify_degradation_points(&points, thresholds)
}

/// Classify the trend of `(x, y)` points sorted by `x`; gaps in `x` are allowed
pub fn classify_degradation_points(points: &[(f64, f64)], thresholds: DegradationThresholds) -> DegradationAnalysis {
    let Some(fit) = linear_regression(points) else {
        return DegradationAnalysis::flat(points);
    };

    let (Some(&(first_x, _)), Some(&(last_x, _))) = (points.first(), points.last()) else {
        return DegradationAnalysis::flat(points);
    };
    let baseline = fit.predict(first_x);
    let projected = fit.predict(last_x);

    let ratio = if baseline > 0.0 {
        projected / baseline
    } else if projected > 0.0 {
        // The fit starts at or below zero while ending positive
        f64::INFINITY
    } else {
        1.0
    };

    let level = if fit.slope <= 0.0 || ratio < NOISE_RATIO {
        DegradationLevel::None
    } else if ratio < thresholds.warn_ratio {
        DegradationLevel::Mild
    } else if ratio < thresholds.fail_ratio {
        DegradationLevel::Significant
    } else {
        DegradationLevel::Severe
    };

    DegradationAnalysis {
        level,
        slope: fit.slope,
        r_squared: fit.r_squared,
        baseline,
        projected,
        ratio,
    }
}

/// Measurements taken at one load level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelMeasurement {
    pub level: u32,
    pub error_rate: f64,
    pub p95_ms: f64,
}

/// Limits a load level must stay within to count as stable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakingCriteria {
    pub max_error_rate: f64,
    pub max_p95_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingReason {
    ErrorRate,
    Latency,
}

impl BreakingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorRate => "error rate",
            Self::Latency => "p95 latency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakingPoint {
    pub level: u32,
    pub reason: BreakingReason,
    /// The offending error rate or p95
    pub value: f64,
    pub limit: f64,
    /// Highest level before the break, `None` if the first level broke
    pub last_stable_level: Option<u32>,
}

/// First level whose error rate or p95 exceeds the criteria
///
/// The error rate is checked before latency, so a level failing both is
/// reported as an error-rate break.
pub fn detect_breaking_point(levels: &[LevelMeasurement], criteria: BreakingCriteria) -> Option<BreakingPoint> {
    let mut last_stable = None;

    for measurement in levels {
        let broken = if measurement.error_rate > criteria.max_error_rate {
            Some((BreakingReason::ErrorRate, measurement.error_rate, criteria.max_error_rate))
        } else if measurement.p95_ms > criteria.max_p95_ms {
            Some((BreakingReason::Latency, measurement.p95_ms, criteria.max_p95_ms))
        } else {
            None
        };

        if let Some((reason, value, limit)) = broken {
            return Some(BreakingPoint {
                level: measurement.level,
                reason,
                value,
                limit,
                last_stable_level: last_stable,
            });
        }
        last_stable = Some(measurement.level);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_regression_exact_line() {
        let points = vec![(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let fit = linear_regression(&points).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_regression_degenerate() {
        assert!(linear_regression(&[]).is_none());
        assert!(linear_regression(&[(1.0, 2.0)]).is_none());
        assert!(linear_regression(&[(1.0, 2.0), (1.0, 3.0)]).is_none());
    }

    #[test]
    fn test_flat_series_is_none() {
        let analysis = classify_degradation(&[100.0; 8], DegradationThresholds::default());
        assert_eq!(analysis.level, DegradationLevel::None);
        assert!((analysis.ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_doubling_series_is_severe() {
        let analysis = classify_degradation(&[100.0, 125.0, 150.0, 175.0, 200.0], DegradationThresholds::default());
        assert_eq!(analysis.level, DegradationLevel::Severe);
        assert!((analysis.ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_degradation_levels() {
        let thresholds = DegradationThresholds::default();
        // ratio 1.05
        assert_eq!(classify_degradation(&[100.0, 105.0], thresholds).level, DegradationLevel::None);
        // ratio 1.3
        assert_eq!(classify_degradation(&[100.0, 130.0], thresholds).level, DegradationLevel::Mild);
        // ratio 1.7
        assert_eq!(
            classify_degradation(&[100.0, 170.0], thresholds).level,
            DegradationLevel::Significant
        );
    }

    #[test]
    fn test_improving_series_is_none() {
        let analysis = classify_degradation(&[200.0, 150.0, 100.0], DegradationThresholds::default());
        assert_eq!(analysis.level, DegradationLevel::None);
        assert!(analysis.slope < 0.0);
    }

    #[test]
    fn test_single_point_is_flat() {
        let analysis = classify_degradation(&[42.0], DegradationThresholds::default());
        assert_eq!(analysis.level, DegradationLevel::None);
        assert_eq!(analysis.baseline, 42.0);
    }

    #[test]
    fn test_points_with_gaps() {
        let thresholds = DegradationThresholds::default();
        let flat = classify_degradation_points(&[(2.0, 10.0), (3.0, 10.0), (5.0, 10.0)], thresholds);
        assert_eq!(flat.level, DegradationLevel::None);
        assert_eq!(flat.baseline, 10.0);

        let rising = classify_degradation_points(&[(1.0, 100.0), (4.0, 300.0)], thresholds);
        assert_eq!(rising.level, DegradationLevel::Severe);
        assert!((rising.ratio - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_breaking_point_first_offender() {
        let levels = vec![
            LevelMeasurement { level: 10, error_rate: 0.0, p95_ms: 100.0 },
            LevelMeasurement { level: 20, error_rate: 0.01, p95_ms: 300.0 },
            LevelMeasurement { level: 30, error_rate: 0.02, p95_ms: 1200.0 },
            LevelMeasurement { level: 40, error_rate: 0.5, p95_ms: 5000.0 },
        ];
        let criteria = BreakingCriteria { max_error_rate: 0.05, max_p95_ms: 1000.0 };

        let point = detect_breaking_point(&levels, criteria).unwrap();
        assert_eq!(point.level, 30);
        assert_eq!(point.reason, BreakingReason::Latency);
        assert_eq!(point.value, 1200.0);
        assert_eq!(point.last_stable_level, Some(20));
    }

    #[test]
    fn test_breaking_point_error_rate_takes_precedence() {
        let levels = vec![LevelMeasurement { level: 5, error_rate: 0.2, p95_ms: 5000.0 }];
        let criteria = BreakingCriteria { max_error_rate: 0.05, max_p95_ms: 1000.0 };

        let point = detect_breaking_point(&levels, criteria).unwrap();
        assert_eq!(point.reason, BreakingReason::ErrorRate);
        assert_eq!(point.last_stable_level, None);
    }

    #[test]
    fn test_no_breaking_point() {
        let levels = vec![LevelMeasurement { level: 1, error_rate: 0.0, p95_ms: 10.0 }];
        let criteria = BreakingCriteria { max_error_rate: 0.05, max_p95_ms: 1000.0 };
        assert!(detect_breaking_point(&levels, criteria).is_none());
    }
}
