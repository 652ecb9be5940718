//! Scaling curves: how latency grows with the measured dimension

use super::dimension::ScalingPoint;
use crate::error::ErrorLog;
use crate::models::{ScalabilitySettings, ScalingDimension, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::{
    classify_degradation, detect_breaking_point, linear_regression, BreakingCriteria, BreakingPoint,
    DegradationAnalysis, DegradationThresholds, RegressionFit,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latency growth classified by the log-log elasticity exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingBehavior {
    Constant,
    Sublinear,
    Linear,
    Superlinear,
}

impl ScalingBehavior {
    pub fn from_exponent(exponent: f64) -> Self {
        if exponent < 0.2 {
            Self::Constant
        } else if exponent < 0.8 {
            Self::Sublinear
        } else if exponent <= 1.2 {
            Self::Linear
        } else {
            Self::Superlinear
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Sublinear => "sublinear",
            Self::Linear => "linear",
            Self::Superlinear => "superlinear",
        }
    }
}

impl fmt::Display for ScalingBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change between two consecutive levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEfficiency {
    pub from_level: u32,
    pub to_level: u32,
    /// Load growth divided by p95 growth; 1.0 means latency grew in step with load
    pub efficiency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScalingCurve {
    pub dimension: ScalingDimension,
    pub points: Vec<ScalingPoint>,
    /// p95 over level
    pub p95_fit: Option<RegressionFit>,
    pub exponent: Option<f64>,
    pub behavior: Option<ScalingBehavior>,
    pub efficiency: Vec<StepEfficiency>,
    pub degradation: DegradationAnalysis,
    pub breaking_point: Option<BreakingPoint>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

/// Builds a [`ScalingCurve`] from measured points
pub struct ScalingCurveGenerator {
    criteria: BreakingCriteria,
    min_breaking_level: u32,
    thresholds: DegradationThresholds,
}

impl ScalingCurveGenerator {
    pub fn new(criteria: BreakingCriteria, min_breaking_level: u32) -> Self {
        Self {
            criteria,
            min_breaking_level,
            thresholds: DegradationThresholds::default(),
        }
    }

    pub fn from_settings(settings: &ScalabilitySettings) -> Self {
        Self::new(
            BreakingCriteria {
                max_error_rate: settings.max_error_rate,
                max_p95_ms: settings.max_p95_ms,
            },
            settings.min_breaking_level,
        )
    }

    pub fn generate(&self, dimension: ScalingDimension, points: Vec<ScalingPoint>, errors: ErrorLog) -> ScalingCurve {
        let linear: Vec<(f64, f64)> = points
            .iter()
            .map(|p| (f64::from(p.level), p.latency.p95_ms))
            .collect();
        let p95_fit = linear_regression(&linear);

        let exponent = elasticity(&points);
        let behavior = exponent.map(ScalingBehavior::from_exponent);

        let efficiency = points
            .windows(2)
            .filter_map(|pair| step_efficiency(&pair[0], &pair[1]))
            .collect();

        let p95_series: Vec<f64> = points.iter().map(|p| p.latency.p95_ms).collect();
        let degradation = classify_degradation(&p95_series, self.thresholds);

        let measurements: Vec<_> = points.iter().map(ScalingPoint::measurement).collect();
        let breaking_point = detect_breaking_point(&measurements, self.criteria);

        let mut checks = Vec::new();
        if let Some(behavior) = behavior {
            checks.push(ThresholdCheck::condition("no_superlinear_scaling", behavior != ScalingBehavior::Superlinear).advisory());
        }
        if let Some(bp) = &breaking_point {
            checks.push(ThresholdCheck::at_least(
                "breaking_level",
                f64::from(bp.level),
                f64::from(self.min_breaking_level) + 1.0,
            ));
        }

        ScalingCurve {
            dimension,
            points,
            p95_fit,
            exponent,
            behavior,
            efficiency,
            degradation,
            breaking_point,
            verdict: Verdict::from_checks(&checks),
            checks,
            errors,
        }
    }
}

/// Slope of ln(p95) over ln(level)
fn elasticity(points: &[ScalingPoint]) -> Option<f64> {
    let logs: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| p.level > 0 && p.latency.p95_ms > 0.0)
        .map(|p| (f64::from(p.level).ln(), p.latency.p95_ms.ln()))
        .collect();
    linear_regression(&logs).map(|fit| fit.slope)
}

fn step_efficiency(from: &ScalingPoint, to: &ScalingPoint) -> Option<StepEfficiency> {
    if from.level == 0 || from.latency.p95_ms <= 0.0 || to.latency.p95_ms <= 0.0 {
        return None;
    }
    let load_growth = f64::from(to.level) / f64::from(from.level);
    let latency_growth = to.latency.p95_ms / from.latency.p95_ms;
    Some(StepEfficiency {
        from_level: from.level,
        to_level: to.level,
        efficiency: load_growth / latency_growth,
    })
}

impl Report for ScalingCurve {
    fn kind(&self) -> &'static str {
        "scalability"
    }

    fn title(&self) -> String {
        format!("Scalability by {}", self.dimension.unit())
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("Levels".to_string(), self.points.len().to_string()),
            (
                "Scaling".to_string(),
                match (self.behavior, self.exponent) {
                    (Some(behavior), Some(exponent)) => format!("{} (exponent {:.2})", behavior, exponent),
                    _ => "n/a".to_string(),
                },
            ),
            ("Degradation".to_string(), self.degradation.level.to_string()),
        ];
        lines.push((
            "Breaking point".to_string(),
            match &self.breaking_point {
                Some(bp) => format!(
                    "level {} ({} {:.3} > {:.3})",
                    bp.level,
                    bp.reason.as_str(),
                    bp.value,
                    bp.limit
                ),
                None => "none".to_string(),
            },
        ));
        lines
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        let mut efficiency = ReportTable::new(&["from", "to", "efficiency"]);
        for step in &self.efficiency {
            efficiency.push_row(vec![
                step.from_level.to_string(),
                step.to_level.to_string(),
                format!("{:.2}", step.efficiency),
            ]);
        }

        let mut sections = vec![
            MarkdownSection::table("Points", &self.csv_table()),
            MarkdownSection::table("Step efficiency", &efficiency),
        ];
        if let Some(fit) = &self.p95_fit {
            sections.push(MarkdownSection::new(
                "Linear fit",
                format!(
                    "p95 ≈ {:.3} × level + {:.3} ms (r² {:.3})",
                    fit.slope, fit.intercept, fit.r_squared
                ),
            ));
        }
        sections
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["level", "requests", "mean_ms", "p95_ms", "throughput", "error_rate"]);
        for point in &self.points {
            table.push_row(vec![
                point.level.to_string(),
                point.requests.to_string(),
                fmt_ms(point.latency.mean_ms),
                fmt_ms(point.latency.p95_ms),
                format!("{:.2}", point.throughput),
                fmt_pct(point.error_rate),
            ]);
        }
        table
    }

    fn errors(&self) -> Option<&ErrorLog> {
        Some(&self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BreakingReason, DegradationLevel, LatencySummary};

    fn point(level: u32, p95: f64, error_rate: f64) -> ScalingPoint {
        ScalingPoint {
            level,
            requests: 10,
            latency: LatencySummary {
                count: 10,
                p95_ms: p95,
                mean_ms: p95 / 2.0,
                ..LatencySummary::default()
            },
            throughput: 10.0,
            error_rate,
        }
    }

    fn generator() -> ScalingCurveGenerator {
        ScalingCurveGenerator::new(
            BreakingCriteria {
                max_error_rate: 0.05,
                max_p95_ms: 1000.0,
            },
            8,
        )
    }

    #[test]
    fn test_behavior_boundaries() {
        assert_eq!(ScalingBehavior::from_exponent(0.0), ScalingBehavior::Constant);
        assert_eq!(ScalingBehavior::from_exponent(0.2), ScalingBehavior::Sublinear);
        assert_eq!(ScalingBehavior::from_exponent(0.8), ScalingBehavior::Linear);
        assert_eq!(ScalingBehavior::from_exponent(1.2), ScalingBehavior::Linear);
        assert_eq!(ScalingBehavior::from_exponent(1.21), ScalingBehavior::Superlinear);
    }

    #[test]
    fn test_linear_growth() {
        let points = vec![point(1, 10.0, 0.0), point(2, 20.0, 0.0), point(4, 40.0, 0.0), point(8, 80.0, 0.0)];
        let curve = generator().generate(ScalingDimension::Concurrency, points, ErrorLog::default());

        assert!((curve.exponent.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(curve.behavior, Some(ScalingBehavior::Linear));
        assert!(curve.efficiency.iter().all(|s| (s.efficiency - 1.0).abs() < 1e-9));
        assert!((curve.p95_fit.as_ref().unwrap().slope - 10.0).abs() < 1e-9);
        assert_eq!(curve.breaking_point, None);
        assert_eq!(curve.verdict, Verdict::Pass);
    }

    #[test]
    fn test_superlinear_growth_warns() {
        let points = vec![point(1, 10.0, 0.0), point(2, 40.0, 0.0), point(4, 160.0, 0.0)];
        let curve = generator().generate(ScalingDimension::Concurrency, points, ErrorLog::default());

        assert_eq!(curve.behavior, Some(ScalingBehavior::Superlinear));
        assert_eq!(curve.degradation.level, DegradationLevel::Severe);
        assert_eq!(curve.verdict, Verdict::Warn);
    }

    #[test]
    fn test_early_breaking_point_fails() {
        let points = vec![point(1, 10.0, 0.0), point(2, 11.0, 0.0), point(4, 12.0, 0.2), point(8, 13.0, 0.5)];
        let curve = generator().generate(ScalingDimension::Concurrency, points, ErrorLog::default());

        let bp = curve.breaking_point.unwrap();
        assert_eq!(bp.level, 4);
        assert_eq!(bp.reason, BreakingReason::ErrorRate);
        assert_eq!(bp.last_stable_level, Some(2));
        assert_eq!(curve.verdict, Verdict::Fail);
    }

    #[test]
    fn test_breaking_point_beyond_minimum_passes() {
        let points = vec![point(8, 100.0, 0.0), point(16, 150.0, 0.0), point(32, 1500.0, 0.0)];
        let curve = generator().generate(ScalingDimension::TimeRange, points, ErrorLog::default());

        assert_eq!(curve.breaking_point.unwrap().level, 32);
        assert!(curve.checks.iter().any(|c| c.name == "breaking_level" && c.passed));
    }

    #[test]
    fn test_single_point_has_no_curve() {
        let curve = generator().generate(ScalingDimension::Cardinality, vec![point(5, 10.0, 0.0)], ErrorLog::default());
        assert_eq!(curve.exponent, None);
        assert_eq!(curve.behavior, None);
        assert!(curve.efficiency.is_empty());
        assert_eq!(curve.verdict, Verdict::Pass);
    }
}
