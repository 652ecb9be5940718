//! Threshold checks and the verdict derived from them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `actual <= limit`
    AtMost,
    /// `actual >= limit`
    AtLeast,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::AtMost => "<=",
            Self::AtLeast => ">=",
        }
    }

    pub fn holds(&self, actual: f64, limit: f64) -> bool {
        match self {
            Self::AtMost => actual <= limit,
            Self::AtLeast => actual >= limit,
        }
    }
}

/// What a failed check does to the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    #[default]
    Required,
    Advisory,
}

/// One measured value compared against a static limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub actual: f64,
    pub limit: f64,
    pub comparison: Comparison,
    pub passed: bool,
    #[serde(default)]
    pub level: CheckLevel,
}

impl ThresholdCheck {
    pub fn new<S: Into<String>>(name: S, actual: f64, limit: f64, comparison: Comparison) -> Self {
        // NaN never passes
        let passed = !actual.is_nan() && comparison.holds(actual, limit);
        Self {
            name: name.into(),
            actual,
            limit,
            comparison,
            passed,
            level: CheckLevel::Required,
        }
    }

    pub fn at_most<S: Into<String>>(name: S, actual: f64, limit: f64) -> Self {
        Self::new(name, actual, limit, Comparison::AtMost)
    }

    pub fn at_least<S: Into<String>>(name: S, actual: f64, limit: f64) -> Self {
        Self::new(name, actual, limit, Comparison::AtLeast)
    }

    /// Pass/fail condition that is not a numeric comparison
    pub fn condition<S: Into<String>>(name: S, holds: bool) -> Self {
        Self::at_least(name, if holds { 1.0 } else { 0.0 }, 1.0)
    }

    /// A failure only downgrades the verdict to Warn
    pub fn advisory(mut self) -> Self {
        self.level = CheckLevel::Advisory;
        self
    }
}

impl fmt::Display for ThresholdCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.3} {} {:.3} ({})",
            self.name,
            self.actual,
            self.comparison.symbol(),
            self.limit,
            if self.passed { "pass" } else { "fail" }
        )
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    /// Fail if a required check failed, Warn if only advisory ones did
    pub fn from_checks(checks: &[ThresholdCheck]) -> Self {
        checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match c.level {
                CheckLevel::Required => Verdict::Fail,
                CheckLevel::Advisory => Verdict::Warn,
            })
            .max()
            .unwrap_or(Verdict::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_comparisons() {
        assert!(ThresholdCheck::at_most("p95", 90.0, 100.0).passed);
        assert!(ThresholdCheck::at_most("p95", 100.0, 100.0).passed);
        assert!(!ThresholdCheck::at_most("p95", 100.1, 100.0).passed);
        assert!(ThresholdCheck::at_least("success", 0.99, 0.99).passed);
        assert!(!ThresholdCheck::at_least("success", 0.98, 0.99).passed);
        assert!(!ThresholdCheck::at_most("p95", f64::NAN, 100.0).passed);
        assert!(ThresholdCheck::condition("recovered", true).passed);
        assert!(!ThresholdCheck::condition("recovered", false).passed);
    }

    #[test]
    fn test_verdict_from_checks() {
        let pass = ThresholdCheck::at_most("a", 1.0, 2.0);
        let fail = ThresholdCheck::at_most("b", 3.0, 2.0);
        let warn = ThresholdCheck::at_most("c", 3.0, 2.0).advisory();

        assert_eq!(Verdict::from_checks(&[]), Verdict::Pass);
        assert_eq!(Verdict::from_checks(&[pass.clone()]), Verdict::Pass);
        assert_eq!(Verdict::from_checks(&[pass.clone(), warn.clone()]), Verdict::Warn);
        assert_eq!(Verdict::from_checks(&[warn, fail, pass]), Verdict::Fail);
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::Warn).unwrap(), "\"WARN\"");
    }
}
