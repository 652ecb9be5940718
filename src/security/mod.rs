//! Security verification of a Prometheus endpoint

mod checks;
mod verifier;

pub use checks::find_unredacted_secrets;
pub use verifier::{SecurityReport, SecurityVerifier};

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a failed finding is
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::parse(format!("Unknown severity: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Passed,
    Failed,
    /// The check could not be carried out or does not apply
    Skipped,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one security check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub check: String,
    pub severity: Severity,
    pub status: FindingStatus,
    pub detail: String,
}

impl SecurityFinding {
    pub fn passed<D: Into<String>>(check: &str, detail: D) -> Self {
        Self::with_status(check, Severity::Info, FindingStatus::Passed, detail)
    }

    pub fn failed<D: Into<String>>(check: &str, severity: Severity, detail: D) -> Self {
        Self::with_status(check, severity, FindingStatus::Failed, detail)
    }

    pub fn skipped<D: Into<String>>(check: &str, detail: D) -> Self {
        Self::with_status(check, Severity::Info, FindingStatus::Skipped, detail)
    }

    fn with_status<D: Into<String>>(check: &str, severity: Severity, status: FindingStatus, detail: D) -> Self {
        Self {
            check: check.to_string(),
            severity,
            status,
            detail: detail.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == FindingStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::default(), Severity::High);
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("urgent".parse::<Severity>().is_err());
        let yaml: Severity = serde_yaml::from_str("medium").unwrap();
        assert_eq!(yaml, Severity::Medium);
    }
}
