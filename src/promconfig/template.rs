//! Deployment size templates

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SizeTemplate {
    Small,
    Medium,
    Large,
    #[value(name = "xlarge")]
    XLarge,
}

impl SizeTemplate {
    pub const ALL: [SizeTemplate; 4] = [Self::Small, Self::Medium, Self::Large, Self::XLarge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        }
    }

    pub fn spec(&self) -> TemplateSpec {
        match self {
            Self::Small => TemplateSpec {
                targets: 50,
                scrape_interval: Duration::from_secs(30),
                retention_days: 15,
                expected_series: 100_000,
                memory_mib: 2_048,
                cpu_cores: 1.0,
                storage_gib: 20,
            },
            Self::Medium => TemplateSpec {
                targets: 500,
                scrape_interval: Duration::from_secs(15),
                retention_days: 15,
                expected_series: 1_000_000,
                memory_mib: 8_192,
                cpu_cores: 4.0,
                storage_gib: 100,
            },
            Self::Large => TemplateSpec {
                targets: 2_000,
                scrape_interval: Duration::from_secs(15),
                retention_days: 30,
                expected_series: 5_000_000,
                memory_mib: 32_768,
                cpu_cores: 8.0,
                storage_gib: 500,
            },
            Self::XLarge => TemplateSpec {
                targets: 10_000,
                scrape_interval: Duration::from_secs(15),
                retention_days: 30,
                expected_series: 20_000_000,
                memory_mib: 131_072,
                cpu_cores: 16.0,
                storage_gib: 2_000,
            },
        }
    }
}

impl fmt::Display for SizeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SizeTemplate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "small" | "s" => Ok(Self::Small),
            "medium" | "m" => Ok(Self::Medium),
            "large" | "l" => Ok(Self::Large),
            "xlarge" | "xl" => Ok(Self::XLarge),
            _ => Err(AppError::parse(format!("Unknown size template: {}", s))),
        }
    }
}

/// Sizing of one Prometheus deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub targets: u32,
    #[serde(with = "humantime_serde")]
    pub scrape_interval: Duration,
    pub retention_days: u32,
    pub expected_series: u64,
    pub memory_mib: u64,
    pub cpu_cores: f64,
    pub storage_gib: u64,
}

impl TemplateSpec {
    /// Samples ingested per second at the expected series count
    pub fn ingestion_rate(&self) -> f64 {
        self.expected_series as f64 / self.scrape_interval.as_secs_f64()
    }

    /// Command-line flags that go with the template
    pub fn recommended_flags(&self) -> Vec<String> {
        vec![
            format!("--storage.tsdb.retention.time={}d", self.retention_days),
            format!("--storage.tsdb.retention.size={}GB", self.storage_gib * 9 / 10),
            format!("--query.max-concurrency={}", (self.cpu_cores as u32 * 2).max(4)),
        ]
    }
}
