//! Prometheus Test Harness
//!
//! Drives soak, load, benchmark, scalability, stress, spike and security
//! tests against a Prometheus server, generates sized Prometheus
//! configurations with relabel simulation, and scores the health of GitHub
//! repositories.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod endurance;
pub mod error;
pub mod github;
pub mod k6;
pub mod load;
pub mod logging;
pub mod models;
pub mod output;
pub mod performance;
pub mod promconfig;
pub mod scalability;
pub mod security;
pub mod stats;
pub mod stress;

// Re-export commonly used types
pub use client::{PrometheusApi, PrometheusClient};
pub use error::{AppError, Result};
pub use models::{Config, ThresholdCheck, Verdict};
pub use output::{ConsoleFormatter, Report, ReportFormat, ReportWriter};
pub use stats::LatencySummary;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Version with the commit, build time and target set by build.rs
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ", ",
    env!("TARGET_TRIPLE"),
    ")"
);

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_SELF_JOB: &str = "prometheus";
    pub const DEFAULT_OUTPUT_DIR: &str = "reports";
    pub const DEFAULT_K6_BINARY: &str = "k6";
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
    pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
}
