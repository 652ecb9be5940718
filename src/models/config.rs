//! Configuration data model and validation

use crate::error::{AppError, Result};
use crate::models::query::{default_queries, QueryKind, QuerySpec};
use crate::output::ReportFormat;
use crate::security::Severity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Prometheus under test
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// `job` label Prometheus scrapes itself under
    #[serde(default = "default_self_job")]
    pub self_job: String,

    /// Directory report files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,

    /// Query set driven by the testers
    #[serde(default = "default_queries")]
    pub queries: Vec<QuerySpec>,

    #[serde(default = "default_k6_binary")]
    pub k6_binary: String,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub soak: SoakSettings,

    #[serde(default)]
    pub load: LoadSettings,

    #[serde(default)]
    pub benchmark: BenchmarkSettings,

    #[serde(default)]
    pub scalability: ScalabilitySettings,

    #[serde(default)]
    pub stress: StressSettings,

    #[serde(default)]
    pub spike: SpikeSettings,

    #[serde(default)]
    pub security: SecuritySettings,

    #[serde(default)]
    pub github: GitHubSettings,
}

/// Soak test and stability monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoakSettings {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(with = "humantime_serde")]
    pub query_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub resource_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stability_interval: Duration,
    /// Number of equal time windows used for the degradation analysis
    pub windows: usize,
    pub max_p95_ms: f64,
    pub max_p99_ms: f64,
    pub min_success_rate: f64,
    pub max_memory_growth_pct: f64,
    /// Minimum share of successful health probes, 0..=1
    pub min_availability: f64,
    pub degradation_warn_ratio: f64,
    pub degradation_fail_ratio: f64,
    /// Virtual users when the soak is driven by k6
    pub vus: u32,
}

impl Default for SoakSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30 * 60),
            query_interval: Duration::from_secs(10),
            resource_interval: Duration::from_secs(30),
            stability_interval: Duration::from_secs(5),
            windows: 6,
            max_p95_ms: 1000.0,
            max_p99_ms: 2500.0,
            min_success_rate: 0.99,
            max_memory_growth_pct: 25.0,
            min_availability: 0.999,
            degradation_warn_ratio: 1.5,
            degradation_fail_ratio: 2.0,
            vus: 10,
        }
    }
}

/// Open-loop load test settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target_rps: f64,
    pub max_in_flight: usize,
    pub max_p95_ms: f64,
    pub max_p99_ms: f64,
    pub min_success_rate: f64,
    /// Achieved throughput must reach this share of `target_rps`
    pub min_throughput_ratio: f64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            target_rps: 50.0,
            max_in_flight: 200,
            max_p95_ms: 500.0,
            max_p99_ms: 1000.0,
            min_success_rate: 0.99,
            min_throughput_ratio: 0.9,
        }
    }
}

/// Query benchmark settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSettings {
    pub warmup: u32,
    pub iterations: u32,
    pub simple_p95_ms: f64,
    pub moderate_p95_ms: f64,
    pub complex_p95_ms: f64,
    /// Previous benchmark JSON report to compare against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<PathBuf>,
    pub regression_tolerance_pct: f64,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            warmup: 3,
            iterations: 20,
            simple_p95_ms: 100.0,
            moderate_p95_ms: 500.0,
            complex_p95_ms: 2000.0,
            baseline: None,
            regression_tolerance_pct: 20.0,
        }
    }
}

/// Dimension a scalability run varies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDimension {
    /// Concurrent queries in flight
    Concurrency,
    /// Hours covered by a range query
    TimeRange,
    /// `k` of a `topk` over many series
    Cardinality,
}

impl ScalingDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concurrency => "concurrency",
            Self::TimeRange => "time_range",
            Self::Cardinality => "cardinality",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Concurrency => "concurrent queries",
            Self::TimeRange => "hours",
            Self::Cardinality => "series",
        }
    }
}

impl std::str::FromStr for ScalingDimension {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "concurrency" => Ok(Self::Concurrency),
            "time_range" | "timerange" => Ok(Self::TimeRange),
            "cardinality" => Ok(Self::Cardinality),
            _ => Err(AppError::parse(format!("Unknown scaling dimension: {}", s))),
        }
    }
}

/// Scalability test settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalabilitySettings {
    pub dimension: ScalingDimension,
    pub levels: Vec<u32>,
    /// Rounds measured at each level
    pub samples: u32,
    /// Query used for the concurrency dimension
    pub query: String,
    /// Selector `topk` ranges over for the cardinality dimension
    pub cardinality_selector: String,
    pub max_error_rate: f64,
    pub max_p95_ms: f64,
    /// A breaking point must not occur at or below this level
    pub min_breaking_level: u32,
}

impl Default for ScalabilitySettings {
    fn default() -> Self {
        Self {
            dimension: ScalingDimension::Concurrency,
            levels: vec![1, 2, 4, 8, 16, 32],
            samples: 5,
            query: "sum by (job) (rate(prometheus_http_requests_total[5m]))".to_string(),
            cardinality_selector: "{__name__=~\"prometheus_.+\"}".to_string(),
            max_error_rate: 0.05,
            max_p95_ms: 2000.0,
            min_breaking_level: 8,
        }
    }
}

/// Concurrency ramp stress settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressSettings {
    pub start_concurrency: u32,
    pub step: u32,
    pub max_concurrency: u32,
    pub rounds: u32,
    pub stop_on_break: bool,
    pub max_error_rate: f64,
    pub max_p95_ms: f64,
    pub min_stable_concurrency: u32,
}

impl Default for StressSettings {
    fn default() -> Self {
        Self {
            start_concurrency: 5,
            step: 5,
            max_concurrency: 100,
            rounds: 3,
            stop_on_break: true,
            max_error_rate: 0.05,
            max_p95_ms: 2000.0,
            min_stable_concurrency: 20,
        }
    }
}

/// Spike test settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeSettings {
    pub baseline_concurrency: u32,
    pub spike_concurrency: u32,
    pub baseline_rounds: u32,
    pub spike_rounds: u32,
    /// Recovered once p95 is within this multiple of the baseline p95
    pub recovery_tolerance: f64,
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub recovery_poll_interval: Duration,
    pub max_spike_error_rate: f64,
}

impl Default for SpikeSettings {
    fn default() -> Self {
        Self {
            baseline_concurrency: 2,
            spike_concurrency: 50,
            baseline_rounds: 5,
            spike_rounds: 5,
            recovery_tolerance: 1.5,
            recovery_timeout: Duration::from_secs(60),
            recovery_poll_interval: Duration::from_secs(2),
            max_spike_error_rate: 0.1,
        }
    }
}

/// Security verification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub expect_tls: bool,
    pub expect_auth: bool,
    pub allow_admin_api: bool,
    pub allow_lifecycle_api: bool,
    /// Lowest severity of a failed finding that fails the run
    pub fail_on: Severity,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            expect_tls: false,
            expect_auth: false,
            allow_admin_api: false,
            allow_lifecycle_api: false,
            fail_on: Severity::High,
        }
    }
}

/// GitHub analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `owner/name` pairs
    pub repositories: Vec<String>,
    pub lookback_days: u32,
    pub max_pages: u32,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: crate::defaults::DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
            repositories: Vec::new(),
            lookback_days: 90,
            max_pages: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            timeout_seconds: default_timeout_secs(),
            username: None,
            password: None,
            bearer_token: None,
            self_job: default_self_job(),
            output_dir: default_output_dir(),
            formats: default_formats(),
            queries: default_queries(),
            k6_binary: default_k6_binary(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
            soak: SoakSettings::default(),
            load: LoadSettings::default(),
            benchmark: BenchmarkSettings::default(),
            scalability: ScalabilitySettings::default(),
            stress: StressSettings::default(),
            spike: SpikeSettings::default(),
            security: SecuritySettings::default(),
            github: GitHubSettings::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Load a YAML configuration file; missing fields take their defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
            .map_err(|e| AppError::config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.prometheus_url)
            .map_err(|e| AppError::config(format!("Invalid Prometheus URL '{}': {}", self.prometheus_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::config(format!(
                "Prometheus URL must use http or https: {}",
                self.prometheus_url
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }
        if self.timeout_seconds > crate::defaults::MAX_TIMEOUT_SECS {
            return Err(AppError::config(format!(
                "Timeout cannot exceed {} seconds",
                crate::defaults::MAX_TIMEOUT_SECS
            )));
        }

        if self.username.is_some() && self.password.is_none() {
            return Err(AppError::config("A username was given without a password"));
        }
        if self.username.is_some() && self.bearer_token.is_some() {
            return Err(AppError::config("Basic auth and a bearer token are mutually exclusive"));
        }

        if self.formats.is_empty() {
            return Err(AppError::config("At least one report format is required"));
        }

        self.validate_queries()?;
        self.validate_soak()?;
        self.validate_load()?;
        self.validate_benchmark()?;
        self.validate_scalability()?;
        self.validate_stress()?;
        self.validate_github()?;

        Ok(())
    }

    fn validate_queries(&self) -> Result<()> {
        if self.queries.is_empty() {
            return Err(AppError::config("The query set cannot be empty"));
        }
        for query in &self.queries {
            if query.name.trim().is_empty() || query.promql.trim().is_empty() {
                return Err(AppError::config("Queries need a name and a PromQL expression"));
            }
            if let QueryKind::Range { range, step } = &query.kind {
                if range.is_zero() || step.is_zero() {
                    return Err(AppError::config(format!(
                        "Range query '{}' needs a non-zero range and step",
                        query.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_soak(&self) -> Result<()> {
        let soak = &self.soak;
        non_zero_duration("soak.duration", soak.duration)?;
        non_zero_duration("soak.query_interval", soak.query_interval)?;
        non_zero_duration("soak.resource_interval", soak.resource_interval)?;
        non_zero_duration("soak.stability_interval", soak.stability_interval)?;
        if soak.windows < 2 {
            return Err(AppError::config("soak.windows must be at least 2"));
        }
        positive("soak.max_p95_ms", soak.max_p95_ms)?;
        positive("soak.max_p99_ms", soak.max_p99_ms)?;
        rate("soak.min_success_rate", soak.min_success_rate)?;
        rate("soak.min_availability", soak.min_availability)?;
        positive("soak.max_memory_growth_pct", soak.max_memory_growth_pct)?;
        if soak.degradation_warn_ratio <= 1.0 || soak.degradation_fail_ratio < soak.degradation_warn_ratio {
            return Err(AppError::config(
                "soak degradation ratios must satisfy 1 < warn_ratio <= fail_ratio",
            ));
        }
        if soak.vus == 0 {
            return Err(AppError::config("soak.vus must be greater than 0"));
        }
        Ok(())
    }

    fn validate_load(&self) -> Result<()> {
        let load = &self.load;
        non_zero_duration("load.duration", load.duration)?;
        positive("load.target_rps", load.target_rps)?;
        if load.max_in_flight == 0 {
            return Err(AppError::config("load.max_in_flight must be greater than 0"));
        }
        positive("load.max_p95_ms", load.max_p95_ms)?;
        positive("load.max_p99_ms", load.max_p99_ms)?;
        rate("load.min_success_rate", load.min_success_rate)?;
        rate("load.min_throughput_ratio", load.min_throughput_ratio)?;
        Ok(())
    }

    fn validate_benchmark(&self) -> Result<()> {
        let bench = &self.benchmark;
        if bench.iterations == 0 {
            return Err(AppError::config("benchmark.iterations must be greater than 0"));
        }
        positive("benchmark.simple_p95_ms", bench.simple_p95_ms)?;
        positive("benchmark.moderate_p95_ms", bench.moderate_p95_ms)?;
        positive("benchmark.complex_p95_ms", bench.complex_p95_ms)?;
        positive("benchmark.regression_tolerance_pct", bench.regression_tolerance_pct)?;
        Ok(())
    }

    fn validate_scalability(&self) -> Result<()> {
        let scale = &self.scalability;
        sorted_levels("scalability.levels", &scale.levels)?;
        if scale.samples == 0 {
            return Err(AppError::config("scalability.samples must be greater than 0"));
        }
        rate("scalability.max_error_rate", scale.max_error_rate)?;
        positive("scalability.max_p95_ms", scale.max_p95_ms)?;
        Ok(())
    }

    fn validate_stress(&self) -> Result<()> {
        let stress = &self.stress;
        if stress.start_concurrency == 0 || stress.step == 0 || stress.rounds == 0 {
            return Err(AppError::config("stress start_concurrency, step and rounds must be greater than 0"));
        }
        if stress.max_concurrency < stress.start_concurrency {
            return Err(AppError::config("stress.max_concurrency must be at least start_concurrency"));
        }
        rate("stress.max_error_rate", stress.max_error_rate)?;
        positive("stress.max_p95_ms", stress.max_p95_ms)?;

        let spike = &self.spike;
        if spike.baseline_concurrency == 0 || spike.baseline_rounds == 0 || spike.spike_rounds == 0 {
            return Err(AppError::config("spike concurrency and rounds must be greater than 0"));
        }
        if spike.spike_concurrency <= spike.baseline_concurrency {
            return Err(AppError::config("spike.spike_concurrency must exceed baseline_concurrency"));
        }
        if spike.recovery_tolerance < 1.0 {
            return Err(AppError::config("spike.recovery_tolerance must be at least 1.0"));
        }
        non_zero_duration("spike.recovery_timeout", spike.recovery_timeout)?;
        non_zero_duration("spike.recovery_poll_interval", spike.recovery_poll_interval)?;
        rate("spike.max_spike_error_rate", spike.max_spike_error_rate)?;
        Ok(())
    }

    fn validate_github(&self) -> Result<()> {
        url::Url::parse(&self.github.api_url)
            .map_err(|e| AppError::config(format!("Invalid GitHub API URL '{}': {}", self.github.api_url, e)))?;
        if self.github.lookback_days == 0 || self.github.max_pages == 0 {
            return Err(AppError::config("github lookback_days and max_pages must be greater than 0"));
        }
        for repo in &self.github.repositories {
            parse_repository(repo)?;
        }
        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PROMETHEUS_URL") {
            self.prometheus_url = url.trim().to_string();
        }

        if let Ok(timeout) = std::env::var("PROMETHEUS_TIMEOUT_SECONDS") {
            self.timeout_seconds = timeout.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid PROMETHEUS_TIMEOUT_SECONDS value '{}': {}", timeout, e))
            })?;
        }

        if let Ok(username) = std::env::var("PROMETHEUS_USERNAME") {
            self.username = non_empty(username);
        }
        if let Ok(password) = std::env::var("PROMETHEUS_PASSWORD") {
            self.password = non_empty(password);
        }
        if let Ok(token) = std::env::var("PROMETHEUS_BEARER_TOKEN") {
            self.bearer_token = non_empty(token);
        }

        if let Ok(job) = std::env::var("PROMETHEUS_SELF_JOB") {
            self.self_job = job.trim().to_string();
        }

        if let Ok(dir) = std::env::var("HARNESS_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir.trim());
        }

        if let Ok(formats) = std::env::var("HARNESS_FORMATS") {
            self.formats = ReportFormat::parse_list(&formats)
                .map_err(|e| AppError::config(format!("Invalid HARNESS_FORMATS value '{}': {}", formats, e)))?;
        }

        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.github.token = non_empty(token);
        }
        if let Ok(api_url) = std::env::var("GITHUB_API_URL") {
            self.github.api_url = api_url.trim().to_string();
        }

        if let Ok(k6) = std::env::var("K6_BINARY") {
            self.k6_binary = k6.trim().to_string();
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = enable_color.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e))
            })?;
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.enable_color = false;
        }

        Ok(())
    }
}

/// Split `owner/name` into its parts
pub fn parse_repository(repo: &str) -> Result<(String, String)> {
    match repo.trim().split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(AppError::config(format!("Repository must look like owner/name, got '{}'", repo))),
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn non_zero_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(AppError::config(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(AppError::config(format!("{} must be a positive number, got {}", name, value)));
    }
    Ok(())
}

fn rate(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AppError::config(format!("{} must be between 0 and 1, got {}", name, value)));
    }
    Ok(())
}

fn sorted_levels(name: &str, levels: &[u32]) -> Result<()> {
    if levels.is_empty() {
        return Err(AppError::config(format!("{} cannot be empty", name)));
    }
    if levels.contains(&0) {
        return Err(AppError::config(format!("{} cannot contain 0", name)));
    }
    if levels.windows(2).any(|w| w[0] >= w[1]) {
        return Err(AppError::config(format!("{} must be strictly increasing", name)));
    }
    Ok(())
}

// Default value functions for serde
fn default_prometheus_url() -> String {
    crate::defaults::DEFAULT_PROMETHEUS_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_self_job() -> String {
    crate::defaults::DEFAULT_SELF_JOB.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_OUTPUT_DIR)
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Json, ReportFormat::Markdown]
}

fn default_k6_binary() -> String {
    crate::defaults::DEFAULT_K6_BINARY.to_string()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
