//! Command-line interface

pub mod help;

pub use help::HelpSystem;

use crate::models::ScalingDimension;
use crate::output::ReportFormat;
use crate::promconfig::SizeTemplate;
use crate::security::Severity;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Prometheus Test Harness - soak, load, stress and security testing for Prometheus
#[derive(Parser, Debug, Clone)]
#[command(name = "pth")]
#[command(version, long_version = crate::LONG_VERSION, about, long_about = None)]
pub struct Cli {
    /// Base URL of the Prometheus under test
    #[arg(long, global = true, value_name = "URL")]
    pub prometheus_url: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// YAML configuration file
    #[arg(short, long, global = true, env = "PTH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory report files are written to
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Report format (can be used multiple times)
    #[arg(long = "format", global = true, value_enum, action = ArgAction::Append)]
    pub formats: Vec<ReportFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Keep a steady query load up for a long period and watch for degradation
    Soak(SoakArgs),
    /// Drive queries at a fixed request rate
    Load(LoadArgs),
    /// Benchmark each query and compare against a previous run
    Benchmark(BenchmarkArgs),
    /// Measure latency along one scaling dimension
    Scale(ScaleArgs),
    /// Ramp concurrency until Prometheus breaks
    Stress(StressArgs),
    /// Hit Prometheus with a sudden burst and time the recovery
    Spike(SpikeArgs),
    /// Verify the security posture of the Prometheus endpoint
    Security(SecurityArgs),
    /// Score the health of GitHub repositories
    Github(GitHubArgs),
    /// Generate a sized Prometheus configuration
    GenConfig(GenConfigArgs),
    /// Print or write an example .env file
    EnvExample {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Show detailed help for a topic (config, env, examples, exit-codes)
    Guide {
        topic: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SoakArgs {
    /// Total soak duration, e.g. "30m" or "2h"
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Interval between query rounds
    #[arg(long, value_parser = parse_duration)]
    pub query_interval: Option<Duration>,

    /// Run the soak through k6 instead of the built-in loop
    #[arg(long)]
    pub k6: bool,

    /// Virtual users for the k6 run
    #[arg(long, requires = "k6")]
    pub vus: Option<u32>,

    /// Skip the health-endpoint stability monitor
    #[arg(long, conflicts_with = "k6")]
    pub no_monitor: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LoadArgs {
    /// Target requests per second
    #[arg(long, value_parser = parse_positive_rate)]
    pub rps: Option<f64>,

    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Cap on requests in flight
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Run the load through k6 instead of the built-in pacer
    #[arg(long)]
    pub k6: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BenchmarkArgs {
    #[arg(long)]
    pub iterations: Option<u32>,

    #[arg(long)]
    pub warmup: Option<u32>,

    /// Previous benchmark JSON report to compare against
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,

    /// Allowed p95 regression against the baseline, in percent
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScaleArgs {
    /// concurrency, time-range or cardinality
    #[arg(long, value_parser = parse_dimension)]
    pub dimension: Option<ScalingDimension>,

    /// Comma-separated levels, e.g. 1,2,4,8
    #[arg(long, value_delimiter = ',')]
    pub levels: Vec<u32>,

    /// Rounds measured at each level
    #[arg(long)]
    pub samples: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StressArgs {
    #[arg(long)]
    pub start: Option<u32>,

    #[arg(long)]
    pub step: Option<u32>,

    #[arg(long)]
    pub max: Option<u32>,

    #[arg(long)]
    pub rounds: Option<u32>,

    /// Keep ramping after the breaking point
    #[arg(long)]
    pub no_stop_on_break: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SpikeArgs {
    #[arg(long)]
    pub baseline_concurrency: Option<u32>,

    #[arg(long)]
    pub spike_concurrency: Option<u32>,

    /// Give up waiting for recovery after this long
    #[arg(long, value_parser = parse_duration)]
    pub recovery_timeout: Option<Duration>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SecurityArgs {
    /// Lowest severity of a failed finding that fails the run
    #[arg(long, value_enum)]
    pub fail_on: Option<Severity>,

    /// Require the endpoint to be served over TLS
    #[arg(long)]
    pub expect_tls: bool,

    /// Require requests without credentials to be rejected
    #[arg(long)]
    pub expect_auth: bool,

    #[arg(long)]
    pub allow_admin_api: bool,

    #[arg(long)]
    pub allow_lifecycle_api: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GitHubArgs {
    /// Repositories as owner/name
    #[arg(value_name = "OWNER/NAME")]
    pub repositories: Vec<String>,

    /// API token (falls back to GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long)]
    pub api_url: Option<String>,

    /// Days of history taken into account
    #[arg(long)]
    pub lookback_days: Option<u32>,

    /// Page limit per endpoint
    #[arg(long)]
    pub max_pages: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct GenConfigArgs {
    /// Deployment size template
    #[arg(long, value_enum, default_value_t = SizeTemplate::Medium)]
    pub size: SizeTemplate,

    /// Write the configuration to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// YAML list of discovered target label sets to run through relabeling
    #[arg(long, value_name = "FILE")]
    pub simulate: Option<PathBuf>,

    /// Scrape job the simulation runs against
    #[arg(long, default_value = "kubernetes-pods")]
    pub job: String,

    /// Split targets across this many Prometheus shards
    #[arg(long, requires = "shard_index")]
    pub shards: Option<u64>,

    /// Shard this configuration is for, 0-based
    #[arg(long, requires = "shards")]
    pub shard_index: Option<u64>,

    /// External label as name=value (can be used multiple times)
    #[arg(long = "external-label", value_parser = parse_label, action = ArgAction::Append)]
    pub external_labels: Vec<(String, String)>,
}

impl Cli {
    /// Validate CLI arguments for conflicts clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.prometheus_url {
            let parsed = url::Url::parse(url).map_err(|e| format!("Invalid Prometheus URL '{}': {}", url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("Prometheus URL must use http or https: {}", url));
            }
        }

        match &self.command {
            Command::Scale(args) => {
                if args.levels.contains(&0) {
                    return Err("--levels cannot contain 0".to_string());
                }
                if args.levels.windows(2).any(|w| w[0] >= w[1]) {
                    return Err("--levels must be strictly increasing".to_string());
                }
            }
            Command::Stress(args) => {
                if let (Some(start), Some(max)) = (args.start, args.max) {
                    if max < start {
                        return Err("--max must be at least --start".to_string());
                    }
                }
            }
            Command::GenConfig(args) => {
                if let (Some(shards), Some(index)) = (args.shards, args.shard_index) {
                    if shards == 0 || index >= shards {
                        return Err(format!("--shard-index must be below --shards ({})", shards));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }

    /// Commands that talk to Prometheus
    pub fn targets_prometheus(&self) -> bool {
        matches!(
            self.command,
            Command::Soak(_)
                | Command::Load(_)
                | Command::Benchmark(_)
                | Command::Scale(_)
                | Command::Stress(_)
                | Command::Spike(_)
                | Command::Security(_)
        )
    }
}

fn parse_timeout(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid timeout: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid timeout: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Timeout must be greater than 0".to_string())
            } else if secs > crate::defaults::MAX_TIMEOUT_SECS {
                Err(format!("Timeout cannot exceed {} seconds", crate::defaults::MAX_TIMEOUT_SECS))
            } else {
                Ok(secs)
            }
        })
}

/// Parse a human duration such as "90s", "30m" or "1h 30m"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(s.trim()).map_err(|e| format!("Invalid duration '{}': {}", s, e))?;
    if duration.is_zero() {
        return Err("Duration must be greater than 0".to_string());
    }
    Ok(duration)
}

fn parse_positive_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|_| format!("Invalid rate: {}", s))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err("Rate must be greater than 0".to_string());
    }
    Ok(rate)
}

fn parse_dimension(s: &str) -> Result<ScalingDimension, String> {
    s.parse().map_err(|e: crate::error::AppError| e.to_string())
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("Expected name=value, got '{}'", s)),
    }
}

/// Check if the terminal supports color output
pub fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "pth",
            "load",
            "--rps",
            "25",
            "--prometheus-url",
            "http://prom:9090",
            "--format",
            "json",
            "--format",
            "csv",
            "--no-color",
        ]);

        assert_eq!(cli.prometheus_url.as_deref(), Some("http://prom:9090"));
        assert_eq!(cli.formats, vec![ReportFormat::Json, ReportFormat::Csv]);
        assert!(cli.no_color);
        assert!(!cli.use_colors());
        match cli.command {
            Command::Load(args) => assert_eq!(args.rps, Some(25.0)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_soak_durations() {
        let cli = Cli::parse_from(["pth", "soak", "--duration", "1h 30m", "--query-interval", "15s"]);
        match cli.command {
            Command::Soak(args) => {
                assert_eq!(args.duration, Some(Duration::from_secs(5400)));
                assert_eq!(args.query_interval, Some(Duration::from_secs(15)));
                assert!(!args.k6);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_soak_monitor_conflicts_with_k6() {
        assert!(Cli::try_parse_from(["pth", "soak", "--k6", "--no-monitor"]).is_err());
        assert!(Cli::try_parse_from(["pth", "soak", "--vus", "5"]).is_err());
    }

    #[test]
    fn test_scale_levels() {
        let cli = Cli::parse_from(["pth", "scale", "--dimension", "time-range", "--levels", "1,6,24"]);
        assert!(cli.validate().is_ok());
        match &cli.command {
            Command::Scale(args) => {
                assert_eq!(args.dimension, Some(ScalingDimension::TimeRange));
                assert_eq!(args.levels, vec![1, 6, 24]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let unsorted = Cli::parse_from(["pth", "scale", "--levels", "4,2"]);
        assert!(unsorted.validate().is_err());
        assert!(Cli::try_parse_from(["pth", "scale", "--dimension", "memory"]).is_err());
    }

    #[test]
    fn test_security_and_github_args() {
        let cli = Cli::parse_from(["pth", "security", "--fail-on", "medium", "--expect-tls"]);
        match cli.command {
            Command::Security(args) => {
                assert_eq!(args.fail_on, Some(Severity::Medium));
                assert!(args.expect_tls);
                assert!(!args.expect_auth);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["pth", "github", "rust-lang/rust", "tokio-rs/tokio", "--lookback-days", "30"]);
        match cli.command {
            Command::Github(args) => {
                assert_eq!(args.repositories.len(), 2);
                assert_eq!(args.lookback_days, Some(30));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_gen_config_args() {
        let cli = Cli::parse_from([
            "pth",
            "gen-config",
            "--size",
            "xlarge",
            "--shards",
            "3",
            "--shard-index",
            "1",
            "--external-label",
            "cluster=eu-1",
        ]);
        assert!(cli.validate().is_ok());
        assert!(!cli.targets_prometheus());
        match cli.command {
            Command::GenConfig(args) => {
                assert_eq!(args.size, SizeTemplate::XLarge);
                assert_eq!(args.job, "kubernetes-pods");
                assert_eq!(args.external_labels, vec![("cluster".to_string(), "eu-1".to_string())]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["pth", "gen-config", "--shards", "3"]).is_err());
        let out_of_range = Cli::parse_from(["pth", "gen-config", "--shards", "2", "--shard-index", "2"]);
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_invalid_prometheus_url() {
        let cli = Cli::parse_from(["pth", "security", "--prometheus-url", "ftp://prom"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_color_support_detection() {
        let _guard = crate::config::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("NO_COLOR", "1");
        assert!(!supports_color());
        std::env::remove_var("NO_COLOR");
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(parse_timeout("10").unwrap(), 10);
        assert_eq!(parse_timeout("300").unwrap(), 300);
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("301").is_err());
        assert!(parse_timeout("+5").is_err());
        assert!(parse_timeout("abc").is_err());
    }

    #[test]
    fn test_duration_and_label_parsing() {
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_positive_rate("-1").is_err());
        assert!(parse_label("novalue").is_err());
        assert_eq!(parse_label("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
    }
}
