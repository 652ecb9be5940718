//! Advisory configuration checks
//!
//! `Config::validate` rejects configurations that cannot run. The checks here
//! only produce warnings for settings that run but are likely mistakes.

use crate::{
    cli::Command,
    error::Result,
    models::{Config, ScalingDimension},
};
use colored::*;
use std::time::Duration;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Run `Config::validate` and collect warnings relevant to `command`
    pub fn validate_comprehensive(config: &Config, command: &Command) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Self::validate_connection(config);
        warnings.extend(match command {
            Command::Soak(_) => Self::validate_soak(config),
            Command::Load(_) => Self::validate_load(config),
            Command::Scale(_) => Self::validate_scalability(config),
            Command::Stress(_) | Command::Spike(_) => Self::validate_stress(config),
            Command::Security(_) => Self::validate_security(config),
            Command::Github(_) => Self::validate_github(config),
            _ => Vec::new(),
        });

        Ok(warnings)
    }

    fn validate_connection(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let plain_http = config.prometheus_url.starts_with("http://");
        if plain_http && (config.password.is_some() || config.bearer_token.is_some()) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Credentials will be sent in clear text to {}", config.prometheus_url),
            ));
        }

        if config.timeout_seconds < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Timeout of {}s may fail heavy range queries", config.timeout_seconds),
            ));
        } else if config.timeout_seconds > 120 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Long timeout of {}s will slow down failure detection", config.timeout_seconds),
            ));
        }

        warnings
    }

    fn validate_soak(config: &Config) -> Vec<ValidationWarning> {
        let soak = &config.soak;
        let mut warnings = Vec::new();

        let rounds = soak.duration.as_secs_f64() / soak.query_interval.as_secs_f64();
        if rounds < (soak.windows * 3) as f64 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Only {:.0} query rounds for {} windows, degradation analysis will be noisy",
                    rounds, soak.windows
                ),
            ));
        }
        if soak.duration < Duration::from_secs(15 * 60) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Soak of {} is short for spotting memory growth",
                    humantime::format_duration(soak.duration)
                ),
            ));
        }
        if soak.resource_interval > soak.duration / 2 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Fewer than two resource samples will be taken".to_string(),
            ));
        }

        warnings
    }

    fn validate_load(config: &Config) -> Vec<ValidationWarning> {
        let load = &config.load;
        let mut warnings = Vec::new();

        // Little's law: in-flight = rate x latency
        let needed = load.target_rps * config.timeout().as_secs_f64();
        if (load.max_in_flight as f64) < needed {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "max_in_flight {} may cap throughput if requests approach the {}s timeout",
                    load.max_in_flight, config.timeout_seconds
                ),
            ));
        }
        if load.target_rps > 1000.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("{} rps may saturate the harness before Prometheus; consider --k6", load.target_rps),
            ));
        }

        warnings
    }

    fn validate_scalability(config: &Config) -> Vec<ValidationWarning> {
        let scale = &config.scalability;
        let mut warnings = Vec::new();

        if scale.levels.len() < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Fewer than three levels cannot classify the scaling behavior reliably".to_string(),
            ));
        }
        if scale.dimension == ScalingDimension::TimeRange && scale.levels.iter().any(|&h| h > 24 * 90) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Time ranges beyond 90 days probably exceed the retention".to_string(),
            ));
        }

        warnings
    }

    fn validate_stress(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.stress.min_stable_concurrency > config.stress.max_concurrency {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "min_stable_concurrency {} is above max_concurrency {}, the check cannot pass",
                    config.stress.min_stable_concurrency, config.stress.max_concurrency
                ),
            ));
        }
        if config.spike.recovery_poll_interval >= config.spike.recovery_timeout {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Spike recovery is polled at most once before the timeout".to_string(),
            ));
        }

        warnings
    }

    fn validate_security(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let has_credentials = config.username.is_some() || config.bearer_token.is_some();

        if config.security.expect_auth && !has_credentials {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Authentication is expected but no credentials are configured; authenticated checks will be skipped"
                    .to_string(),
            ));
        }
        if config.security.expect_tls && config.prometheus_url.starts_with("http://") {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "TLS is expected but the Prometheus URL uses http".to_string(),
            ));
        }

        warnings
    }

    fn validate_github(config: &Config) -> Vec<ValidationWarning> {
        let github = &config.github;
        let mut warnings = Vec::new();

        if github.token.is_none() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "No GITHUB_TOKEN set, the API allows 60 requests per hour".to_string(),
            ));
        }
        // five endpoints per repository
        let requests = github.repositories.len() as u64 * 5 * github.max_pages as u64;
        if requests > 1000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Up to {} API requests may be made", requests),
            ));
        }

        warnings
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Info => Color::Blue,
            Self::Warning => Color::Yellow,
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()).bold(), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config, command: &Command) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config, command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{GitHubArgs, LoadArgs, SecurityArgs, SoakArgs};

    fn has(warnings: &[ValidationWarning], needle: &str) -> bool {
        warnings.iter().any(|w| w.message.contains(needle))
    }

    #[test]
    fn test_default_config_has_no_soak_warnings() {
        let warnings = validate_config(&Config::default(), &Command::Soak(SoakArgs::default())).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_short_soak_warnings() {
        let mut config = Config::default();
        config.soak.duration = Duration::from_secs(60);
        config.soak.resource_interval = Duration::from_secs(45);
        let warnings = validate_config(&config, &Command::Soak(SoakArgs::default())).unwrap();
        assert!(has(&warnings, "degradation analysis will be noisy"));
        assert!(has(&warnings, "short for spotting memory growth"));
        assert!(has(&warnings, "Fewer than two resource samples"));
    }

    #[test]
    fn test_clear_text_credentials() {
        let mut config = Config::default();
        config.bearer_token = Some("t".to_string());
        let warnings = validate_config(&config, &Command::Load(LoadArgs::default())).unwrap();
        assert!(has(&warnings, "clear text"));
        assert_eq!(warnings[0].level, ValidationLevel::Warning);
    }

    #[test]
    fn test_security_expectations() {
        let mut config = Config::default();
        config.security.expect_auth = true;
        config.security.expect_tls = true;
        let warnings = validate_config(&config, &Command::Security(SecurityArgs::default())).unwrap();
        assert!(has(&warnings, "no credentials are configured"));
        assert!(has(&warnings, "uses http"));
    }

    #[test]
    fn test_github_without_token() {
        let mut config = Config::default();
        config.github.repositories = vec!["a/b".to_string()];
        let warnings = validate_config(&config, &Command::Github(GitHubArgs::default())).unwrap();
        assert!(has(&warnings, "60 requests per hour"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut config = Config::default();
        config.timeout_seconds = 0;
        assert!(validate_config(&config, &Command::Guide { topic: None }).is_err());
    }

    #[test]
    fn test_warning_format() {
        let warning = ValidationWarning::new(ValidationLevel::Info, "hello".to_string());
        assert_eq!(warning.format(false), "[INFO] hello");
    }
}
