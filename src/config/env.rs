//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::output::ReportFormat;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        if Path::new(".env").exists() {
            dotenv::from_filename(".env").map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                println!("Loaded configuration from .env file");
            }
        } else if debug {
            println!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Prometheus Test Harness Configuration
#
# Values here override the YAML config file and are overridden by
# command-line flags.

# Prometheus under test
# PROMETHEUS_URL=http://localhost:9090

# Request timeout in seconds (1-300)
# PROMETHEUS_TIMEOUT_SECONDS=30

# Basic auth, mutually exclusive with the bearer token
# PROMETHEUS_USERNAME=admin
# PROMETHEUS_PASSWORD=secret
# PROMETHEUS_BEARER_TOKEN=

# job label Prometheus scrapes itself under
# PROMETHEUS_SELF_JOB=prometheus

# Where reports go and in which formats (json, markdown, csv)
# HARNESS_OUTPUT_DIR=reports
# HARNESS_FORMATS=json,markdown

# GitHub analyzer; anonymous requests are limited to 60 per hour
# GITHUB_TOKEN=
# GITHUB_API_URL=https://api.github.com

# k6 binary used by `soak --k6` and `load --k6`
# K6_BINARY=k6

# Enable colored output (true/false)
# ENABLE_COLOR=true

# YAML configuration file
# PTH_CONFIG=pth.yaml
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::io(format!("Failed to write example .env file {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "PROMETHEUS_URL" | "GITHUB_API_URL" => {
                let parsed = url::Url::parse(value.trim())
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!("{} must use http or https: {}", key, value)));
                }
            }
            "PROMETHEUS_TIMEOUT_SECONDS" => {
                let timeout: u64 = value
                    .trim()
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if timeout == 0 || timeout > crate::defaults::MAX_TIMEOUT_SECS {
                    return Err(AppError::config(format!(
                        "{} must be between 1 and {}, got: {}",
                        key,
                        crate::defaults::MAX_TIMEOUT_SECS,
                        timeout
                    )));
                }
            }
            "HARNESS_FORMATS" => {
                ReportFormat::parse_list(value)
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "ENABLE_COLOR" => {
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            "PROMETHEUS_SELF_JOB" | "K6_BINARY" => {
                if value.trim().is_empty() {
                    return Err(AppError::config(format!("{} cannot be empty", key)));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("PROMETHEUS_URL", "Base URL of the Prometheus under test", "http://prometheus:9090"),
            ("PROMETHEUS_TIMEOUT_SECONDS", "Request timeout in seconds (1-300)", "30"),
            ("PROMETHEUS_USERNAME", "Basic auth user", "admin"),
            ("PROMETHEUS_PASSWORD", "Basic auth password", "secret"),
            ("PROMETHEUS_BEARER_TOKEN", "Bearer token, instead of basic auth", "eyJhbGci..."),
            ("PROMETHEUS_SELF_JOB", "job label of Prometheus' own metrics", "prometheus"),
            ("HARNESS_OUTPUT_DIR", "Report directory", "reports"),
            ("HARNESS_FORMATS", "Comma-separated report formats", "json,markdown,csv"),
            ("GITHUB_TOKEN", "GitHub API token", "ghp_..."),
            ("GITHUB_API_URL", "GitHub API base URL", "https://api.github.com"),
            ("K6_BINARY", "k6 executable", "/usr/local/bin/k6"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate the lines of a .env file
    pub fn check_env_content(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value.trim().trim_matches('"'))
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_content_mentions_every_variable() {
        let content = EnvManager::create_example_env_content();
        for (name, _, _) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("{}=", name)), "{}", name);
        }
        assert!(EnvManager::check_env_content(&content).is_empty());
    }

    #[test]
    fn test_save_example_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("Prometheus Test Harness Configuration"));

        let error = EnvManager::save_example_env_file(Path::new("/nonexistent/dir/.env")).unwrap_err();
        assert_eq!(error.exit_code(), 5);
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("PROMETHEUS_URL", "https://prom.example.com").is_ok());
        assert!(EnvManager::validate_env_var("PROMETHEUS_TIMEOUT_SECONDS", "10").is_ok());
        assert!(EnvManager::validate_env_var("HARNESS_FORMATS", "json,md").is_ok());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "false").is_ok());
        assert!(EnvManager::validate_env_var("SOMETHING_ELSE", "anything").is_ok());

        assert!(EnvManager::validate_env_var("PROMETHEUS_URL", "not-a-url").is_err());
        assert!(EnvManager::validate_env_var("GITHUB_API_URL", "ftp://github").is_err());
        assert!(EnvManager::validate_env_var("PROMETHEUS_TIMEOUT_SECONDS", "0").is_err());
        assert!(EnvManager::validate_env_var("PROMETHEUS_TIMEOUT_SECONDS", "301").is_err());
        assert!(EnvManager::validate_env_var("HARNESS_FORMATS", "xlsx").is_err());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "maybe").is_err());
        assert!(EnvManager::validate_env_var("K6_BINARY", " ").is_err());
    }

    #[test]
    fn test_check_env_content() {
        let warnings = EnvManager::check_env_content(
            "# comment\nPROMETHEUS_URL=\"http://prom:9090\"\nPROMETHEUS_TIMEOUT_SECONDS=900\n\nENABLE_COLOR=yes\n",
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("PROMETHEUS_TIMEOUT_SECONDS"));
    }
}
