//! Configuration parsing from the config file, environment and CLI arguments

use crate::{
    cli::{Cli, Command},
    config::env::EnvManager,
    error::Result,
    models::Config,
};

/// Builds the configuration: defaults, YAML file, .env and environment, CLI
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = match &self.cli.config {
            Some(path) => Config::from_yaml_file(path)?,
            None => Config::default(),
        };

        self.load_env_file()?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    fn load_env_file(&self) -> Result<()> {
        EnvManager::load_env_file(self.cli.debug)
    }

    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(ref url) = cli.prometheus_url {
            config.prometheus_url = url.clone();
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(ref dir) = cli.output_dir {
            config.output_dir = dir.clone();
        }
        if !cli.formats.is_empty() {
            config.formats = cli.formats.clone();
        }
        if cli.no_color {
            config.enable_color = false;
        }

        // CLI-only, a config file may still turn them on
        config.verbose |= cli.verbose;
        config.debug |= cli.debug;

        match &cli.command {
            Command::Soak(args) => {
                let soak = &mut config.soak;
                override_with(&mut soak.duration, args.duration);
                override_with(&mut soak.query_interval, args.query_interval);
                override_with(&mut soak.vus, args.vus);
            }
            Command::Load(args) => {
                let load = &mut config.load;
                override_with(&mut load.target_rps, args.rps);
                override_with(&mut load.duration, args.duration);
                override_with(&mut load.max_in_flight, args.max_in_flight);
            }
            Command::Benchmark(args) => {
                let bench = &mut config.benchmark;
                override_with(&mut bench.iterations, args.iterations);
                override_with(&mut bench.warmup, args.warmup);
                override_with(&mut bench.regression_tolerance_pct, args.tolerance);
                if args.baseline.is_some() {
                    bench.baseline = args.baseline.clone();
                }
            }
            Command::Scale(args) => {
                let scale = &mut config.scalability;
                override_with(&mut scale.dimension, args.dimension);
                override_with(&mut scale.samples, args.samples);
                if !args.levels.is_empty() {
                    scale.levels = args.levels.clone();
                }
            }
            Command::Stress(args) => {
                let stress = &mut config.stress;
                override_with(&mut stress.start_concurrency, args.start);
                override_with(&mut stress.step, args.step);
                override_with(&mut stress.max_concurrency, args.max);
                override_with(&mut stress.rounds, args.rounds);
                if args.no_stop_on_break {
                    stress.stop_on_break = false;
                }
            }
            Command::Spike(args) => {
                let spike = &mut config.spike;
                override_with(&mut spike.baseline_concurrency, args.baseline_concurrency);
                override_with(&mut spike.spike_concurrency, args.spike_concurrency);
                override_with(&mut spike.recovery_timeout, args.recovery_timeout);
            }
            Command::Security(args) => {
                let security = &mut config.security;
                override_with(&mut security.fail_on, args.fail_on);
                security.expect_tls |= args.expect_tls;
                security.expect_auth |= args.expect_auth;
                security.allow_admin_api |= args.allow_admin_api;
                security.allow_lifecycle_api |= args.allow_lifecycle_api;
            }
            Command::Github(args) => {
                let github = &mut config.github;
                if !args.repositories.is_empty() {
                    github.repositories = args.repositories.clone();
                }
                if args.token.is_some() {
                    github.token = args.token.clone();
                }
                if let Some(ref api_url) = args.api_url {
                    github.api_url = api_url.clone();
                }
                override_with(&mut github.lookback_days, args.lookback_days);
                override_with(&mut github.max_pages, args.max_pages);
            }
            Command::GenConfig(_) | Command::EnvExample { .. } | Command::Guide { .. } => {}
        }

        if config.debug {
            println!("Applied CLI overrides to configuration");
            println!(
                "Final config: prometheus_url={}, timeout={}s, enable_color={}",
                config.prometheus_url, config.timeout_seconds, config.enable_color
            );
        }
    }
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let auth = match (&config.username, &config.bearer_token) {
        (Some(user), _) => format!("basic ({})", user),
        (None, Some(_)) => "bearer token".to_string(),
        (None, None) => "none".to_string(),
    };
    let formats: Vec<String> = config.formats.iter().map(|f| f.to_string()).collect();

    let summary = [
        format!("Prometheus URL: {}", config.prometheus_url),
        format!("Timeout: {}s", config.timeout_seconds),
        format!("Authentication: {}", auth),
        format!("Self job: {}", config.self_job),
        format!("Queries: {}", config.queries.len()),
        format!("Output dir: {}", config.output_dir.display()),
        format!("Formats: {}", formats.join(", ")),
        format!("k6 binary: {}", config.k6_binary),
        format!("Color Output: {}", config.enable_color),
        format!("Verbose: {}", config.verbose),
        format!("Debug: {}", config.debug),
    ];

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_LOCK;
    use crate::output::ReportFormat;
    use clap::Parser;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn clear_env() {
        for (name, _, _) in EnvManager::get_supported_env_vars() {
            std::env::remove_var(name);
        }
    }

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let cli = Cli::parse_from([
            "pth",
            "--timeout",
            "5",
            "--no-color",
            "--verbose",
            "soak",
            "--duration",
            "10m",
        ]);
        let config = ConfigParser::new(cli).parse().unwrap();

        assert_eq!(config.timeout_seconds, 5);
        assert!(!config.enable_color);
        assert!(config.verbose);
        assert_eq!(config.soak.duration, Duration::from_secs(600));
        assert_eq!(config.soak.query_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_layer_precedence() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let file = yaml_file(
            "prometheus_url: http://from-yaml:9090\nformats: [csv]\nstress:\n  max_concurrency: 50\n  rounds: 2\n",
        );
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["pth", "--config", path, "stress", "--max", "80"]);
        let config = load_config(cli).unwrap();
        assert_eq!(config.prometheus_url, "http://from-yaml:9090");
        assert_eq!(config.formats, vec![ReportFormat::Csv]);
        assert_eq!(config.stress.max_concurrency, 80);
        assert_eq!(config.stress.rounds, 2);

        std::env::set_var("PROMETHEUS_URL", "http://from-env:9090");
        let cli = Cli::parse_from(["pth", "--config", path, "stress"]);
        assert_eq!(load_config(cli).unwrap().prometheus_url, "http://from-env:9090");

        let cli = Cli::parse_from(["pth", "--config", path, "--prometheus-url", "http://from-cli:9090", "stress"]);
        assert_eq!(load_config(cli).unwrap().prometheus_url, "http://from-cli:9090");

        clear_env();
    }

    #[test]
    fn test_github_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("GITHUB_TOKEN", "from-env");

        let cli = Cli::parse_from(["pth", "github", "tokio-rs/tokio", "--lookback-days", "14"]);
        let config = load_config(cli).unwrap();
        assert_eq!(config.github.repositories, vec!["tokio-rs/tokio"]);
        assert_eq!(config.github.token.as_deref(), Some("from-env"));
        assert_eq!(config.github.lookback_days, 14);

        let cli = Cli::parse_from(["pth", "github", "not-a-repo"]);
        assert_eq!(load_config(cli).unwrap_err().exit_code(), 1);

        clear_env();
    }

    #[test]
    fn test_invalid_config_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let file = yaml_file("timeout_seconds: 0\n");
        let cli = Cli::parse_from(["pth", "--config", file.path().to_str().unwrap(), "benchmark"]);
        let error = load_config(cli).unwrap_err();
        assert_eq!(error.exit_code(), 1);

        let cli = Cli::parse_from(["pth", "--config", "/nonexistent/pth.yaml", "benchmark"]);
        assert!(load_config(cli).is_err());
    }

    #[test]
    fn test_display_config_summary() {
        let mut config = Config::default();
        config.bearer_token = Some("token".to_string());
        let summary = display_config_summary(&config);
        assert!(summary.contains("Prometheus URL: http://localhost:9090"));
        assert!(summary.contains("Authentication: bearer token"));
    }
}
