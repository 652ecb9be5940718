//! Main application orchestration and execution

use crate::{
    cli::{Cli, Command, GenConfigArgs, HelpSystem, LoadArgs, SoakArgs},
    client::{Credentials, PrometheusApi, PrometheusClient},
    config::{display_config_summary, load_config, validate_config, EnvManager},
    endurance::{run_soak_with_monitor, K6SoakRunner, SoakTester, StabilityMonitor},
    error::{AppError, Result},
    github::{GitHubClient, RepositoryAnalyzer},
    k6::K6Runner,
    load::{run_k6_load, LoadTester},
    logging::LoggerFactory,
    models::{CheckLevel, Config, Verdict},
    output::{ConsoleFormatter, Report, ReportWriter},
    performance::QueryBenchmark,
    promconfig::{load_targets, simulate_job, ConfigGenerator, TargetOutcome},
    scalability::{run_scalability, ScalingDimensionTester},
    security::SecurityVerifier,
    stress::{ConcurrentQueryStressTester, SpikeTester},
};
use colored::*;
use std::path::Path;
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance, rejecting conflicting arguments
    pub fn new(cli: Cli) -> Result<Self> {
        cli.validate().map_err(AppError::config)?;
        Ok(Self { cli })
    }

    /// Run the selected command
    pub async fn run(self) -> Result<()> {
        match &self.cli.command {
            Command::EnvExample { output } => return write_env_example(output.as_deref()),
            Command::Guide { topic } => return self.show_guide(topic.as_deref()),
            Command::GenConfig(args) => return self.generate_config(args),
            _ => {}
        }

        let config = load_config(self.cli.clone())?;
        let warnings = validate_config(&config, &self.cli.command)?;

        if config.debug {
            println!("{} {}", crate::PKG_NAME, crate::LONG_VERSION);
            println!("\nConfiguration Summary:");
            println!("{}\n", display_config_summary(&config));
        }

        if !warnings.is_empty() {
            eprintln!("Configuration Warnings:");
            for warning in &warnings {
                eprintln!("  {}", warning.format(config.enable_color));
            }
            eprintln!();
        }

        let factory = LoggerFactory::new(config.clone());
        let logger = factory.create_logger("pth").await;
        let operation = command_name(&self.cli.command);
        let correlation_id = logger.start_operation(operation).await;

        let result = self.dispatch(&config, &factory).await;

        logger.end_operation(&correlation_id, operation, result.is_ok()).await;
        result
    }

    async fn dispatch(&self, config: &Config, factory: &LoggerFactory) -> Result<()> {
        let queries = config.queries.clone();

        match &self.cli.command {
            Command::Soak(args) => self.run_soak(config, args, factory).await,
            Command::Load(args) => self.run_load(config, args, factory).await,
            Command::Benchmark(_) => {
                let api = prometheus_api(config, factory).await?;
                let logger = factory.create_logger("benchmark").await;
                let result = QueryBenchmark::new(api, config.benchmark.clone(), queries, logger).run().await?;
                finish(config, &result)
            }
            Command::Scale(_) => {
                let api = prometheus_api(config, factory).await?;
                let logger = factory.create_logger("scalability").await;
                let tester = ScalingDimensionTester::new(api, config.scalability.clone(), logger);
                let curve = run_scalability(&tester).await?;
                finish(config, &curve)
            }
            Command::Stress(_) => {
                let api = prometheus_api(config, factory).await?;
                let logger = factory.create_logger("stress").await;
                let result = ConcurrentQueryStressTester::new(api, config.stress.clone(), queries, logger)
                    .run()
                    .await?;
                finish(config, &result)
            }
            Command::Spike(_) => {
                let api = prometheus_api(config, factory).await?;
                let logger = factory.create_logger("spike").await;
                let result = SpikeTester::new(api, config.spike.clone(), queries, logger).run().await?;
                finish(config, &result)
            }
            Command::Security(_) => {
                let api = prometheus_api(config, factory).await?;
                let logger = factory.create_logger("security").await;
                let has_credentials = Credentials::from_config(config) != Credentials::None;
                let report = SecurityVerifier::new(api, config.security.clone(), has_credentials, logger)
                    .run()
                    .await?;
                finish(config, &report)
            }
            Command::Github(_) => self.run_github(config, factory).await,
            Command::GenConfig(_) | Command::EnvExample { .. } | Command::Guide { .. } => {
                Err(AppError::internal("Command does not need a test configuration"))
            }
        }
    }

    async fn run_soak(&self, config: &Config, args: &SoakArgs, factory: &LoggerFactory) -> Result<()> {
        let logger = factory.create_logger("soak").await;

        if args.k6 {
            let runner = K6Runner::locate(&config.k6_binary).await?;
            let report = K6SoakRunner::new(
                runner,
                config.soak.clone(),
                config.queries.clone(),
                config.prometheus_url.clone(),
                Credentials::from_config(config),
                config.output_dir.clone(),
                logger,
            )
            .run()
            .await?;
            return finish(config, &report);
        }

        let api = prometheus_api(config, factory).await?;
        let tester = SoakTester::new(
            api.clone(),
            config.soak.clone(),
            config.queries.clone(),
            config.self_job.clone(),
            logger,
        );

        let result = if args.no_monitor {
            tester.run().await?
        } else {
            let monitor = StabilityMonitor::new(
                api,
                config.soak.stability_interval,
                config.soak.duration,
                factory.create_logger("stability").await,
            );
            run_soak_with_monitor(&tester, &monitor, config.soak.min_availability).await?
        };

        finish(config, &result)
    }

    async fn run_load(&self, config: &Config, args: &LoadArgs, factory: &LoggerFactory) -> Result<()> {
        let logger = factory.create_logger("load").await;

        if args.k6 {
            let runner = K6Runner::locate(&config.k6_binary).await?;
            let report = run_k6_load(
                &runner,
                &config.load,
                &config.queries,
                &config.prometheus_url,
                &Credentials::from_config(config),
                &config.output_dir,
                &logger,
            )
            .await?;
            return finish(config, &report);
        }

        let api = prometheus_api(config, factory).await?;
        let result = LoadTester::new(api, config.load.clone(), config.queries.clone(), logger)
            .run()
            .await?;
        finish(config, &result)
    }

    async fn run_github(&self, config: &Config, factory: &LoggerFactory) -> Result<()> {
        if config.github.repositories.is_empty() {
            return Err(AppError::config(
                "No repositories given; pass owner/name arguments or set github.repositories in the config file",
            ));
        }

        let client = GitHubClient::new(&config.github, config.timeout(), factory.create_logger("github-http").await)?;
        let analyzer = RepositoryAnalyzer::new(
            client,
            config.github.lookback_days,
            factory.create_logger("github").await,
        );
        let report = analyzer.analyze_all(&config.github.repositories).await?;
        finish(config, &report)
    }

    fn show_guide(&self, topic: Option<&str>) -> Result<()> {
        let help_system = HelpSystem::new();
        let use_colors = self.cli.use_colors();

        match topic {
            None => println!("{}", help_system.display_main_help(use_colors)),
            Some(topic) => {
                let help = help_system.display_topic_help(topic, use_colors).ok_or_else(|| {
                    AppError::validation(format!(
                        "Unknown help topic '{}', available topics: {}",
                        topic,
                        crate::cli::help::TOPICS.join(", ")
                    ))
                })?;
                println!("{}", help);
            }
        }
        Ok(())
    }

    fn generate_config(&self, args: &GenConfigArgs) -> Result<()> {
        let mut generator = ConfigGenerator::new(args.size);
        if let (Some(shards), Some(index)) = (args.shards, args.shard_index) {
            generator = generator.with_sharding(shards, index)?;
        }
        for (name, value) in &args.external_labels {
            generator = generator.with_external_label(name, value);
        }

        let jobs = crate::promconfig::default_jobs();
        let yaml = generator.render(&jobs)?;

        match &args.output {
            Some(path) => {
                std::fs::write(path, &yaml)
                    .map_err(|e| AppError::io(format!("Failed to write {}: {}", path.display(), e)))?;
                println!("Prometheus configuration ({} template) written to {}", args.size, path.display());
            }
            None => print!("{}", yaml),
        }

        if let Some(ref targets_path) = args.simulate {
            let config = generator.generate(&jobs)?;
            let targets = load_targets(targets_path)?;
            let outcomes = simulate_job(&config, &args.job, &targets)?;
            // keep stdout parseable as YAML when the config went there
            let summary = format_simulation(&args.job, &outcomes, self.cli.use_colors());
            if args.output.is_some() {
                println!("{}", summary);
            } else {
                eprintln!("{}", summary);
            }
        }

        Ok(())
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Soak(_) => "soak",
        Command::Load(_) => "load",
        Command::Benchmark(_) => "benchmark",
        Command::Scale(_) => "scale",
        Command::Stress(_) => "stress",
        Command::Spike(_) => "spike",
        Command::Security(_) => "security",
        Command::Github(_) => "github",
        Command::GenConfig(_) => "gen-config",
        Command::EnvExample { .. } => "env-example",
        Command::Guide { .. } => "guide",
    }
}

async fn prometheus_api(config: &Config, factory: &LoggerFactory) -> Result<Arc<dyn PrometheusApi>> {
    let client = PrometheusClient::from_config(config)?.with_request_logger(factory.create_request_logger().await);
    Ok(Arc::new(client))
}

/// Print the summary, write the report files and map a failed verdict to an error
fn finish<R: Report>(config: &Config, report: &R) -> Result<()> {
    let formatter = ConsoleFormatter::new(config.enable_color);
    println!("{}", formatter.render(report));

    let written = ReportWriter::new(&config.output_dir).write(report, &config.formats)?;
    for path in &written {
        println!("Report written: {}", path.display());
    }

    match report.verdict() {
        Verdict::Fail => {
            let failed: Vec<&str> = report
                .checks()
                .iter()
                .filter(|check| !check.passed && check.level == CheckLevel::Required)
                .map(|check| check.name.as_str())
                .collect();
            Err(AppError::test_execution(format!(
                "{} failed: {}",
                report.title(),
                failed.join(", ")
            )))
        }
        Verdict::Warn | Verdict::Pass => Ok(()),
    }
}

fn write_env_example(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            EnvManager::save_example_env_file(path)?;
            println!("Example environment file written to {}", path.display());
        }
        None => print!("{}", EnvManager::create_example_env_content()),
    }
    Ok(())
}

fn format_simulation(job: &str, outcomes: &[TargetOutcome], use_colors: bool) -> String {
    let kept = outcomes.iter().filter(|o| o.scraped.is_some()).count();
    let mut lines = vec![format!(
        "Relabel simulation for job '{}': {} of {} targets kept",
        job,
        kept,
        outcomes.len()
    )];

    for outcome in outcomes {
        let address = outcome
            .discovered
            .get("__address__")
            .map(String::as_str)
            .unwrap_or("<no address>");
        let line = match &outcome.scraped {
            Some(labels) => {
                let labels: Vec<String> = labels.iter().map(|(k, v)| format!("{}=\"{}\"", k, v)).collect();
                let mark = if use_colors { "kept".green().to_string() } else { "kept".to_string() };
                format!("  {} {} {{{}}}", mark, address, labels.join(", "))
            }
            None => {
                let mark = if use_colors { "drop".red().to_string() } else { "drop".to_string() };
                format!("  {} {}", mark, address)
            }
        };
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promconfig::LabelSet;
    use clap::Parser;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_app_rejects_invalid_arguments() {
        let cli = Cli::parse_from(["pth", "scale", "--levels", "8,4"]);
        let error = App::new(cli).err().unwrap();
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_format_simulation() {
        let outcomes = vec![
            TargetOutcome {
                discovered: labels(&[("__address__", "10.0.0.1:9100")]),
                scraped: Some(labels(&[("instance", "10.0.0.1:9100"), ("job", "node")])),
            },
            TargetOutcome {
                discovered: labels(&[("__address__", "10.0.0.2:9100")]),
                scraped: None,
            },
        ];

        let text = format_simulation("node", &outcomes, false);
        assert!(text.starts_with("Relabel simulation for job 'node': 1 of 2 targets kept"));
        assert!(text.contains("kept 10.0.0.1:9100 {instance=\"10.0.0.1:9100\", job=\"node\"}"));
        assert!(text.contains("drop 10.0.0.2:9100"));
    }

    #[tokio::test]
    async fn test_unknown_guide_topic() {
        let cli = Cli::parse_from(["pth", "guide", "dns"]);
        let error = App::new(cli).unwrap().run().await.unwrap_err();
        assert_eq!(error.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_gen_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prometheus.yml");
        let cli = Cli::parse_from(["pth", "gen-config", "--size", "small", "--output", path.to_str().unwrap()]);
        App::new(cli).unwrap().run().await.unwrap();

        let yaml = std::fs::read_to_string(&path).unwrap();
        let parsed = crate::promconfig::PrometheusConfig::from_yaml(&yaml).unwrap();
        assert!(parsed.job("kubernetes-pods").is_some());
    }
}
