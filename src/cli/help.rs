//! Topic guides shown by `pth guide <topic>`

use crate::config::env::EnvManager;
use colored::*;

pub const TOPICS: &[&str] = &["config", "env", "examples", "exit-codes"];

/// Long-form help beyond what `--help` shows
pub struct HelpSystem;

impl HelpSystem {
    pub fn new() -> Self {
        Self
    }

    /// Overview listing the commands and topics
    pub fn display_main_help(&self, use_colors: bool) -> String {
        let mut help = String::new();

        help.push_str(&self.format_header(use_colors));
        help.push('\n');
        help.push_str(&self.heading("COMMANDS:", use_colors));
        for (name, description) in [
            ("soak", "Long-running steady load with degradation analysis"),
            ("load", "Fixed request rate, built-in pacer or k6"),
            ("benchmark", "Per-query latency with baseline comparison"),
            ("scale", "Latency along concurrency, time range or cardinality"),
            ("stress", "Concurrency ramp up to the breaking point"),
            ("spike", "Sudden burst and recovery time"),
            ("security", "Authentication, exposed APIs and disclosure checks"),
            ("github", "Repository activity metrics and health grade"),
            ("gen-config", "Sized Prometheus configuration with relabel simulation"),
            ("env-example", "Example .env file"),
        ] {
            help.push_str(&format!("  {:<12} {}\n", self.emphasize(name, use_colors), description));
        }
        help.push('\n');
        help.push_str(&self.heading("TOPICS:", use_colors));
        help.push_str(&format!("  pth guide <{}>\n", TOPICS.join("|")));
        help
    }

    /// Help for one topic, `None` when the topic is unknown
    pub fn display_topic_help(&self, topic: &str, use_colors: bool) -> Option<String> {
        match topic.to_lowercase().as_str() {
            "config" | "configuration" => Some(self.format_configuration_help(use_colors)),
            "env" | "environment" => Some(self.format_environment_help(use_colors)),
            "examples" => Some(self.format_examples_help(use_colors)),
            "exit-codes" | "exit" => Some(self.format_exit_code_help(use_colors)),
            _ => None,
        }
    }

    fn format_header(&self, use_colors: bool) -> String {
        let title = "Prometheus Test Harness";
        let version = env!("CARGO_PKG_VERSION");
        if use_colors {
            format!("{}\nVersion: {}\n", title.bright_cyan().bold(), version.green())
        } else {
            format!("{}\nVersion: {}\n", title, version)
        }
    }

    fn heading(&self, text: &str, use_colors: bool) -> String {
        if use_colors {
            format!("{}\n", text.bright_green().bold())
        } else {
            format!("{}\n", text)
        }
    }

    fn emphasize(&self, text: &str, use_colors: bool) -> String {
        if use_colors {
            text.bright_white().to_string()
        } else {
            text.to_string()
        }
    }

    fn format_configuration_help(&self, use_colors: bool) -> String {
        let mut help = self.heading("CONFIGURATION REFERENCE", use_colors);
        help.push('\n');
        help.push_str(&self.heading("CONFIGURATION PRIORITY (lowest to highest):", use_colors));
        help.push_str("  1. Built-in defaults\n");
        help.push_str("  2. YAML file given with --config or PTH_CONFIG\n");
        help.push_str("  3. .env file and environment variables\n");
        help.push_str("  4. Command-line flags\n\n");
        help.push_str(&self.heading("YAML SECTIONS:", use_colors));
        help.push_str("  soak, load, benchmark, scalability, stress, spike, security, github\n");
        help.push_str("  Durations are written as \"30m\", \"1h 30m\" or \"500ms\".\n\n");
        help.push_str(&self.heading("EXAMPLE:", use_colors));
        help.push_str(
            r#"  prometheus_url: http://prometheus:9090
  timeout_seconds: 30
  formats: [json, markdown]
  soak:
    duration: 2h
    max_p95_ms: 800
  stress:
    max_concurrency: 200
"#,
        );
        help.push('\n');
        help.push_str(&self.heading("PARAMETER LIMITS:", use_colors));
        help.push_str(&format!(
            "  timeout_seconds   1-{}\n  rates             0.0-1.0\n  latency limits    greater than 0 ms\n",
            crate::defaults::MAX_TIMEOUT_SECS
        ));
        help
    }

    fn format_environment_help(&self, use_colors: bool) -> String {
        let mut help = self.heading("ENVIRONMENT VARIABLES REFERENCE", use_colors);
        help.push('\n');
        help.push_str(&self.heading("SUPPORTED VARIABLES:", use_colors));
        for (name, description, example) in EnvManager::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", self.emphasize(name, use_colors), description));
            help.push_str(&format!("  {:<26} Example: {}\n", "", example));
        }
        help.push('\n');
        help.push_str("  NO_COLOR disables colored output regardless of ENABLE_COLOR.\n");
        help.push_str("  Run `pth env-example` for a commented .env file.\n");
        help
    }

    fn format_examples_help(&self, use_colors: bool) -> String {
        let mut help = self.heading("EXAMPLES:", use_colors);
        for (title, command) in [
            ("Two hour soak", "pth soak --duration 2h --prometheus-url http://prom:9090"),
            ("Load at 100 rps through k6", "pth load --rps 100 --duration 5m --k6"),
            ("Benchmark against last week", "pth benchmark --baseline reports/benchmark-20240601-120000.json"),
            ("Time range scaling", "pth scale --dimension time-range --levels 1,6,24,168"),
            ("Security gate in CI", "pth security --expect-auth --fail-on medium --format json"),
            ("Repository health", "pth github prometheus/prometheus grafana/grafana --lookback-days 30"),
            ("Sharded config", "pth gen-config --size large --shards 4 --shard-index 0 --output prometheus.yml"),
        ] {
            help.push_str(&format!("  {}\n    {}\n\n", self.emphasize(title, use_colors), command));
        }
        help
    }

    fn format_exit_code_help(&self, use_colors: bool) -> String {
        let mut help = self.heading("EXIT CODES", use_colors);
        for (code, meaning) in [
            (0, "Success, verdict PASS or WARN"),
            (1, "Configuration or argument error"),
            (2, "Network or HTTP failure"),
            (3, "Timeout"),
            (4, "Authentication failure"),
            (5, "File system error"),
            (6, "Test failed (verdict FAIL) or could not run"),
            (7, "k6 could not be started"),
            (8, "GitHub API error"),
            (99, "Internal error"),
        ] {
            help.push_str(&format!("  {:>3}  {}\n", code, meaning));
        }
        help
    }
}

impl Default for HelpSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_topic_has_help() {
        let help_system = HelpSystem::new();
        for topic in TOPICS {
            assert!(help_system.display_topic_help(topic, false).is_some(), "{}", topic);
        }
        assert!(help_system.display_topic_help("dns", false).is_none());
    }

    #[test]
    fn test_main_help_lists_commands() {
        let help = HelpSystem::new().display_main_help(false);
        assert!(help.contains("Prometheus Test Harness"));
        assert!(help.contains("gen-config"));
        assert!(help.contains("pth guide <config|env|examples|exit-codes>"));
        assert!(!help.contains("\u{1b}["));
    }

    #[test]
    fn test_environment_help_lists_variables() {
        let help = HelpSystem::new().display_topic_help("env", false).unwrap();
        assert!(help.contains("PROMETHEUS_URL"));
        assert!(help.contains("GITHUB_TOKEN"));
    }
}
