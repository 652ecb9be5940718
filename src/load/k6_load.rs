//! Load test driven by k6's constant-arrival-rate executor

use crate::client::Credentials;
use crate::error::Result;
use crate::k6::{K6Report, K6Runner, K6Scenario};
use crate::logging::Logger;
use crate::models::{LoadSettings, QuerySpec, ThresholdCheck};
use std::path::Path;

/// Arrival-rate scenario matching the built-in load generator's settings
pub fn load_scenario(settings: &LoadSettings) -> K6Scenario {
    let rate = settings.target_rps.ceil().max(1.0) as u32;
    let max_vus = settings.max_in_flight.max(1) as u32;
    K6Scenario::ConstantArrivalRate {
        rate,
        duration: settings.duration,
        pre_allocated_vus: rate.min(max_vus),
        max_vus,
    }
}

pub async fn run_k6_load(
    runner: &K6Runner,
    settings: &LoadSettings,
    queries: &[QuerySpec],
    base_url: &str,
    credentials: &Credentials,
    work_dir: &Path,
    logger: &Logger,
) -> Result<K6Report> {
    let scenario = load_scenario(settings);
    let run = runner
        .run(&scenario, base_url, queries, credentials, work_dir, logger)
        .await?;

    let mut checks = run
        .summary
        .checks(settings.max_p95_ms, settings.max_p99_ms, settings.min_success_rate);
    checks.push(ThresholdCheck::at_least(
        "throughput_rps",
        run.summary.request_rate,
        settings.min_throughput_ratio * settings.target_rps,
    ));

    Ok(K6Report::new("load-k6", scenario, run, checks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_scenario_from_settings() {
        let settings = LoadSettings {
            target_rps: 12.5,
            max_in_flight: 8,
            duration: Duration::from_secs(30),
            ..LoadSettings::default()
        };
        assert_eq!(
            load_scenario(&settings),
            K6Scenario::ConstantArrivalRate {
                rate: 13,
                duration: Duration::from_secs(30),
                pre_allocated_vus: 8,
                max_vus: 8,
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_k6_load_checks_throughput() {
        use crate::models::{default_queries, Verdict};
        use crate::output::Report;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let binary = dir.path().join("k6");
        // 19.98 req/s in the sample summary against a 50 req/s target
        std::fs::write(
            &binary,
            format!(
                "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then echo k6; exit 0; fi\ncat > \"$4\" <<'EOF'\n{}\nEOF\n",
                crate::k6::SAMPLE_SUMMARY
            ),
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = K6Runner::locate(binary.to_str().unwrap()).await.unwrap();
        let settings = LoadSettings {
            duration: Duration::from_secs(1),
            ..LoadSettings::default()
        };
        let report = run_k6_load(
            &runner,
            &settings,
            &default_queries(),
            "http://127.0.0.1:9090",
            &Credentials::None,
            dir.path(),
            &Logger::disabled(),
        )
        .await
        .unwrap();

        assert_eq!(report.kind(), "load-k6");
        assert_eq!(report.verdict(), Verdict::Fail);
        assert!(report.checks().iter().any(|c| c.name == "throughput_rps" && !c.passed));
    }
}
