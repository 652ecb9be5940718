//! Driving the external `k6` load generator
//!
//! The harness writes a k6 script for the query set, runs
//! `k6 run --quiet --summary-export <file> <script>` and reads the
//! summary back. k6 exits non-zero when one of its own thresholds is
//! crossed; as long as the summary was written the run is still usable.

mod script;
mod summary;

pub use script::render_script;
pub use summary::K6Summary;

#[cfg(test)]
pub(crate) use summary::SAMPLE_SUMMARY;

use crate::client::Credentials;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{QuerySpec, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Extra time k6 gets beyond the scenario duration before it is killed
const RUN_GRACE: Duration = Duration::from_secs(120);

/// k6 executor used for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum K6Scenario {
    /// Fixed number of looping virtual users, used for soak runs
    ConstantVus { vus: u32, duration: Duration },
    /// Fixed request rate per second, used for load runs
    ConstantArrivalRate {
        rate: u32,
        duration: Duration,
        pre_allocated_vus: u32,
        max_vus: u32,
    },
}

impl K6Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConstantVus { .. } => "soak",
            Self::ConstantArrivalRate { .. } => "load",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::ConstantVus { duration, .. } | Self::ConstantArrivalRate { duration, .. } => *duration,
        }
    }
}

/// Outcome of one k6 invocation
#[derive(Debug, Clone, Serialize)]
pub struct K6Run {
    pub k6_version: String,
    pub script_path: PathBuf,
    pub summary_path: PathBuf,
    /// Process exit code; 99 means k6 thresholds were crossed
    pub exit_code: Option<i32>,
    pub summary: K6Summary,
}

/// A located k6 binary
#[derive(Debug, Clone)]
pub struct K6Runner {
    binary: String,
    version: String,
}

impl K6Runner {
    /// Check that `binary` runs by asking for its version
    pub async fn locate(binary: &str) -> Result<Self> {
        let output = Command::new(binary)
            .arg("version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::subprocess(format!("Cannot run k6 binary '{}': {}", binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::subprocess(format!(
                "'{} version' failed: {}",
                binary,
                stderr.trim()
            )));
        }

        Ok(Self {
            binary: binary.to_string(),
            version: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Write the script into `work_dir`, run it and parse the summary export
    pub async fn run(
        &self,
        scenario: &K6Scenario,
        base_url: &str,
        queries: &[QuerySpec],
        credentials: &Credentials,
        work_dir: &Path,
        logger: &Logger,
    ) -> Result<K6Run> {
        std::fs::create_dir_all(work_dir)?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let script_path = work_dir.join(format!("k6-{}-{}.js", scenario.name(), stamp));
        let summary_path = work_dir.join(format!("k6-{}-{}-summary.json", scenario.name(), stamp));

        std::fs::write(&script_path, render_script(scenario, base_url, queries)?)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("--quiet")
            .arg("--summary-export")
            .arg(&summary_path)
            .arg(&script_path)
            .env("PTH_BASE_URL", base_url.trim_end_matches('/'))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Secrets go through the environment, never into the script file
        match credentials {
            Credentials::None => {}
            Credentials::Basic { username, password } => {
                cmd.env("PTH_USERNAME", username).env("PTH_PASSWORD", password);
            }
            Credentials::Bearer(token) => {
                cmd.env("PTH_BEARER_TOKEN", token);
            }
        }

        logger
            .info(&format!("Running k6 {} scenario", scenario.name()))
            .field("script", script_path.display().to_string())
            .field("duration_s", scenario.duration().as_secs())
            .log()
            .await;

        let limit = scenario.duration() + RUN_GRACE;
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| AppError::subprocess(format!("k6 did not finish within {}s", limit.as_secs())))?
            .map_err(|e| AppError::subprocess(format!("Failed to run k6: {}", e)))?;

        let exit_code = output.status.code();

        if !summary_path.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            return Err(AppError::subprocess(format!(
                "k6 exited with {:?} without writing a summary: {}",
                exit_code, tail
            )));
        }

        if !output.status.success() {
            logger
                .warn("k6 exited non-zero; its thresholds were likely crossed")
                .field("exit_code", exit_code)
                .log()
                .await;
        }

        let summary = K6Summary::parse(&std::fs::read_to_string(&summary_path)?)?;

        Ok(K6Run {
            k6_version: self.version.clone(),
            script_path,
            summary_path,
            exit_code,
            summary,
        })
    }
}

/// Report for a k6-driven run, shared by the soak and load commands
#[derive(Debug, Clone, Serialize)]
pub struct K6Report {
    #[serde(skip)]
    kind: &'static str,
    pub scenario: K6Scenario,
    pub run: K6Run,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
}

impl K6Report {
    pub fn new(kind: &'static str, scenario: K6Scenario, run: K6Run, checks: Vec<ThresholdCheck>) -> Self {
        let verdict = Verdict::from_checks(&checks);
        Self {
            kind,
            scenario,
            run,
            checks,
            verdict,
        }
    }
}

impl Report for K6Report {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn title(&self) -> String {
        format!("k6 {} run ({}s)", self.scenario.name(), self.scenario.duration().as_secs())
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let summary = &self.run.summary;
        vec![
            ("k6".to_string(), self.run.k6_version.clone()),
            ("Requests".to_string(), summary.requests.to_string()),
            ("Request rate".to_string(), format!("{:.2}/s", summary.request_rate)),
            ("Success rate".to_string(), fmt_pct(summary.success_rate())),
            ("p95 latency".to_string(), format!("{} ms", fmt_ms(summary.p95_ms))),
            ("Max VUs".to_string(), summary.max_vus.to_string()),
        ]
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        vec![
            MarkdownSection::table("Request duration", &self.csv_table()),
            MarkdownSection::new(
                "Artifacts",
                format!(
                    "- script: `{}`\n- summary export: `{}`\n- exit code: {}",
                    self.run.script_path.display(),
                    self.run.summary_path.display(),
                    self.run
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string())
                ),
            ),
        ]
    }

    fn csv_table(&self) -> ReportTable {
        let summary = &self.run.summary;
        let mut table = ReportTable::new(&["metric", "value"]);
        let rows = [
            ("avg_ms", summary.avg_ms),
            ("med_ms", summary.med_ms),
            ("p90_ms", summary.p90_ms),
            ("p95_ms", summary.p95_ms),
            ("p99_ms", summary.p99_ms.unwrap_or(f64::NAN)),
            ("max_ms", summary.max_ms),
            ("failed_rate", summary.failed_rate),
        ];
        for (name, value) in rows {
            if value.is_finite() {
                table.push_row(vec![name.to_string(), format!("{:.3}", value)]);
            }
        }
        table
    }
}
