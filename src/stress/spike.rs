//! Sudden load spike and recovery measurement

use crate::client::{ensure_healthy, run_batch, PrometheusApi};
use crate::error::{AppError, ErrorLog, Result};
use crate::logging::{Logger, PhaseLogger};
use crate::models::{OutcomeRecorder, QuerySpec, SpikeSettings, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::LatencySummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub concurrency: u32,
    pub requests: u64,
    pub latency: LatencySummary,
    pub error_rate: f64,
}

impl PhaseStats {
    fn from_recorder(concurrency: u32, recorder: &OutcomeRecorder) -> Self {
        Self {
            concurrency,
            requests: recorder.total(),
            latency: recorder.summary(),
            error_rate: recorder.error_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpikeResult {
    pub baseline: PhaseStats,
    pub spike: PhaseStats,
    pub recovery: PhaseStats,
    pub recovered: bool,
    #[serde(with = "humantime_serde")]
    pub recovery_time: Option<Duration>,
    pub recovery_polls: u32,
    /// p95 a recovery poll had to reach
    pub recovery_target_ms: f64,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

/// Baseline, spike and recovery phases against the query set
pub struct SpikeTester {
    api: Arc<dyn PrometheusApi>,
    settings: SpikeSettings,
    queries: Vec<QuerySpec>,
    logger: Logger,
}

impl SpikeTester {
    pub fn new(api: Arc<dyn PrometheusApi>, settings: SpikeSettings, queries: Vec<QuerySpec>, logger: Logger) -> Self {
        Self {
            api,
            settings,
            queries,
            logger,
        }
    }

    async fn phase(&self, concurrency: u32, rounds: u32) -> OutcomeRecorder {
        let mut recorder = OutcomeRecorder::new();
        for _ in 0..rounds {
            recorder.merge(run_batch(self.api.as_ref(), &self.queries, concurrency).await.outcomes);
        }
        recorder
    }

    pub async fn run(&self) -> Result<SpikeResult> {
        ensure_healthy(self.api.as_ref()).await?;
        let mut phases = PhaseLogger::new(self.logger.clone());

        phases.begin("baseline").await;
        let baseline = self.phase(self.settings.baseline_concurrency, self.settings.baseline_rounds).await;
        phases.end("baseline").await;

        if baseline.successes() == 0 {
            return Err(AppError::test_execution(
                "Baseline phase produced no successful requests; nothing to compare the spike against",
            ));
        }
        let baseline_p95 = baseline.summary().p95_ms;
        let recovery_target_ms = baseline_p95 * self.settings.recovery_tolerance;

        phases.begin("spike").await;
        let spike = self.phase(self.settings.spike_concurrency, self.settings.spike_rounds).await;
        phases.end("spike").await;

        phases.begin("recovery").await;
        let recovery_start = Instant::now();
        let mut recovery = OutcomeRecorder::new();
        let mut recovery_time = None;
        let mut polls = 0u32;

        loop {
            let batch = run_batch(self.api.as_ref(), &self.queries, self.settings.baseline_concurrency).await;
            polls += 1;
            let poll = batch.outcomes.summary();
            let healthy = batch.outcomes.failures() == 0 && !poll.is_empty() && poll.p95_ms <= recovery_target_ms;
            recovery.merge(batch.outcomes);

            if healthy {
                recovery_time = Some(recovery_start.elapsed());
                break;
            }
            if recovery_start.elapsed() >= self.settings.recovery_timeout {
                self.logger
                    .warn("Prometheus did not recover within the timeout")
                    .field("timeout_s", self.settings.recovery_timeout.as_secs_f64())
                    .field("last_p95_ms", poll.p95_ms)
                    .log()
                    .await;
                break;
            }
            tokio::time::sleep(self.settings.recovery_poll_interval).await;
        }
        phases.end("recovery").await;

        let baseline_stats = PhaseStats::from_recorder(self.settings.baseline_concurrency, &baseline);
        let spike_stats = PhaseStats::from_recorder(self.settings.spike_concurrency, &spike);
        let recovery_stats = PhaseStats::from_recorder(self.settings.baseline_concurrency, &recovery);

        let mut errors = ErrorLog::default();
        errors.extend(baseline.into_errors());
        errors.extend(spike.into_errors());
        errors.extend(recovery.into_errors());

        Ok(evaluate(
            &self.settings,
            baseline_stats,
            spike_stats,
            recovery_stats,
            recovery_time,
            polls,
            recovery_target_ms,
            errors,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate(
    settings: &SpikeSettings,
    baseline: PhaseStats,
    spike: PhaseStats,
    recovery: PhaseStats,
    recovery_time: Option<Duration>,
    recovery_polls: u32,
    recovery_target_ms: f64,
    errors: ErrorLog,
) -> SpikeResult {
    let recovered = recovery_time.is_some();
    let checks = vec![
        ThresholdCheck::condition("recovered", recovered),
        ThresholdCheck::at_most("spike_error_rate", spike.error_rate, settings.max_spike_error_rate),
    ];

    SpikeResult {
        baseline,
        spike,
        recovery,
        recovered,
        recovery_time,
        recovery_polls,
        recovery_target_ms,
        verdict: Verdict::from_checks(&checks),
        checks,
        errors,
    }
}

impl Report for SpikeResult {
    fn kind(&self) -> &'static str {
        "spike"
    }

    fn title(&self) -> String {
        format!(
            "Spike test ({} -> {} concurrent)",
            self.baseline.concurrency, self.spike.concurrency
        )
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        vec![
            ("Baseline p95".to_string(), format!("{} ms", fmt_ms(self.baseline.latency.p95_ms))),
            ("Spike p95".to_string(), format!("{} ms", fmt_ms(self.spike.latency.p95_ms))),
            ("Spike error rate".to_string(), fmt_pct(self.spike.error_rate)),
            (
                "Recovery".to_string(),
                match self.recovery_time {
                    Some(time) => format!("{:.1}s after {} polls", time.as_secs_f64(), self.recovery_polls),
                    None => format!("not recovered after {} polls", self.recovery_polls),
                },
            ),
        ]
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        vec![
            MarkdownSection::table("Phases", &self.csv_table()),
            MarkdownSection::new(
                "Recovery criterion",
                format!("p95 at or below {} ms with no failed requests", fmt_ms(self.recovery_target_ms)),
            ),
        ]
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["phase", "concurrency", "requests", "p95_ms", "p99_ms", "error_rate"]);
        for (name, phase) in [("baseline", &self.baseline), ("spike", &self.spike), ("recovery", &self.recovery)] {
            table.push_row(vec![
                name.to_string(),
                phase.concurrency.to_string(),
                phase.requests.to_string(),
                fmt_ms(phase.latency.p95_ms),
                fmt_ms(phase.latency.p99_ms),
                fmt_pct(phase.error_rate),
            ]);
        }
        table
    }

    fn errors(&self) -> Option<&ErrorLog> {
        Some(&self.errors)
    }
}
