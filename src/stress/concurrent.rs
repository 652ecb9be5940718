//! Concurrency ramp until Prometheus breaks

use crate::client::{ensure_healthy, run_batch, PrometheusApi};
use crate::error::{ErrorLog, Result};
use crate::logging::Logger;
use crate::models::{OutcomeRecorder, QuerySpec, StressSettings, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::{detect_breaking_point, BreakingCriteria, BreakingPoint, LatencySummary, LevelMeasurement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Measurements at one concurrency level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressLevel {
    pub concurrency: u32,
    pub requests: u64,
    pub latency: LatencySummary,
    pub throughput: f64,
    pub error_rate: f64,
}

impl StressLevel {
    fn measurement(&self) -> LevelMeasurement {
        LevelMeasurement {
            level: self.concurrency,
            error_rate: self.error_rate,
            p95_ms: self.latency.p95_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StressResult {
    pub levels: Vec<StressLevel>,
    pub breaking_point: Option<BreakingPoint>,
    /// Highest level that stayed within the limits
    pub max_stable_concurrency: Option<u32>,
    /// The ramp ended at the breaking point instead of `max_concurrency`
    pub stopped_early: bool,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

/// Concurrency levels from `start` by `step` up to `max`
pub fn ramp_levels(settings: &StressSettings) -> Vec<u32> {
    let step = settings.step.max(1);
    (settings.start_concurrency.max(1)..=settings.max_concurrency)
        .step_by(step as usize)
        .collect()
}

pub struct ConcurrentQueryStressTester {
    api: Arc<dyn PrometheusApi>,
    settings: StressSettings,
    queries: Vec<QuerySpec>,
    logger: Logger,
}

impl ConcurrentQueryStressTester {
    pub fn new(api: Arc<dyn PrometheusApi>, settings: StressSettings, queries: Vec<QuerySpec>, logger: Logger) -> Self {
        Self {
            api,
            settings,
            queries,
            logger,
        }
    }

    fn criteria(&self) -> BreakingCriteria {
        BreakingCriteria {
            max_error_rate: self.settings.max_error_rate,
            max_p95_ms: self.settings.max_p95_ms,
        }
    }

    pub async fn run(&self) -> Result<StressResult> {
        ensure_healthy(self.api.as_ref()).await?;

        let levels = ramp_levels(&self.settings);
        let mut measured = Vec::with_capacity(levels.len());
        let mut errors = ErrorLog::default();
        let mut stopped_early = false;

        for (i, &concurrency) in levels.iter().enumerate() {
            let mut recorder = OutcomeRecorder::new();
            let mut wall_time = Duration::ZERO;
            for _ in 0..self.settings.rounds {
                let batch = run_batch(self.api.as_ref(), &self.queries, concurrency).await;
                wall_time += batch.wall_time;
                recorder.merge(batch.outcomes);
            }

            let level = StressLevel {
                concurrency,
                requests: recorder.total(),
                latency: recorder.summary(),
                throughput: if wall_time.as_secs_f64() > 0.0 {
                    recorder.successes() as f64 / wall_time.as_secs_f64()
                } else {
                    0.0
                },
                error_rate: recorder.error_rate(),
            };
            errors.extend(recorder.into_errors());

            self.logger
                .info("Stress level complete")
                .field("concurrency", concurrency)
                .field("p95_ms", level.latency.p95_ms)
                .field("error_rate", level.error_rate)
                .log()
                .await;

            let broke = detect_breaking_point(&[level.measurement()], self.criteria()).is_some();
            measured.push(level);

            if broke && self.settings.stop_on_break {
                stopped_early = i + 1 < levels.len();
                self.logger
                    .warn("Breaking point reached")
                    .field("concurrency", concurrency)
                    .log()
                    .await;
                break;
            }
        }

        Ok(evaluate(measured, self.criteria(), self.settings.min_stable_concurrency, stopped_early, errors))
    }
}

fn evaluate(
    levels: Vec<StressLevel>,
    criteria: BreakingCriteria,
    min_stable_concurrency: u32,
    stopped_early: bool,
    errors: ErrorLog,
) -> StressResult {
    let measurements: Vec<_> = levels.iter().map(StressLevel::measurement).collect();
    let breaking_point = detect_breaking_point(&measurements, criteria);

    let max_stable_concurrency = match &breaking_point {
        Some(bp) => bp.last_stable_level,
        None => levels.last().map(|l| l.concurrency),
    };

    let mut checks = vec![ThresholdCheck::at_least("levels_measured", levels.len() as f64, 1.0)];
    if let Some(bp) = &breaking_point {
        checks.push(ThresholdCheck::at_least(
            "breaking_concurrency",
            f64::from(bp.level),
            f64::from(min_stable_concurrency) + 1.0,
        ));
    }

    StressResult {
        levels,
        breaking_point,
        max_stable_concurrency,
        stopped_early,
        verdict: Verdict::from_checks(&checks),
        checks,
        errors,
    }
}

impl Report for StressResult {
    fn kind(&self) -> &'static str {
        "stress"
    }

    fn title(&self) -> String {
        "Concurrent query stress test".to_string()
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        vec![
            ("Levels".to_string(), self.levels.len().to_string()),
            (
                "Max stable concurrency".to_string(),
                self.max_stable_concurrency
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            ),
            (
                "Breaking point".to_string(),
                match &self.breaking_point {
                    Some(bp) => format!("{} concurrent ({})", bp.level, bp.reason.as_str()),
                    None => "not reached".to_string(),
                },
            ),
        ]
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        vec![MarkdownSection::table("Levels", &self.csv_table())]
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["concurrency", "requests", "p95_ms", "p99_ms", "throughput", "error_rate"]);
        for level in &self.levels {
            table.push_row(vec![
                level.concurrency.to_string(),
                level.requests.to_string(),
                fmt_ms(level.latency.p95_ms),
                fmt_ms(level.latency.p99_ms),
                format!("{:.2}", level.throughput),
                fmt_pct(level.error_rate),
            ]);
        }
        table
    }

    fn errors(&self) -> Option<&ErrorLog> {
        Some(&self.errors)
    }
}
