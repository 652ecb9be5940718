//! Open-loop load generation at a fixed request rate

use super::pacer::{Pacer, TICK};
use crate::client::{ensure_healthy, PrometheusApi};
use crate::error::{AppError, ErrorLog, Result};
use crate::logging::Logger;
use crate::models::{LoadSettings, OutcomeRecorder, QuerySpec, RequestOutcome, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::LatencySummary;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLoadStats {
    pub name: String,
    pub requests: u64,
    pub success_rate: f64,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub started_at: DateTime<Utc>,
    pub target_rps: f64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Requests the pacer scheduled
    pub scheduled: u64,
    /// Scheduled requests skipped because `max_in_flight` was reached
    pub dropped: u64,
    pub completed: u64,
    pub achieved_rps: f64,
    pub success_rate: f64,
    pub latency: LatencySummary,
    pub per_query: Vec<QueryLoadStats>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

/// Issues the query set round robin at `target_rps`
pub struct LoadTester {
    api: Arc<dyn PrometheusApi>,
    settings: LoadSettings,
    queries: Vec<QuerySpec>,
    logger: Logger,
}

impl LoadTester {
    pub fn new(api: Arc<dyn PrometheusApi>, settings: LoadSettings, queries: Vec<QuerySpec>, logger: Logger) -> Self {
        Self {
            api,
            settings,
            queries,
            logger,
        }
    }

    pub async fn run(&self) -> Result<LoadResult> {
        if self.queries.is_empty() {
            return Err(AppError::validation("Load test needs at least one query"));
        }
        ensure_healthy(self.api.as_ref()).await?;

        let started_at = Utc::now();
        let start = Instant::now();
        let mut pacer = Pacer::new(self.settings.target_rps, TICK);
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let deadline = tokio::time::sleep(self.settings.duration);
        tokio::pin!(deadline);

        let mut per_query: Vec<OutcomeRecorder> = vec![OutcomeRecorder::new(); self.queries.len()];
        let mut in_flight: FuturesUnordered<BoxFuture<'_, (usize, RequestOutcome)>> = FuturesUnordered::new();
        let mut next_query = 0usize;
        let mut dropped = 0u64;

        self.logger
            .info("Load test started")
            .field("target_rps", self.settings.target_rps)
            .field("duration_s", self.settings.duration.as_secs_f64())
            .log()
            .await;

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                Some((index, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                    per_query[index].record_for(&self.queries[index].name, outcome);
                }
                _ = ticker.tick() => {
                    for _ in 0..pacer.next_batch() {
                        if in_flight.len() >= self.settings.max_in_flight {
                            dropped += 1;
                            continue;
                        }
                        let index = next_query % self.queries.len();
                        next_query += 1;
                        in_flight.push(
                            self.api
                                .run_query(&self.queries[index])
                                .map(move |outcome| (index, outcome))
                                .boxed(),
                        );
                    }
                }
            }
        }

        if dropped > 0 {
            self.logger
                .warn("Requests dropped at the in-flight limit")
                .field("dropped", dropped)
                .field("max_in_flight", self.settings.max_in_flight)
                .log()
                .await;
        }

        // Requests already started still count
        while let Some((index, outcome)) = in_flight.next().await {
            per_query[index].record_for(&self.queries[index].name, outcome);
        }
        let elapsed = start.elapsed();

        Ok(build_result(
            &self.settings,
            &self.queries,
            started_at,
            elapsed,
            pacer.emitted(),
            dropped,
            per_query,
        ))
    }
}

fn build_result(
    settings: &LoadSettings,
    queries: &[QuerySpec],
    started_at: DateTime<Utc>,
    elapsed: Duration,
    scheduled: u64,
    dropped: u64,
    per_query: Vec<OutcomeRecorder>,
) -> LoadResult {
    let stats: Vec<QueryLoadStats> = queries
        .iter()
        .zip(&per_query)
        .map(|(query, recorder)| QueryLoadStats {
            name: query.name.clone(),
            requests: recorder.total(),
            success_rate: recorder.success_rate(),
            latency: recorder.summary(),
        })
        .collect();

    let mut overall = OutcomeRecorder::new();
    for recorder in per_query {
        overall.merge(recorder);
    }

    let completed = overall.total();
    let achieved_rps = if elapsed.as_secs_f64() > 0.0 {
        completed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    let latency = overall.summary();
    let success_rate = overall.success_rate();

    let checks = vec![
        ThresholdCheck::at_most("p95_latency_ms", latency.p95_ms, settings.max_p95_ms),
        ThresholdCheck::at_most("p99_latency_ms", latency.p99_ms, settings.max_p99_ms),
        ThresholdCheck::at_least("success_rate", success_rate, settings.min_success_rate),
        ThresholdCheck::at_least(
            "throughput_rps",
            achieved_rps,
            settings.min_throughput_ratio * settings.target_rps,
        ),
    ];

    LoadResult {
        started_at,
        target_rps: settings.target_rps,
        duration: elapsed,
        scheduled,
        dropped,
        completed,
        achieved_rps,
        success_rate,
        latency,
        per_query: stats,
        verdict: Verdict::from_checks(&checks),
        checks,
        errors: overall.into_errors(),
    }
}

impl Report for LoadResult {
    fn kind(&self) -> &'static str {
        "load"
    }

    fn title(&self) -> String {
        format!("Load test at {:.1} req/s", self.target_rps)
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        vec![
            ("Completed".to_string(), self.completed.to_string()),
            ("Dropped".to_string(), self.dropped.to_string()),
            ("Throughput".to_string(), format!("{:.2} req/s", self.achieved_rps)),
            ("Success rate".to_string(), fmt_pct(self.success_rate)),
            ("p95 latency".to_string(), format!("{} ms", fmt_ms(self.latency.p95_ms))),
            ("p99 latency".to_string(), format!("{} ms", fmt_ms(self.latency.p99_ms))),
        ]
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        vec![MarkdownSection::table("Per query", &self.csv_table())]
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["query", "requests", "success_rate", "mean_ms", "p95_ms", "p99_ms"]);
        for query in &self.per_query {
            table.push_row(vec![
                query.name.clone(),
                query.requests.to_string(),
                format!("{:.4}", query.success_rate),
                fmt_ms(query.latency.mean_ms),
                fmt_ms(query.latency.p95_ms),
                fmt_ms(query.latency.p99_ms),
            ]);
        }
        table
    }

    fn errors(&self) -> Option<&ErrorLog> {
        Some(&self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{mock_server::MockPrometheus, PrometheusClient};
    use crate::models::QueryClass;

    fn queries() -> Vec<QuerySpec> {
        vec![
            QuerySpec::instant("up", "up", QueryClass::Simple),
            QuerySpec::instant("build", "prometheus_build_info", QueryClass::Simple),
        ]
    }

    fn settings(rps: f64, duration_ms: u64, max_in_flight: usize) -> LoadSettings {
        LoadSettings {
            duration: Duration::from_millis(duration_ms),
            target_rps: rps,
            max_in_flight,
            min_throughput_ratio: 0.5,
            ..LoadSettings::default()
        }
    }

    #[tokio::test]
    async fn test_load_run_reaches_rate() {
        let mock = MockPrometheus::start().await;
        mock.mock_healthy().await;
        mock.mock_queries(None).await;
        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();

        let tester = LoadTester::new(Arc::new(client), settings(40.0, 1000, 50), queries(), Logger::disabled());
        let result = tester.run().await.unwrap();

        assert_eq!(result.dropped, 0);
        assert_eq!(result.completed, result.scheduled);
        assert!(result.completed >= 30 && result.completed <= 45, "completed {}", result.completed);
        assert_eq!(result.success_rate, 1.0);
        // Round robin splits the load evenly
        let diff = result.per_query[0].requests as i64 - result.per_query[1].requests as i64;
        assert!(diff.abs() <= 1);
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_in_flight_limit_drops_requests() {
        let mock = MockPrometheus::start().await;
        mock.mock_healthy().await;
        mock.mock_queries(Some(Duration::from_millis(800))).await;
        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(5)).unwrap();

        let tester = LoadTester::new(Arc::new(client), settings(100.0, 500, 5), queries(), Logger::disabled());
        let result = tester.run().await.unwrap();

        assert!(result.dropped > 0);
        assert_eq!(result.completed, 5);
        assert_eq!(result.scheduled, result.completed + result.dropped);
    }

    #[test]
    fn test_failures_fail_the_verdict() {
        let mut recorder = OutcomeRecorder::new();
        for _ in 0..10 {
            recorder.record(RequestOutcome::failure(
                Duration::from_millis(5),
                Some(503),
                crate::error::TestError::new(crate::error::ErrorCategory::HttpStatus, "HTTP 503"),
            ));
        }
        let result = build_result(
            &settings(10.0, 1000, 10),
            &queries()[..1],
            Utc::now(),
            Duration::from_secs(1),
            10,
            0,
            vec![recorder],
        );

        assert_eq!(result.success_rate, 0.0);
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.errors.total(), 10);
        assert!(result.checks.iter().any(|c| c.name == "success_rate" && !c.passed));
    }
}
