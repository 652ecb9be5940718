//! Sustained query load with resource and latency-trend tracking

use super::stability::StabilityResult;
use crate::client::{ensure_healthy, PrometheusApi};
use crate::error::{ErrorCategory, ErrorLog, Result, TestError};
use crate::logging::Logger;
use crate::models::{OutcomeRecorder, QuerySpec, SoakSettings, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::{
    classify_degradation_points, growth_percent, rate_per_hour, split_windows, DegradationAnalysis,
    DegradationLevel, DegradationThresholds, LatencySummary, TrendDirection,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Slope (ms per window) within which the latency trend counts as stable
const TREND_TOLERANCE_MS: f64 = 1.0;

/// One sample of Prometheus' own resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub elapsed_secs: f64,
    pub memory_bytes: Option<f64>,
    pub cpu_cores: Option<f64>,
    pub head_series: Option<f64>,
    pub goroutines: Option<f64>,
}

/// Latency within one time window of the soak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub index: usize,
    pub requests: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoakResult {
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub rounds: u64,
    pub requests: u64,
    pub success_rate: f64,
    pub latency: LatencySummary,
    pub per_query: BTreeMap<String, LatencySummary>,
    pub windows: Vec<WindowStats>,
    pub degradation: DegradationAnalysis,
    pub trend: TrendDirection,
    pub resources: Vec<ResourceSample>,
    pub memory_growth_pct: Option<f64>,
    pub memory_growth_bytes_per_hour: Option<f64>,
    pub head_series_growth_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<StabilityResult>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

impl SoakResult {
    /// Attach a stability monitor result and re-evaluate the verdict
    pub fn with_stability(mut self, stability: StabilityResult, min_availability: f64) -> Self {
        self.checks.push(stability.availability_check(min_availability));
        self.stability = Some(stability);
        self.verdict = Verdict::from_checks(&self.checks);
        self
    }
}

/// PromQL for the self-monitoring resource queries
fn resource_queries(self_job: &str) -> [(&'static str, String); 4] {
    let selector = format!("{{job=\"{}\"}}", self_job);
    [
        ("memory", format!("process_resident_memory_bytes{}", selector)),
        ("cpu", format!("rate(process_cpu_seconds_total{}[1m])", selector)),
        ("head_series", format!("prometheus_tsdb_head_series{}", selector)),
        ("goroutines", format!("go_goroutines{}", selector)),
    ]
}

/// Runs the query set on a timer for the configured duration
pub struct SoakTester {
    api: Arc<dyn PrometheusApi>,
    settings: SoakSettings,
    queries: Vec<QuerySpec>,
    self_job: String,
    logger: Logger,
}

impl SoakTester {
    pub fn new(
        api: Arc<dyn PrometheusApi>,
        settings: SoakSettings,
        queries: Vec<QuerySpec>,
        self_job: String,
        logger: Logger,
    ) -> Self {
        Self {
            api,
            settings,
            queries,
            self_job,
            logger,
        }
    }

    pub async fn run(&self) -> Result<SoakResult> {
        ensure_healthy(self.api.as_ref()).await?;

        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = tokio::time::sleep(self.settings.duration);
        tokio::pin!(deadline);

        let mut query_tick = tokio::time::interval(self.settings.query_interval);
        query_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resource_tick = tokio::time::interval(self.settings.resource_interval);
        resource_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut recorder = OutcomeRecorder::new();
        let mut per_query: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut round_latencies: Vec<Vec<f64>> = Vec::new();
        let mut resources = Vec::new();
        let mut resource_errors = ErrorLog::default();

        self.logger
            .info("Soak test started")
            .field("duration_s", self.settings.duration.as_secs())
            .field("queries", self.queries.len())
            .log()
            .await;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = query_tick.tick() => {
                    let outcomes = join_all(self.queries.iter().map(|q| self.api.run_query(q))).await;
                    let mut round = Vec::with_capacity(outcomes.len());
                    for (query, outcome) in self.queries.iter().zip(outcomes) {
                        if outcome.success {
                            round.push(outcome.latency_ms());
                            per_query.entry(query.name.clone()).or_default().push(outcome.latency_ms());
                        }
                        recorder.record_for(&query.name, outcome);
                    }
                    round_latencies.push(round);
                }
                _ = resource_tick.tick() => {
                    let sample = self.sample_resources(start.elapsed(), &mut resource_errors).await;
                    resources.push(sample);
                }
            }
        }

        let duration = start.elapsed();
        self.logger
            .info("Soak test finished")
            .field("rounds", round_latencies.len())
            .field("requests", recorder.total())
            .log()
            .await;

        let mut errors = ErrorLog::default();
        errors.extend(resource_errors);
        let latency = recorder.summary();
        let success_rate = recorder.success_rate();
        let total = recorder.total();
        errors.extend(recorder.into_errors());

        Ok(build_result(
            &self.settings,
            started_at,
            duration,
            total,
            success_rate,
            latency,
            per_query,
            round_latencies,
            resources,
            errors,
        ))
    }

    async fn sample_resources(&self, elapsed: Duration, errors: &mut ErrorLog) -> ResourceSample {
        let queries = resource_queries(&self.self_job);
        let values = join_all(queries.iter().map(|(_, promql)| self.api.sample_value(promql))).await;

        let mut sample = ResourceSample {
            elapsed_secs: elapsed.as_secs_f64(),
            ..ResourceSample::default()
        };

        for ((name, _), value) in queries.iter().zip(values) {
            let value = match value {
                Ok(value) => value,
                Err(e) => {
                    errors.push(TestError::new(ErrorCategory::from(&e), e.to_string()).with_context(*name));
                    None
                }
            };
            match *name {
                "memory" => sample.memory_bytes = value,
                "cpu" => sample.cpu_cores = value,
                "head_series" => sample.head_series = value,
                _ => sample.goroutines = value,
            }
        }
        sample
    }
}

/// `(elapsed seconds, value)` points of one resource
fn series<F>(resources: &[ResourceSample], field: F) -> Vec<(f64, f64)>
where
    F: Fn(&ResourceSample) -> Option<f64>,
{
    resources
        .iter()
        .filter_map(|s| field(s).map(|v| (s.elapsed_secs, v)))
        .collect()
}

fn growth(points: &[(f64, f64)]) -> Option<f64> {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 2 => Some(growth_percent(first.1, last.1)),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    settings: &SoakSettings,
    started_at: DateTime<Utc>,
    duration: Duration,
    requests: u64,
    success_rate: f64,
    latency: LatencySummary,
    per_query: BTreeMap<String, Vec<f64>>,
    round_latencies: Vec<Vec<f64>>,
    resources: Vec<ResourceSample>,
    errors: ErrorLog,
) -> SoakResult {
    let windows: Vec<WindowStats> = split_windows(&round_latencies, settings.windows)
        .into_iter()
        .enumerate()
        .map(|(index, rounds)| {
            let samples: Vec<f64> = rounds.into_iter().flatten().collect();
            let summary = LatencySummary::from_samples(&samples);
            WindowStats {
                index,
                requests: summary.count,
                mean_ms: summary.mean_ms,
                p95_ms: summary.p95_ms,
            }
        })
        .collect();

    // Windows without a successful request have no p95 to fit
    let window_p95: Vec<(f64, f64)> = windows
        .iter()
        .filter(|w| w.requests > 0)
        .map(|w| (w.index as f64, w.p95_ms))
        .collect();
    let degradation = classify_degradation_points(
        &window_p95,
        DegradationThresholds {
            warn_ratio: settings.degradation_warn_ratio,
            fail_ratio: settings.degradation_fail_ratio,
        },
    );
    let trend = TrendDirection::from_slope(degradation.slope, TREND_TOLERANCE_MS);

    let memory = series(&resources, |s| s.memory_bytes);
    let memory_growth_pct = growth(&memory);
    let memory_growth_bytes_per_hour = if memory.len() >= 2 { rate_per_hour(&memory) } else { None };
    let head_series_growth_pct = growth(&series(&resources, |s| s.head_series));

    let mut checks = vec![
        ThresholdCheck::at_least("requests_sent", requests as f64, 1.0),
        ThresholdCheck::at_most("p95_latency_ms", latency.p95_ms, settings.max_p95_ms),
        ThresholdCheck::at_most("p99_latency_ms", latency.p99_ms, settings.max_p99_ms),
        ThresholdCheck::at_least("success_rate", success_rate, settings.min_success_rate),
    ];
    if let Some(growth) = memory_growth_pct {
        checks.push(ThresholdCheck::at_most("memory_growth_pct", growth, settings.max_memory_growth_pct));
    }
    // Significant degradation warns; only severe degradation fails
    let significant = ThresholdCheck::at_most(
        "latency_degradation",
        degradation.level.rank(),
        DegradationLevel::Mild.rank(),
    )
    .advisory();
    checks.push(significant);
    checks.push(ThresholdCheck::at_most(
        "latency_degradation_severe",
        degradation.level.rank(),
        DegradationLevel::Significant.rank(),
    ));

    let per_query = per_query
        .into_iter()
        .map(|(name, samples)| (name, LatencySummary::from_samples(&samples)))
        .collect();

    let verdict = Verdict::from_checks(&checks);
    SoakResult {
        started_at,
        duration,
        rounds: round_latencies.len() as u64,
        requests,
        success_rate,
        latency,
        per_query,
        windows,
        degradation,
        trend,
        resources,
        memory_growth_pct,
        memory_growth_bytes_per_hour,
        head_series_growth_pct,
        stability: None,
        checks,
        verdict,
        errors,
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{:.2}{}", v, suffix))
        .unwrap_or_else(|| "n/a".to_string())
}

impl Report for SoakResult {
    fn kind(&self) -> &'static str {
        "soak"
    }

    fn title(&self) -> String {
        format!("Soak test ({})", humantime::format_duration(Duration::from_secs(self.duration.as_secs())))
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("Rounds".to_string(), self.rounds.to_string()),
            ("Requests".to_string(), self.requests.to_string()),
            ("Success rate".to_string(), fmt_pct(self.success_rate)),
            ("p95 latency".to_string(), format!("{} ms", fmt_ms(self.latency.p95_ms))),
            ("p99 latency".to_string(), format!("{} ms", fmt_ms(self.latency.p99_ms))),
            (
                "Degradation".to_string(),
                format!("{} (ratio {:.2}, {})", self.degradation.level, self.degradation.ratio, self.trend.as_str()),
            ),
            ("Memory growth".to_string(), fmt_opt(self.memory_growth_pct, "%")),
        ];
        if let Some(stability) = &self.stability {
            lines.push(("Availability".to_string(), fmt_pct(stability.availability)));
            lines.push(("Outages".to_string(), stability.outage_count.to_string()));
        }
        lines
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        let mut per_query = ReportTable::new(&["query", "count", "mean_ms", "p95_ms", "p99_ms"]);
        for (name, summary) in &self.per_query {
            per_query.push_row(vec![
                name.clone(),
                summary.count.to_string(),
                fmt_ms(summary.mean_ms),
                fmt_ms(summary.p95_ms),
                fmt_ms(summary.p99_ms),
            ]);
        }

        let mut resources = ReportTable::new(&["elapsed_s", "memory_mib", "cpu_cores", "head_series", "goroutines"]);
        for sample in &self.resources {
            resources.push_row(vec![
                format!("{:.0}", sample.elapsed_secs),
                fmt_opt(sample.memory_bytes.map(|b| b / (1024.0 * 1024.0)), ""),
                fmt_opt(sample.cpu_cores, ""),
                fmt_opt(sample.head_series, ""),
                fmt_opt(sample.goroutines, ""),
            ]);
        }

        let mut sections = vec![
            MarkdownSection::table("Latency per window", &self.csv_table()),
            MarkdownSection::table("Latency per query", &per_query),
            MarkdownSection::table("Resources", &resources),
        ];

        if let Some(stability) = &self.stability {
            sections.push(MarkdownSection::new(
                "Stability",
                format!(
                    "{} probes, availability {}, {} outages, longest {}, mean probe latency {} ms",
                    stability.probes,
                    fmt_pct(stability.availability),
                    stability.outage_count,
                    humantime::format_duration(stability.longest_outage),
                    fmt_ms(stability.mean_probe_latency_ms)
                ),
            ));
        }
        sections
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["window", "requests", "mean_ms", "p95_ms"]);
        for window in &self.windows {
            table.push_row(vec![
                window.index.to_string(),
                window.requests.to_string(),
                fmt_ms(window.mean_ms),
                fmt_ms(window.p95_ms),
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

    fn settings(duration_ms: u64) -> SoakSettings {
        SoakSettings {
            duration: Duration::from_millis(duration_ms),
            query_interval: Duration::from_millis(50),
            resource_interval: Duration::from_millis(100),
            windows: 3,
            ..SoakSettings::default()
        }
    }

    fn rounds(p95s: &[f64]) -> Vec<Vec<f64>> {
        p95s.iter().map(|&v| vec![v; 4]).collect()
    }

    #[test]
    fn test_resource_queries_filter_by_job() {
        let queries = resource_queries("prom-self");
        assert_eq!(queries[0].1, "process_resident_memory_bytes{job=\"prom-self\"}");
        assert_eq!(queries[1].1, "rate(process_cpu_seconds_total{job=\"prom-self\"}[1m])");
    }

    #[test]
    fn test_flat_soak_passes() {
        let resources = vec![
            ResourceSample {
                elapsed_secs: 0.0,
                memory_bytes: Some(100.0),
                head_series: Some(1000.0),
                ..ResourceSample::default()
            },
            ResourceSample {
                elapsed_secs: 3600.0,
                memory_bytes: Some(110.0),
                head_series: Some(1500.0),
                ..ResourceSample::default()
            },
        ];
        let result = build_result(
            &SoakSettings::default(),
            Utc::now(),
            Duration::from_secs(3600),
            24,
            1.0,
            LatencySummary::from_samples(&[10.0; 24]),
            BTreeMap::new(),
            rounds(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
            resources,
            ErrorLog::default(),
        );

        assert_eq!(result.windows.len(), 6);
        assert_eq!(result.degradation.level, DegradationLevel::None);
        assert_eq!(result.trend, TrendDirection::Stable);
        assert_eq!(result.memory_growth_pct, Some(10.0));
        assert!((result.memory_growth_bytes_per_hour.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(result.head_series_growth_pct, Some(50.0));
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_doubling_latency_fails() {
        let result = build_result(
            &SoakSettings::default(),
            Utc::now(),
            Duration::from_secs(600),
            24,
            1.0,
            LatencySummary::from_samples(&[10.0, 80.0]),
            BTreeMap::new(),
            rounds(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]),
            Vec::new(),
            ErrorLog::default(),
        );

        assert_eq!(result.degradation.level, DegradationLevel::Severe);
        assert_eq!(result.trend, TrendDirection::Degrading);
        assert_eq!(result.memory_growth_pct, None);
        assert_eq!(result.verdict, Verdict::Fail);
        assert!(result.checks.iter().any(|c| c.name == "latency_degradation_severe" && !c.passed));
    }

    #[test]
    fn test_empty_windows_do_not_skew_degradation() {
        let mut round_latencies = vec![Vec::new(), Vec::new()];
        round_latencies.extend(rounds(&[10.0; 10]));

        let result = build_result(
            &SoakSettings::default(),
            Utc::now(),
            Duration::from_secs(600),
            40,
            1.0,
            LatencySummary::from_samples(&[10.0; 40]),
            BTreeMap::new(),
            round_latencies,
            Vec::new(),
            ErrorLog::default(),
        );

        assert_eq!(result.windows.len(), 6);
        assert_eq!(result.windows[0].requests, 0);
        assert_eq!(result.degradation.level, DegradationLevel::None);
        assert_eq!(result.degradation.baseline, 10.0);
        assert_eq!(result.trend, TrendDirection::Stable);
        assert!(!result.checks.iter().any(|c| c.name.starts_with("latency_degradation") && !c.passed));
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_stability_failure_fails_verdict() {
        let result = build_result(
            &SoakSettings::default(),
            Utc::now(),
            Duration::from_secs(60),
            6,
            1.0,
            LatencySummary::from_samples(&[5.0; 6]),
            BTreeMap::new(),
            rounds(&[5.0; 6]),
            Vec::new(),
            ErrorLog::default(),
        );
        assert_eq!(result.verdict, Verdict::Pass);

        let stability = StabilityResult {
            probes: 10,
            healthy_probes: 9,
            availability: 0.9,
            ..StabilityResult::default()
        };
        let result = result.with_stability(stability, 0.999);
        assert_eq!(result.verdict, Verdict::Fail);
        assert!(result.summary_lines().iter().any(|(k, _)| k == "Availability"));
    }

    #[tokio::test]
    async fn test_soak_run_against_mock() {
        let mock = MockPrometheus::start().await;
        mock.mock_healthy().await;
        mock.mock_sample("process_resident_memory_bytes", 1_048_576.0).await;
        mock.mock_sample("prometheus_tsdb_head_series", 2000.0).await;
        mock.mock_queries(None).await;

        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();
        let queries = vec![
            QuerySpec::instant("up", "up", QueryClass::Simple),
            QuerySpec::instant("build", "prometheus_build_info", QueryClass::Simple),
        ];
        let tester = SoakTester::new(
            Arc::new(client),
            settings(400),
            queries,
            "prometheus".to_string(),
            Logger::disabled(),
        );

        let result = tester.run().await.unwrap();
        assert!(result.rounds >= 3);
        assert_eq!(result.requests, result.rounds * 2);
        assert_eq!(result.success_rate, 1.0);
        assert!(!result.resources.is_empty());
        assert_eq!(result.resources[0].memory_bytes, Some(1_048_576.0));
        assert_eq!(result.resources[0].head_series, Some(2000.0));
        assert_eq!(result.per_query.len(), 2);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_soak_requires_healthy_target() {
        let mock = MockPrometheus::start().await;
        mock.mock_health_status(503).await;

        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();
        let tester = SoakTester::new(
            Arc::new(client),
            settings(100),
            vec![QuerySpec::instant("up", "up", QueryClass::Simple)],
            "prometheus".to_string(),
            Logger::disabled(),
        );

        let error = tester.run().await.unwrap_err();
        assert_eq!(error.category(), "NETWORK");
    }
}
