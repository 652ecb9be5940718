//! Sequential per-query latency benchmark

use super::baseline::{load_baseline, regression_pct};
use crate::client::{ensure_healthy, BuildInfo, PrometheusApi};
use crate::error::{ErrorLog, Result};
use crate::logging::Logger;
use crate::models::{BenchmarkSettings, OutcomeRecorder, QueryClass, QuerySpec, ThresholdCheck, Verdict};
use crate::output::{fmt_ms, fmt_pct, MarkdownSection, Report, ReportTable};
use crate::stats::LatencySummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct QueryBenchmarkResult {
    pub name: String,
    pub promql: String,
    pub class: QueryClass,
    pub latency: LatencySummary,
    pub success_rate: f64,
    /// Series returned by the last successful run
    pub series_count: Option<usize>,
    pub limit_p95_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_p95_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub started_at: DateTime<Utc>,
    pub build_info: Option<BuildInfo>,
    pub warmup: u32,
    pub iterations: u32,
    pub queries: Vec<QueryBenchmarkResult>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
    pub errors: ErrorLog,
}

fn class_limit(settings: &BenchmarkSettings, class: QueryClass) -> f64 {
    match class {
        QueryClass::Simple => settings.simple_p95_ms,
        QueryClass::Moderate => settings.moderate_p95_ms,
        QueryClass::Complex => settings.complex_p95_ms,
    }
}

/// Runs each query `warmup + iterations` times, one at a time
pub struct QueryBenchmark {
    api: Arc<dyn PrometheusApi>,
    settings: BenchmarkSettings,
    queries: Vec<QuerySpec>,
    logger: Logger,
}

impl QueryBenchmark {
    pub fn new(
        api: Arc<dyn PrometheusApi>,
        settings: BenchmarkSettings,
        queries: Vec<QuerySpec>,
        logger: Logger,
    ) -> Self {
        Self {
            api,
            settings,
            queries,
            logger,
        }
    }

    pub async fn run(&self) -> Result<BenchmarkResult> {
        ensure_healthy(self.api.as_ref()).await?;

        let baseline = match &self.settings.baseline {
            Some(path) => load_baseline(path)?,
            None => BTreeMap::new(),
        };

        let build_info = match self.api.build_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                self.logger
                    .warn("Build info unavailable")
                    .error_info(&e)
                    .log()
                    .await;
                None
            }
        };

        let started_at = Utc::now();
        let mut results = Vec::with_capacity(self.queries.len());
        let mut errors = ErrorLog::default();

        for query in &self.queries {
            for _ in 0..self.settings.warmup {
                let _ = self.api.run_query(query).await;
            }

            let mut recorder = OutcomeRecorder::new();
            let mut series_count = None;
            for _ in 0..self.settings.iterations {
                let outcome = self.api.run_query(query).await;
                if outcome.success {
                    series_count = outcome.series_count.or(series_count);
                }
                recorder.record_for(&query.name, outcome);
            }

            self.logger
                .debug("Benchmarked query")
                .field("query", &query.name)
                .field("p95_ms", recorder.summary().p95_ms)
                .log()
                .await;

            results.push(QueryBenchmarkResult {
                name: query.name.clone(),
                promql: query.promql.clone(),
                class: query.class,
                latency: recorder.summary(),
                success_rate: recorder.success_rate(),
                series_count,
                limit_p95_ms: class_limit(&self.settings, query.class),
                baseline_p95_ms: None,
                regression_pct: None,
            });
            errors.extend(recorder.into_errors());
        }

        Ok(finish(&self.settings, started_at, build_info, results, &baseline, errors))
    }
}

/// Apply the baseline comparison and derive checks
fn finish(
    settings: &BenchmarkSettings,
    started_at: DateTime<Utc>,
    build_info: Option<BuildInfo>,
    mut queries: Vec<QueryBenchmarkResult>,
    baseline: &BTreeMap<String, f64>,
    errors: ErrorLog,
) -> BenchmarkResult {
    let mut checks = Vec::new();

    for query in &mut queries {
        // A query without a single success has no meaningful p95
        let p95 = if query.latency.is_empty() {
            f64::NAN
        } else {
            query.latency.p95_ms
        };
        checks.push(ThresholdCheck::at_most(
            format!("{}_p95_ms", query.name),
            p95,
            query.limit_p95_ms,
        ));

        if let Some(&base) = baseline.get(&query.name) {
            query.baseline_p95_ms = Some(base);
            query.regression_pct = regression_pct(p95, base);
            if let Some(regression) = query.regression_pct {
                checks.push(ThresholdCheck::at_most(
                    format!("{}_regression_pct", query.name),
                    regression,
                    settings.regression_tolerance_pct,
                ));
            }
        }
    }

    BenchmarkResult {
        started_at,
        build_info,
        warmup: settings.warmup,
        iterations: settings.iterations,
        queries,
        verdict: Verdict::from_checks(&checks),
        checks,
        errors,
    }
}

impl Report for BenchmarkResult {
    fn kind(&self) -> &'static str {
        "benchmark"
    }

    fn title(&self) -> String {
        match &self.build_info {
            Some(info) if !info.version.is_empty() => format!("Query benchmark (Prometheus {})", info.version),
            _ => "Query benchmark".to_string(),
        }
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("Queries".to_string(), self.queries.len().to_string()),
            (
                "Runs per query".to_string(),
                format!("{} (+{} warmup)", self.iterations, self.warmup),
            ),
        ];
        if let Some(slowest) = self
            .queries
            .iter()
            .max_by(|a, b| a.latency.p95_ms.total_cmp(&b.latency.p95_ms))
        {
            lines.push((
                "Slowest query".to_string(),
                format!("{} ({} ms p95)", slowest.name, fmt_ms(slowest.latency.p95_ms)),
            ));
        }
        if let Some(info) = &self.build_info {
            lines.push(("Prometheus".to_string(), format!("{} ({})", info.version, info.revision)));
        }
        lines
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        let mut sections = vec![MarkdownSection::table("Queries", &self.csv_table())];
        let promql = self
            .queries
            .iter()
            .map(|q| format!("- `{}`: `{}`", q.name, q.promql))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(MarkdownSection::new("PromQL", promql));
        sections
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&[
            "query",
            "class",
            "success_rate",
            "mean_ms",
            "p95_ms",
            "limit_ms",
            "baseline_p95_ms",
            "regression_pct",
        ]);
        for query in &self.queries {
            table.push_row(vec![
                query.name.clone(),
                query.class.to_string(),
                fmt_pct(query.success_rate),
                fmt_ms(query.latency.mean_ms),
                fmt_ms(query.latency.p95_ms),
                fmt_ms(query.limit_p95_ms),
                query.baseline_p95_ms.map(fmt_ms).unwrap_or_default(),
                query
                    .regression_pct
                    .map(|r| format!("{:+.1}", r))
                    .unwrap_or_default(),
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
    use std::time::Duration;

    fn result(name: &str, samples: &[f64]) -> QueryBenchmarkResult {
        QueryBenchmarkResult {
            name: name.to_string(),
            promql: "up".to_string(),
            class: QueryClass::Simple,
            latency: LatencySummary::from_samples(samples),
            success_rate: if samples.is_empty() { 0.0 } else { 1.0 },
            series_count: None,
            limit_p95_ms: 100.0,
            baseline_p95_ms: None,
            regression_pct: None,
        }
    }

    #[test]
    fn test_regression_against_baseline() {
        let mut baseline = BTreeMap::new();
        baseline.insert("fast".to_string(), 10.0);
        baseline.insert("slower".to_string(), 10.0);

        let outcome = finish(
            &BenchmarkSettings::default(),
            Utc::now(),
            None,
            vec![result("fast", &[10.0; 5]), result("slower", &[15.0; 5]), result("new", &[5.0; 5])],
            &baseline,
            ErrorLog::default(),
        );

        assert_eq!(outcome.queries[0].regression_pct, Some(0.0));
        assert_eq!(outcome.queries[1].regression_pct, Some(50.0));
        assert_eq!(outcome.queries[2].regression_pct, None);
        assert_eq!(outcome.verdict, Verdict::Fail);
        let failed: Vec<_> = outcome.checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["slower_regression_pct"]);
    }

    #[test]
    fn test_query_without_successes_fails() {
        let outcome = finish(
            &BenchmarkSettings::default(),
            Utc::now(),
            None,
            vec![result("broken", &[])],
            &BTreeMap::new(),
            ErrorLog::default(),
        );
        assert_eq!(outcome.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_benchmark_run_and_baseline_file() {
        let mock = MockPrometheus::start().await;
        mock.mock_healthy().await;
        mock.mock_build_info("2.53.0").await;
        mock.mock_queries(None).await;
        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let baseline_path = dir.path().join("baseline.json");
        std::fs::write(
            &baseline_path,
            r#"{"queries": [{"name": "up", "latency": {"p95_ms": 1000.0}}]}"#,
        )
        .unwrap();

        let settings = BenchmarkSettings {
            warmup: 1,
            iterations: 5,
            baseline: Some(baseline_path),
            ..BenchmarkSettings::default()
        };
        let queries = vec![QuerySpec::instant("up", "up", QueryClass::Simple)];
        let benchmark = QueryBenchmark::new(Arc::new(client), settings, queries, Logger::disabled());
        let outcome = benchmark.run().await.unwrap();

        assert_eq!(outcome.build_info.as_ref().unwrap().version, "2.53.0");
        assert_eq!(outcome.queries[0].latency.count, 5);
        assert_eq!(outcome.queries[0].series_count, Some(1));
        assert!(outcome.queries[0].regression_pct.unwrap() < 0.0);
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert!(outcome.title().contains("2.53.0"));

        // 1 warmup + 5 recorded queries, plus health and build info
        let requests = mock.server().received_requests().await.unwrap();
        let queries = requests.iter().filter(|r| r.url.path() == "/api/v1/query").count();
        assert_eq!(queries, 6);
    }
}
