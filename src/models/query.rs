//! PromQL query definitions driven by the testers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a query is sent to Prometheus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryKind {
    /// `GET /api/v1/query`
    Instant,
    /// `GET /api/v1/query_range` over `[now - range, now]`
    Range {
        #[serde(with = "humantime_serde")]
        range: Duration,
        #[serde(with = "humantime_serde")]
        step: Duration,
    },
}

/// Expected cost of a query, selects the benchmark latency limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    #[default]
    Simple,
    Moderate,
    Complex,
}

impl QueryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named PromQL query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub name: String,
    pub promql: String,
    #[serde(default = "instant")]
    pub kind: QueryKind,
    #[serde(default)]
    pub class: QueryClass,
}

fn instant() -> QueryKind {
    QueryKind::Instant
}

impl QuerySpec {
    pub fn instant<N: Into<String>, Q: Into<String>>(name: N, promql: Q, class: QueryClass) -> Self {
        Self {
            name: name.into(),
            promql: promql.into(),
            kind: QueryKind::Instant,
            class,
        }
    }

    pub fn range<N: Into<String>, Q: Into<String>>(
        name: N,
        promql: Q,
        range: Duration,
        step: Duration,
        class: QueryClass,
    ) -> Self {
        Self {
            name: name.into(),
            promql: promql.into(),
            kind: QueryKind::Range { range, step },
            class,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self.kind, QueryKind::Range { .. })
    }
}

/// Queries over Prometheus' own metrics, available on any instance that scrapes itself
pub fn default_queries() -> Vec<QuerySpec> {
    vec![
        QuerySpec::instant("up", "up", QueryClass::Simple),
        QuerySpec::instant("build_info", "prometheus_build_info", QueryClass::Simple),
        QuerySpec::instant(
            "http_request_rate",
            "sum by (handler) (rate(prometheus_http_requests_total[5m]))",
            QueryClass::Moderate,
        ),
        QuerySpec::instant(
            "scrape_duration_by_job",
            "avg by (job) (scrape_duration_seconds)",
            QueryClass::Moderate,
        ),
        QuerySpec::instant(
            "http_latency_p99",
            "histogram_quantile(0.99, sum by (le, handler) (rate(prometheus_http_request_duration_seconds_bucket[5m])))",
            QueryClass::Complex,
        ),
        QuerySpec::range(
            "head_series_1h",
            "prometheus_tsdb_head_series",
            Duration::from_secs(3600),
            Duration::from_secs(60),
            QueryClass::Moderate,
        ),
        QuerySpec::range(
            "engine_query_time_6h",
            "sum by (slice) (rate(prometheus_engine_query_duration_seconds_sum[5m]))",
            Duration::from_secs(6 * 3600),
            Duration::from_secs(300),
            QueryClass::Complex,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queries_have_unique_names() {
        let queries = default_queries();
        let mut names: Vec<_> = queries.iter().map(|q| q.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), queries.len());
        assert!(queries.iter().any(QuerySpec::is_range));
    }

    #[test]
    fn test_query_yaml_shape() {
        let yaml = r#"
- name: up
  promql: up
- name: series
  promql: prometheus_tsdb_head_series
  kind:
    type: range
    range: 30m
    step: 30s
  class: moderate
"#;
        let queries: Vec<QuerySpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(queries[0].kind, QueryKind::Instant);
        assert_eq!(queries[0].class, QueryClass::Simple);
        assert_eq!(
            queries[1].kind,
            QueryKind::Range {
                range: Duration::from_secs(1800),
                step: Duration::from_secs(30)
            }
        );
        assert_eq!(queries[1].class, QueryClass::Moderate);
    }
}
