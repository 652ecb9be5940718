//! Fan-out of queries to a fixed number of concurrent requests

use super::PrometheusApi;
use crate::models::{OutcomeRecorder, QuerySpec};
use futures::future::join_all;
use std::time::{Duration, Instant};

/// Outcomes of one concurrent batch and the wall time it took
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub outcomes: OutcomeRecorder,
    pub wall_time: Duration,
}

impl BatchResult {
    /// Successful requests per second of wall time
    pub fn throughput(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.outcomes.successes() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Issue `concurrency` requests at once, cycling through `queries`, and wait for all of them
pub async fn run_batch(api: &dyn PrometheusApi, queries: &[QuerySpec], concurrency: u32) -> BatchResult {
    if queries.is_empty() {
        return BatchResult::default();
    }
    let picked: Vec<&QuerySpec> = queries.iter().cycle().take(concurrency as usize).collect();

    let start = Instant::now();
    let outcomes = join_all(picked.iter().map(|query| api.run_query(query))).await;
    let wall_time = start.elapsed();

    let mut recorder = OutcomeRecorder::new();
    for (query, outcome) in picked.iter().zip(outcomes) {
        recorder.record_for(&query.name, outcome);
    }

    BatchResult {
        outcomes: recorder,
        wall_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{mock_server::MockPrometheus, PrometheusClient};
    use crate::models::QueryClass;

    #[tokio::test]
    async fn test_batch_counts_every_request() {
        let mock = MockPrometheus::start().await;
        mock.mock_queries(Some(Duration::from_millis(20))).await;

        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(5)).unwrap();
        let queries = vec![
            QuerySpec::instant("up", "up", QueryClass::Simple),
            QuerySpec::instant("build", "prometheus_build_info", QueryClass::Simple),
        ];
        let batch = run_batch(&client, &queries, 8).await;

        assert_eq!(batch.outcomes.total(), 8);
        assert_eq!(batch.outcomes.successes(), 8);
        // Requests overlap, so the batch takes far less than 8 x 20 ms
        assert!(batch.wall_time < Duration::from_millis(150));
        assert!(batch.throughput() > 0.0);
    }

    #[tokio::test]
    async fn test_empty_query_set() {
        let client = PrometheusClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let batch = run_batch(&client, &[], 4).await;
        assert_eq!(batch.outcomes.total(), 0);
        assert_eq!(batch.throughput(), 0.0);
    }
}
