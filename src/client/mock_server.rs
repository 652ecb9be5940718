//! Mock Prometheus server for unit tests of the client and the testers

use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Match, Mock, MockServer, Request, ResponseTemplate,
};

/// Matches requests whose `query` parameter contains a substring
pub struct PromQlContains(pub &'static str);

impl Match for PromQlContains {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query_pairs()
            .any(|(key, value)| key == "query" && value.contains(self.0))
    }
}

pub fn vector_body(values: &[f64]) -> serde_json::Value {
    let result: Vec<serde_json::Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::json!({
                "metric": {"instance": format!("node-{}", i)},
                "value": [1_700_000_000.0, v.to_string()]
            })
        })
        .collect();
    serde_json::json!({"status": "success", "data": {"resultType": "vector", "result": result}})
}

pub fn matrix_body() -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": {"resultType": "matrix", "result": [
            {"metric": {"job": "prometheus"}, "values": [[1_700_000_000.0, "1"], [1_700_000_060.0, "2"]]}
        ]}
    })
}

/// Mock Prometheus for controlled testing scenarios
pub struct MockPrometheus {
    server: MockServer,
}

impl MockPrometheus {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// `/-/healthy` and `/-/ready` answer 200
    pub async fn mock_healthy(&self) {
        for endpoint in ["/-/healthy", "/-/ready"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_string("Prometheus Server is Healthy.\n"))
                .mount(&self.server)
                .await;
        }
    }

    /// Health endpoints answer with the given status
    pub async fn mock_health_status(&self, status: u16) {
        for endpoint in ["/-/healthy", "/-/ready"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(status))
                .mount(&self.server)
                .await;
        }
    }

    /// Instant and range queries succeed after an optional delay
    pub async fn mock_queries(&self, delay: Option<Duration>) {
        let mut instant = ResponseTemplate::new(200).set_body_json(vector_body(&[1.0]));
        let mut range = ResponseTemplate::new(200).set_body_json(matrix_body());
        if let Some(delay) = delay {
            instant = instant.set_delay(delay);
            range = range.set_delay(delay);
        }

        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(instant)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .respond_with(range)
            .mount(&self.server)
            .await;
    }

    /// Every query fails with the given HTTP status
    pub async fn mock_query_status(&self, status: u16) {
        for endpoint in ["/api/v1/query", "/api/v1/query_range"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(status).set_body_string("overloaded"))
                .mount(&self.server)
                .await;
        }
    }

    /// Instant queries whose PromQL contains `needle` return one sample.
    /// Mount before [`mock_queries`](Self::mock_queries) so it takes priority.
    pub async fn mock_sample(&self, needle: &'static str, value: f64) {
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(PromQlContains(needle))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector_body(&[value])))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_build_info(&self, version: &str) {
        Mock::given(method("GET"))
            .and(path("/api/v1/status/buildinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"version": version, "revision": "abc123", "branch": "HEAD", "goVersion": "go1.22.1"}
            })))
            .mount(&self.server)
            .await;
    }
}
