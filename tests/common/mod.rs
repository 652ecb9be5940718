//! Shared helpers for the integration tests

#![allow(dead_code)]

use assert_cmd::prelude::*;
use prometheus_test_harness::logging::Logger;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const HARNESS_ENV: &[&str] = &[
    "PROMETHEUS_URL",
    "PROMETHEUS_TIMEOUT_SECONDS",
    "PROMETHEUS_USERNAME",
    "PROMETHEUS_PASSWORD",
    "PROMETHEUS_BEARER_TOKEN",
    "PROMETHEUS_SELF_JOB",
    "HARNESS_OUTPUT_DIR",
    "HARNESS_FORMATS",
    "GITHUB_TOKEN",
    "GITHUB_API_URL",
    "K6_BINARY",
    "ENABLE_COLOR",
    "PTH_CONFIG",
];

/// `pth` running inside `dir` with a clean harness environment
pub fn pth(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pth").unwrap();
    for name in HARNESS_ENV {
        cmd.env_remove(name);
    }
    cmd.env("NO_COLOR", "1").current_dir(dir.path());
    cmd
}

/// Write a YAML config file into `dir` and return its path
pub fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("pth.yaml");
    std::fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

pub fn quiet_logger() -> Logger {
    Logger::disabled()
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

/// Healthy Prometheus answering every query with a one-series vector
pub async fn healthy_prometheus(query_delay: Duration) -> MockServer {
    let server = MockServer::start().await;

    for endpoint in ["/-/healthy", "/-/ready"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_string("Prometheus Server is Healthy.\n"))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/api/v1/status/buildinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": {"version": "2.53.0", "revision": "abc123", "branch": "HEAD", "goVersion": "go1.22.4"}
        })))
        .mount(&server)
        .await;

    for endpoint in ["/api/v1/query", "/api/v1/query_range"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(vector_body(&[1.0]))
                    .set_delay(query_delay),
            )
            .mount(&server)
            .await;
    }

    server
}
