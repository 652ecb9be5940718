//! Prometheus HTTP client and request measurement

#[cfg(test)]
pub(crate) mod mock_server;


mod batch;

pub use batch::{run_batch, BatchResult};

use crate::{
    error::{AppError, ErrorCategory, Result, TestError},
    logging::RequestLogger,
    models::{Config, QueryKind, QuerySpec, RequestOutcome},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub use reqwest::Method;

/// Operations the testers perform against Prometheus
#[async_trait]
pub trait PrometheusApi: Send + Sync {
    /// Base URL requests are sent to
    fn base_url(&self) -> &str;

    /// Execute an instant or range query; failures are encoded in the outcome
    async fn run_query(&self, query: &QuerySpec) -> RequestOutcome;

    /// `GET /-/healthy`
    async fn health(&self) -> RequestOutcome;

    /// `GET /-/ready`
    async fn readiness(&self) -> RequestOutcome;

    async fn build_info(&self) -> Result<BuildInfo>;

    /// First sample of an instant query, `None` when the result is empty
    async fn sample_value(&self, promql: &str) -> Result<Option<f64>>;

    /// Raw request against any path, used by the security checks
    async fn probe(&self, method: Method, path: &str, authenticated: bool) -> Result<ProbeResponse>;
}

/// Credentials attached to authenticated requests
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Credentials {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

impl Credentials {
    pub fn from_config(config: &Config) -> Self {
        match (&config.username, &config.password, &config.bearer_token) {
            (Some(username), Some(password), _) => Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            (_, _, Some(token)) => Credentials::Bearer(token.clone()),
            _ => Credentials::None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Credentials::None)
    }
}

/// `GET /api/v1/status/buildinfo` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, rename = "goVersion")]
    pub go_version: String,
}

/// Raw response returned by [`PrometheusApi::probe`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ProbeResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn api_envelope(&self) -> Option<ApiEnvelope> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Common shape of every `/api/v1` response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiEnvelope {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    fn error_message(&self) -> String {
        match (&self.error_type, &self.error) {
            (Some(kind), Some(message)) => format!("{}: {}", kind, message),
            (None, Some(message)) => message.clone(),
            (Some(kind), None) => kind.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }

    /// Number of series (vector/matrix) or 1 for scalar and string results
    fn series_count(&self) -> Option<usize> {
        let result = self.data.as_ref()?.get("result")?;
        match result {
            serde_json::Value::Array(items) => Some(items.len()),
            serde_json::Value::Null => None,
            _ => Some(1),
        }
    }
}

/// `reqwest` implementation of [`PrometheusApi`]
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    request_logger: Option<RequestLogger>,
}

impl PrometheusClient {
    /// Create a client with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::config(format!("Unsupported URL scheme: {}", parsed.scheme())));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::defaults::USER_AGENT)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: Credentials::None,
            request_logger: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.prometheus_url, config.timeout())?.with_credentials(Credentials::from_config(config)))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_request_logger(mut self, logger: RequestLogger) -> Self {
        self.request_logger = Some(logger);
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder, authenticated: bool) -> RequestBuilder {
        if !authenticated {
            return request;
        }
        match &self.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => request.basic_auth(username, Some(password)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn log_request(&self, method: &str, url: &str, status: Option<u16>, latency: Duration) {
        if let Some(logger) = &self.request_logger {
            logger
                .log_http_request(method, url, status, latency.as_secs_f64() * 1000.0)
                .await;
        }
    }

    /// Send an authenticated `/api/v1` GET and turn the response into an outcome
    async fn timed_api_call(&self, path: &str, params: &[(&str, String)]) -> RequestOutcome {
        let url = self.url(path);
        let request = self.authorize(self.client.get(&url).query(params), true);

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let latency = start.elapsed();
                self.log_request("GET", &url, None, latency).await;
                return RequestOutcome::failure(latency, None, transport_error(&e));
            }
        };

        let status = response.status().as_u16();
        let body = response.bytes().await;
        let latency = start.elapsed();
        self.log_request("GET", &url, Some(status), latency).await;

        match body {
            Ok(bytes) => classify_api_response(latency, status, &bytes),
            Err(e) => RequestOutcome::failure(latency, Some(status), transport_error(&e)),
        }
    }

    /// Send a GET to a plain-text endpoint where HTTP 200 is success
    async fn timed_status_call(&self, path: &str) -> RequestOutcome {
        let url = self.url(path);
        let request = self.authorize(self.client.get(&url), true);

        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so latency covers the full response
                match response.bytes().await {
                    Ok(_) => Ok(status),
                    Err(e) => Err((Some(status), e)),
                }
            }
            Err(e) => Err((None, e)),
        };
        let latency = start.elapsed();

        match result {
            Ok(status) => {
                self.log_request("GET", &url, Some(status), latency).await;
                if status == 200 {
                    RequestOutcome::success(latency, status, None)
                } else {
                    RequestOutcome::failure(
                        latency,
                        Some(status),
                        TestError::new(ErrorCategory::HttpStatus, format!("HTTP {}", status)),
                    )
                }
            }
            Err((status, e)) => {
                self.log_request("GET", &url, status, latency).await;
                RequestOutcome::failure(latency, status, transport_error(&e))
            }
        }
    }

    /// Authenticated `/api/v1` GET that must succeed, returning `data`
    async fn api_data(&self, path: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = self.url(path);
        let request = self.authorize(self.client.get(&url).query(params), true);

        let start = Instant::now();
        let response = request.send().await;
        let status = response.as_ref().ok().map(|r| r.status().as_u16());
        self.log_request("GET", &url, status, start.elapsed()).await;
        let response = response?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(AppError::auth(format!("{} returned HTTP {}", path, status)));
        }

        let body = response.bytes().await?;
        let envelope: ApiEnvelope = serde_json::from_slice(&body).map_err(|e| {
            AppError::parse(format!("{} returned HTTP {} with an undecodable body: {}", path, status, e))
        })?;

        if status != 200 || !envelope.is_success() {
            return Err(AppError::http_request(format!(
                "{} returned HTTP {}: {}",
                path,
                status,
                envelope.error_message()
            )));
        }

        envelope
            .data
            .ok_or_else(|| AppError::parse(format!("{} response has no data", path)))
    }
}

#[async_trait]
impl PrometheusApi for PrometheusClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn run_query(&self, query: &QuerySpec) -> RequestOutcome {
        match &query.kind {
            QueryKind::Instant => {
                self.timed_api_call("/api/v1/query", &[("query", query.promql.clone())])
                    .await
            }
            QueryKind::Range { range, step } => {
                let end = Utc::now().timestamp_millis() as f64 / 1000.0;
                let start = end - range.as_secs_f64();
                let params = [
                    ("query", query.promql.clone()),
                    ("start", format!("{:.3}", start)),
                    ("end", format!("{:.3}", end)),
                    ("step", format!("{}", step.as_secs_f64())),
                ];
                self.timed_api_call("/api/v1/query_range", &params).await
            }
        }
    }

    async fn health(&self) -> RequestOutcome {
        self.timed_status_call("/-/healthy").await
    }

    async fn readiness(&self) -> RequestOutcome {
        self.timed_status_call("/-/ready").await
    }

    async fn build_info(&self) -> Result<BuildInfo> {
        let data = self.api_data("/api/v1/status/buildinfo", &[]).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn sample_value(&self, promql: &str) -> Result<Option<f64>> {
        let data = self
            .api_data("/api/v1/query", &[("query", promql.to_string())])
            .await?;
        first_sample(&data)
    }

    async fn probe(&self, method: Method, path: &str, authenticated: bool) -> Result<ProbeResponse> {
        let url = self.url(path);
        let method_name = method.to_string();
        let request = self.authorize(self.client.request(method, &url), authenticated);

        let start = Instant::now();
        let response = request.send().await;
        let status = response.as_ref().ok().map(|r| r.status().as_u16());
        self.log_request(&method_name, &url, status, start.elapsed()).await;
        let response = response?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response.text().await?;

        Ok(ProbeResponse { status, headers, body })
    }
}

/// Turn an `/api/v1` response into an outcome
pub fn classify_api_response(latency: Duration, status: u16, body: &[u8]) -> RequestOutcome {
    let envelope: std::result::Result<ApiEnvelope, _> = serde_json::from_slice(body);

    match (status, envelope) {
        (200, Ok(envelope)) if envelope.is_success() => {
            RequestOutcome::success(latency, status, envelope.series_count())
        }
        // Prometheus rejects bad PromQL and failed evaluations with an error envelope
        (_, Ok(envelope)) if envelope.status == "error" => RequestOutcome::failure(
            latency,
            Some(status),
            TestError::new(ErrorCategory::QueryError, envelope.error_message()),
        ),
        (200, _) => RequestOutcome::failure(
            latency,
            Some(status),
            TestError::new(ErrorCategory::Parse, "response body is not a Prometheus API envelope"),
        ),
        (_, _) => RequestOutcome::failure(
            latency,
            Some(status),
            TestError::new(ErrorCategory::HttpStatus, format!("HTTP {}", status)),
        ),
    }
}

fn transport_error(error: &reqwest::Error) -> TestError {
    let category = if error.is_timeout() {
        ErrorCategory::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ErrorCategory::Connection
    } else if error.is_decode() {
        ErrorCategory::Parse
    } else {
        ErrorCategory::Other
    };
    TestError::new(category, error.to_string())
}

/// Value of the first sample in an instant query `data` object
fn first_sample(data: &serde_json::Value) -> Result<Option<f64>> {
    let result_type = data.get("resultType").and_then(|v| v.as_str()).unwrap_or("");
    let pair = match result_type {
        "vector" => data
            .get("result")
            .and_then(|r| r.as_array())
            .and_then(|items| items.first())
            .and_then(|item| item.get("value")),
        "scalar" => data.get("result"),
        other => {
            return Err(AppError::parse(format!(
                "Expected an instant vector or scalar, got '{}'",
                other
            )))
        }
    };

    let Some(pair) = pair else {
        return Ok(None);
    };

    let raw = pair
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::parse("Sample is not a [timestamp, \"value\"] pair"))?;

    match raw {
        "NaN" | "+Inf" | "-Inf" => Ok(None),
        value => Ok(Some(value.parse::<f64>()?)),
    }
}

/// Health gate run before every test; an unhealthy target aborts the command
pub async fn ensure_healthy(api: &dyn PrometheusApi) -> Result<()> {
    let outcome = api.health().await;
    if outcome.success {
        return Ok(());
    }

    let reason = outcome
        .error
        .map(|e| e.message)
        .unwrap_or_else(|| "unknown failure".to_string());

    match outcome.status_code {
        Some(401) | Some(403) => Err(AppError::auth(format!(
            "Prometheus at {} rejected the health check: {}",
            api.base_url(),
            reason
        ))),
        _ => Err(AppError::network(format!(
            "Prometheus at {} is not healthy: {}",
            api.base_url(),
            reason
        ))),
    }
}
