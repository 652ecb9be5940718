//! Individual security checks
//!
//! Each check issues one or two probes and turns the responses into a
//! [`SecurityFinding`]. A probe that fails at the transport level skips the
//! check instead of aborting the run.

use super::{SecurityFinding, Severity};
use crate::client::{Method, PrometheusApi, ProbeResponse};
use crate::error::Result;
use crate::models::SecuritySettings;
use regex::Regex;

pub const TRANSPORT_TLS: &str = "transport_tls";
pub const AUTHENTICATION_REQUIRED: &str = "authentication_required";
pub const ADMIN_API_EXPOSURE: &str = "admin_api_exposure";
pub const LIFECYCLE_API_EXPOSURE: &str = "lifecycle_api_exposure";
pub const CONFIG_DISCLOSURE: &str = "config_disclosure";
pub const FLAGS_DISCLOSURE: &str = "flags_disclosure";
pub const SECURITY_HEADERS: &str = "security_headers";
pub const MALFORMED_QUERY_HANDLING: &str = "malformed_query_handling";
pub const PATH_TRAVERSAL: &str = "path_traversal";

const QUERY_UP: &str = "/api/v1/query?query=up";
const ADMIN_PATH: &str = "/api/v1/admin/tsdb/clean_tombstones";
const RELOAD_PATH: &str = "/-/reload";
const CONFIG_PATH: &str = "/api/v1/status/config";
const FLAGS_PATH: &str = "/api/v1/status/flags";
/// `sum(rate(up[` percent-encoded
const MALFORMED_QUERY: &str = "/api/v1/query?query=sum%28rate%28up%5B";
/// Encoded separators so the URL parser does not collapse the dot segments
const TRAVERSAL_PATH: &str = "/static/..%2f..%2f..%2f..%2f..%2fetc%2fpasswd";

/// Redacted marker Prometheus prints in place of secrets
const REDACTED: &str = "<secret>";

fn is_denied(status: u16) -> bool {
    status == 401 || status == 403
}

fn unreachable(check: &str, path: &str, error: &crate::error::AppError) -> SecurityFinding {
    SecurityFinding::skipped(check, format!("{} could not be probed: {}", path, error))
}

async fn probe(api: &dyn PrometheusApi, method: Method, path: &str, authenticated: bool) -> Result<ProbeResponse> {
    api.probe(method, path, authenticated).await
}

pub fn transport_tls(base_url: &str, settings: &SecuritySettings) -> SecurityFinding {
    if base_url.starts_with("https://") {
        SecurityFinding::passed(TRANSPORT_TLS, "endpoint is served over HTTPS")
    } else if settings.expect_tls {
        SecurityFinding::failed(TRANSPORT_TLS, Severity::High, "endpoint is plain HTTP but TLS is expected")
    } else {
        SecurityFinding::skipped(TRANSPORT_TLS, "plain HTTP endpoint and TLS is not expected")
    }
}

pub async fn authentication_required(
    api: &dyn PrometheusApi,
    settings: &SecuritySettings,
    has_credentials: bool,
) -> SecurityFinding {
    if settings.expect_auth {
        match probe(api, Method::GET, QUERY_UP, false).await {
            Ok(response) if is_denied(response.status) => {}
            Ok(response) => {
                return SecurityFinding::failed(
                    AUTHENTICATION_REQUIRED,
                    Severity::High,
                    format!("anonymous query answered with HTTP {}", response.status),
                )
            }
            Err(e) => return unreachable(AUTHENTICATION_REQUIRED, QUERY_UP, &e),
        }
    }

    if has_credentials {
        match probe(api, Method::GET, QUERY_UP, true).await {
            Ok(response) if response.status == 200 => {}
            Ok(response) => {
                return SecurityFinding::failed(
                    AUTHENTICATION_REQUIRED,
                    Severity::Medium,
                    format!("configured credentials were rejected with HTTP {}", response.status),
                )
            }
            Err(e) => return unreachable(AUTHENTICATION_REQUIRED, QUERY_UP, &e),
        }
    }

    match (settings.expect_auth, has_credentials) {
        (false, false) => SecurityFinding::skipped(AUTHENTICATION_REQUIRED, "authentication is not expected"),
        (true, false) => SecurityFinding::passed(AUTHENTICATION_REQUIRED, "anonymous queries are rejected"),
        (false, true) => SecurityFinding::passed(AUTHENTICATION_REQUIRED, "configured credentials are accepted"),
        (true, true) => SecurityFinding::passed(
            AUTHENTICATION_REQUIRED,
            "anonymous queries are rejected and configured credentials are accepted",
        ),
    }
}

pub async fn admin_api_exposure(api: &dyn PrometheusApi, settings: &SecuritySettings) -> SecurityFinding {
    let response = match probe(api, Method::POST, ADMIN_PATH, true).await {
        Ok(response) => response,
        Err(e) => return unreachable(ADMIN_API_EXPOSURE, ADMIN_PATH, &e),
    };

    match response.status {
        200 | 204 if settings.allow_admin_api => {
            SecurityFinding::passed(ADMIN_API_EXPOSURE, "admin API is enabled and allowed")
        }
        200 | 204 => SecurityFinding::failed(
            ADMIN_API_EXPOSURE,
            Severity::High,
            format!("admin API accepted {} (HTTP {})", ADMIN_PATH, response.status),
        ),
        status => SecurityFinding::passed(ADMIN_API_EXPOSURE, format!("admin API is disabled (HTTP {})", status)),
    }
}

pub async fn lifecycle_api_exposure(api: &dyn PrometheusApi, settings: &SecuritySettings) -> SecurityFinding {
    let response = match probe(api, Method::GET, RELOAD_PATH, true).await {
        Ok(response) => response,
        Err(e) => return unreachable(LIFECYCLE_API_EXPOSURE, RELOAD_PATH, &e),
    };

    // An enabled lifecycle API only accepts POST/PUT, so GET gets 405
    match response.status {
        200 | 405 if settings.allow_lifecycle_api => {
            SecurityFinding::passed(LIFECYCLE_API_EXPOSURE, "lifecycle API is enabled and allowed")
        }
        200 | 405 => SecurityFinding::failed(
            LIFECYCLE_API_EXPOSURE,
            Severity::Medium,
            format!("lifecycle API is enabled ({} answered HTTP {})", RELOAD_PATH, response.status),
        ),
        403 => SecurityFinding::passed(LIFECYCLE_API_EXPOSURE, "lifecycle API is disabled"),
        status => SecurityFinding::passed(
            LIFECYCLE_API_EXPOSURE,
            format!("{} answered HTTP {}", RELOAD_PATH, status),
        ),
    }
}

/// Keys in a Prometheus configuration whose values are secrets that are not
/// shown as `<secret>`
pub fn find_unredacted_secrets(config_yaml: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(r"(?m)^\s*-?\s*(password|bearer_token|secret|client_secret|credentials)\s*:\s*(.+?)\s*$")?;

    let mut keys = Vec::new();
    for captures in pattern.captures_iter(config_yaml) {
        let value = captures[2].trim_matches(|c| c == '"' || c == '\'');
        if !value.is_empty() && value != REDACTED {
            keys.push(captures[1].to_string());
        }
    }
    Ok(keys)
}

pub async fn config_disclosure(api: &dyn PrometheusApi) -> SecurityFinding {
    let response = match probe(api, Method::GET, CONFIG_PATH, false).await {
        Ok(response) => response,
        Err(e) => return unreachable(CONFIG_DISCLOSURE, CONFIG_PATH, &e),
    };

    if response.status != 200 {
        return SecurityFinding::passed(
            CONFIG_DISCLOSURE,
            format!("configuration is not readable anonymously (HTTP {})", response.status),
        );
    }

    let yaml = response
        .api_envelope()
        .and_then(|envelope| envelope.data)
        .and_then(|data| data.get("yaml").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_default();

    match find_unredacted_secrets(&yaml) {
        Ok(keys) if !keys.is_empty() => SecurityFinding::failed(
            CONFIG_DISCLOSURE,
            Severity::Critical,
            format!("configuration exposes unredacted secrets: {}", keys.join(", ")),
        ),
        Ok(_) => SecurityFinding::failed(
            CONFIG_DISCLOSURE,
            Severity::Medium,
            "configuration is readable anonymously (secrets are redacted)",
        ),
        Err(e) => SecurityFinding::skipped(CONFIG_DISCLOSURE, e.to_string()),
    }
}

pub async fn flags_disclosure(api: &dyn PrometheusApi) -> SecurityFinding {
    match probe(api, Method::GET, FLAGS_PATH, false).await {
        Ok(response) if response.status == 200 => {
            SecurityFinding::failed(FLAGS_DISCLOSURE, Severity::Low, "command-line flags are readable anonymously")
        }
        Ok(response) => SecurityFinding::passed(
            FLAGS_DISCLOSURE,
            format!("flags are not readable anonymously (HTTP {})", response.status),
        ),
        Err(e) => unreachable(FLAGS_DISCLOSURE, FLAGS_PATH, &e),
    }
}

pub async fn security_headers(api: &dyn PrometheusApi) -> SecurityFinding {
    let response = match probe(api, Method::GET, "/-/healthy", true).await {
        Ok(response) => response,
        Err(e) => return unreachable(SECURITY_HEADERS, "/-/healthy", &e),
    };

    let mut expected = vec!["X-Content-Type-Options", "X-Frame-Options"];
    if api.base_url().starts_with("https://") {
        expected.push("Strict-Transport-Security");
    }
    let missing: Vec<&str> = expected
        .into_iter()
        .filter(|name| response.header(name).is_none())
        .collect();

    if missing.is_empty() {
        SecurityFinding::passed(SECURITY_HEADERS, "hardening headers are present")
    } else {
        SecurityFinding::failed(SECURITY_HEADERS, Severity::Low, format!("missing headers: {}", missing.join(", ")))
    }
}

pub async fn malformed_query_handling(api: &dyn PrometheusApi) -> SecurityFinding {
    let response = match probe(api, Method::GET, MALFORMED_QUERY, true).await {
        Ok(response) => response,
        Err(e) => return unreachable(MALFORMED_QUERY_HANDLING, MALFORMED_QUERY, &e),
    };

    let error_type = response.api_envelope().and_then(|envelope| envelope.error_type);
    match response.status {
        400 if error_type.as_deref() == Some("bad_data") => {
            SecurityFinding::passed(MALFORMED_QUERY_HANDLING, "invalid PromQL is rejected with bad_data")
        }
        status if is_denied(status) => {
            SecurityFinding::skipped(MALFORMED_QUERY_HANDLING, format!("query endpoint denied access (HTTP {})", status))
        }
        status if status >= 500 => SecurityFinding::failed(
            MALFORMED_QUERY_HANDLING,
            Severity::Medium,
            format!("invalid PromQL caused a server error (HTTP {})", status),
        ),
        status => SecurityFinding::failed(
            MALFORMED_QUERY_HANDLING,
            Severity::Low,
            format!(
                "invalid PromQL answered HTTP {} with error type {}",
                status,
                error_type.as_deref().unwrap_or("none")
            ),
        ),
    }
}

pub async fn path_traversal(api: &dyn PrometheusApi) -> SecurityFinding {
    match probe(api, Method::GET, TRAVERSAL_PATH, false).await {
        Ok(response) if response.status == 200 && response.body.contains("root:") => SecurityFinding::failed(
            PATH_TRAVERSAL,
            Severity::High,
            "static file handler served /etc/passwd",
        ),
        Ok(response) => SecurityFinding::passed(
            PATH_TRAVERSAL,
            format!("traversal attempt answered HTTP {}", response.status),
        ),
        Err(e) => unreachable(PATH_TRAVERSAL, TRAVERSAL_PATH, &e),
    }
}
