//! Runs every security check and derives the verdict

use super::{checks, FindingStatus, SecurityFinding, Severity};
use crate::client::{ensure_healthy, PrometheusApi};
use crate::error::Result;
use crate::logging::Logger;
use crate::models::{SecuritySettings, ThresholdCheck, Verdict};
use crate::output::{MarkdownSection, Report, ReportTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub target: String,
    pub checked_at: DateTime<Utc>,
    pub fail_on: Severity,
    pub findings: Vec<SecurityFinding>,
    /// Failed findings per severity
    pub failures: BTreeMap<Severity, usize>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
}

impl SecurityReport {
    /// A failed finding at or above `fail_on` fails the run, any other failure warns
    pub fn from_findings(target: String, findings: Vec<SecurityFinding>, fail_on: Severity) -> Self {
        let checks: Vec<ThresholdCheck> = findings
            .iter()
            .filter(|f| f.status != FindingStatus::Skipped)
            .map(|f| {
                let check = ThresholdCheck::condition(f.check.as_str(), !f.is_failed());
                if f.is_failed() && f.severity < fail_on {
                    check.advisory()
                } else {
                    check
                }
            })
            .collect();

        let mut failures = BTreeMap::new();
        for finding in findings.iter().filter(|f| f.is_failed()) {
            *failures.entry(finding.severity).or_insert(0) += 1;
        }

        Self {
            target,
            checked_at: Utc::now(),
            fail_on,
            verdict: Verdict::from_checks(&checks),
            findings,
            failures,
            checks,
        }
    }
}

/// Probes a Prometheus endpoint for common misconfigurations
pub struct SecurityVerifier {
    api: Arc<dyn PrometheusApi>,
    settings: SecuritySettings,
    has_credentials: bool,
    logger: Logger,
}

impl SecurityVerifier {
    pub fn new(api: Arc<dyn PrometheusApi>, settings: SecuritySettings, has_credentials: bool, logger: Logger) -> Self {
        Self {
            api,
            settings,
            has_credentials,
            logger,
        }
    }

    pub async fn run(&self) -> Result<SecurityReport> {
        ensure_healthy(self.api.as_ref()).await?;
        let api = self.api.as_ref();

        let findings = vec![
            checks::transport_tls(api.base_url(), &self.settings),
            checks::authentication_required(api, &self.settings, self.has_credentials).await,
            checks::admin_api_exposure(api, &self.settings).await,
            checks::lifecycle_api_exposure(api, &self.settings).await,
            checks::config_disclosure(api).await,
            checks::flags_disclosure(api).await,
            checks::security_headers(api).await,
            checks::malformed_query_handling(api).await,
            checks::path_traversal(api).await,
        ];

        for finding in findings.iter().filter(|f| f.is_failed()) {
            self.logger
                .warn("Security check failed")
                .field("check", &finding.check)
                .field("severity", finding.severity)
                .field("detail", &finding.detail)
                .log()
                .await;
        }

        Ok(SecurityReport::from_findings(
            api.base_url().to_string(),
            findings,
            self.settings.fail_on,
        ))
    }
}

impl Report for SecurityReport {
    fn kind(&self) -> &'static str {
        "security"
    }

    fn title(&self) -> String {
        format!("Security verification of {}", self.target)
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let count = |status: FindingStatus| self.findings.iter().filter(|f| f.status == status).count();
        let mut lines = vec![
            ("Passed".to_string(), count(FindingStatus::Passed).to_string()),
            ("Failed".to_string(), count(FindingStatus::Failed).to_string()),
            ("Skipped".to_string(), count(FindingStatus::Skipped).to_string()),
            ("Fail on".to_string(), format!("{} and above", self.fail_on)),
        ];
        for (severity, n) in self.failures.iter().rev() {
            lines.push((format!("Failed {}", severity), n.to_string()));
        }
        lines
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        vec![MarkdownSection::table("Findings", &self.csv_table())]
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&["check", "status", "severity", "detail"]);
        for finding in &self.findings {
            table.push_row(vec![
                finding.check.clone(),
                finding.status.as_str().to_string(),
                if finding.is_failed() {
                    finding.severity.to_string()
                } else {
                    String::new()
                },
                finding.detail.clone(),
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{mock_server::MockPrometheus, PrometheusClient};
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, ResponseTemplate,
    };

    #[test]
    fn test_verdict_follows_fail_on() {
        let findings = vec![
            SecurityFinding::passed("a", "ok"),
            SecurityFinding::failed("b", Severity::Medium, "meh"),
            SecurityFinding::skipped("c", "n/a"),
        ];

        let report = SecurityReport::from_findings("http://x".into(), findings.clone(), Severity::High);
        assert_eq!(report.verdict, Verdict::Warn);
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.failures.get(&Severity::Medium), Some(&1));

        let strict = SecurityReport::from_findings("http://x".into(), findings, Severity::Medium);
        assert_eq!(strict.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_hardened_instance_passes() {
        let mock = MockPrometheus::start().await;
        for endpoint in ["/-/healthy", "/-/ready"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("X-Content-Type-Options", "nosniff")
                        .insert_header("X-Frame-Options", "DENY"),
                )
                .mount(mock.server())
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": "error", "errorType": "bad_data", "error": "parse error"
            })))
            .mount(mock.server())
            .await;
        Mock::given(method("GET"))
            .and(path("/-/reload"))
            .respond_with(ResponseTemplate::new(403))
            .mount(mock.server())
            .await;

        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();
        let verifier = SecurityVerifier::new(Arc::new(client), SecuritySettings::default(), false, Logger::disabled());
        let report = verifier.run().await.unwrap();

        assert_eq!(report.findings.len(), 9);
        assert!(report.findings.iter().all(|f| !f.is_failed()), "{:?}", report.findings);
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_exposed_admin_api_fails_run() {
        let mock = MockPrometheus::start().await;
        mock.mock_healthy().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/admin/tsdb/clean_tombstones"))
            .respond_with(ResponseTemplate::new(204))
            .mount(mock.server())
            .await;

        let client = PrometheusClient::new(&mock.url(), Duration::from_secs(2)).unwrap();
        let verifier = SecurityVerifier::new(Arc::new(client), SecuritySettings::default(), false, Logger::disabled());
        let report = verifier.run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.failures.get(&Severity::High), Some(&1));
        let table = report.csv_table();
        assert!(table.rows.iter().any(|row| row[0] == "admin_api_exposure" && row[2] == "high"));
    }
}
