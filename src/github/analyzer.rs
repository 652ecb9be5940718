//! Fetches repository data, computes metrics and ranks repositories by health

use super::client::GitHubClient;
use super::health::HealthScore;
use super::metrics::RepositoryMetrics;
use super::types::RepositoryData;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{config::parse_repository, ThresholdCheck, Verdict};
use crate::output::{fmt_pct, MarkdownSection, Report, ReportTable};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryAnalysis {
    pub metrics: RepositoryMetrics,
    pub score: HealthScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisFailure {
    pub repository: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubReport {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: u32,
    /// Best score first
    pub repositories: Vec<RepositoryAnalysis>,
    pub failures: Vec<AnalysisFailure>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
}

impl GitHubReport {
    pub fn new(lookback_days: u32, mut repositories: Vec<RepositoryAnalysis>, failures: Vec<AnalysisFailure>) -> Self {
        repositories.sort_by(|a, b| {
            b.score
                .overall
                .total_cmp(&a.score.overall)
                .then_with(|| a.metrics.repository.cmp(&b.metrics.repository))
        });
        let checks = vec![ThresholdCheck::condition("all_repositories_analyzed", failures.is_empty()).advisory()];

        Self {
            generated_at: Utc::now(),
            lookback_days,
            repositories,
            failures,
            verdict: Verdict::from_checks(&checks),
            checks,
        }
    }
}

pub struct RepositoryAnalyzer {
    client: GitHubClient,
    lookback_days: u32,
    logger: Logger,
}

impl RepositoryAnalyzer {
    pub fn new(client: GitHubClient, lookback_days: u32, logger: Logger) -> Self {
        Self {
            client,
            lookback_days,
            logger,
        }
    }

    async fn fetch(&self, owner: &str, name: &str, since: DateTime<Utc>) -> Result<RepositoryData> {
        let (issues, commits, pulls, releases, contributors) = tokio::try_join!(
            self.client.issues(owner, name, since),
            self.client.commits(owner, name, since),
            self.client.pulls(owner, name),
            self.client.releases(owner, name),
            self.client.contributors(owner, name),
        )?;

        Ok(RepositoryData {
            issues,
            commits,
            pulls,
            releases,
            contributors,
        })
    }

    /// Analyze one `owner/name` repository
    pub async fn analyze(&self, repository: &str) -> Result<RepositoryAnalysis> {
        let (owner, name) = parse_repository(repository)?;
        let now = Utc::now();
        let since = now - ChronoDuration::days(i64::from(self.lookback_days));

        let data = self.fetch(&owner, &name, since).await?;
        let metrics = RepositoryMetrics::compute(&format!("{}/{}", owner, name), &data, now, self.lookback_days);
        let score = HealthScore::from_metrics(&metrics);

        self.logger
            .info("Analyzed repository")
            .field("repository", &metrics.repository)
            .field("score", score.overall)
            .field("grade", score.grade)
            .log()
            .await;

        Ok(RepositoryAnalysis { metrics, score })
    }

    /// Analyze every repository; fails only when none could be analyzed
    pub async fn analyze_all(&self, repositories: &[String]) -> Result<GitHubReport> {
        if repositories.is_empty() {
            return Err(AppError::validation("No repositories given"));
        }

        let mut analyses = Vec::with_capacity(repositories.len());
        let mut failures = Vec::new();
        let mut last_error = None;

        for repository in repositories {
            match self.analyze(repository).await {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    self.logger
                        .error("Repository analysis failed")
                        .field("repository", repository)
                        .error_info(&e)
                        .log()
                        .await;
                    failures.push(AnalysisFailure {
                        repository: repository.clone(),
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        if analyses.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(GitHubReport::new(self.lookback_days, analyses, failures))
    }
}

fn fmt_days(days: Option<f64>) -> String {
    days.map_or_else(|| "-".to_string(), |d| format!("{:.1}", d))
}

impl Report for GitHubReport {
    fn kind(&self) -> &'static str {
        "github"
    }

    fn title(&self) -> String {
        format!("GitHub repository health ({} day window)", self.lookback_days)
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn checks(&self) -> &[ThresholdCheck] {
        &self.checks
    }

    fn summary_lines(&self) -> Vec<(String, String)> {
        let mut lines: Vec<(String, String)> = self
            .repositories
            .iter()
            .map(|r| {
                (
                    r.metrics.repository.clone(),
                    format!("{:.1} ({})", r.score.overall, r.score.grade),
                )
            })
            .collect();
        for failure in &self.failures {
            lines.push((failure.repository.clone(), format!("failed: {}", failure.error)));
        }
        lines
    }

    fn markdown_sections(&self) -> Vec<MarkdownSection> {
        let mut sections = vec![MarkdownSection::table("Ranking", &self.csv_table())];

        for analysis in &self.repositories {
            let m = &analysis.metrics;
            let mut table = ReportTable::new(&["metric", "value"]);
            let rows = [
                ("open issues", m.open_issues.to_string()),
                ("issues closed", m.closed_issues.to_string()),
                ("median issue close (days)", fmt_days(m.median_issue_close_days)),
                ("pull requests opened", m.pulls_opened.to_string()),
                ("pull requests merged", m.pulls_merged.to_string()),
                ("merge rate", m.merge_rate.map_or_else(|| "-".to_string(), fmt_pct)),
                ("median merge time (days)", fmt_days(m.median_merge_days)),
                ("commits per week", format!("{:.1}", m.commits_per_week)),
                ("active authors", m.active_authors.to_string()),
                ("contributors", m.contributors.to_string()),
                (
                    "top contributor share",
                    m.top_contributor_share.map_or_else(|| "-".to_string(), fmt_pct),
                ),
                ("releases", m.releases.to_string()),
                ("days since last release", fmt_days(m.days_since_last_release)),
                ("mean days between releases", fmt_days(m.mean_days_between_releases)),
            ];
            for (metric, value) in rows {
                table.push_row(vec![metric.to_string(), value]);
            }
            sections.push(MarkdownSection::table(m.repository.clone(), &table));
        }

        if !self.failures.is_empty() {
            let body = self
                .failures
                .iter()
                .map(|f| format!("- `{}`: {}", f.repository, f.error))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(MarkdownSection::new("Failures", body));
        }
        sections
    }

    fn csv_table(&self) -> ReportTable {
        let mut table = ReportTable::new(&[
            "rank",
            "repository",
            "score",
            "grade",
            "activity",
            "responsiveness",
            "community",
            "maintenance",
            "releases",
        ]);
        for (rank, analysis) in self.repositories.iter().enumerate() {
            let score = &analysis.score;
            table.push_row(vec![
                (rank + 1).to_string(),
                analysis.metrics.repository.clone(),
                format!("{:.1}", score.overall),
                score.grade.to_string(),
                format!("{:.1}", score.activity),
                format!("{:.1}", score.responsiveness),
                format!("{:.1}", score.community),
                format!("{:.1}", score.maintenance),
                format!("{:.1}", score.releases),
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::super::metrics::fixtures::{healthy_repository, now};
    use super::*;
    use crate::github::health::Grade;
    use crate::models::GitHubSettings;
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn analysis(repository: &str, data: &RepositoryData) -> RepositoryAnalysis {
        let metrics = RepositoryMetrics::compute(repository, data, now(), 90);
        let score = HealthScore::from_metrics(&metrics);
        RepositoryAnalysis { metrics, score }
    }

    #[test]
    fn test_report_ranks_by_score() {
        let report = GitHubReport::new(
            90,
            vec![
                analysis("o/empty", &RepositoryData::default()),
                analysis("o/busy", &healthy_repository()),
            ],
            Vec::new(),
        );

        assert_eq!(report.repositories[0].metrics.repository, "o/busy");
        assert_eq!(report.verdict, Verdict::Pass);
        let table = report.csv_table();
        assert_eq!(table.rows[0][0], "1");
        assert_eq!(table.rows[1][1], "o/empty");
        assert_eq!(report.repositories[0].score.grade, Grade::A);
    }

    #[test]
    fn test_partial_failure_warns() {
        let report = GitHubReport::new(
            90,
            vec![analysis("o/busy", &healthy_repository())],
            vec![AnalysisFailure {
                repository: "o/gone".to_string(),
                error: "not found".to_string(),
            }],
        );
        assert_eq!(report.verdict, Verdict::Warn);
        assert!(report.markdown_sections().iter().any(|s| s.heading == "Failures"));
    }

    async fn mount(server: &MockServer, endpoint: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/widget/{}", endpoint)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_analyze_against_mock_api() {
        let server = MockServer::start().await;
        let recent = (Utc::now() - ChronoDuration::days(3)).to_rfc3339();
        let older = (Utc::now() - ChronoDuration::days(5)).to_rfc3339();

        mount(
            &server,
            "issues",
            serde_json::json!([
                {"number": 1, "state": "closed", "created_at": older, "closed_at": recent},
                {"number": 2, "state": "open", "created_at": recent, "pull_request": {"url": "x"}}
            ]),
        )
        .await;
        mount(
            &server,
            "commits",
            serde_json::json!([
                {"sha": "a", "commit": {"author": {"name": "Ann", "date": recent}}, "author": {"login": "ann"}}
            ]),
        )
        .await;
        mount(
            &server,
            "pulls",
            serde_json::json!([
                {"number": 2, "state": "closed", "created_at": older, "closed_at": recent, "merged_at": recent}
            ]),
        )
        .await;
        mount(&server, "releases", serde_json::json!([{"tag_name": "v1", "created_at": recent}])).await;
        mount(&server, "contributors", serde_json::json!([{"login": "ann", "contributions": 3}])).await;

        let settings = GitHubSettings {
            api_url: server.uri(),
            ..GitHubSettings::default()
        };
        let client = GitHubClient::new(&settings, Duration::from_secs(5), Logger::disabled()).unwrap();
        let analyzer = RepositoryAnalyzer::new(client, 90, Logger::disabled());

        let report = analyzer
            .analyze_all(&["acme/widget".to_string(), "acme/missing".to_string()])
            .await
            .unwrap();

        assert_eq!(report.repositories.len(), 1);
        let metrics = &report.repositories[0].metrics;
        assert_eq!(metrics.closed_issues, 1);
        assert_eq!(metrics.open_issues, 0);
        assert_eq!(metrics.pulls_merged, 1);
        assert_eq!(metrics.merge_rate, Some(1.0));
        assert_eq!(metrics.top_contributor_share, Some(1.0));
        assert_eq!(report.failures[0].repository, "acme/missing");
        assert_eq!(report.verdict, Verdict::Warn);
    }

    #[tokio::test]
    async fn test_invalid_repository_name() {
        let settings = GitHubSettings::default();
        let client = GitHubClient::new(&settings, Duration::from_secs(5), Logger::disabled()).unwrap();
        let analyzer = RepositoryAnalyzer::new(client, 90, Logger::disabled());
        let error = analyzer.analyze_all(&["not-a-repo".to_string()]).await.unwrap_err();
        assert_eq!(error.exit_code(), 1);
    }
}
