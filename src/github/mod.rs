//! GitHub repository metrics and health scoring

mod analyzer;
mod client;
mod health;
mod metrics;
mod types;

pub use analyzer::{AnalysisFailure, GitHubReport, RepositoryAnalysis, RepositoryAnalyzer};
pub use client::{next_page_url, GitHubClient, RateLimitInfo, PER_PAGE};
pub use health::{Grade, HealthScore};
pub use metrics::RepositoryMetrics;
pub use types::{Commit, Contributor, Issue, PullRequest, Release, RepositoryData};
