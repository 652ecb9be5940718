//! Paginated GitHub REST client

use super::types::{Commit, Contributor, Issue, PullRequest, Release};
use crate::error::{AppError, Result};
use crate::logging::{Logger, RequestLogger};
use crate::models::GitHubSettings;
use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// Items requested per page, the API maximum
pub const PER_PAGE: u32 = 100;

/// Remaining requests below which a warning is logged
const RATE_LIMIT_WARNING: u32 = 10;

const ACCEPT: &str = "application/vnd.github+json";

/// Rate limit information from GitHub API headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp the window resets at
    pub reset: i64,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = |name: &str| headers.get(name)?.to_str().ok().map(str::trim);

        Some(Self {
            limit: value("x-ratelimit-limit")?.parse().ok()?,
            remaining: value("x-ratelimit-remaining")?.parse().ok()?,
            reset: value("x-ratelimit-reset")?.parse().ok()?,
        })
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset, 0)
    }
}

/// URL of the `rel="next"` entry of a `Link` header
pub fn next_page_url(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|entry| {
        let mut parts = entry.split(';').map(str::trim);
        let target = parts.next()?;
        let is_next = parts.any(|param| param == "rel=\"next\"");
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    max_pages: u32,
    logger: Logger,
    request_logger: RequestLogger,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings, timeout: Duration, logger: Logger) -> Result<Self> {
        url::Url::parse(&settings.api_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::defaults::USER_AGENT)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create GitHub API client: {}", e)))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            max_pages: settings.max_pages.max(1),
            request_logger: RequestLogger::new(logger.child("http")),
            logger,
        })
    }

    /// Fetch one page, returning its items and the next page URL
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<(Vec<T>, Option<String>)> {
        let mut request = self.client.get(url).query(params).header("Accept", ACCEPT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let response = request.send().await;
        let status = response.as_ref().ok().map(|r| r.status().as_u16());
        self.request_logger
            .log_http_request("GET", url, status, start.elapsed().as_secs_f64() * 1000.0)
            .await;
        let response = response?;

        let rate_limit = RateLimitInfo::from_headers(response.headers());
        if let Some(limit) = rate_limit {
            if limit.remaining < RATE_LIMIT_WARNING && limit.remaining > 0 {
                self.logger
                    .warn("GitHub API rate limit is low")
                    .field("remaining", limit.remaining)
                    .field("limit", limit.limit)
                    .field("reset_at", limit.reset_at())
                    .log()
                    .await;
            }
        }

        match response.status() {
            StatusCode::NO_CONTENT => return Ok((Vec::new(), None)),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
                if rate_limit.is_some_and(|limit| limit.remaining == 0) =>
            {
                let reset = rate_limit
                    .and_then(|limit| limit.reset_at())
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "an unknown time".to_string());
                return Err(AppError::github(format!(
                    "GitHub API rate limit exceeded; the limit resets at {}",
                    reset
                )));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(AppError::auth("GitHub rejected the token (HTTP 401)"));
            }
            StatusCode::NOT_FOUND => {
                return Err(AppError::github(format!("{} not found (HTTP 404)", url)));
            }
            status if !status.is_success() => {
                return Err(AppError::github(format!("GitHub API request to {} failed: HTTP {}", url, status)));
            }
            _ => {}
        }

        let next = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_url);

        let body = response.bytes().await?;
        let items: Vec<T> = serde_json::from_slice(&body)
            .map_err(|e| AppError::parse(format!("Unexpected GitHub API response from {}: {}", url, e)))?;
        Ok((items, next))
    }

    /// Every item of a repository collection, following `Link` headers up to `max_pages`
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        owner: &str,
        name: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let first = format!("{}/repos/{}/{}/{}", self.api_url, owner, name, endpoint);
        let mut params: Vec<(&str, String)> = params.to_vec();
        params.push(("per_page", PER_PAGE.to_string()));

        let (mut items, mut next) = self.get_page::<T>(&first, &params).await?;
        let mut pages = 1;

        while let Some(url) = next {
            if pages >= self.max_pages {
                self.logger
                    .warn("Stopped paginating at the page limit")
                    .field("endpoint", endpoint)
                    .field("max_pages", self.max_pages)
                    .log()
                    .await;
                break;
            }
            // Next links already carry the query string
            let (page, following) = self.get_page::<T>(&url, &[]).await?;
            items.extend(page);
            next = following;
            pages += 1;
        }

        self.logger
            .debug("Fetched GitHub collection")
            .field("repository", format!("{}/{}", owner, name))
            .field("endpoint", endpoint)
            .field("items", items.len())
            .field("pages", pages)
            .log()
            .await;
        Ok(items)
    }

    /// Issues updated since `since`, pull requests excluded
    pub async fn issues(&self, owner: &str, name: &str, since: DateTime<Utc>) -> Result<Vec<Issue>> {
        let params = [("state", "all".to_string()), ("since", since.to_rfc3339())];
        let issues: Vec<Issue> = self.fetch_all(owner, name, "issues", &params).await?;
        Ok(issues.into_iter().filter(|issue| !issue.is_pull_request()).collect())
    }

    pub async fn commits(&self, owner: &str, name: &str, since: DateTime<Utc>) -> Result<Vec<Commit>> {
        self.fetch_all(owner, name, "commits", &[("since", since.to_rfc3339())])
            .await
    }

    pub async fn pulls(&self, owner: &str, name: &str) -> Result<Vec<PullRequest>> {
        let params = [
            ("state", "all".to_string()),
            ("sort", "created".to_string()),
            ("direction", "desc".to_string()),
        ];
        self.fetch_all(owner, name, "pulls", &params).await
    }

    pub async fn releases(&self, owner: &str, name: &str) -> Result<Vec<Release>> {
        self.fetch_all(owner, name, "releases", &[]).await
    }

    pub async fn contributors(&self, owner: &str, name: &str) -> Result<Vec<Contributor>> {
        self.fetch_all(owner, name, "contributors", &[]).await
    }
}
