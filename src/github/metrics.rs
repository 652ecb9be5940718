//! Repository metrics over a lookback window

use super::types::RepositoryData;
use crate::stats::{mean, median};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SECONDS_PER_DAY: f64 = 86_400.0;

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / SECONDS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    pub repository: String,
    pub window_days: u32,

    pub open_issues: usize,
    /// Issues closed inside the window
    pub closed_issues: usize,
    pub median_issue_close_days: Option<f64>,

    pub pulls_opened: usize,
    pub pulls_merged: usize,
    /// Closed inside the window without being merged
    pub pulls_rejected: usize,
    /// merged / (merged + rejected)
    pub merge_rate: Option<f64>,
    pub median_merge_days: Option<f64>,

    pub commits: usize,
    pub commits_per_week: f64,
    pub active_authors: usize,

    pub contributors: usize,
    /// Share of all contributions made by the top contributor
    pub top_contributor_share: Option<f64>,

    pub releases: usize,
    pub days_since_last_release: Option<f64>,
    pub mean_days_between_releases: Option<f64>,
}

impl RepositoryMetrics {
    pub fn compute(repository: &str, data: &RepositoryData, now: DateTime<Utc>, window_days: u32) -> Self {
        let since = now - ChronoDuration::days(i64::from(window_days));
        let in_window = |at: DateTime<Utc>| at >= since && at <= now;

        // Issues
        let issues: Vec<_> = data.issues.iter().filter(|i| !i.is_pull_request()).collect();
        let open_issues = issues.iter().filter(|i| i.is_open()).count();
        let close_days: Vec<f64> = issues
            .iter()
            .filter_map(|i| i.closed_at.filter(|at| in_window(*at)).map(|at| days_between(i.created_at, at)))
            .collect();

        // Pull requests
        let pulls_opened = data.pulls.iter().filter(|p| in_window(p.created_at)).count();
        let merge_days: Vec<f64> = data
            .pulls
            .iter()
            .filter_map(|p| p.merged_at.filter(|at| in_window(*at)).map(|at| days_between(p.created_at, at)))
            .collect();
        let pulls_rejected = data
            .pulls
            .iter()
            .filter(|p| p.merged_at.is_none() && p.closed_at.is_some_and(in_window))
            .count();
        let decided = merge_days.len() + pulls_rejected;
        let merge_rate = (decided > 0).then(|| merge_days.len() as f64 / decided as f64);

        // Commits
        let commits: Vec<_> = data
            .commits
            .iter()
            .filter(|c| c.authored_at().map_or(true, in_window))
            .collect();
        let weeks = (f64::from(window_days) / 7.0).max(1.0 / 7.0);
        let authors: HashSet<String> = commits.iter().filter_map(|c| c.author_key()).collect();

        // Contributors
        let total_contributions: u64 = data.contributors.iter().map(|c| c.contributions).sum();
        let top_contributor_share = data
            .contributors
            .iter()
            .map(|c| c.contributions)
            .max()
            .filter(|_| total_contributions > 0)
            .map(|top| top as f64 / total_contributions as f64);

        // Releases
        let mut release_dates: Vec<DateTime<Utc>> = data
            .releases
            .iter()
            .filter(|r| !r.draft)
            .map(|r| r.released_at())
            .collect();
        release_dates.sort();
        let days_since_last_release = release_dates.last().map(|last| days_between(*last, now).max(0.0));
        let gaps: Vec<f64> = release_dates.windows(2).map(|w| days_between(w[0], w[1])).collect();

        Self {
            repository: repository.to_string(),
            window_days,
            open_issues,
            closed_issues: close_days.len(),
            median_issue_close_days: median(&close_days),
            pulls_opened,
            pulls_merged: merge_days.len(),
            pulls_rejected,
            merge_rate,
            median_merge_days: median(&merge_days),
            commits: commits.len(),
            commits_per_week: commits.len() as f64 / weeks,
            active_authors: authors.len(),
            contributors: data.contributors.len(),
            top_contributor_share,
            releases: release_dates.len(),
            days_since_last_release,
            mean_days_between_releases: mean(&gaps),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::super::types::*;
    use chrono::{DateTime, Duration, Utc};

    pub fn now() -> DateTime<Utc> {
        "2024-06-30T00:00:00Z".parse().unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    pub fn issue(number: u64, created: i64, closed: Option<i64>) -> Issue {
        Issue {
            number,
            state: if closed.is_some() { "closed" } else { "open" }.to_string(),
            created_at: days_ago(created),
            closed_at: closed.map(days_ago),
            pull_request: None,
        }
    }

    pub fn pull(number: u64, created: i64, merged: Option<i64>, closed: Option<i64>) -> PullRequest {
        PullRequest {
            number,
            state: if closed.is_some() || merged.is_some() { "closed" } else { "open" }.to_string(),
            created_at: days_ago(created),
            closed_at: closed.or(merged).map(days_ago),
            merged_at: merged.map(days_ago),
        }
    }

    pub fn commit(author: &str, age: i64) -> Commit {
        Commit {
            sha: format!("{}-{}", author, age),
            commit: CommitDetail {
                author: Some(GitSignature {
                    name: author.to_string(),
                    date: days_ago(age),
                }),
            },
            author: Some(User {
                login: author.to_string(),
            }),
        }
    }

    pub fn release(tag: &str, age: i64) -> Release {
        Release {
            tag_name: tag.to_string(),
            draft: false,
            prerelease: false,
            created_at: days_ago(age),
            published_at: Some(days_ago(age)),
        }
    }

    pub fn contributor(login: &str, contributions: u64) -> Contributor {
        Contributor {
            login: Some(login.to_string()),
            contributions,
        }
    }

    /// A small but active repository
    pub fn healthy_repository() -> RepositoryData {
        RepositoryData {
            issues: vec![issue(1, 20, Some(18)), issue(2, 30, Some(25)), issue(3, 10, Some(7)), issue(4, 5, None)],
            commits: (0..70).map(|i| commit(["ann", "bob", "cy"][i % 3], (i % 60) as i64)).collect(),
            pulls: vec![
                pull(10, 12, Some(11), None),
                pull(11, 9, Some(8), None),
                pull(12, 6, None, Some(5)),
                pull(13, 2, None, None),
            ],
            releases: vec![release("v1.0.0", 100), release("v1.1.0", 40), release("v1.2.0", 10)],
            contributors: (0..12).map(|i| contributor(&format!("dev{}", i), 10)).collect(),
        }
    }
}
