//! GitHub REST API response shapes, reduced to the fields the analyzer reads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Present when the issue is a pull request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub author: Option<GitSignature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub commit: CommitDetail,
    /// GitHub account linked to the commit author, if any
    #[serde(default)]
    pub author: Option<User>,
}

impl Commit {
    /// Login when the author has an account, git author name otherwise
    pub fn author_key(&self) -> Option<String> {
        self.author
            .as_ref()
            .map(|user| user.login.clone())
            .or_else(|| self.commit.author.as_ref().map(|sig| sig.name.clone()))
    }

    pub fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit.author.as_ref().map(|sig| sig.date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Release {
    pub fn released_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    /// Anonymous contributors have no login
    #[serde(default)]
    pub login: Option<String>,
    pub contributions: u64,
}

/// Everything fetched for one repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryData {
    pub issues: Vec<Issue>,
    pub commits: Vec<Commit>,
    pub pulls: Vec<PullRequest>,
    pub releases: Vec<Release>,
    pub contributors: Vec<Contributor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_with_pull_request_marker() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "number": 7,
            "state": "closed",
            "created_at": "2024-05-01T10:00:00Z",
            "closed_at": "2024-05-03T10:00:00Z",
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/7"}
        }))
        .unwrap();
        assert!(issue.is_pull_request());
        assert!(!issue.is_open());
    }

    #[test]
    fn test_commit_author_fallback() {
        let commit: Commit = serde_json::from_value(serde_json::json!({
            "sha": "abc",
            "commit": {"author": {"name": "Jane Doe", "date": "2024-05-01T10:00:00Z"}},
            "author": null
        }))
        .unwrap();
        assert_eq!(commit.author_key().as_deref(), Some("Jane Doe"));
    }
}
