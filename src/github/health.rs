//! Health score derived from repository metrics

use super::metrics::RepositoryMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

const ACTIVITY_WEIGHT: f64 = 0.25;
const RESPONSIVENESS_WEIGHT: f64 = 0.25;
const COMMUNITY_WEIGHT: f64 = 0.20;
const MAINTENANCE_WEIGHT: f64 = 0.15;
const RELEASES_WEIGHT: f64 = 0.15;

/// Commits per week that count as fully active
const ACTIVE_COMMITS_PER_WEEK: f64 = 5.0;
/// Contributor count that counts as a full community
const FULL_COMMUNITY: f64 = 10.0;
/// Top-contributor share above which the community score is reduced
const BUS_FACTOR_SHARE: f64 = 0.5;
/// Score used when a component has no data to judge
const NEUTRAL: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 85.0 => Grade::A,
            s if s >= 70.0 => Grade::B,
            s if s >= 55.0 => Grade::C,
            s if s >= 40.0 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 100 at or below `best`, 0 at or beyond `worst`, linear in between
fn linear_score(value: f64, best: f64, worst: f64) -> f64 {
    ((worst - value) / (worst - best)).clamp(0.0, 1.0) * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub activity: f64,
    pub responsiveness: f64,
    pub community: f64,
    pub maintenance: f64,
    pub releases: f64,
    pub overall: f64,
    pub grade: Grade,
}

impl HealthScore {
    pub fn from_metrics(metrics: &RepositoryMetrics) -> Self {
        let activity = (metrics.commits_per_week / ACTIVE_COMMITS_PER_WEEK).min(1.0) * 100.0;

        let close_score = metrics.median_issue_close_days.map(|days| linear_score(days, 7.0, 90.0));
        let merge_score = metrics.merge_rate.map(|rate| rate * 100.0);
        let responsiveness = match (close_score, merge_score) {
            (Some(close), Some(merge)) => (close + merge) / 2.0,
            (Some(score), None) | (None, Some(score)) => score,
            (None, None) => NEUTRAL,
        };

        let mut community = (metrics.contributors as f64 / FULL_COMMUNITY).min(1.0) * 100.0;
        if let Some(share) = metrics.top_contributor_share.filter(|s| *s > BUS_FACTOR_SHARE) {
            // A sole contributor halves the score
            community *= 1.0 - (share - BUS_FACTOR_SHARE);
        }

        let tracked_issues = metrics.open_issues + metrics.closed_issues;
        let maintenance = if tracked_issues == 0 {
            100.0
        } else {
            (1.0 - metrics.open_issues as f64 / tracked_issues as f64) * 100.0
        };

        let releases = metrics
            .days_since_last_release
            .map_or(0.0, |days| linear_score(days, 30.0, 365.0));

        let overall = activity * ACTIVITY_WEIGHT
            + responsiveness * RESPONSIVENESS_WEIGHT
            + community * COMMUNITY_WEIGHT
            + maintenance * MAINTENANCE_WEIGHT
            + releases * RELEASES_WEIGHT;

        Self {
            activity,
            responsiveness,
            community,
            maintenance,
            releases,
            overall,
            grade: Grade::from_score(overall),
        }
    }
}
