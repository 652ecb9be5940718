//! Per-request failure records collected during a test run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default number of individual errors kept in a log
pub const DEFAULT_ERROR_CAPACITY: usize = 500;

/// Reporting category for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Could not connect or the connection broke
    Connection,
    /// Request exceeded its timeout
    Timeout,
    /// Non-success HTTP status
    HttpStatus,
    /// Prometheus answered with `"status":"error"`
    QueryError,
    /// Response body could not be decoded
    Parse,
    /// External process failure
    Subprocess,
    /// Misconfiguration discovered at run time
    Configuration,
    /// Anything else
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::QueryError => "query_error",
            Self::Parse => "parse",
            Self::Subprocess => "subprocess",
            Self::Configuration => "configuration",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&super::AppError> for ErrorCategory {
    fn from(error: &super::AppError) -> Self {
        use super::AppError;
        match error {
            AppError::Network(_) => Self::Connection,
            AppError::Timeout(_) => Self::Timeout,
            AppError::HttpRequest(_) | AppError::Auth(_) | AppError::GitHub(_) => Self::HttpStatus,
            AppError::Parse(_) => Self::Parse,
            AppError::Subprocess(_) => Self::Subprocess,
            AppError::Config(_) | AppError::Validation(_) => Self::Configuration,
            _ => Self::Other,
        }
    }
}

/// A single failed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestError {
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// What was being done, usually the query name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl TestError {
    pub fn new<S: Into<String>>(category: ErrorCategory, message: S) -> Self {
        Self {
            category,
            message: message.into(),
            timestamp: Utc::now(),
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "[{}] {}: {}", self.category, context, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

/// Bounded error list with exact per-category counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLog {
    capacity: usize,
    total: u64,
    counts: BTreeMap<ErrorCategory, u64>,
    entries: Vec<TestError>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ERROR_CAPACITY)
    }
}

impl ErrorLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            total: 0,
            counts: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    /// Record an error; counted always, stored while under capacity
    pub fn push(&mut self, error: TestError) {
        self.total += 1;
        *self.counts.entry(error.category).or_insert(0) += 1;
        if self.entries.len() < self.capacity {
            self.entries.push(error);
        }
    }

    pub fn extend(&mut self, other: ErrorLog) {
        for (category, count) in other.counts {
            *self.counts.entry(category).or_insert(0) += count;
        }
        self.total += other.total;
        for entry in other.entries {
            if self.entries.len() < self.capacity {
                self.entries.push(entry);
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn counts(&self) -> &BTreeMap<ErrorCategory, u64> {
        &self.counts
    }

    pub fn entries(&self) -> &[TestError] {
        &self.entries
    }

    /// Number of errors counted but not stored
    pub fn dropped(&self) -> u64 {
        self.total - self.entries.len() as u64
    }
}
