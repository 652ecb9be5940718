//! Error handling for the Prometheus test harness
//!
//! `AppError` covers failures that stop a command: configuration problems,
//! the health gate at test start, report I/O, subprocess launch and GitHub
//! API failures. Failures of individual requests during a run are not
//! errors at this level; they are recorded as [`TestError`] entries in an
//! [`ErrorLog`] and only influence the verdict through threshold checks.

pub mod record;

pub use record::{ErrorCategory, ErrorLog, TestError};

use thiserror::Error;

/// Custom error types for the harness
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (report files, scripts)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, YAML, numbers)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Authentication/authorization errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Test execution errors, including a failed verdict
    #[error("Test execution error: {0}")]
    TestExecution(String),

    /// Statistics calculation errors
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// External process (k6) errors
    #[error("Subprocess error: {0}")]
    Subprocess(String),

    /// GitHub API errors
    #[error("GitHub API error: {0}")]
    GitHub(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new HTTP request error
    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth(message.into())
    }

    /// Create a new test execution error
    pub fn test_execution<S: Into<String>>(message: S) -> Self {
        Self::TestExecution(message.into())
    }

    /// Create a new statistics error
    pub fn statistics<S: Into<String>>(message: S) -> Self {
        Self::Statistics(message.into())
    }

    /// Create a new subprocess error
    pub fn subprocess<S: Into<String>>(message: S) -> Self {
        Self::Subprocess(message.into())
    }

    /// Create a new GitHub API error
    pub fn github<S: Into<String>>(message: S) -> Self {
        Self::GitHub(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Auth(_) => "AUTH",
            Self::TestExecution(_) => "TEST",
            Self::Statistics(_) => "STATS",
            Self::Subprocess(_) => "SUBPROCESS",
            Self::GitHub(_) => "GITHUB",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is transient (a rerun might succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::GitHub(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::Auth(_) => false,
            Self::Io(_) | Self::TestExecution(_) | Self::Statistics(_) => false,
            Self::Subprocess(_) | Self::Internal(_) => false,
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Network(_) | Self::HttpRequest(_) => 2,
            Self::Timeout(_) => 3,
            Self::Auth(_) => 4,
            Self::Io(_) => 5,
            Self::TestExecution(_) | Self::Statistics(_) => 6,
            Self::Subprocess(_) => 7,
            Self::GitHub(_) => 8,
            Self::Internal(_) => 99,
        }
    }

    /// Get user-facing hint printed after the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) | Self::Validation(_) => {
                Some("Check --config, your .env file and command line flags (see `pth env-example`).")
            }
            Self::Network(_) | Self::HttpRequest(_) => {
                Some("Check that Prometheus is running and --prometheus-url points at it.")
            }
            Self::Timeout(_) => Some("Increase --timeout or reduce the load level."),
            Self::Auth(_) => Some("Check PROMETHEUS_USERNAME/PROMETHEUS_PASSWORD or PROMETHEUS_BEARER_TOKEN."),
            Self::Subprocess(_) => Some("Install k6 or point K6_BINARY at it."),
            Self::GitHub(_) => Some("Set GITHUB_TOKEN to raise the API rate limit."),
            _ => None,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Network(_) | Self::HttpRequest(_) | Self::GitHub(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Auth(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::TestExecution(_) | Self::Statistics(_) | Self::Subprocess(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::parse(format!("YAML parse error: {}", error))
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        Self::io(format!("CSV write error: {}", error))
    }
}

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        Self::config(format!("Invalid regular expression: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Config(m) => AppError::Config(format!("{}: {}", context, m)),
                AppError::Network(m) => AppError::Network(format!("{}: {}", context, m)),
                AppError::HttpRequest(m) => AppError::HttpRequest(format!("{}: {}", context, m)),
                AppError::Timeout(m) => AppError::Timeout(format!("{}: {}", context, m)),
                AppError::Validation(m) => AppError::Validation(format!("{}: {}", context, m)),
                AppError::Io(m) => AppError::Io(format!("{}: {}", context, m)),
                AppError::Parse(m) => AppError::Parse(format!("{}: {}", context, m)),
                AppError::Auth(m) => AppError::Auth(format!("{}: {}", context, m)),
                AppError::TestExecution(m) => AppError::TestExecution(format!("{}: {}", context, m)),
                AppError::Statistics(m) => AppError::Statistics(format!("{}: {}", context, m)),
                AppError::Subprocess(m) => AppError::Subprocess(format!("{}: {}", context, m)),
                AppError::GitHub(m) => AppError::GitHub(format!("{}: {}", context, m)),
                AppError::Internal(m) => AppError::Internal(format!("{}: {}", context, m)),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}
