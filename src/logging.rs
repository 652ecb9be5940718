//! Structured logging for the test harness
//!
//! This module provides:
//! - Structured log entries with levels, fields and correlation IDs
//! - Console, JSON and compact output formats
//! - Request logging for Prometheus and GitHub HTTP calls
//! - Phase timing for the stages of a test run

use crate::error::{AppError, Result};
use crate::models::{Config, RequestOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for log aggregators
    Json,
    /// Compact single-line format
    Compact,
}

#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    current_correlation_id: Option<String>,
    context_fields: HashMap<String, serde_json::Value>,
}

/// Logger with shared session context
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger at Info level
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger whose level and format follow the configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A silent logger, used by tests and library callers that do not log
    pub fn disabled() -> Self {
        let mut logger = Self::new("NULL".to_string());
        logger.min_level = LogLevel::Fatal;
        logger
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derive a logger sharing this logger's context under another name
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.info(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.info(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        drop(context);

        let output = self.format_entry(&entry);

        // Warnings and errors go to stderr so report output on stdout stays clean
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn format_entry(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
            LogFormat::Compact => self.format_compact(entry),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry
                .fields
                .iter()
                .filter(|(k, _)| k.as_str() != "session_id")
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            fields.sort();
            if !fields.is_empty() {
                output.push_str(&format!(" {{{}}}", fields.join(", ")));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}", entry.message),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add the measurement of a single request
    pub fn outcome(self, outcome: &RequestOutcome) -> Self {
        let builder = self
            .field("latency_ms", outcome.latency_ms())
            .field("status_code", outcome.status_code)
            .field("success", outcome.success);
        match &outcome.error {
            Some(error) => builder.field("error_category", error.category.as_str()),
            None => builder,
        }
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for individual HTTP calls
#[derive(Clone)]
pub struct RequestLogger {
    logger: Logger,
}

impl RequestLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Log an HTTP request; failures are logged at Warn
    pub async fn log_http_request(&self, method: &str, url: &str, status_code: Option<u16>, duration_ms: f64) {
        let success = status_code.is_some_and(|code| (200..400).contains(&code));
        let level = if success { LogLevel::Debug } else { LogLevel::Warn };

        let message = format!(
            "{} {} -> {} in {:.1}ms",
            method,
            url,
            status_code.map_or("FAILED".to_string(), |c| c.to_string()),
            duration_ms
        );

        self.logger
            .log(level, &message)
            .field("url", url)
            .field("method", method)
            .field("status_code", status_code)
            .field("success", success)
            .field("duration_ms", duration_ms)
            .log()
            .await;
    }
}

/// Timing of the phases of a test run (health gate, warmup, measurement...)
pub struct PhaseLogger {
    logger: Logger,
    started: HashMap<String, Instant>,
}

impl PhaseLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            started: HashMap::new(),
        }
    }

    pub async fn begin(&mut self, phase: &str) {
        self.started.insert(phase.to_string(), Instant::now());
        self.logger
            .info(&format!("Phase started: {}", phase))
            .field("phase", phase)
            .log()
            .await;
    }

    /// End a phase and return its duration, `None` if it was never started
    pub async fn end(&mut self, phase: &str) -> Option<std::time::Duration> {
        match self.started.remove(phase) {
            Some(start) => {
                let elapsed = start.elapsed();
                self.logger
                    .info(&format!("Phase completed: {} in {:.1}s", phase, elapsed.as_secs_f64()))
                    .field("phase", phase)
                    .field("duration_ms", elapsed.as_secs_f64() * 1000.0)
                    .log()
                    .await;
                Some(elapsed)
            }
            None => {
                self.logger
                    .warn(&format!("Attempted to end unknown phase: {}", phase))
                    .field("phase", phase)
                    .log()
                    .await;
                None
            }
        }
    }

    pub fn active_phases(&self) -> Vec<&str> {
        self.started.keys().map(String::as_str).collect()
    }
}

/// Creates loggers that share one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub async fn create_request_logger(&self) -> RequestLogger {
        RequestLogger::new(self.create_logger("HTTP").await)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, TestError};
    use std::str::FromStr;
    use std::time::Duration;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_logger_with_config_levels() {
        let mut config = Config::default();
        let logger = Logger::with_config("SOAK".to_string(), &config);
        assert!(!logger.would_log(LogLevel::Info));
        assert!(logger.would_log(LogLevel::Warn));

        config.verbose = true;
        let logger = Logger::with_config("SOAK".to_string(), &config);
        assert!(logger.would_log(LogLevel::Info));
        assert_eq!(logger.format, LogFormat::Console);

        config.debug = true;
        let logger = Logger::with_config("SOAK".to_string(), &config);
        assert!(logger.would_log(LogLevel::Debug));
        assert_eq!(logger.format, LogFormat::Json);
    }

    #[test]
    fn test_disabled_logger() {
        let logger = Logger::disabled();
        assert!(!logger.would_log(LogLevel::Error));
        assert!(logger.would_log(LogLevel::Fatal));
    }

    #[test]
    fn test_child_logger_shares_context() {
        let parent = Logger::new("APP".to_string());
        let child = parent.child("LOAD");
        assert_eq!(child.name(), "LOAD");
        assert!(Arc::ptr_eq(&parent.context, &child.context));
    }

    #[tokio::test]
    async fn test_operation_correlation() {
        let logger = Logger::disabled();
        let id = logger.start_operation("soak").await;
        assert_eq!(logger.context.read().await.current_correlation_id.as_deref(), Some(id.as_str()));
        logger.end_operation(&id, "soak", true).await;
        assert!(logger.context.read().await.current_correlation_id.is_none());
    }

    #[test]
    fn test_console_format_contains_fields() {
        let mut logger = Logger::new("LOAD".to_string());
        logger.set_color(false);
        let entry = LogEntryBuilder::new(&logger, LogLevel::Info, "batch sent".to_string())
            .field("requests", 12)
            .correlation_id("0123456789abcdef")
            .entry;

        let line = logger.format_console(&entry);
        assert!(line.contains(" INFO [LOAD] batch sent"));
        assert!(line.contains("[01234567]"));
        assert!(line.contains("requests=12"));
    }

    #[test]
    fn test_outcome_fields() {
        let logger = Logger::new("HTTP".to_string());
        let outcome = RequestOutcome::failure(
            Duration::from_millis(250),
            Some(503),
            TestError::new(ErrorCategory::HttpStatus, "HTTP 503"),
        );
        let entry = logger.warn("query failed").outcome(&outcome).entry;
        assert_eq!(entry.fields["status_code"], serde_json::json!(503));
        assert_eq!(entry.fields["success"], serde_json::json!(false));
        assert_eq!(entry.fields["error_category"], serde_json::json!("http_status"));
    }

    #[test]
    fn test_json_format_round_trip() {
        let mut logger = Logger::new("GITHUB".to_string());
        logger.set_format(LogFormat::Json);
        let entry = logger.info("page fetched").field("page", 3).entry;
        let json = logger.format_entry(&entry);
        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.message, "page fetched");
        assert_eq!(parsed.fields["page"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_phase_logger() {
        let mut phases = PhaseLogger::new(Logger::disabled());
        phases.begin("warmup").await;
        assert_eq!(phases.active_phases(), vec!["warmup"]);
        assert!(phases.end("warmup").await.is_some());
        assert!(phases.end("warmup").await.is_none());
    }

    #[tokio::test]
    async fn test_logger_factory_session() {
        let factory = LoggerFactory::new(Config::default());
        let logger = factory.create_logger("APP").await;
        let session = logger.context.read().await.session_id.clone();
        assert_eq!(session.as_deref(), Some(factory.session_id()));
    }
}
