//! Structured logging for the pilot.
//!
//! Every component receives an `Arc<PilotLogger>` at construction time. The
//! logger filters by verbosity, forwards records to an external callback when
//! one is configured (falling back to a console printer otherwise) and, when a
//! log file is configured, appends a timestamped line per record to it.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{PilotConfig, Verbosity};

/// Convenience alias for external logging callbacks.
pub type LogCallback = Arc<dyn Fn(&PilotLogRecord) + Send + Sync + 'static>;

/// Logging configuration shared across the pilot.
#[derive(Clone, Default)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub external_logger: Option<LogCallback>,
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    pub fn from_pilot_config(config: &PilotConfig) -> Self {
        Self {
            verbose: config.verbose,
            external_logger: None,
            log_file: config.log_file.clone(),
        }
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level == LogLevel::Error || level.as_u8() <= self.verbose.as_u8() + 1
    }
}

/// Log severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Structured log entry shared with external callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PilotLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl PilotLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }

    /// Single-line rendering used by the file sink.
    pub fn to_line(&self) -> String {
        let timestamp = self
            .timestamp
            .format("%Y-%m-%d %H:%M:%S%.6f");
        match &self.category {
            Some(category) => format!(
                "[{timestamp}] {}: [{category}] {}",
                self.level.label(),
                self.message
            ),
            None => format!("[{timestamp}] {}: {}", self.level.label(), self.message),
        }
    }
}

/// Default console printer used when no external logger is configured.
pub fn default_log_handler(record: &PilotLogRecord) {
    let timestamp = record
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    if let Some(category) = &record.category {
        println!(
            "[{}] {:<5} [{}] {}",
            timestamp,
            record.level.label(),
            category,
            record.message
        );
    } else {
        println!(
            "[{}] {:<5} {}",
            timestamp,
            record.level.label(),
            record.message
        );
    }
    if let Some(aux) = &record.auxiliary {
        if !aux.is_null() {
            println!("    {}", aux);
        }
    }
}

/// Logger handed to every pilot component.
pub struct PilotLogger {
    config: LogConfig,
    default_handler: LogCallback,
    file_sink: Mutex<()>,
}

impl fmt::Debug for PilotLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotLogger")
            .field("verbosity", &self.config.verbose)
            .field("external_logger", &self.config.external_logger.is_some())
            .field("log_file", &self.config.log_file)
            .finish()
    }
}

impl PilotLogger {
    pub fn with_config(config: LogConfig) -> Self {
        Self {
            config,
            default_handler: Arc::new(default_log_handler),
            file_sink: Mutex::new(()),
        }
    }

    pub fn new(verbose: Verbosity) -> Self {
        Self::with_config(LogConfig::new(verbose))
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn set_verbose(&mut self, verbose: Verbosity) {
        self.config.verbose = verbose;
    }

    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.config.external_logger = logger;
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.config.should_log(level) {
            return;
        }

        let record =
            PilotLogRecord::new(message, level, category.map(|c| c.to_string()), auxiliary);

        if let Some(path) = &self.config.log_file {
            self.append_to_file(path, &record);
        }

        if let Some(callback) = &self.config.external_logger {
            callback(&record);
        } else {
            (self.default_handler)(&record);
        }
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn warn(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Warn, category, auxiliary);
    }

    pub fn info(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }

    // A broken file sink must not take the run down with it.
    fn append_to_file(&self, path: &Path, record: &PilotLogRecord) {
        let _guard = self.file_sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", record.to_line()));
        if let Err(err) = written {
            eprintln!("failed to append to log file {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capturing_logger(verbose: Verbosity) -> (PilotLogger, Arc<Mutex<Vec<PilotLogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let callback: LogCallback = Arc::new(move |record| {
            capture.lock().unwrap().push(record.clone());
        });

        let mut logger = PilotLogger::new(verbose);
        logger.set_external_logger(Some(callback));
        (logger, records)
    }

    #[test]
    fn respects_verbosity() {
        let logger = PilotLogger::new(Verbosity::Minimal);
        assert!(logger.config.should_log(LogLevel::Error));
        assert!(logger.config.should_log(LogLevel::Warn));
        assert!(!logger.config.should_log(LogLevel::Info));
        assert!(!logger.config.should_log(LogLevel::Debug));

        let logger = PilotLogger::new(Verbosity::Medium);
        assert!(logger.config.should_log(LogLevel::Info));
        assert!(!logger.config.should_log(LogLevel::Debug));
    }

    #[test]
    fn external_logger_is_invoked() {
        let (logger, records) = capturing_logger(Verbosity::Detailed);

        logger.info("hello", Some("navigation"), None);
        logger.debug("details", None, Some(serde_json::json!({ "count": 2 })));

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].message, "hello");
        assert_eq!(values[0].category.as_deref(), Some("navigation"));
        assert_eq!(values[0].level, LogLevel::Info);
        assert_eq!(
            values[1].auxiliary.as_ref().unwrap(),
            &serde_json::json!({ "count": 2 })
        );
    }

    #[test]
    fn file_sink_appends_timestamped_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.txt");
        let config = LogConfig {
            verbose: Verbosity::Medium,
            external_logger: Some(Arc::new(|_| {})),
            log_file: Some(path.clone()),
        };
        let logger = PilotLogger::with_config(config);

        logger.info("Navigating to https://www.bing.com", None, None);
        logger.warn("Could not get page title", Some("navigation"), None);
        logger.debug("filtered out", None, None);

        let contents = std::fs::read_to_string(&path).expect("log file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("INFO: Navigating to https://www.bing.com"));
        assert!(lines[1].ends_with("WARN: [navigation] Could not get page title"));
    }
}
