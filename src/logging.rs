/// Structured logging for the return-level analysis runs
///
/// Tags every entry with the pipeline stage and, where there is one, the
/// scenario label. Console output stays readable for a hand-run batch;
/// the optional log file gets full timestamped lines.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::FitError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Ingest,
    Fit,
    Export,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Config => write!(f, "CONFIG"),
            Stage::Ingest => write!(f, "INGEST"),
            Stage::Fit => write!(f, "FIT"),
            Stage::Export => write!(f, "EXPORT"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// The input cannot support a fit (too few tail points, bad rows).
    DataLimited,
    /// The numerics broke down on data that looked usable.
    Numerical,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::DataLimited => write!(f, "DATA"),
            FailureType::Numerical => write!(f, "NUMERICAL"),
        }
    }
}

pub fn classify_fit_failure(err: &FitError) -> FailureType {
    match err {
        FitError::InvalidSample(_) | FitError::InsufficientTailData { .. } => {
            FailureType::DataLimited
        }
        FitError::FitNonConvergence { .. } | FitError::DomainError { .. } => {
            FailureType::Numerical
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
}

/// Full log line: `<timestamp> <LEVEL> <STAGE>[ [scenario]]: <message>`.
pub fn format_entry(
    timestamp: &str,
    level: LogLevel,
    stage: Stage,
    scenario: Option<&str>,
    message: &str,
) -> String {
    let scenario_part = scenario.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, stage, scenario_part, message)
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>) {
        let logger = Logger { min_level, log_file };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, stage: Stage, scenario: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let log_entry = format_entry(&timestamp, level, stage, scenario, message);
        let scenario_part = scenario.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console lines stay short; the file gets the full entry.
        match level {
            LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, scenario_part, message),
            LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, scenario_part, message),
            LogLevel::Info => println!("   {}", message),
            LogLevel::Debug => println!("   [DEBUG] {}", message),
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>) {
    Logger::init(min_level, log_file.map(String::from));
}

fn dispatch(level: LogLevel, stage: Stage, scenario: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, stage, scenario, message);
        }
    }
}

/// Log a general informational message
pub fn info(stage: Stage, scenario: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, stage, scenario, message);
}

/// Log a warning message
pub fn warn(stage: Stage, scenario: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, stage, scenario, message);
}

/// Log an error message
pub fn error(stage: Stage, scenario: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, stage, scenario, message);
}

/// Log a debug message
pub fn debug(stage: Stage, scenario: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, stage, scenario, message);
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a fit failure with automatic classification. Data-limited
/// failures are warnings; numerical breakdowns are errors.
pub fn log_fit_failure(scenario: &str, err: &FitError) {
    let failure_type = classify_fit_failure(err);
    let message = format!("{} [{}]: {}", err.kind(), failure_type, err);

    match failure_type {
        FailureType::DataLimited => warn(Stage::Fit, Some(scenario), &message),
        FailureType::Numerical => error(Stage::Fit, Some(scenario), &message),
    }
}

/// Log a summary of a batch run
pub fn log_run_summary(total: usize, fitted: usize, failed: usize) {
    let message = format!("Run complete: {}/{} scenarios fitted, {} failed", fitted, total, failed);

    if failed == 0 {
        info(Stage::System, None, &message);
    } else if fitted == 0 {
        error(Stage::System, None, &message);
    } else {
        warn(Stage::System, None, &message);
    }
}
