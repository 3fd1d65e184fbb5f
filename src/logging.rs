/// Structured logging for the plant monitoring service
///
/// Provides context-rich logging with component and plant identifiers on top
/// of `tracing`. Supports both console output and file-based logging for
/// daemon operations. Without `init_logger` the library stays silent.

use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::model::MonitorError;

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

impl LogLevel {
    /// Parses a level name as found in `PLANTMON_LOG_LEVEL`.
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
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
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Config,
    Species,
    Discovery,
    Plant,
    History,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Config => write!(f, "CONFIG"),
            Component::Species => write!(f, "SPECIES"),
            Component::Discovery => write!(f, "DISCOVERY"),
            Component::Plant => write!(f, "PLANT"),
            Component::History => write!(f, "HISTORY"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Unexpected failure - indicates corruption or a configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber Setup
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `min_level` when set. With a `log_file`
/// all output is appended to that file instead of the console. Returns an
/// error if the file cannot be opened; calling this twice is a no-op.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(min_level.directive())
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // try_init fails only when a subscriber is already installed
    let _ = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None if console_timestamps => builder.with_writer(std::io::stderr).try_init(),
        None => builder
            .without_time()
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
    };
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(component: Component, plant: Option<&str>, message: &str) {
    tracing::info!(component = %component, plant = plant.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(component: Component, plant: Option<&str>, message: &str) {
    tracing::warn!(component = %component, plant = plant.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(component: Component, plant: Option<&str>, message: &str) {
    tracing::error!(component = %component, plant = plant.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(component: Component, plant: Option<&str>, message: &str) {
    tracing::debug!(component = %component, plant = plant.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a history store failure by what went wrong
pub fn classify_history_failure(err: &MonitorError) -> FailureType {
    match err {
        // A path that is missing or not writable will fail the same way every time
        MonitorError::Io { source, .. }
            if matches!(source.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) =>
        {
            FailureType::Unexpected
        }
        MonitorError::Persistence(_) => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

/// Classify a species database failure
pub fn classify_species_failure(err: &MonitorError) -> FailureType {
    match err {
        MonitorError::Database(_) => FailureType::Unexpected,
        MonitorError::Io { source, .. } if source.kind() == ErrorKind::NotFound => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a history store failure with automatic classification
pub fn log_history_failure(plant: &str, operation: &str, err: &MonitorError) {
    let error_msg = err.to_string();
    let failure_type = classify_history_failure(err);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Unexpected => error(Component::History, Some(plant), &message),
        FailureType::Unknown => warn(Component::History, Some(plant), &message),
    }
}

/// Log a species database failure with classification
pub fn log_species_failure(operation: &str, err: &MonitorError) {
    let error_msg = err.to_string();
    let failure_type = classify_species_failure(err);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Unexpected => error(Component::Species, None, &message),
        FailureType::Unknown => warn(Component::Species, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Load Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a one-shot load over many items
pub fn log_load_summary(component: Component, what: &str, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "{} loaded: {}/{} successful, {} failed",
        what, successful, total, failed
    );

    if failed == 0 {
        info(component, None, &message);
    } else if successful == 0 {
        error(component, None, &message);
    } else {
        warn(component, None, &message);
    }
}
