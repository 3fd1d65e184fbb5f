/// ReadingType, ThresholdPair, ReadingState, PlantHealth, MonitorError
/// core data structures and error handling
///
/// Core data types for the plant monitoring service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and the fixed per-reading metadata
/// (keyword, unit, built-in default range).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// The fixed set of physical quantities a plant sensor can report.
///
/// Declaration order is the canonical ordering used for static sensor
/// attachment, problem text and snapshot output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingType {
    Battery,
    LightLux,
    LightMmol,
    Temp,
    EnvHumid,
    SoilMoist,
    SoilEc,
}

/// Default minimum battery level, in percent.
pub const DEFAULT_MIN_BATTERY: f64 = 20.0;

impl ReadingType {
    pub const ALL: [ReadingType; 7] = [
        ReadingType::Battery,
        ReadingType::LightLux,
        ReadingType::LightMmol,
        ReadingType::Temp,
        ReadingType::EnvHumid,
        ReadingType::SoilMoist,
        ReadingType::SoilEc,
    ];

    /// Canonical keyword, as used in sensor names and `min_`/`max_` keys.
    pub fn keyword(self) -> &'static str {
        match self {
            ReadingType::Battery => "battery",
            ReadingType::LightLux => "light_lux",
            ReadingType::LightMmol => "light_mmol",
            ReadingType::Temp => "temp",
            ReadingType::EnvHumid => "env_humid",
            ReadingType::SoilMoist => "soil_moist",
            ReadingType::SoilEc => "soil_ec",
        }
    }

    /// Alternative keywords accepted in sensor names.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            ReadingType::Battery => &["batt"],
            ReadingType::LightLux => &["lux", "light", "illuminance", "brightness"],
            ReadingType::LightMmol => &["mmol"],
            ReadingType::Temp => &["temperature"],
            ReadingType::EnvHumid => &["humidity", "humid"],
            ReadingType::SoilMoist => &["moist", "moisture", "soil_moisture"],
            ReadingType::SoilEc => &["ec", "conductivity", "soil_conductivity", "fertility"],
        }
    }

    /// Resolves a canonical keyword or synonym (case-insensitive).
    pub fn from_keyword(keyword: &str) -> Option<ReadingType> {
        let keyword = keyword.to_ascii_lowercase();
        ReadingType::ALL.into_iter().find(|rt| {
            rt.keyword() == keyword || rt.synonyms().contains(&keyword.as_str())
        })
    }

    /// Physical unit reported for this reading unless the sensor says otherwise.
    pub fn unit(self) -> &'static str {
        match self {
            ReadingType::Battery => "%",
            ReadingType::LightLux => "lx",
            ReadingType::LightMmol => "mmol",
            ReadingType::Temp => "°C",
            ReadingType::EnvHumid => "%",
            ReadingType::SoilMoist => "%",
            ReadingType::SoilEc => "µS/cm",
        }
    }

    /// Built-in default range, the lowest-precedence threshold layer.
    pub fn default_threshold(self) -> ThresholdPair {
        match self {
            ReadingType::Battery => ThresholdPair::new(Some(DEFAULT_MIN_BATTERY), None),
            _ => ThresholdPair::unbounded(),
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// A (min, max) bound pair for one reading. `None` means "no limit" on that
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ThresholdPair {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

// ---------------------------------------------------------------------------
// Classification types
// ---------------------------------------------------------------------------

/// Classification of a single reading against its effective threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingState {
    Ok,
    BelowMin,
    AboveMax,
    /// No source is currently reporting a fresh value.
    Unavailable,
    /// No threshold side applies to this reading.
    Unbound,
}

impl ReadingState {
    pub fn is_problem(self) -> bool {
        !matches!(self, ReadingState::Ok | ReadingState::Unbound)
    }
}

/// Overall plant state derived from its reading states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantHealth {
    Ok,
    Problem,
    /// Every reading in a problem state is merely unavailable.
    Unavailable,
}

impl fmt::Display for PlantHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlantHealth::Ok => write!(f, "ok"),
            PlantHealth::Problem => write!(f, "problem"),
            PlantHealth::Unavailable => write!(f, "unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while loading configuration, the species database
/// or persisted history.
///
/// Expected operating conditions (unknown pid, unmatched sensor names,
/// unavailable sensors) are modeled as values, never as errors.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The plant can never be populated or is self-contradictory; only this
    /// plant is omitted.
    #[error("Configuration error for plant '{plant}': {reason}")]
    Configuration { plant: String, reason: String },

    /// The configuration document itself could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The species table is unusable (e.g. missing header row).
    #[error("Species database error: {0}")]
    Database(String),

    /// The history store could not be read or written.
    #[error("History persistence error: {0}")]
    Persistence(String),

    /// A sensor event line could not be decoded.
    #[error("Malformed sensor event: {0}")]
    Event(String),
}

impl MonitorError {
    pub fn configuration(plant: &str, reason: impl Into<String>) -> Self {
        MonitorError::Configuration {
            plant: plant.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
