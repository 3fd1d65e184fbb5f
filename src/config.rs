//! Configuration loader for the plant monitoring service.
//!
//! Plants, their species ids, static sensors, threshold overrides and the
//! global discovery settings come from a single TOML document:
//!
//! ```toml
//! database = "plants.csv"
//! images = "/config/www/plants"
//! discovery_prefix = "plant"
//!
//! [plants."Monstera Deliciosa"]
//! pid = "monstera deliciosa"
//! min_soil_moist = 20
//!
//! [plants."Monstera Deliciosa".sensors]
//! temp = "sensor.living_room_temperature"
//! ```
//!
//! Parsing is lenient about unknown keys; validation of individual plants
//! happens in `validate_plant` so one bad plant never blocks the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::{MonitorError, ReadingType, ThresholdPair};
use crate::naming::slugify;
use crate::species::ImageSettings;

pub const DEFAULT_CHECK_DAYS: u32 = 3;
pub const DEFAULT_HISTORY_FILE: &str = "plant_history.json";

fn default_check_days() -> u32 {
    DEFAULT_CHECK_DAYS
}

fn default_history_file() -> PathBuf {
    PathBuf::from(DEFAULT_HISTORY_FILE)
}

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// The whole configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Species table path.
    pub database: Option<PathBuf>,
    /// Local image directory.
    pub images: Option<PathBuf>,
    #[serde(default)]
    pub disable_remote_images: bool,
    /// Global discovery prefix; `None` disables discovery for plants without
    /// their own prefix.
    pub discovery_prefix: Option<String>,
    /// Create plants for discovered sensors whose plant key is not
    /// configured.
    #[serde(default)]
    pub auto_create_plants: bool,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    /// Keyed by display name; insertion order is not significant.
    #[serde(default)]
    pub plants: BTreeMap<String, PlantConfig>,
}

/// One `[plants.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantConfig {
    pub pid: Option<String>,
    pub discovery_prefix: Option<String>,
    #[serde(default = "default_check_days")]
    pub check_days: u32,
    #[serde(default)]
    pub sensors: BTreeMap<ReadingType, String>,
    #[serde(flatten)]
    pub overrides: ThresholdOverrides,
}

/// User threshold overrides, the highest-precedence layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThresholdOverrides {
    pub min_battery: Option<f64>,
    pub max_battery: Option<f64>,
    pub min_light_lux: Option<f64>,
    pub max_light_lux: Option<f64>,
    pub min_light_mmol: Option<f64>,
    pub max_light_mmol: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_env_humid: Option<f64>,
    pub max_env_humid: Option<f64>,
    pub min_soil_moist: Option<f64>,
    pub max_soil_moist: Option<f64>,
    pub min_soil_ec: Option<f64>,
    pub max_soil_ec: Option<f64>,
}

impl ThresholdOverrides {
    /// Override pair for `reading`, or `None` if neither side is set.
    pub fn for_reading(&self, reading: ReadingType) -> Option<ThresholdPair> {
        let (min, max) = match reading {
            ReadingType::Battery => (self.min_battery, self.max_battery),
            ReadingType::LightLux => (self.min_light_lux, self.max_light_lux),
            ReadingType::LightMmol => (self.min_light_mmol, self.max_light_mmol),
            ReadingType::Temp => (self.min_temp, self.max_temp),
            ReadingType::EnvHumid => (self.min_env_humid, self.max_env_humid),
            ReadingType::SoilMoist => (self.min_soil_moist, self.max_soil_moist),
            ReadingType::SoilEc => (self.min_soil_ec, self.max_soil_ec),
        };
        let pair = ThresholdPair::new(min, max);
        (!pair.is_unbounded()).then_some(pair)
    }

    /// All set overrides, keyed by reading.
    pub fn to_map(&self) -> BTreeMap<ReadingType, ThresholdPair> {
        ReadingType::ALL
            .into_iter()
            .filter_map(|rt| self.for_reading(rt).map(|pair| (rt, pair)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a configuration document.
pub fn parse_config(text: &str) -> Result<MonitorConfig, MonitorError> {
    toml::from_str(text).map_err(|e| MonitorError::ConfigParse(e.to_string()))
}

/// Reads and parses the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<MonitorConfig, MonitorError> {
    let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

impl MonitorConfig {
    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            images_dir: self.images.clone(),
            disable_remote_images: self.disable_remote_images,
        }
    }

    /// Global prefix, ignoring blank values.
    pub fn global_prefix(&self) -> Option<String> {
        normalize_prefix(self.discovery_prefix.as_deref())
    }

    /// The prefix a plant uses: its own, else the global one.
    pub fn effective_prefix(&self, plant: &PlantConfig) -> Option<String> {
        normalize_prefix(plant.discovery_prefix.as_deref()).or_else(|| self.global_prefix())
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        use crate::logging::{self, Component};

        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        };
        logging::info(Component::Config, None, "Configuration loaded:");
        logging::info(Component::Config, None, &format!("  database         : {}", show(&self.database)));
        logging::info(Component::Config, None, &format!("  images           : {}", show(&self.images)));
        logging::info(
            Component::Config,
            None,
            &format!("  remote images    : {}", if self.disable_remote_images { "disabled" } else { "enabled" }),
        );
        logging::info(
            Component::Config,
            None,
            &format!("  discovery prefix : {}", self.global_prefix().as_deref().unwrap_or("(disabled)")),
        );
        logging::info(Component::Config, None, &format!("  plants           : {}", self.plants.len()));
    }
}

fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix.map(slugify).filter(|p| !p.is_empty())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A plant that passed validation, with its key and effective prefix
/// resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantSpec {
    pub key: String,
    pub name: String,
    pub pid: Option<String>,
    pub discovery_prefix: Option<String>,
    pub check_days: u32,
    pub sensors: BTreeMap<ReadingType, String>,
    pub overrides: BTreeMap<ReadingType, ThresholdPair>,
}

impl PlantSpec {
    /// Settings for a plant created on the fly by discovery.
    pub fn discovered(key: &str, prefix: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            pid: None,
            discovery_prefix: Some(prefix.to_string()),
            check_days: DEFAULT_CHECK_DAYS,
            sensors: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Checks one plant table. A plant that nothing could ever populate, or
/// whose settings contradict themselves, is a configuration error.
///
/// A `pid` alone does not make a plant valid: without static sensors and
/// without a discovery prefix it is rejected even when its species is known.
pub fn validate_plant(config: &MonitorConfig, name: &str, plant: &PlantConfig) -> Result<PlantSpec, MonitorError> {
    let key = slugify(name);
    if key.is_empty() {
        return Err(MonitorError::configuration(name, "name contains no usable characters"));
    }

    let discovery_prefix = config.effective_prefix(plant);
    let sensors: BTreeMap<ReadingType, String> = plant
        .sensors
        .iter()
        .filter(|(_, id)| !id.trim().is_empty())
        .map(|(rt, id)| (*rt, id.trim().to_ascii_lowercase()))
        .collect();

    if sensors.is_empty() && discovery_prefix.is_none() {
        return Err(MonitorError::configuration(
            name,
            "no sensors configured and discovery is disabled",
        ));
    }

    if plant.check_days == 0 {
        return Err(MonitorError::configuration(name, "check_days must be at least 1"));
    }

    let overrides = plant.overrides.to_map();
    for (reading, pair) in &overrides {
        if let (Some(min), Some(max)) = (pair.min, pair.max) {
            if min > max {
                return Err(MonitorError::configuration(
                    name,
                    format!("min_{reading} ({min}) is greater than max_{reading} ({max})"),
                ));
            }
        }
    }

    Ok(PlantSpec {
        key,
        name: name.to_string(),
        pid: plant.pid.clone().filter(|p| !p.trim().is_empty()),
        discovery_prefix,
        check_days: plant.check_days,
        sensors,
        overrides,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
