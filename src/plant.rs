//! One monitored plant: its readings, effective thresholds and light
//! history.
//!
//! The plant's problem state is never stored. `evaluate` recomputes it from
//! the current fused readings and thresholds every time, so it can be called
//! at any moment without replaying history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::thresholds::{self, classify_reading, problem_text};
use crate::analysis::brightness::{BrightnessHistory, HistoryPoint};
use crate::analysis::redundancy::{EffectiveReading, RedundantReadingAggregator, SensorSource};
use crate::config::PlantSpec;
use crate::logging::{self, Component};
use crate::model::{PlantHealth, ReadingState, ReadingType, ThresholdPair};
use crate::species::{ImageSettings, SpeciesIndex, resolve_image};

pub const PROBLEM_NONE: &str = "none";

/// Sources and display unit of one reading.
#[derive(Debug, Clone, PartialEq)]
struct ReadingSlot {
    aggregator: RedundantReadingAggregator,
    unit: String,
}

impl ReadingSlot {
    fn new(reading: ReadingType) -> Self {
        Self {
            aggregator: RedundantReadingAggregator::new(),
            unit: reading.unit().to_string(),
        }
    }
}

/// Result of classifying every reading of a plant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantStatus {
    pub states: BTreeMap<ReadingType, ReadingState>,
    pub health: PlantHealth,
    pub problems: Vec<String>,
    pub max_brightness: Option<f64>,
}

impl PlantStatus {
    pub fn is_problem(&self) -> bool {
        self.health != PlantHealth::Ok
    }

    /// Problems joined with `", "`, or `"none"`.
    pub fn summary(&self) -> String {
        if self.problems.is_empty() {
            PROBLEM_NONE.to_string()
        } else {
            self.problems.join(", ")
        }
    }
}

/// Output view of one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingSnapshot {
    pub value: Option<f64>,
    pub available: bool,
    pub state: ReadingState,
    pub unit: String,
    pub threshold: ThresholdPair,
    pub sources: Vec<SensorSource>,
}

/// Output view of a plant, as handed to the host platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantSnapshot {
    pub key: String,
    pub name: String,
    pub pid: Option<String>,
    pub health: PlantHealth,
    pub problem: bool,
    pub problems: Vec<String>,
    pub summary: String,
    pub readings: BTreeMap<ReadingType, ReadingSnapshot>,
    pub image: Option<String>,
    pub max_brightness: Option<f64>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PlantAggregate {
    spec: PlantSpec,
    readings: BTreeMap<ReadingType, ReadingSlot>,
    thresholds: BTreeMap<ReadingType, ThresholdPair>,
    brightness: BrightnessHistory,
    image: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl PlantAggregate {
    /// Creates the plant, attaches its static sensors and resolves its
    /// thresholds against `species`.
    pub fn new(spec: PlantSpec, species: &SpeciesIndex, images: &ImageSettings) -> Self {
        let brightness = BrightnessHistory::new(spec.check_days);
        let mut plant = Self {
            spec,
            readings: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            brightness,
            image: None,
            attributes: BTreeMap::new(),
        };

        let statics: Vec<(ReadingType, String)> =
            plant.spec.sensors.iter().map(|(rt, id)| (*rt, id.clone())).collect();
        for (reading, identifier) in statics {
            logging::debug(
                Component::Plant,
                Some(&plant.spec.key),
                &format!("Adding statically defined sensor {} for reading {}", identifier, reading),
            );
            plant.attach_source(reading, &identifier);
        }

        plant.resolve_thresholds(species, images);
        plant
    }

    pub fn key(&self) -> &str {
        &self.spec.key
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn pid(&self) -> Option<&str> {
        self.spec.pid.as_deref()
    }

    pub fn discovery_prefix(&self) -> Option<&str> {
        self.spec.discovery_prefix.as_deref()
    }

    pub fn check_days(&self) -> u32 {
        self.spec.check_days
    }

    // -----------------------------------------------------------------------
    // Thresholds
    // -----------------------------------------------------------------------

    /// Recomputes every effective threshold, the image and the species
    /// attributes from the layers. The only path that writes them.
    pub fn resolve_thresholds(&mut self, species: &SpeciesIndex, images: &ImageSettings) {
        let record = self.spec.pid.as_deref().and_then(|pid| species.get(pid));
        if let (Some(pid), None) = (self.spec.pid.as_deref(), record) {
            logging::debug(
                Component::Species,
                Some(&self.spec.key),
                &format!("No species record for pid '{}', using defaults", pid),
            );
        }

        self.thresholds = ReadingType::ALL
            .into_iter()
            .map(|rt| (rt, thresholds::resolve(rt, record, self.spec.overrides.get(&rt))))
            .collect();
        self.image = resolve_image(images, self.spec.pid.as_deref(), record.and_then(|r| r.image.as_deref()));
        self.attributes = record.map(|r| r.attributes.clone()).unwrap_or_default();
    }

    pub fn threshold(&self, reading: ReadingType) -> ThresholdPair {
        self.thresholds.get(&reading).copied().unwrap_or_default()
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Adds `identifier` as a source of `reading`, creating the aggregator
    /// on first use. Returns `false` if it was already attached.
    pub fn attach_source(&mut self, reading: ReadingType, identifier: &str) -> bool {
        self.readings
            .entry(reading)
            .or_insert_with(|| ReadingSlot::new(reading))
            .aggregator
            .add_source(identifier)
    }

    /// Removes `identifier` from `reading`, dropping the reading once it has
    /// no sources left.
    pub fn detach_source(&mut self, reading: ReadingType, identifier: &str) -> bool {
        let Some(slot) = self.readings.get_mut(&reading) else {
            return false;
        };
        let removed = slot.aggregator.remove_source(identifier);
        if slot.aggregator.is_empty() {
            self.readings.remove(&reading);
        }
        removed
    }

    /// Which reading `identifier` feeds, if any.
    pub fn reading_for(&self, identifier: &str) -> Option<ReadingType> {
        self.readings
            .iter()
            .find(|(_, slot)| slot.aggregator.contains(identifier))
            .map(|(rt, _)| *rt)
    }

    pub fn aggregator(&self, reading: ReadingType) -> Option<&RedundantReadingAggregator> {
        self.readings.get(&reading).map(|slot| &slot.aggregator)
    }

    pub fn effective(&self, reading: ReadingType) -> Option<EffectiveReading> {
        self.aggregator(reading).map(RedundantReadingAggregator::effective)
    }

    /// Applies one sensor state change. Available light values feed the
    /// brightness history. Returns `false` if the source is not attached.
    pub fn apply_update(
        &mut self,
        reading: ReadingType,
        identifier: &str,
        value: Option<f64>,
        available: bool,
        unit: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(slot) = self.readings.get_mut(&reading) else {
            return false;
        };
        if !slot.aggregator.update(identifier, value, available) {
            return false;
        }
        if let Some(unit) = unit.filter(|u| !u.is_empty()) {
            slot.unit = unit.to_string();
        }

        if reading == ReadingType::LightLux {
            if let EffectiveReading { value: Some(lux), available: true } = slot.aggregator.effective() {
                self.brightness.record(lux, timestamp);
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Light history
    // -----------------------------------------------------------------------

    pub fn restore_history(&mut self, points: Vec<HistoryPoint>) {
        self.brightness.restore(points);
    }

    pub fn history_points(&self, now: DateTime<Utc>) -> Vec<HistoryPoint> {
        self.brightness.points(now)
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    /// Classifies every reading that has at least one source.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> PlantStatus {
        let max_brightness = self.brightness.current_max(now);

        let mut states = BTreeMap::new();
        let mut problems = Vec::new();
        for (reading, slot) in &self.readings {
            let effective = slot.aggregator.effective();
            let min_reference = match (reading, max_brightness, effective.value) {
                (ReadingType::LightLux, Some(max), Some(value)) => Some(max.max(value)),
                _ => None,
            };
            let state = classify_reading(&effective, &self.threshold(*reading), min_reference);
            if let Some(text) = problem_text(*reading, state) {
                problems.push(text);
            }
            states.insert(*reading, state);
        }

        let health = if problems.is_empty() {
            PlantHealth::Ok
        } else if states
            .values()
            .filter(|s| s.is_problem())
            .all(|s| *s == ReadingState::Unavailable)
        {
            PlantHealth::Unavailable
        } else {
            PlantHealth::Problem
        };

        PlantStatus {
            states,
            health,
            problems,
            max_brightness,
        }
    }

    /// Evaluates the plant and packages everything the host displays.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> PlantSnapshot {
        let status = self.evaluate(now);

        let readings = self
            .readings
            .iter()
            .map(|(reading, slot)| {
                let effective = slot.aggregator.effective();
                let snapshot = ReadingSnapshot {
                    value: effective.value,
                    available: effective.available,
                    state: status.states.get(reading).copied().unwrap_or(ReadingState::Unavailable),
                    unit: slot.unit.clone(),
                    threshold: self.threshold(*reading),
                    sources: slot.aggregator.sources().to_vec(),
                };
                (*reading, snapshot)
            })
            .collect();

        PlantSnapshot {
            key: self.spec.key.clone(),
            name: self.spec.name.clone(),
            pid: self.spec.pid.clone(),
            health: status.health,
            problem: status.is_problem(),
            summary: status.summary(),
            problems: status.problems,
            readings,
            image: self.image.clone(),
            max_brightness: status.max_brightness,
            attributes: self.attributes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
