//! The monitoring engine as one object.
//!
//! `PlantMonitor` owns the plant registry, the discovery coordinator and the
//! species catalog. Host integrations feed it `SensorUpdate`s and read back
//! `PlantSnapshot`s; everything time-dependent takes `now` explicitly.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};

use crate::analysis::brightness::HistoryPoint;
use crate::config::{DEFAULT_CHECK_DAYS, MonitorConfig, validate_plant};
use crate::discovery::{DiscoveryCoordinator, DiscoveryOutcome, PlantId, PlantRegistry};
use crate::history::HistoryStore;
use crate::ingest::events::{SensorUpdate, parse_event_line};
use crate::logging::{self, Component};
use crate::model::{MonitorError, ReadingType};
use crate::plant::{PlantAggregate, PlantSnapshot, PlantStatus};
use crate::species::{ImageSettings, SpeciesCatalog, SpeciesIndex};

pub struct PlantMonitor {
    registry: PlantRegistry,
    coordinator: DiscoveryCoordinator,
    catalog: SpeciesCatalog,
    images: ImageSettings,
    /// Stored light history of plants not created yet, keyed by plant key.
    pending_history: HashMap<String, Vec<HistoryPoint>>,
}

impl PlantMonitor {
    /// Builds the monitor from a parsed configuration.
    ///
    /// Plants that fail validation are omitted and their errors returned
    /// alongside the monitor; the remaining plants load normally.
    pub fn from_config(config: &MonitorConfig, species: SpeciesIndex) -> (Self, Vec<MonitorError>) {
        let images = config.image_settings();
        let mut registry = PlantRegistry::new();
        let mut errors = Vec::new();

        for (name, plant_config) in &config.plants {
            let result = validate_plant(config, name, plant_config)
                .and_then(|spec| registry.insert(PlantAggregate::new(spec, &species, &images)));
            match result {
                Ok(_) => logging::debug(Component::Config, Some(name), "Plant loaded"),
                Err(e) => {
                    logging::error(Component::Config, Some(name), &e.to_string());
                    errors.push(e);
                }
            }
        }

        logging::log_load_summary(
            Component::Config,
            "Plants",
            config.plants.len(),
            registry.len(),
            errors.len(),
        );

        let monitor = Self {
            registry,
            coordinator: DiscoveryCoordinator::new(config.global_prefix().as_deref(), config.auto_create_plants),
            catalog: SpeciesCatalog::new(species),
            images,
            pending_history: HashMap::new(),
        };
        (monitor, errors)
    }

    pub fn registry(&self) -> &PlantRegistry {
        &self.registry
    }

    pub fn plant(&self, key: &str) -> Option<&PlantAggregate> {
        self.registry.find(key).and_then(|id| self.registry.get(id))
    }

    pub fn species(&self) -> std::sync::Arc<SpeciesIndex> {
        self.catalog.current()
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Prefixes a new sensor is tried against: every plant's prefix, then
    /// the global one when plants may be created from it.
    fn discovery_prefixes(&self) -> Vec<String> {
        let mut prefixes = self.registry.prefixes();
        if let Some(global) = self.coordinator.global_prefix() {
            if !prefixes.iter().any(|p| p == global) {
                prefixes.push(global.to_string());
            }
        }
        prefixes
    }

    fn route(&mut self, entity_id: &str) -> Option<(PlantId, ReadingType)> {
        if let Some(known) = self.registry.lookup_sensor(entity_id) {
            return Some(known);
        }

        let species = self.catalog.current();
        for prefix in self.discovery_prefixes() {
            match self
                .coordinator
                .on_sensor_seen(&mut self.registry, entity_id, &prefix, &species, &self.images)
            {
                DiscoveryOutcome::Attached { plant, reading, created } => {
                    if created {
                        self.apply_pending_history(plant);
                    }
                    return Some((plant, reading));
                }
                DiscoveryOutcome::AlreadyKnown { plant, reading } => return Some((plant, reading)),
                DiscoveryOutcome::Collision { .. } => return None,
                DiscoveryOutcome::Ignored => continue,
            }
        }
        None
    }

    /// Applies one sensor state change, discovering the sensor first if it
    /// is new. Returns the affected plant, or `None` when the sensor belongs
    /// to no plant.
    pub fn handle_update(&mut self, update: &SensorUpdate) -> Option<PlantId> {
        let entity_id = update.entity_id.trim().to_ascii_lowercase();
        let (id, reading) = self.route(&entity_id)?;
        let plant = self.registry.get_mut(id)?;
        plant.apply_update(
            reading,
            &entity_id,
            update.reading(),
            update.is_available(),
            update.unit.as_deref(),
            update.timestamp,
        );
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn status(&mut self, key: &str, now: DateTime<Utc>) -> Option<PlantStatus> {
        let id = self.registry.find(key)?;
        self.registry.get_mut(id).map(|p| p.evaluate(now))
    }

    pub fn snapshot(&mut self, key: &str, now: DateTime<Utc>) -> Option<PlantSnapshot> {
        let id = self.registry.find(key)?;
        self.snapshot_of(id, now)
    }

    pub fn snapshot_of(&mut self, id: PlantId, now: DateTime<Utc>) -> Option<PlantSnapshot> {
        self.registry.get_mut(id).map(|p| p.snapshot(now))
    }

    /// Snapshots of every plant, in creation order.
    pub fn snapshots(&mut self, now: DateTime<Utc>) -> Vec<PlantSnapshot> {
        self.registry.iter_mut().map(|(_, p)| p.snapshot(now)).collect()
    }

    // -----------------------------------------------------------------------
    // Event stream
    // -----------------------------------------------------------------------

    /// Applies JSON-line events from `input` until it ends, writing the
    /// snapshot of each affected plant to `out` as one JSON line. Returns
    /// how many snapshots were written.
    ///
    /// Bytes that are not valid UTF-8 are replaced before parsing, and a
    /// line that does not parse is logged and skipped. Only reading `input`
    /// or writing `out` ends the stream early.
    pub fn run_events<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut out: W,
        mut clock: impl FnMut() -> DateTime<Utc>,
    ) -> io::Result<usize> {
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        let mut written = 0;

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                return Ok(written);
            }
            line_no += 1;

            let decoded = String::from_utf8_lossy(&buf);
            if matches!(decoded, std::borrow::Cow::Owned(_)) {
                logging::warn(
                    Component::System,
                    None,
                    &format!("Line {} is not valid UTF-8, decoding lossily", line_no),
                );
            }
            let line = decoded.trim();
            if line.is_empty() {
                continue;
            }

            let now = clock();
            let update = match parse_event_line(line, now) {
                Ok(Some(update)) => update,
                Ok(None) => continue,
                Err(e) => {
                    logging::warn(Component::System, None, &format!("Skipping line {}: {}", line_no, e));
                    continue;
                }
            };

            let Some(plant) = self.handle_update(&update) else {
                continue;
            };
            if let Some(snapshot) = self.snapshot_of(plant, now) {
                serde_json::to_writer(&mut out, &snapshot)?;
                writeln!(out)?;
                out.flush()?;
                written += 1;
            }
        }
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Loads each plant's light history from `store`. A plant whose history
    /// cannot be read starts with an empty tracker. Returns how many plants
    /// were restored.
    pub fn restore_history(&mut self, store: &mut dyn HistoryStore, now: DateTime<Utc>) -> usize {
        let mut restored = 0;
        for (_, plant) in self.registry.iter_mut() {
            let since = now - chrono::Duration::days(i64::from(plant.check_days()));
            match store.load(plant.key(), since) {
                Ok(points) => {
                    logging::debug(
                        Component::History,
                        Some(plant.key()),
                        &format!("Restored {} light samples", points.len()),
                    );
                    plant.restore_history(points);
                    restored += 1;
                }
                Err(e) => {
                    logging::log_history_failure(plant.key(), "Restore", &e);
                    logging::warn(
                        Component::History,
                        Some(plant.key()),
                        "Continuing without light history",
                    );
                }
            }
        }
        if self.coordinator.auto_create() {
            self.hold_unclaimed_history(store, now);
        }
        restored
    }

    /// Loads the history of stored plants that are not configured, so a
    /// plant auto-created later in this run starts from its saved samples.
    fn hold_unclaimed_history(&mut self, store: &mut dyn HistoryStore, now: DateTime<Utc>) {
        let keys = match store.plant_keys() {
            Ok(keys) => keys,
            Err(e) => {
                logging::warn(
                    Component::History,
                    None,
                    &format!("Cannot list stored plants, discovered plants start empty: {}", e),
                );
                return;
            }
        };
        let since = now - chrono::Duration::days(i64::from(DEFAULT_CHECK_DAYS));
        for key in keys.into_iter().filter(|k| self.registry.find(k).is_none()) {
            match store.load(&key, since) {
                Ok(points) if points.is_empty() => {}
                Ok(points) => {
                    self.pending_history.insert(key, points);
                }
                Err(e) => logging::log_history_failure(&key, "Restore", &e),
            }
        }
        if !self.pending_history.is_empty() {
            logging::debug(
                Component::History,
                None,
                &format!("Holding light history for {} undiscovered plants", self.pending_history.len()),
            );
        }
    }

    fn apply_pending_history(&mut self, id: PlantId) {
        let Some(plant) = self.registry.get_mut(id) else {
            return;
        };
        if let Some(points) = self.pending_history.remove(plant.key()) {
            logging::debug(
                Component::History,
                Some(plant.key()),
                &format!("Restored {} light samples on discovery", points.len()),
            );
            plant.restore_history(points);
        }
    }

    /// Saves every plant's in-window light history. Failures are logged and
    /// returned; the other plants are still saved. Stored plants that were
    /// never discovered in this run are left untouched.
    pub fn persist_history(&self, store: &mut dyn HistoryStore, now: DateTime<Utc>) -> Vec<MonitorError> {
        let mut errors = Vec::new();
        for (_, plant) in self.registry.iter() {
            if let Err(e) = store.save(plant.key(), &plant.history_points(now)) {
                logging::log_history_failure(plant.key(), "Save", &e);
                errors.push(e);
            }
        }
        errors
    }

    // -----------------------------------------------------------------------
    // Species reload
    // -----------------------------------------------------------------------

    /// Installs a new species index and re-resolves every plant against it.
    pub fn reload_species(&mut self, index: SpeciesIndex) {
        let records = index.len();
        self.catalog.replace(index);
        let species = self.catalog.current();
        for (_, plant) in self.registry.iter_mut() {
            plant.resolve_thresholds(&species, &self.images);
        }
        logging::info(
            Component::Species,
            None,
            &format!("Species database reloaded ({} records)", records),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
