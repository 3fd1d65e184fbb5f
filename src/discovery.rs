//! Plant registry and sensor discovery.
//!
//! The registry owns every `PlantAggregate` and indexes sensors back to the
//! (plant, reading) pair they feed. The coordinator decides what happens
//! when the host reports a sensor the registry has not seen: attach it to a
//! configured plant, create a plant for it, or ignore it.

use std::collections::HashMap;

use crate::config::PlantSpec;
use crate::logging::{self, Component};
use crate::model::{MonitorError, ReadingType};
use crate::naming::{SensorName, match_sensor, slugify};
use crate::plant::PlantAggregate;
use crate::species::{ImageSettings, SpeciesIndex};

/// Stable handle to a plant inside a `PlantRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlantId(usize);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PlantRegistry {
    plants: Vec<PlantAggregate>,
    by_key: HashMap<String, PlantId>,
    sensors: HashMap<String, (PlantId, ReadingType)>,
}

impl PlantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plant and indexes its static sensors. A static sensor already
    /// claimed by another plant stays with that plant.
    pub fn insert(&mut self, mut plant: PlantAggregate) -> Result<PlantId, MonitorError> {
        if self.by_key.contains_key(plant.key()) {
            return Err(MonitorError::configuration(
                plant.name(),
                format!("plant key '{}' is already in use", plant.key()),
            ));
        }

        let id = PlantId(self.plants.len());
        let key = plant.key().to_string();

        let attached: Vec<(String, ReadingType)> = ReadingType::ALL
            .into_iter()
            .filter_map(|rt| plant.aggregator(rt).map(|agg| (rt, agg)))
            .flat_map(|(rt, agg)| agg.sources().iter().map(move |s| (s.identifier.clone(), rt)))
            .collect();
        for (identifier, reading) in attached {
            if !self.index_sensor(id, &key, &identifier, reading) {
                plant.detach_source(reading, &identifier);
            }
        }

        self.by_key.insert(key, id);
        self.plants.push(plant);
        Ok(id)
    }

    fn index_sensor(&mut self, id: PlantId, key: &str, identifier: &str, reading: ReadingType) -> bool {
        if let Some((owner, _)) = self.sensors.get(identifier) {
            if *owner != id {
                let owner_key = self.plants.get(owner.0).map(|p| p.key()).unwrap_or("?");
                logging::warn(
                    Component::Discovery,
                    Some(key),
                    &format!("Sensor {} already belongs to plant '{}', keeping that mapping", identifier, owner_key),
                );
            }
            return false;
        }
        self.sensors.insert(identifier.to_string(), (id, reading));
        true
    }

    /// Attaches `identifier` as a source of `reading` on plant `id`.
    /// Returns `false` if the sensor is already mapped anywhere.
    pub fn attach(&mut self, id: PlantId, reading: ReadingType, identifier: &str) -> bool {
        let Some(key) = self.plants.get(id.0).map(|p| p.key().to_string()) else {
            return false;
        };
        if !self.index_sensor(id, &key, identifier, reading) {
            return false;
        }
        if let Some(plant) = self.plants.get_mut(id.0) {
            plant.attach_source(reading, identifier);
        }
        true
    }

    pub fn get(&self, id: PlantId) -> Option<&PlantAggregate> {
        self.plants.get(id.0)
    }

    pub fn get_mut(&mut self, id: PlantId) -> Option<&mut PlantAggregate> {
        self.plants.get_mut(id.0)
    }

    pub fn find(&self, key: &str) -> Option<PlantId> {
        self.by_key.get(key).copied()
    }

    /// The (plant, reading) a sensor feeds, if it is known.
    pub fn lookup_sensor(&self, identifier: &str) -> Option<(PlantId, ReadingType)> {
        self.sensors.get(identifier).copied()
    }

    /// All plants in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (PlantId, &PlantAggregate)> {
        self.plants.iter().enumerate().map(|(i, p)| (PlantId(i), p))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PlantId, &mut PlantAggregate)> {
        self.plants.iter_mut().enumerate().map(|(i, p)| (PlantId(i), p))
    }

    /// Distinct discovery prefixes in use, in plant order.
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = Vec::new();
        for plant in &self.plants {
            if let Some(prefix) = plant.discovery_prefix() {
                if !prefixes.iter().any(|p| p == prefix) {
                    prefixes.push(prefix.to_string());
                }
            }
        }
        prefixes
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// What `on_sensor_seen` did with a sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Newly attached; `created` is set when the plant was created for it.
    Attached {
        plant: PlantId,
        reading: ReadingType,
        created: bool,
    },
    /// The sensor was already mapped; nothing changed.
    AlreadyKnown { plant: PlantId, reading: ReadingType },
    /// The sensor is mapped to one plant but its name resolves to another.
    /// The existing mapping wins.
    Collision { existing: PlantId, claimed_by: String },
    /// The name did not match, or matched a plant this prefix may not feed.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryCoordinator {
    global_prefix: Option<String>,
    auto_create: bool,
}

impl DiscoveryCoordinator {
    pub fn new(global_prefix: Option<&str>, auto_create: bool) -> Self {
        Self {
            global_prefix: global_prefix.map(slugify).filter(|p| !p.is_empty()),
            auto_create,
        }
    }

    pub fn global_prefix(&self) -> Option<&str> {
        self.global_prefix.as_deref()
    }

    /// Whether unknown plant names under the global prefix create plants.
    pub fn auto_create(&self) -> bool {
        self.auto_create && self.global_prefix.is_some()
    }

    /// Handles a sensor identifier reported by the host, matched against
    /// `prefix`. Plants created here resolve thresholds against `species`.
    pub fn on_sensor_seen(
        &self,
        registry: &mut PlantRegistry,
        identifier: &str,
        prefix: &str,
        species: &SpeciesIndex,
        images: &ImageSettings,
    ) -> DiscoveryOutcome {
        let prefix = slugify(prefix);
        let identifier = identifier.trim().to_ascii_lowercase();
        let name = match_sensor(&identifier, &prefix).matched();

        if let Some((existing, reading)) = registry.lookup_sensor(&identifier) {
            return match name {
                Some(SensorName { plant_key, .. })
                    if registry.get(existing).is_some_and(|p| p.key() != plant_key)
                        && registry.find(&plant_key).is_some() =>
                {
                    logging::warn(
                        Component::Discovery,
                        Some(&plant_key),
                        &format!("Sensor {} is already assigned to another plant, ignoring", identifier),
                    );
                    DiscoveryOutcome::Collision {
                        existing,
                        claimed_by: plant_key,
                    }
                }
                _ => DiscoveryOutcome::AlreadyKnown { plant: existing, reading },
            };
        }

        let Some(SensorName { plant_key, reading, .. }) = name else {
            return DiscoveryOutcome::Ignored;
        };

        let (plant, created) = match registry.find(&plant_key) {
            Some(id) => {
                let accepts = registry
                    .get(id)
                    .and_then(PlantAggregate::discovery_prefix)
                    .is_some_and(|p| p == prefix);
                if !accepts {
                    logging::debug(
                        Component::Discovery,
                        Some(&plant_key),
                        &format!("Sensor {} matched with prefix '{}' which this plant does not use", identifier, prefix),
                    );
                    return DiscoveryOutcome::Ignored;
                }
                (id, false)
            }
            None => {
                if !self.auto_create || self.global_prefix.as_deref() != Some(prefix.as_str()) {
                    logging::debug(
                        Component::Discovery,
                        Some(&plant_key),
                        &format!("Sensor {} names an unconfigured plant, ignoring", identifier),
                    );
                    return DiscoveryOutcome::Ignored;
                }
                let plant = PlantAggregate::new(PlantSpec::discovered(&plant_key, &prefix), species, images);
                match registry.insert(plant) {
                    Ok(id) => {
                        logging::info(Component::Discovery, Some(&plant_key), "Created plant from discovered sensor");
                        (id, true)
                    }
                    Err(e) => {
                        logging::error(Component::Discovery, Some(&plant_key), &e.to_string());
                        return DiscoveryOutcome::Ignored;
                    }
                }
            }
        };

        if !registry.attach(plant, reading, &identifier) {
            return DiscoveryOutcome::Ignored;
        }
        logging::info(
            Component::Discovery,
            Some(&plant_key),
            &format!("Attached {} as {} source", identifier, reading),
        );
        DiscoveryOutcome::Attached { plant, reading, created }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(key: &str, prefix: &str) -> PlantAggregate {
        PlantAggregate::new(
            PlantSpec::discovered(key, prefix),
            &SpeciesIndex::empty(),
            &ImageSettings::default(),
        )
    }

    fn seen(
        coordinator: &DiscoveryCoordinator,
        registry: &mut PlantRegistry,
        identifier: &str,
        prefix: &str,
    ) -> DiscoveryOutcome {
        coordinator.on_sensor_seen(
            registry,
            identifier,
            prefix,
            &SpeciesIndex::empty(),
            &ImageSettings::default(),
        )
    }

    #[test]
    fn test_matching_sensor_attaches_to_configured_plant() {
        let mut registry = PlantRegistry::new();
        let id = registry.insert(configured("monstera", "plant")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);

        let outcome = seen(&coordinator, &mut registry, "sensor.plant_monstera_soil_moist", "plant");
        assert_eq!(
            outcome,
            DiscoveryOutcome::Attached { plant: id, reading: ReadingType::SoilMoist, created: false }
        );
        assert_eq!(
            registry.lookup_sensor("sensor.plant_monstera_soil_moist"),
            Some((id, ReadingType::SoilMoist))
        );
    }

    #[test]
    fn test_second_sighting_is_already_known() {
        let mut registry = PlantRegistry::new();
        let id = registry.insert(configured("monstera", "plant")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);

        seen(&coordinator, &mut registry, "sensor.plant_monstera_temp", "plant");
        let outcome = seen(&coordinator, &mut registry, "sensor.plant_monstera_temp", "plant");
        assert_eq!(outcome, DiscoveryOutcome::AlreadyKnown { plant: id, reading: ReadingType::Temp });
        assert_eq!(registry.get(id).unwrap().aggregator(ReadingType::Temp).unwrap().len(), 1);
    }

    #[test]
    fn test_indexed_sensors_become_redundant_sources() {
        let mut registry = PlantRegistry::new();
        let id = registry.insert(configured("monstera", "plant")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);

        seen(&coordinator, &mut registry, "sensor.plant_monstera_temp", "plant");
        seen(&coordinator, &mut registry, "sensor.plant_monstera_temp_2", "plant");
        let sources: Vec<&str> = registry
            .get(id)
            .unwrap()
            .aggregator(ReadingType::Temp)
            .unwrap()
            .sources()
            .iter()
            .map(|s| s.identifier.as_str())
            .collect();
        assert_eq!(sources, vec!["sensor.plant_monstera_temp", "sensor.plant_monstera_temp_2"]);
    }

    #[test]
    fn test_unknown_plant_ignored_without_auto_create() {
        let mut registry = PlantRegistry::new();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);
        let outcome = seen(&coordinator, &mut registry, "sensor.plant_fern_temp", "plant");
        assert_eq!(outcome, DiscoveryOutcome::Ignored);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_auto_create_makes_plant_for_global_prefix_only() {
        let mut registry = PlantRegistry::new();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), true);

        let outcome = seen(&coordinator, &mut registry, "sensor.plant_fern_temp", "plant");
        assert!(matches!(outcome, DiscoveryOutcome::Attached { created: true, .. }));
        assert!(registry.find("fern").is_some());

        let outcome = seen(&coordinator, &mut registry, "sensor.shelf_ivy_temp", "shelf");
        assert_eq!(outcome, DiscoveryOutcome::Ignored);
        assert!(registry.find("ivy").is_none());
    }

    #[test]
    fn test_plant_only_accepts_its_own_prefix() {
        let mut registry = PlantRegistry::new();
        registry.insert(configured("monstera", "balcony")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);

        assert_eq!(
            seen(&coordinator, &mut registry, "sensor.plant_monstera_temp", "plant"),
            DiscoveryOutcome::Ignored
        );
        assert!(matches!(
            seen(&coordinator, &mut registry, "sensor.balcony_monstera_temp", "balcony"),
            DiscoveryOutcome::Attached { .. }
        ));
    }

    #[test]
    fn test_non_matching_name_ignored() {
        let mut registry = PlantRegistry::new();
        registry.insert(configured("monstera", "plant")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), true);
        assert_eq!(
            seen(&coordinator, &mut registry, "sensor.kitchen_light", "plant"),
            DiscoveryOutcome::Ignored
        );
        assert_eq!(
            seen(&coordinator, &mut registry, "sensor.plant_monstera_status", "plant"),
            DiscoveryOutcome::Ignored
        );
    }

    #[test]
    fn test_static_sensor_claimed_by_name_of_other_plant_is_collision() {
        let mut registry = PlantRegistry::new();
        let mut spec = PlantSpec::discovered("ficus", "plant");
        spec.sensors.insert(ReadingType::Temp, "sensor.plant_monstera_temp".to_string());
        let ficus = registry
            .insert(PlantAggregate::new(spec, &SpeciesIndex::empty(), &ImageSettings::default()))
            .unwrap();
        registry.insert(configured("monstera", "plant")).unwrap();
        let coordinator = DiscoveryCoordinator::new(Some("plant"), false);

        let outcome = seen(&coordinator, &mut registry, "sensor.plant_monstera_temp", "plant");
        assert_eq!(
            outcome,
            DiscoveryOutcome::Collision { existing: ficus, claimed_by: "monstera".to_string() }
        );
        assert_eq!(registry.lookup_sensor("sensor.plant_monstera_temp"), Some((ficus, ReadingType::Temp)));
    }

    #[test]
    fn test_duplicate_plant_key_rejected() {
        let mut registry = PlantRegistry::new();
        registry.insert(configured("monstera", "plant")).unwrap();
        let err = registry.insert(configured("monstera", "plant")).unwrap_err();
        assert!(matches!(err, MonitorError::Configuration { .. }));
    }

    #[test]
    fn test_static_sensor_shared_by_two_plants_stays_with_first() {
        let mut registry = PlantRegistry::new();
        let mut a = PlantSpec::discovered("a", "plant");
        a.sensors.insert(ReadingType::Temp, "sensor.room_temp".to_string());
        let mut b = PlantSpec::discovered("b", "plant");
        b.sensors.insert(ReadingType::Temp, "sensor.room_temp".to_string());

        let a_id = registry
            .insert(PlantAggregate::new(a, &SpeciesIndex::empty(), &ImageSettings::default()))
            .unwrap();
        registry
            .insert(PlantAggregate::new(b, &SpeciesIndex::empty(), &ImageSettings::default()))
            .unwrap();
        assert_eq!(registry.lookup_sensor("sensor.room_temp"), Some((a_id, ReadingType::Temp)));
        let b_id = registry.find("b").unwrap();
        assert!(registry.get(b_id).unwrap().aggregator(ReadingType::Temp).is_none());
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let mut registry = PlantRegistry::new();
        registry.insert(configured("a", "plant")).unwrap();
        registry.insert(configured("b", "balcony")).unwrap();
        registry.insert(configured("c", "plant")).unwrap();
        assert_eq!(registry.prefixes(), vec!["plant".to_string(), "balcony".to_string()]);
    }
}
