/// End-to-end scenarios for the plant monitor
///
/// Tests verify:
/// 1. Discovery of redundant sensors by naming convention
/// 2. Threshold layering across species database and overrides
/// 3. Light history surviving a restart through the JSON store, including
///    plants created on discovery and input with undecodable bytes
/// 4. Species database reload re-resolving live plants
/// 5. Snapshot output as handed to the host
///
/// All files live in temporary directories; no external services needed.
///
/// Run with: cargo test --test plant_monitor_scenarios

use std::fs;

use chrono::{DateTime, Duration, TimeZone, Utc};

use plantmon_service::config::{load_config, parse_config};
use plantmon_service::history::JsonFileStore;
use plantmon_service::ingest::events::{SensorUpdate, parse_event_line};
use plantmon_service::species::SpeciesIndex;
use plantmon_service::{MonitorError, PlantHealth, PlantMonitor, ReadingState, ReadingType, ThresholdPair};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

const SPECIES_CSV: &str = "\
pid,display_pid,min_light_lux,max_light_lux,min_soil_moist,max_soil_moist,min_temp,max_temp,image,origin
monstera deliciosa,Monstera deliciosa,1500,40000,15,60,12,32,https://example.org/monstera.jpg,Central America
ficus lyrata,Ficus lyrata,2500,,20,,10,35,,West Africa
";

fn monitor_from(config: &str, species: &str) -> (PlantMonitor, Vec<MonitorError>) {
    let config = parse_config(config).expect("config should parse");
    let index = SpeciesIndex::parse(species).expect("species table should parse");
    PlantMonitor::from_config(&config, index)
}

fn value(id: &str, v: f64, at: DateTime<Utc>) -> SensorUpdate {
    SensorUpdate::value(id, v, at)
}

// ---------------------------------------------------------------------------
// 1. Discovery and Redundancy
// ---------------------------------------------------------------------------

#[test]
fn test_redundant_soil_sensors_discovered_for_one_reading() {
    let (mut monitor, errors) = monitor_from(
        r#"
        discovery_prefix = "plant"

        [plants.monstera_deliciosa]
        min_soil_moist = 20
        "#,
        "pid\n",
    );
    assert!(errors.is_empty());

    monitor.handle_update(&value("plant_monstera_deliciosa_soil_moist_1", 25.0, t0()));
    monitor.handle_update(&SensorUpdate::unavailable("plant_monstera_deliciosa_soil_moist_2", t0()));

    let plant = monitor.plant("monstera_deliciosa").expect("plant exists");
    let agg = plant.aggregator(ReadingType::SoilMoist).expect("soil aggregator exists");
    assert_eq!(agg.len(), 2, "both redundant sources should be attached");

    let effective = agg.effective();
    assert_eq!(effective.value, Some(25.0));
    assert!(effective.available);

    let status = monitor.status("monstera_deliciosa", t0()).unwrap();
    assert_eq!(status.states[&ReadingType::SoilMoist], ReadingState::Ok);
    assert_eq!(status.health, PlantHealth::Ok);
}

#[test]
fn test_failover_to_second_sensor_keeps_plant_healthy() {
    let (mut monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"

        [plants.monstera]
        min_soil_moist = 20
        "#,
        "pid\n",
    );

    monitor.handle_update(&value("sensor.plant_monstera_soil_moist", 30.0, t0()));
    monitor.handle_update(&value("sensor.plant_monstera_soil_moist_2", 35.0, t0()));
    monitor.handle_update(&SensorUpdate::unavailable("sensor.plant_monstera_soil_moist", t0()));

    let status = monitor.status("monstera", t0()).unwrap();
    assert_eq!(status.health, PlantHealth::Ok);

    monitor.handle_update(&SensorUpdate::unavailable("sensor.plant_monstera_soil_moist_2", t0()));
    let status = monitor.status("monstera", t0()).unwrap();
    assert_eq!(status.states[&ReadingType::SoilMoist], ReadingState::Unavailable);
    assert_eq!(status.health, PlantHealth::Unavailable);

    let snapshot = monitor.snapshot("monstera", t0()).unwrap();
    assert_eq!(snapshot.readings[&ReadingType::SoilMoist].value, Some(30.0), "stale value still shown");
}

#[test]
fn test_static_sensor_used_without_discovery() {
    let (mut monitor, errors) = monitor_from(
        r#"
        [plants."Kitchen Basil"]
        max_temp = 30

        [plants."Kitchen Basil".sensors]
        temp = "sensor.kitchen_temperature"
        "#,
        "pid\n",
    );
    assert!(errors.is_empty());

    monitor.handle_update(&value("sensor.kitchen_temperature", 33.0, t0()));
    let status = monitor.status("kitchen_basil", t0()).unwrap();
    assert_eq!(status.states[&ReadingType::Temp], ReadingState::AboveMax);
    assert_eq!(status.summary(), "temp high");
}

#[test]
fn test_plant_without_sensors_or_prefix_is_configuration_error() {
    let (monitor, errors) = monitor_from(
        r#"
        [plants.orphan]
        min_temp = 10

        [plants.fern]
        discovery_prefix = "plant"
        "#,
        "pid\n",
    );
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], MonitorError::Configuration { plant, .. } if plant == "orphan"));
    assert!(monitor.plant("fern").is_some());
}

#[test]
fn test_auto_created_plant_uses_defaults() {
    let (mut monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"
        auto_create_plants = true
        "#,
        "pid\n",
    );

    monitor.handle_update(&value("sensor.plant_pothos_battery", 12.0, t0()));
    let status = monitor.status("pothos", t0()).expect("plant created on discovery");
    assert_eq!(status.states[&ReadingType::Battery], ReadingState::BelowMin);
    assert_eq!(status.summary(), "battery low");
}

// ---------------------------------------------------------------------------
// 2. Threshold Layering
// ---------------------------------------------------------------------------

#[test]
fn test_override_beats_database_beats_default() {
    let (monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"

        [plants.monstera]
        pid = "Monstera Deliciosa"
        min_soil_moist = 25
        "#,
        SPECIES_CSV,
    );

    let plant = monitor.plant("monstera").unwrap();
    assert_eq!(plant.threshold(ReadingType::SoilMoist), ThresholdPair::new(Some(25.0), Some(60.0)));
    assert_eq!(plant.threshold(ReadingType::Temp), ThresholdPair::new(Some(12.0), Some(32.0)));
    assert_eq!(plant.threshold(ReadingType::Battery), ThresholdPair::new(Some(20.0), None));
    assert_eq!(plant.threshold(ReadingType::SoilEc), ThresholdPair::unbounded());
}

#[test]
fn test_unknown_pid_falls_back_to_defaults() {
    let (monitor, errors) = monitor_from(
        r#"
        discovery_prefix = "plant"

        [plants.mystery]
        pid = "Not A Plant"
        "#,
        SPECIES_CSV,
    );
    assert!(errors.is_empty());
    let plant = monitor.plant("mystery").unwrap();
    assert_eq!(plant.threshold(ReadingType::Temp), ThresholdPair::unbounded());
    assert_eq!(plant.image(), None);
}

// ---------------------------------------------------------------------------
// 3. Light History Across Restarts
// ---------------------------------------------------------------------------

#[test]
fn test_restart_does_not_report_too_dark() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let config = r#"
        discovery_prefix = "plant"

        [plants.monstera]
        pid = "monstera deliciosa"
    "#;

    let (mut first, _) = monitor_from(config, SPECIES_CSV);
    first.handle_update(&value("sensor.plant_monstera_light_lux", 12000.0, t0()));
    first.handle_update(&value("sensor.plant_monstera_light_lux", 40.0, t0() + Duration::hours(9)));
    let mut store = JsonFileStore::new(&history_path);
    assert!(first.persist_history(&mut store, t0() + Duration::hours(9)).is_empty());

    // Process restarts at night.
    let night = t0() + Duration::hours(10);
    let (mut second, _) = monitor_from(config, SPECIES_CSV);
    let mut store = JsonFileStore::new(&history_path);
    assert_eq!(second.restore_history(&mut store, night), 1);
    second.handle_update(&value("sensor.plant_monstera_light_lux", 0.0, night));

    let status = second.status("monstera", night).unwrap();
    assert_eq!(status.states[&ReadingType::LightLux], ReadingState::Ok);
    assert_eq!(status.max_brightness, Some(12000.0));

    // Without the restore the same reading is a problem.
    let (mut fresh, _) = monitor_from(config, SPECIES_CSV);
    fresh.handle_update(&value("sensor.plant_monstera_light_lux", 0.0, night));
    assert_eq!(
        fresh.status("monstera", night).unwrap().states[&ReadingType::LightLux],
        ReadingState::BelowMin
    );
}

#[test]
fn test_auto_created_plant_keeps_history_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let config = r#"
        discovery_prefix = "plant"
        auto_create_plants = true
    "#;

    let (mut first, _) = monitor_from(config, "pid\n");
    first.handle_update(&value("sensor.plant_pothos_light_lux", 9000.0, t0()));
    let mut store = JsonFileStore::new(&history_path);
    assert!(first.persist_history(&mut store, t0()).is_empty());

    // Nothing is configured, so the plant only exists once its sensor reports.
    let night = t0() + Duration::hours(10);
    let (mut second, _) = monitor_from(config, "pid\n");
    let mut store = JsonFileStore::new(&history_path);
    assert_eq!(second.restore_history(&mut store, night), 0);
    second.handle_update(&value("sensor.plant_pothos_light_lux", 0.0, night));
    assert_eq!(second.status("pothos", night).unwrap().max_brightness, Some(9000.0));

    // The next save must not drop the earlier sample.
    assert!(second.persist_history(&mut store, night).is_empty());
    let (mut third, _) = monitor_from(config, "pid\n");
    third.restore_history(&mut store, night);
    third.handle_update(&value("sensor.plant_pothos_light_lux", 0.0, night + Duration::hours(1)));
    assert_eq!(
        third.status("pothos", night + Duration::hours(1)).unwrap().max_brightness,
        Some(9000.0)
    );
}

#[test]
fn test_event_stream_with_bad_bytes_still_saves_history() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let (mut monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"
        [plants.monstera]
        "#,
        "pid\n",
    );

    let mut input = b"{\"entity_id\": \"sensor.plant_monstera_temp\", \"state\": \"2\xff0\"}\n".to_vec();
    input.extend_from_slice(b"{\"entity_id\": \"sensor.plant_monstera_light_lux\", \"state\": \"8000\"}\n");
    let mut out = Vec::new();
    assert_eq!(monitor.run_events(&input[..], &mut out, t0).unwrap(), 1);

    let mut store = JsonFileStore::new(&history_path);
    assert!(monitor.persist_history(&mut store, t0()).is_empty());
    let saved = fs::read_to_string(&history_path).unwrap();
    assert!(saved.contains("8000"));
}

#[test]
fn test_corrupt_history_file_degrades_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    fs::write(&history_path, "not json at all").unwrap();

    let (mut monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"
        [plants.monstera]
        "#,
        "pid\n",
    );
    let mut store = JsonFileStore::new(&history_path);
    assert_eq!(monitor.restore_history(&mut store, t0()), 0);

    monitor.handle_update(&value("sensor.plant_monstera_light_lux", 500.0, t0()));
    assert_eq!(monitor.status("monstera", t0()).unwrap().max_brightness, Some(500.0));
}

// ---------------------------------------------------------------------------
// 4. Species Reload
// ---------------------------------------------------------------------------

#[test]
fn test_reload_species_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("species.csv");
    fs::write(&csv_path, "pid,min_soil_moist\nficus lyrata,20\n").unwrap();

    let config_path = dir.path().join("plants.toml");
    fs::write(
        &config_path,
        format!(
            "database = {:?}\ndiscovery_prefix = \"plant\"\n\n[plants.ficus]\npid = \"ficus lyrata\"\n",
            csv_path.display().to_string()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let index = SpeciesIndex::load(config.database.as_ref().unwrap()).unwrap();
    let (mut monitor, _) = PlantMonitor::from_config(&config, index);
    monitor.handle_update(&value("sensor.plant_ficus_soil_moist", 25.0, t0()));
    assert_eq!(monitor.status("ficus", t0()).unwrap().health, PlantHealth::Ok);

    fs::write(&csv_path, "pid,min_soil_moist\nficus lyrata,30\n").unwrap();
    monitor.reload_species(SpeciesIndex::load(&csv_path).unwrap());

    let status = monitor.status("ficus", t0()).unwrap();
    assert_eq!(status.states[&ReadingType::SoilMoist], ReadingState::BelowMin);
}

// ---------------------------------------------------------------------------
// 5. Snapshot Output
// ---------------------------------------------------------------------------

#[test]
fn test_snapshot_serializes_for_host() {
    let (mut monitor, _) = monitor_from(
        r#"
        discovery_prefix = "plant"

        [plants.monstera]
        pid = "monstera deliciosa"
        "#,
        SPECIES_CSV,
    );

    let line = r#"{"entity_id": "sensor.plant_monstera_temp", "state": "35.5", "unit": "°C"}"#;
    let update = parse_event_line(line, t0()).unwrap().unwrap();
    monitor.handle_update(&update);

    let snapshot = monitor.snapshot("monstera", t0()).unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["key"], "monstera");
    assert_eq!(json["health"], "problem");
    assert_eq!(json["problem"], true);
    assert_eq!(json["summary"], "temp high");
    assert_eq!(json["readings"]["temp"]["state"], "above_max");
    assert_eq!(json["readings"]["temp"]["unit"], "°C");
    assert_eq!(json["readings"]["temp"]["threshold"]["max"], 32.0);
    assert_eq!(json["image"], "https://example.org/monstera.jpg");
    assert_eq!(json["attributes"]["origin"], "Central America");
}
