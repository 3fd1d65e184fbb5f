//! `plantmon`: runs the monitor over a stream of host sensor events.
//!
//! Reads JSON-line state changes from stdin, prints the snapshot of each
//! affected plant as one JSON line on stdout, and saves the light history
//! when input ends or stdin/stdout fails.
//!
//! # Environment Variables
//! - `PLANTMON_CONFIG` (optional) – TOML config path (default: `plants.toml`)
//! - `PLANTMON_LOG_LEVEL` (optional) – debug/info/warn/error (default: `info`)
//! - `PLANTMON_LOG_FILE` (optional) – append logs here instead of stderr
//! - `DATABASE_URL` (optional) – store history in PostgreSQL instead of the
//!   configured JSON file

use std::env;
use std::error::Error;
use std::io;
use std::path::Path;

use chrono::Utc;

use plantmon_service::config::load_config;
use plantmon_service::history::{HistoryStore, JsonFileStore, PostgresStore};
use plantmon_service::logging::{self, Component, LogLevel};
use plantmon_service::monitor::PlantMonitor;
use plantmon_service::species::SpeciesIndex;

const DEFAULT_CONFIG: &str = "plants.toml";

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let level = env::var("PLANTMON_LOG_LEVEL")
        .ok()
        .and_then(|l| LogLevel::parse(&l))
        .unwrap_or(LogLevel::Info);
    let log_file = env::var("PLANTMON_LOG_FILE").ok();
    logging::init_logger(level, log_file.as_deref(), true)?;

    let config_path = env::var("PLANTMON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = load_config(Path::new(&config_path))?;
    config.log_config();

    let species = match &config.database {
        Some(path) => SpeciesIndex::load(path).unwrap_or_else(|e| {
            logging::log_species_failure("Load", &e);
            SpeciesIndex::empty()
        }),
        None => SpeciesIndex::empty(),
    };

    let (mut monitor, _errors) = PlantMonitor::from_config(&config, species);

    let mut store: Box<dyn HistoryStore> = match env::var("DATABASE_URL") {
        Ok(url) => Box::new(PostgresStore::connect(&url)?),
        Err(_) => Box::new(JsonFileStore::new(&config.history_file)),
    };
    let restored = monitor.restore_history(store.as_mut(), Utc::now());
    logging::info(
        Component::History,
        None,
        &format!("Restored light history for {}/{} plants", restored, monitor.registry().len()),
    );

    let streamed = monitor.run_events(io::stdin().lock(), io::stdout().lock(), Utc::now);

    let failures = monitor.persist_history(store.as_mut(), Utc::now());
    if failures.is_empty() {
        logging::info(Component::History, None, "Light history saved");
    }

    match streamed {
        Ok(written) => {
            logging::info(Component::System, None, &format!("Input ended after {} snapshots", written));
            Ok(())
        }
        Err(e) => {
            logging::error(Component::System, None, &format!("Event stream failed: {}", e));
            Err(e.into())
        }
    }
}
