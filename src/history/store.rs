//! History store backends.
//!
//! A store keeps, per plant key, the light samples still inside that plant's
//! rolling window. Saving replaces the plant's previous samples entirely.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};

use crate::analysis::brightness::HistoryPoint;
use crate::logging::{self, Component};
use crate::model::MonitorError;

pub trait HistoryStore {
    /// Samples for `plant_key` at or after `since`, oldest first. A plant
    /// with nothing stored yields an empty list.
    fn load(&mut self, plant_key: &str, since: DateTime<Utc>) -> Result<Vec<HistoryPoint>, MonitorError>;

    /// Replaces everything stored for `plant_key` with `points`.
    fn save(&mut self, plant_key: &str, points: &[HistoryPoint]) -> Result<(), MonitorError>;

    /// Every plant key with stored samples, sorted.
    fn plant_keys(&mut self) -> Result<Vec<String>, MonitorError>;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

type Document = BTreeMap<String, Vec<HistoryPoint>>;

/// All plants in one JSON object keyed by plant key. Writes go to a sibling
/// temporary file that is renamed over the original.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Document, MonitorError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(source) => {
                return Err(MonitorError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            MonitorError::Persistence(format!("{} is not a valid history file: {}", self.path.display(), e))
        })
    }

    fn write_document(&self, document: &Document) -> Result<(), MonitorError> {
        let text = serde_json::to_string_pretty(document)
            .map_err(|e| MonitorError::Persistence(format!("Failed to encode history: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, text).map_err(|source| MonitorError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| MonitorError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&mut self, plant_key: &str, since: DateTime<Utc>) -> Result<Vec<HistoryPoint>, MonitorError> {
        let mut document = self.read_document()?;
        let mut points = document.remove(plant_key).unwrap_or_default();
        points.retain(|p| p.timestamp >= since);
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    fn save(&mut self, plant_key: &str, points: &[HistoryPoint]) -> Result<(), MonitorError> {
        let mut document = self.read_document()?;
        document.insert(plant_key.to_string(), points.to_vec());
        self.write_document(&document)?;
        logging::debug(
            Component::History,
            Some(plant_key),
            &format!("Saved {} samples to {}", points.len(), self.path.display()),
        );
        Ok(())
    }

    fn plant_keys(&mut self) -> Result<Vec<String>, MonitorError> {
        Ok(self.read_document()?.into_keys().collect())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS plant_history (
        plant_key   TEXT             NOT NULL,
        recorded_at TIMESTAMPTZ      NOT NULL,
        value       DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (plant_key, recorded_at)
    )
";

/// One row per sample in the `plant_history` table.
pub struct PostgresStore {
    client: Client,
}

fn db_error(context: &str, e: postgres::Error) -> MonitorError {
    MonitorError::Persistence(format!("{}: {}", context, e))
}

impl PostgresStore {
    /// Connects and makes sure the history table exists.
    pub fn connect(database_url: &str) -> Result<Self, MonitorError> {
        let client = Client::connect(database_url, NoTls).map_err(|e| db_error("Failed to connect", e))?;
        Self::from_client(client)
    }

    pub fn from_client(mut client: Client) -> Result<Self, MonitorError> {
        client
            .batch_execute(CREATE_TABLE_SQL)
            .map_err(|e| db_error("Failed to create plant_history", e))?;
        Ok(Self { client })
    }
}

impl HistoryStore for PostgresStore {
    fn load(&mut self, plant_key: &str, since: DateTime<Utc>) -> Result<Vec<HistoryPoint>, MonitorError> {
        let rows = self
            .client
            .query(
                "SELECT recorded_at, value
                 FROM plant_history
                 WHERE plant_key = $1
                   AND recorded_at >= $2
                 ORDER BY recorded_at",
                &[&plant_key, &since],
            )
            .map_err(|e| db_error("Failed to load history", e))?;

        Ok(rows
            .iter()
            .map(|row| HistoryPoint {
                timestamp: row.get::<_, DateTime<Utc>>(0),
                value: row.get(1),
            })
            .collect())
    }

    fn save(&mut self, plant_key: &str, points: &[HistoryPoint]) -> Result<(), MonitorError> {
        let mut tx = self
            .client
            .transaction()
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        tx.execute("DELETE FROM plant_history WHERE plant_key = $1", &[&plant_key])
            .map_err(|e| db_error("Failed to clear history", e))?;
        for point in points {
            tx.execute(
                "INSERT INTO plant_history (plant_key, recorded_at, value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (plant_key, recorded_at) DO UPDATE SET value = EXCLUDED.value",
                &[&plant_key, &point.timestamp, &point.value],
            )
            .map_err(|e| db_error("Failed to insert history", e))?;
        }

        tx.commit().map_err(|e| db_error("Failed to commit history", e))?;
        logging::debug(
            Component::History,
            Some(plant_key),
            &format!("Saved {} samples to plant_history", points.len()),
        );
        Ok(())
    }

    fn plant_keys(&mut self) -> Result<Vec<String>, MonitorError> {
        let rows = self
            .client
            .query("SELECT DISTINCT plant_key FROM plant_history ORDER BY plant_key", &[])
            .map_err(|e| db_error("Failed to list plants", e))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
