/// Species database for the plant monitoring service.
///
/// Loads the delimited plant table (one row per species) into an in-memory
/// index keyed by normalized `pid`. The index is immutable once built; a
/// reload builds a fresh index and swaps it into the `SpeciesCatalog` in one
/// step, so lookups never observe a half-populated table.
///
/// Table layout is header-driven: the first column is the species id,
/// `min_<reading>` / `max_<reading>` columns are thresholds, `image` is the
/// remote picture URL and every other column is kept as a free-form
/// attribute. Blank cells mean "no bound", never zero.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::logging::{self, Component};
use crate::model::{MonitorError, ReadingType, ThresholdPair};

const COLUMN_IMAGE: &str = "image";
const PREFIX_MIN: &str = "min_";
const PREFIX_MAX: &str = "max_";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One species row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRecord {
    /// The id exactly as written in the table.
    pub pid: String,
    pub thresholds: BTreeMap<ReadingType, ThresholdPair>,
    /// Remote image URL, if the table has one.
    pub image: Option<String>,
    /// Descriptive columns (alias, origin, sunlight, ...), blanks omitted.
    pub attributes: BTreeMap<String, String>,
}

impl SpeciesRecord {
    /// Database layer for `reading`; unbounded when the table has no columns
    /// or blank cells for it.
    pub fn threshold(&self, reading: ReadingType) -> ThresholdPair {
        self.thresholds.get(&reading).copied().unwrap_or_default()
    }
}

/// Normalizes a species id for lookup: lowercase, punctuation and
/// whitespace ignored (`"Ficus-Lyrata"` == `"ficus lyrata"`).
pub fn normalize_pid(pid: &str) -> String {
    pid.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SpeciesIndex {
    records: HashMap<String, SpeciesRecord>,
}

/// What a header column feeds into.
enum Column {
    Pid,
    Min(ReadingType),
    Max(ReadingType),
    Image,
    Attribute(String),
}

fn classify_column(position: usize, name: &str) -> Column {
    let name = name.trim().to_ascii_lowercase();
    if position == 0 {
        return Column::Pid;
    }
    if name == COLUMN_IMAGE {
        return Column::Image;
    }
    if let Some(reading) = name.strip_prefix(PREFIX_MIN).and_then(ReadingType::from_keyword) {
        return Column::Min(reading);
    }
    if let Some(reading) = name.strip_prefix(PREFIX_MAX).and_then(ReadingType::from_keyword) {
        return Column::Max(reading);
    }
    Column::Attribute(name)
}

/// Splits one line of the table, honouring double quotes and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parses a numeric bound; blank, `null` and malformed cells are "no bound".
fn parse_bound(cell: &str) -> Result<Option<f64>, String> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("'{}' is not a number", cell))
}

impl SpeciesIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds an index from the table text.
    ///
    /// Fails only when the header row is missing; malformed cells degrade to
    /// "no bound" and rows without an id are skipped.
    pub fn parse(text: &str) -> Result<Self, MonitorError> {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| MonitorError::Database("missing header row".to_string()))?;
        let header = header.trim_start_matches('\u{feff}');
        let columns: Vec<Column> = split_record(header)
            .iter()
            .enumerate()
            .map(|(i, name)| classify_column(i, name))
            .collect();

        let mut records = HashMap::new();
        for line in lines {
            let cells = split_record(line);
            let Some(record) = Self::parse_row(&columns, &cells) else {
                continue;
            };
            let key = normalize_pid(&record.pid);
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = records.insert(key, record) {
                logging::debug(
                    Component::Species,
                    None,
                    &format!("Duplicate species '{}', keeping the later row", previous.pid),
                );
            }
        }

        Ok(Self { records })
    }

    fn parse_row(columns: &[Column], cells: &[String]) -> Option<SpeciesRecord> {
        let pid = cells.first().map(|c| c.trim().to_string())?;
        if pid.is_empty() {
            return None;
        }

        let mut record = SpeciesRecord {
            pid,
            thresholds: BTreeMap::new(),
            image: None,
            attributes: BTreeMap::new(),
        };

        for (column, cell) in columns.iter().zip(cells.iter()).skip(1) {
            let value = cell.trim();
            match column {
                Column::Pid => {}
                Column::Image => {
                    if !value.is_empty() {
                        record.image = Some(value.to_string());
                    }
                }
                Column::Min(reading) | Column::Max(reading) => {
                    let bound = match parse_bound(value) {
                        Ok(bound) => bound,
                        Err(reason) => {
                            logging::warn(
                                Component::Species,
                                None,
                                &format!("{} {}: {}, treating as no bound", record.pid, reading, reason),
                            );
                            None
                        }
                    };
                    let pair = record.thresholds.entry(*reading).or_default();
                    if matches!(column, Column::Min(_)) {
                        pair.min = bound;
                    } else {
                        pair.max = bound;
                    }
                }
                Column::Attribute(name) => {
                    if !value.is_empty() {
                        record.attributes.insert(name.clone(), value.to_string());
                    }
                }
            }
        }

        Some(record)
    }

    /// Reads and indexes the table at `path`.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::parse(&text)?;
        logging::info(
            Component::Species,
            None,
            &format!("Loaded {} species from {}", index.len(), path.display()),
        );
        Ok(index)
    }

    /// Looks up a species by id. A miss is not an error: the plant simply
    /// falls back to defaults.
    pub fn get(&self, pid: &str) -> Option<&SpeciesRecord> {
        self.records.get(&normalize_pid(pid))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Catalog (atomic reload)
// ---------------------------------------------------------------------------

/// Holder of the current species index. Readers take an `Arc` snapshot;
/// `replace` swaps in a fully built index.
#[derive(Debug, Default)]
pub struct SpeciesCatalog {
    current: RwLock<Arc<SpeciesIndex>>,
}

impl SpeciesCatalog {
    pub fn new(index: SpeciesIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn current(&self) -> Arc<SpeciesIndex> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Installs `index` and returns the one it replaced.
    pub fn replace(&self, index: SpeciesIndex) -> Arc<SpeciesIndex> {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Global image settings from the configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSettings {
    pub images_dir: Option<PathBuf>,
    pub disable_remote_images: bool,
}

/// Picks the picture shown for a plant.
///
/// With remote images disabled the local `<images_dir>/<pid>.jpg` is used
/// (or nothing without a directory or pid); otherwise the database URL is
/// passed through unchanged.
///
/// A configured `images_dir` is ignored while remote images are enabled, so
/// the local file never shadows the database URL.
pub fn resolve_image(settings: &ImageSettings, pid: Option<&str>, remote: Option<&str>) -> Option<String> {
    if settings.disable_remote_images {
        let dir = settings.images_dir.as_ref()?;
        let pid = pid?;
        return Some(dir.join(format!("{}.jpg", pid)).to_string_lossy().into_owned());
    }
    remote.map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
