//! Sensor naming convention matcher.
//!
//! Discovered sensors are associated with plants purely by name:
//!
//! ```text
//! [sensor.]<prefix>_<plant_key>_<reading_keyword>[_<index>]
//! ```
//!
//! e.g. `sensor.plant_monstera_deliciosa_soil_moist_2`. Matching is
//! case-insensitive, pure and deterministic. Plant keys may themselves
//! contain underscores, so the reading keyword is found by trying the
//! longest known keyword first.

use std::sync::OnceLock;

use crate::model::ReadingType;

/// Host domain that sensor entity ids may carry.
pub const SENSOR_DOMAIN: &str = "sensor.";

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// A successfully decomposed sensor identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorName {
    pub plant_key: String,
    pub reading: ReadingType,
    /// Redundancy index from a trailing `_<n>` suffix.
    pub index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched(SensorName),
    NoMatch,
}

impl MatchResult {
    pub fn matched(self) -> Option<SensorName> {
        match self {
            MatchResult::Matched(name) => Some(name),
            MatchResult::NoMatch => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Normalizes a configured plant name or prefix into the form used inside
/// entity ids: lowercase ASCII alphanumerics separated by single `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Every keyword and synonym, longest first so that `soil_moist` wins over
/// `moist`. Ties are broken alphabetically to keep the order fixed.
fn keyword_table() -> &'static [(&'static str, ReadingType)] {
    static TABLE: OnceLock<Vec<(&'static str, ReadingType)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: Vec<(&'static str, ReadingType)> = ReadingType::ALL
            .into_iter()
            .flat_map(|rt| {
                std::iter::once(rt.keyword())
                    .chain(rt.synonyms().iter().copied())
                    .map(move |kw| (kw, rt))
            })
            .collect();
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        table
    })
}

/// Splits a trailing `_<digits>` redundancy suffix off `body`.
fn split_index(body: &str) -> (&str, Option<u32>) {
    if let Some((head, tail)) = body.rsplit_once('_') {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = tail.parse::<u32>() {
                return (head, Some(index));
            }
        }
    }
    (body, None)
}

/// Attempts to decompose `identifier` using the discovery `prefix`.
///
/// Returns `NoMatch` when the prefix is empty or absent from the identifier,
/// when no reading keyword terminates the name, or when the plant key would
/// be empty.
pub fn match_sensor(identifier: &str, prefix: &str) -> MatchResult {
    let prefix = slugify(prefix);
    if prefix.is_empty() {
        return MatchResult::NoMatch;
    }

    let id = identifier.trim().to_ascii_lowercase();
    let id = id.strip_prefix(SENSOR_DOMAIN).unwrap_or(&id);

    let Some(rest) = id
        .strip_prefix(prefix.as_str())
        .and_then(|r| r.strip_prefix('_'))
    else {
        return MatchResult::NoMatch;
    };

    let (body, index) = split_index(rest);

    for (keyword, reading) in keyword_table() {
        let Some(head) = body.strip_suffix(keyword) else {
            continue;
        };
        let Some(plant_key) = head.strip_suffix('_') else {
            continue;
        };
        let plant_key = plant_key.trim_matches('_');
        if plant_key.is_empty() {
            continue;
        }
        return MatchResult::Matched(SensorName {
            plant_key: plant_key.to_string(),
            reading: *reading,
            index,
        });
    }

    MatchResult::NoMatch
}

/// Builds the canonical entity id for a sensor, the inverse of
/// `match_sensor`.
pub fn sensor_id(prefix: &str, plant_key: &str, reading: ReadingType, index: Option<u32>) -> String {
    let mut id = format!("{}{}_{}_{}", SENSOR_DOMAIN, slugify(prefix), plant_key, reading.keyword());
    if let Some(index) = index {
        id.push('_');
        id.push_str(&index.to_string());
    }
    id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
