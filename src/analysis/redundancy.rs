//! Redundant sensor fusion.
//!
//! A plant may have several sensors reporting the same quantity (two soil
//! probes in one pot, a second temperature node as a fallback). The
//! aggregator keeps them in discovery order and picks the first one that is
//! currently available. There is no averaging: the chosen value is always a
//! value some sensor actually reported.

use serde::Serialize;

/// One sensor entity backing a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSource {
    pub identifier: String,
    /// Last numeric value ever reported; survives unavailability.
    pub value: Option<f64>,
    pub available: bool,
}

impl SensorSource {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            value: None,
            available: false,
        }
    }
}

/// The fused (value, availability) pair for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveReading {
    pub value: Option<f64>,
    pub available: bool,
}

/// Ordered set of sources for one (plant, reading) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedundantReadingAggregator {
    sources: Vec<SensorSource>,
}

impl RedundantReadingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source. Returns `false` (and changes nothing) if it is
    /// already present.
    pub fn add_source(&mut self, identifier: &str) -> bool {
        if self.contains(identifier) {
            return false;
        }
        self.sources.push(SensorSource::new(identifier));
        true
    }

    /// Records a state change for `identifier`.
    ///
    /// `value` is the new numeric reading, if the state carried one. A source
    /// only counts as available while it has a value. Returns `false` for
    /// unknown identifiers.
    pub fn update(&mut self, identifier: &str, value: Option<f64>, available: bool) -> bool {
        let Some(source) = self.sources.iter_mut().find(|s| s.identifier == identifier) else {
            return false;
        };
        if value.is_some() {
            source.value = value;
        }
        source.available = available && source.value.is_some();
        true
    }

    /// First available source in discovery order wins. With none available,
    /// the first-discovered source's last value is returned as stale.
    pub fn effective(&self) -> EffectiveReading {
        if let Some(source) = self.sources.iter().find(|s| s.available) {
            return EffectiveReading {
                value: source.value,
                available: true,
            };
        }
        EffectiveReading {
            value: self.sources.first().and_then(|s| s.value),
            available: false,
        }
    }

    /// Drops a source. Returns `false` if it was not present.
    pub fn remove_source(&mut self, identifier: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.identifier != identifier);
        self.sources.len() != before
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.sources.iter().any(|s| s.identifier == identifier)
    }

    pub fn sources(&self) -> &[SensorSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
