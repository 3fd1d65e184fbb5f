/// Rolling maximum of light intensity.
///
/// A plant's light minimum is judged against the brightest value seen over
/// the last `check_days`, not the instantaneous level (which is zero every
/// night). The samples are persisted through a `HistoryStore` so a restart
/// does not reset the maximum and flag every plant as too dark.
///
/// # Clock injection
/// All queries accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, keeping window arithmetic deterministic in tests.
///
/// The window is a rolling `24h * check_days` duration, not calendar-day
/// aligned. Expired samples are dropped lazily when the maximum is read.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One persisted light sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessHistory {
    check_days: u32,
    // keyed by timestamp; equal timestamps keep the larger value
    samples: BTreeMap<DateTime<Utc>, f64>,
}

impl BrightnessHistory {
    pub fn new(check_days: u32) -> Self {
        Self {
            check_days,
            samples: BTreeMap::new(),
        }
    }

    pub fn check_days(&self) -> u32 {
        self.check_days
    }

    /// Oldest timestamp still inside the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.check_days))
    }

    /// Adds a sample. Non-finite values are ignored; samples may arrive out
    /// of order.
    pub fn record(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if !value.is_finite() {
            return;
        }
        self.samples
            .entry(timestamp)
            .and_modify(|v| *v = v.max(value))
            .or_insert(value);
    }

    /// Maximum over samples with `timestamp >= now - check_days`, pruning
    /// anything older.
    pub fn current_max(&mut self, now: DateTime<Utc>) -> Option<f64> {
        let start = self.window_start(now);
        self.samples = self.samples.split_off(&start);
        self.samples.values().copied().reduce(f64::max)
    }

    /// Merges previously persisted points.
    pub fn restore<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = HistoryPoint>,
    {
        for point in points {
            self.record(point.value, point.timestamp);
        }
    }

    /// Points still inside the window at `now`, oldest first, for persisting.
    pub fn points(&self, now: DateTime<Utc>) -> Vec<HistoryPoint> {
        self.samples
            .range(self.window_start(now)..)
            .map(|(timestamp, value)| HistoryPoint {
                timestamp: *timestamp,
                value: *value,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
