//! Threshold resolution and out-of-range classification.
//!
//! Three layers feed the effective bounds of a reading: the built-in
//! default, the species database row and the user's override. Each bound is
//! resolved independently with override > database > default precedence.
//! Resolution is a pure function of those inputs, so it can be re-run at any
//! time (e.g. after a species database reload) without hidden state.

use crate::analysis::redundancy::EffectiveReading;
use crate::model::{ReadingState, ReadingType, ThresholdPair};
use crate::species::SpeciesRecord;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Merges explicit layers; `None` layers and `None` bounds fall through.
pub fn resolve_layers(
    default: ThresholdPair,
    database: Option<ThresholdPair>,
    user_override: Option<ThresholdPair>,
) -> ThresholdPair {
    let database = database.unwrap_or_default();
    let user_override = user_override.unwrap_or_default();
    ThresholdPair {
        min: user_override.min.or(database.min).or(default.min),
        max: user_override.max.or(database.max).or(default.max),
    }
}

/// Effective threshold for `reading` given the plant's species row (if the
/// pid matched) and its configured override.
pub fn resolve(
    reading: ReadingType,
    database_record: Option<&SpeciesRecord>,
    user_override: Option<&ThresholdPair>,
) -> ThresholdPair {
    resolve_layers(
        reading.default_threshold(),
        database_record.map(|record| record.threshold(reading)),
        user_override.copied(),
    )
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Compares a value against a threshold. Bounds are exclusive: a value equal
/// to `min` or `max` is in range.
pub fn classify_value(value: f64, threshold: &ThresholdPair) -> ReadingState {
    classify_with_reference(value, value, threshold)
}

/// Like `classify_value`, but checks the minimum against `min_reference`
/// instead of the current value. Used for light, whose minimum applies to
/// the recent maximum rather than to the instantaneous level.
pub fn classify_with_reference(value: f64, min_reference: f64, threshold: &ThresholdPair) -> ReadingState {
    if threshold.is_unbounded() {
        return ReadingState::Unbound;
    }
    if let Some(min) = threshold.min {
        if min_reference < min {
            return ReadingState::BelowMin;
        }
    }
    if let Some(max) = threshold.max {
        if value > max {
            return ReadingState::AboveMax;
        }
    }
    ReadingState::Ok
}

/// Classifies a fused reading. Anything not backed by a currently
/// available source is `Unavailable`, regardless of the last known value.
pub fn classify_reading(
    reading: &EffectiveReading,
    threshold: &ThresholdPair,
    min_reference: Option<f64>,
) -> ReadingState {
    match (reading.available, reading.value) {
        (true, Some(value)) => {
            classify_with_reference(value, min_reference.unwrap_or(value), threshold)
        }
        _ => ReadingState::Unavailable,
    }
}

/// Human-readable problem label, e.g. `"soil_moist low"`.
pub fn problem_text(reading: ReadingType, state: ReadingState) -> Option<String> {
    let suffix = match state {
        ReadingState::BelowMin => "low",
        ReadingState::AboveMax => "high",
        ReadingState::Unavailable => "unavailable",
        ReadingState::Ok | ReadingState::Unbound => return None,
    };
    Some(format!("{} {}", reading, suffix))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
