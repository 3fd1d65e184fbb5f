/// Host Sensor Event Decoding
///
/// The host platform reports sensor state changes as one JSON object per
/// line:
///
/// ```text
/// {"entity_id": "sensor.plant_monstera_soil_moist", "state": "34.5",
///  "unit": "%", "last_updated": "2024-05-01T12:00:00Z"}
/// ```
///
/// `state` is normally a string. A numeric string is a fresh value,
/// `unavailable` means the sensor went offline, and `unknown` or an empty
/// string carries no information and is skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::MonitorError;

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

// ============================================================================
// Wire structures
// ============================================================================

/// One event line as sent by the host.
#[derive(Debug, Deserialize)]
pub struct RawSensorEvent {
    pub entity_id: String,
    /// String in practice; bare JSON numbers are accepted too.
    pub state: serde_json::Value,
    #[serde(default, alias = "unit_of_measurement")]
    pub unit: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Decoded state of a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorState {
    Value(f64),
    Unavailable,
}

/// A state change ready to be applied to the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorUpdate {
    pub entity_id: String,
    pub state: SensorState,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SensorUpdate {
    pub fn value(entity_id: &str, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: SensorState::Value(value),
            unit: None,
            timestamp,
        }
    }

    pub fn unavailable(entity_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: SensorState::Unavailable,
            unit: None,
            timestamp,
        }
    }

    /// The new numeric value, if the state carried one.
    pub fn reading(&self) -> Option<f64> {
        match self.state {
            SensorState::Value(v) => Some(v),
            SensorState::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, SensorState::Value(_))
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a host state string. `None` means the state says nothing and the
/// event should be dropped (unknown, empty or non-numeric).
pub fn parse_state(state: &str) -> Option<SensorState> {
    let state = state.trim();
    if state.eq_ignore_ascii_case(STATE_UNAVAILABLE) {
        return Some(SensorState::Unavailable);
    }
    if state.is_empty() || state.eq_ignore_ascii_case(STATE_UNKNOWN) {
        return None;
    }
    state
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(SensorState::Value)
}

/// Decodes one event line. Returns `Ok(None)` for blank lines and states
/// that carry no information. Events without a parseable `last_updated`
/// are stamped with `now`.
pub fn parse_event_line(line: &str, now: DateTime<Utc>) -> Result<Option<SensorUpdate>, MonitorError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let raw: RawSensorEvent = serde_json::from_str(line).map_err(|e| MonitorError::Event(e.to_string()))?;
    let entity_id = raw.entity_id.trim().to_ascii_lowercase();
    if entity_id.is_empty() {
        return Err(MonitorError::Event("empty entity_id".to_string()));
    }

    let state = match &raw.state {
        serde_json::Value::String(s) => parse_state(s),
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(SensorState::Value),
        serde_json::Value::Null => None,
        other => return Err(MonitorError::Event(format!("unsupported state {}", other))),
    };
    let Some(state) = state else {
        return Ok(None);
    };

    let timestamp = raw
        .last_updated
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now);

    Ok(Some(SensorUpdate {
        entity_id,
        state,
        unit: raw.unit.filter(|u| !u.trim().is_empty()),
        timestamp,
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_state_numeric() {
        assert_eq!(parse_state("34.5"), Some(SensorState::Value(34.5)));
        assert_eq!(parse_state(" 0 "), Some(SensorState::Value(0.0)));
        assert_eq!(parse_state("-4"), Some(SensorState::Value(-4.0)));
    }

    #[test]
    fn test_parse_state_unavailable_and_unknown() {
        assert_eq!(parse_state("unavailable"), Some(SensorState::Unavailable));
        assert_eq!(parse_state("Unavailable"), Some(SensorState::Unavailable));
        assert_eq!(parse_state("unknown"), None);
        assert_eq!(parse_state(""), None);
    }

    #[test]
    fn test_parse_state_rejects_non_numeric_and_nan() {
        assert_eq!(parse_state("on"), None);
        assert_eq!(parse_state("NaN"), None);
        assert_eq!(parse_state("inf"), None);
    }

    #[test]
    fn test_event_line_with_all_fields() {
        let line = r#"{"entity_id": "Sensor.Plant_Monstera_Temp", "state": "21.5", "unit": "°C", "last_updated": "2024-05-01T10:30:00+00:00"}"#;
        let update = parse_event_line(line, now()).unwrap().unwrap();
        assert_eq!(update.entity_id, "sensor.plant_monstera_temp");
        assert_eq!(update.state, SensorState::Value(21.5));
        assert_eq!(update.unit.as_deref(), Some("°C"));
        assert_eq!(update.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_event_line_defaults_timestamp_to_now() {
        let update = parse_event_line(r#"{"entity_id": "sensor.x_temp", "state": 20}"#, now())
            .unwrap()
            .unwrap();
        assert_eq!(update.timestamp, now());
        assert_eq!(update.reading(), Some(20.0));
        assert!(update.is_available());
    }

    #[test]
    fn test_event_line_unavailable_has_no_value() {
        let update = parse_event_line(r#"{"entity_id": "sensor.x_temp", "state": "unavailable"}"#, now())
            .unwrap()
            .unwrap();
        assert_eq!(update.reading(), None);
        assert!(!update.is_available());
    }

    #[test]
    fn test_event_line_unknown_state_is_skipped() {
        assert_eq!(
            parse_event_line(r#"{"entity_id": "sensor.x_temp", "state": "unknown"}"#, now()).unwrap(),
            None
        );
        assert_eq!(parse_event_line("   ", now()).unwrap(), None);
    }

    #[test]
    fn test_event_line_malformed_is_error() {
        assert!(matches!(parse_event_line("{oops", now()), Err(MonitorError::Event(_))));
        assert!(matches!(
            parse_event_line(r#"{"state": "1"}"#, now()),
            Err(MonitorError::Event(_))
        ));
        assert!(matches!(
            parse_event_line(r#"{"entity_id": "sensor.x", "state": [1]}"#, now()),
            Err(MonitorError::Event(_))
        ));
    }
}
