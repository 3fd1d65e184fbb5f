//! Houseplant monitoring engine.
//!
//! Sensor readings arrive from a home-automation host, are fused per plant
//! and reading, and are compared against thresholds layered from built-in
//! defaults, a species database and user overrides. The light minimum is
//! judged against a rolling maximum that survives restarts.
//!
//! `monitor::PlantMonitor` is the entry point; the other modules can be used
//! on their own.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod discovery;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod naming;
pub mod plant;
pub mod species;

pub use model::{MonitorError, PlantHealth, ReadingState, ReadingType, ThresholdPair};
pub use monitor::PlantMonitor;
