/// Threshold handling for plant readings.
///
/// Submodules:
/// - `thresholds`: layered threshold resolution and reading classification.

pub mod thresholds;
