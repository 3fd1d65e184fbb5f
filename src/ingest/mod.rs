/// Decoding of host sensor events.
///
/// Submodules:
/// - `events`: JSON-line state changes into `SensorUpdate` values.

pub mod events;
