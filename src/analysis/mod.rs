/// Reading fusion utilities for the plant monitoring service.
///
/// Submodules:
/// - `redundancy`: fuses several sensors reporting the same quantity.
/// - `brightness`: rolling maximum of light intensity over `check_days`.

pub mod brightness;
pub mod redundancy;
