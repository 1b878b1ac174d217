//! System-wide constants for the reefctl workspace.
//!
//! Single source of truth for all numeric limits and default paths.
//! Imported by all crates — no duplication permitted.

/// Lower bound of the actuator duty-cycle command [%].
pub const OUTPUT_MIN: f64 = 0.0;

/// Upper bound of the actuator duty-cycle command [%].
pub const OUTPUT_MAX: f64 = 100.0;

/// Default control tick rate [Hz].
pub const DEFAULT_TICK_HZ: u32 = 10;

/// Maximum supported control tick rate [Hz].
pub const MAX_TICK_HZ: u32 = 1000;

/// Capacity of the steady-state tail ring inside a performance window.
///
/// The window keeps only the final 10% of samples for the steady-state
/// error mean, so the longest admissible window is `PERF_TAIL_CAPACITY * 10`
/// ticks. Config validation enforces this bound.
pub const PERF_TAIL_CAPACITY: usize = 1024;

/// Maximum number of ticks a single performance window may span.
pub const MAX_WINDOW_TICKS: u64 = (PERF_TAIL_CAPACITY as u64) * 10;

/// Settled band around the target, as a fraction of target magnitude.
pub const SETTLED_BAND_FRACTION: f64 = 0.02;

/// Offset in the lookup confidence law `count / (count + offset)`.
///
/// Chosen so the very first sample of a context lands at exactly 0.1.
pub const CONFIDENCE_COUNT_OFFSET: u32 = 9;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/reef/controller.toml";

/// Default persistence directory for the file-backed gain store.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/reef/gains";
