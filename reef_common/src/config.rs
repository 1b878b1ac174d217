//! TOML configuration model with validation.
//!
//! One file configures a whole controller instance: gains, feed-forward,
//! performance scoring, adaptation, persistence, runtime pacing and fault
//! heuristics. Every field carries a serde default so a partial (or empty)
//! file yields the documented defaults; `validate()` enforces bounds after
//! parsing. String-based loading exists so tests can feed literals.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DEFAULT_STORE_PATH, DEFAULT_TICK_HZ, MAX_TICK_HZ, MAX_WINDOW_TICKS, OUTPUT_MAX, OUTPUT_MIN,
};
use crate::context::SeasonPreset;
use crate::params::{ControlParameters, GainBounds};

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    IoError(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("config validation: {0}")]
    ValidationError(String),
}

// ─── Sections ───────────────────────────────────────────────────────

/// `[controller]` — regulator core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Initial working gains.
    #[serde(default)]
    pub gains: ControlParameters,
    /// Absolute bounds applied to adapted/tuned gains.
    #[serde(default)]
    pub bounds: GainBounds,
    /// Initial true target [process units].
    #[serde(default = "default_target")]
    pub target: f64,
    /// Hard clamp on the integral accumulator magnitude.
    #[serde(default = "default_integral_max")]
    pub integral_max: f64,
    /// Derivative low-pass retention α ∈ [0,1]; 0 disables filtering.
    #[serde(default = "default_filter_alpha")]
    pub derivative_filter_alpha: f64,
    /// Setpoint ramp rate [units/s]; 0 disables ramping.
    #[serde(default = "default_ramp_rate")]
    pub ramp_rate: f64,
    /// Lower output rail [%].
    #[serde(default = "default_output_min")]
    pub output_min: f64,
    /// Upper output rail [%].
    #[serde(default = "default_output_max")]
    pub output_max: f64,
    /// Input above `target + margin` forces the output to its low rail;
    /// 0 disables the cutoff.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

fn default_target() -> f64 {
    25.0
}

fn default_integral_max() -> f64 {
    100.0
}

fn default_filter_alpha() -> f64 {
    0.7
}

fn default_ramp_rate() -> f64 {
    0.05
}

fn default_output_min() -> f64 {
    OUTPUT_MIN
}

fn default_output_max() -> f64 {
    OUTPUT_MAX
}

fn default_safety_margin() -> f64 {
    2.0
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            gains: ControlParameters::default(),
            bounds: GainBounds::default(),
            target: default_target(),
            integral_max: default_integral_max(),
            derivative_filter_alpha: default_filter_alpha(),
            ramp_rate: default_ramp_rate(),
            output_min: default_output_min(),
            output_max: default_output_max(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl ControllerSection {
    pub fn validate(&self) -> Result<(), String> {
        self.gains.validate()?;
        self.bounds.validate()?;
        if !self.target.is_finite() {
            return Err("controller.target must be finite".into());
        }
        if !(self.integral_max.is_finite() && self.integral_max > 0.0) {
            return Err(format!(
                "controller.integral_max must be positive, got {}",
                self.integral_max
            ));
        }
        if !(0.0..=1.0).contains(&self.derivative_filter_alpha) {
            return Err(format!(
                "controller.derivative_filter_alpha must be in [0,1], got {}",
                self.derivative_filter_alpha
            ));
        }
        if !self.ramp_rate.is_finite() || self.ramp_rate < 0.0 {
            return Err(format!(
                "controller.ramp_rate must be non-negative, got {}",
                self.ramp_rate
            ));
        }
        if !(OUTPUT_MIN..OUTPUT_MAX).contains(&self.output_min)
            || self.output_max > OUTPUT_MAX
            || self.output_min >= self.output_max
        {
            return Err(format!(
                "controller output range [{}, {}] must satisfy {} <= min < max <= {}",
                self.output_min, self.output_max, OUTPUT_MIN, OUTPUT_MAX
            ));
        }
        if !self.safety_margin.is_finite() || self.safety_margin < 0.0 {
            return Err(format!(
                "controller.safety_margin must be non-negative, got {}",
                self.safety_margin
            ));
        }
        Ok(())
    }
}

/// `[feedforward]` — disturbance anticipation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Influence of the dissolved-solids trend, ∈ [-1,1]; 0 disables.
    #[serde(default = "default_tds_influence")]
    pub dissolved_solids_influence: f64,
    /// Influence of the ambient differential, ∈ [-1,1]; 0 disables.
    #[serde(default = "default_ambient_influence")]
    pub ambient_influence: f64,
    /// Influence of the chemistry level, ∈ [-1,1]; 0 disables.
    #[serde(default = "default_chemistry_influence")]
    pub chemistry_influence: f64,
    /// Dissolved-solids normalization baseline [ppm].
    #[serde(default = "default_tds_baseline")]
    pub dissolved_solids_baseline: f64,
    /// Dissolved-solids normalization scale [ppm per unit].
    #[serde(default = "default_tds_scale")]
    pub dissolved_solids_scale: f64,
    /// Chemistry normalization baseline (e.g. pH).
    #[serde(default = "default_chemistry_baseline")]
    pub chemistry_baseline: f64,
    /// Chemistry normalization scale.
    #[serde(default = "default_chemistry_scale")]
    pub chemistry_scale: f64,
}

fn default_true() -> bool {
    true
}

fn default_tds_influence() -> f64 {
    0.1
}

fn default_ambient_influence() -> f64 {
    0.3
}

fn default_chemistry_influence() -> f64 {
    0.2
}

fn default_tds_baseline() -> f64 {
    250.0
}

fn default_tds_scale() -> f64 {
    100.0
}

fn default_chemistry_baseline() -> f64 {
    7.0
}

fn default_chemistry_scale() -> f64 {
    1.0
}

impl Default for FeedForwardSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dissolved_solids_influence: default_tds_influence(),
            ambient_influence: default_ambient_influence(),
            chemistry_influence: default_chemistry_influence(),
            dissolved_solids_baseline: default_tds_baseline(),
            dissolved_solids_scale: default_tds_scale(),
            chemistry_baseline: default_chemistry_baseline(),
            chemistry_scale: default_chemistry_scale(),
        }
    }
}

impl FeedForwardSection {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("dissolved_solids_influence", self.dissolved_solids_influence),
            ("ambient_influence", self.ambient_influence),
            ("chemistry_influence", self.chemistry_influence),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(format!("feedforward.{name} must be in [-1,1], got {value}"));
            }
        }
        for (name, value) in [
            ("dissolved_solids_scale", self.dissolved_solids_scale),
            ("chemistry_scale", self.chemistry_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("feedforward.{name} must be positive, got {value}"));
            }
        }
        if !self.dissolved_solids_baseline.is_finite() || !self.chemistry_baseline.is_finite() {
            return Err("feedforward baselines must be finite".into());
        }
        Ok(())
    }
}

/// `[monitor]` — performance window and composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Window duration [s].
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Score weight of normalized settling time.
    #[serde(default = "default_w_settling")]
    pub w_settling: f64,
    /// Score weight of normalized overshoot.
    #[serde(default = "default_w_overshoot")]
    pub w_overshoot: f64,
    /// Score weight of normalized steady-state error.
    #[serde(default = "default_w_sse")]
    pub w_sse: f64,
    /// Score weight of normalized output variance.
    #[serde(default = "default_w_variance")]
    pub w_variance: f64,
    /// Settling time that saturates its penalty [s].
    #[serde(default = "default_norm_settling")]
    pub norm_settling_secs: f64,
    /// Overshoot percent that saturates its penalty.
    #[serde(default = "default_norm_overshoot")]
    pub norm_overshoot_pct: f64,
    /// Multiplier mapping |steady-state error| to a full penalty at 1/scale.
    #[serde(default = "default_norm_sse")]
    pub norm_sse_scale: f64,
    /// Output variance that saturates its penalty.
    #[serde(default = "default_norm_variance")]
    pub norm_variance: f64,
    /// Bounded sample-history capacity on the adaptation side.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_window_secs() -> u64 {
    600
}

fn default_w_settling() -> f64 {
    0.3
}

fn default_w_overshoot() -> f64 {
    0.3
}

fn default_w_sse() -> f64 {
    0.2
}

fn default_w_variance() -> f64 {
    0.2
}

fn default_norm_settling() -> f64 {
    300.0
}

fn default_norm_overshoot() -> f64 {
    10.0
}

fn default_norm_sse() -> f64 {
    20.0
}

fn default_norm_variance() -> f64 {
    5.0
}

fn default_history_capacity() -> usize {
    256
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            w_settling: default_w_settling(),
            w_overshoot: default_w_overshoot(),
            w_sse: default_w_sse(),
            w_variance: default_w_variance(),
            norm_settling_secs: default_norm_settling(),
            norm_overshoot_pct: default_norm_overshoot(),
            norm_sse_scale: default_norm_sse(),
            norm_variance: default_norm_variance(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl MonitorSection {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_secs == 0 {
            return Err("monitor.window_secs must be positive".into());
        }
        let weights = [
            ("w_settling", self.w_settling),
            ("w_overshoot", self.w_overshoot),
            ("w_sse", self.w_sse),
            ("w_variance", self.w_variance),
        ];
        let mut sum = 0.0;
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("monitor.{name} must be non-negative, got {w}"));
            }
            sum += w;
        }
        if sum <= 0.0 {
            return Err("monitor score weights must not all be zero".into());
        }
        for (name, value) in [
            ("norm_settling_secs", self.norm_settling_secs),
            ("norm_overshoot_pct", self.norm_overshoot_pct),
            ("norm_sse_scale", self.norm_sse_scale),
            ("norm_variance", self.norm_variance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("monitor.{name} must be positive, got {value}"));
            }
        }
        if self.history_capacity == 0 {
            return Err("monitor.history_capacity must be positive".into());
        }
        Ok(())
    }
}

/// `[context]` — discretization of environmental features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    /// Hemisphere preset for season derivation.
    #[serde(default)]
    pub season_preset: SeasonPreset,
    /// Ambient band width [units] for key discretization.
    #[serde(default = "default_band_width")]
    pub ambient_band_width: f64,
    /// Hours per hour-of-day block, 1..=24.
    #[serde(default = "default_block_hours")]
    pub hour_block_hours: u8,
}

fn default_band_width() -> f64 {
    2.0
}

fn default_block_hours() -> u8 {
    6
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            season_preset: SeasonPreset::default(),
            ambient_band_width: default_band_width(),
            hour_block_hours: default_block_hours(),
        }
    }
}

impl ContextSection {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.ambient_band_width.is_finite() && self.ambient_band_width > 0.0) {
            return Err(format!(
                "context.ambient_band_width must be positive, got {}",
                self.ambient_band_width
            ));
        }
        if !(1..=24).contains(&self.hour_block_hours) {
            return Err(format!(
                "context.hour_block_hours must be in 1..=24, got {}",
                self.hour_block_hours
            ));
        }
        Ok(())
    }
}

/// `[adaptation]` — learning and blending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Adapter cadence [s].
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,
    /// Maximum fractional trust in learned gains at confidence 1.
    #[serde(default = "default_blend_cap")]
    pub blend_cap: f64,
    /// Confidence below which the adapter falls back to current gains.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// EMA weight toward a better-scoring candidate.
    #[serde(default = "default_better_weight")]
    pub better_weight: f64,
    /// EMA weight toward a worse-scoring candidate.
    #[serde(default = "default_worse_weight")]
    pub worse_weight: f64,
    /// Samples required before confidence may exceed 0.5.
    #[serde(default = "default_min_trust_samples")]
    pub min_trust_samples: u32,
    /// Upper bound on any entry's confidence.
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,
    /// Entries unrefreshed this long are decayed [s].
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Confidence multiplier applied per staleness sweep.
    #[serde(default = "default_stale_decay")]
    pub stale_decay: f64,
    /// Adapter-cache validity window [s].
    #[serde(default = "default_cache_validity_secs")]
    pub cache_validity_secs: u64,
}

fn default_cadence_secs() -> u64 {
    60
}

fn default_blend_cap() -> f64 {
    0.7
}

fn default_min_confidence() -> f64 {
    0.25
}

fn default_better_weight() -> f64 {
    0.7
}

fn default_worse_weight() -> f64 {
    0.3
}

fn default_min_trust_samples() -> u32 {
    50
}

fn default_confidence_ceiling() -> f64 {
    0.9
}

fn default_stale_after_secs() -> u64 {
    7 * 24 * 3600
}

fn default_stale_decay() -> f64 {
    0.9
}

fn default_cache_validity_secs() -> u64 {
    300
}

impl Default for AdaptationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: default_cadence_secs(),
            blend_cap: default_blend_cap(),
            min_confidence: default_min_confidence(),
            better_weight: default_better_weight(),
            worse_weight: default_worse_weight(),
            min_trust_samples: default_min_trust_samples(),
            confidence_ceiling: default_confidence_ceiling(),
            stale_after_secs: default_stale_after_secs(),
            stale_decay: default_stale_decay(),
            cache_validity_secs: default_cache_validity_secs(),
        }
    }
}

impl AdaptationSection {
    pub fn validate(&self) -> Result<(), String> {
        if self.cadence_secs == 0 {
            return Err("adaptation.cadence_secs must be positive".into());
        }
        for (name, value) in [
            ("blend_cap", self.blend_cap),
            ("min_confidence", self.min_confidence),
            ("better_weight", self.better_weight),
            ("worse_weight", self.worse_weight),
            ("stale_decay", self.stale_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("adaptation.{name} must be in [0,1], got {value}"));
            }
        }
        if !(self.confidence_ceiling > 0.0 && self.confidence_ceiling <= 1.0) {
            return Err(format!(
                "adaptation.confidence_ceiling must be in (0,1], got {}",
                self.confidence_ceiling
            ));
        }
        if self.min_trust_samples == 0 {
            return Err("adaptation.min_trust_samples must be positive".into());
        }
        Ok(())
    }
}

/// `[persistence]` — file-backed gain store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Store root directory.
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Key namespace for this control loop (e.g. "thermal", "chem").
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Persist the table after every N accepted samples.
    #[serde(default = "default_flush_every")]
    pub flush_every_samples: u32,
}

fn default_store_path() -> String {
    DEFAULT_STORE_PATH.to_string()
}

fn default_namespace() -> String {
    "thermal".to_string()
}

fn default_flush_every() -> u32 {
    5
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_store_path(),
            namespace: default_namespace(),
            flush_every_samples: default_flush_every(),
        }
    }
}

impl PersistenceSection {
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.is_empty() {
            return Err("persistence.namespace must not be empty".into());
        }
        if self
            .namespace
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(format!(
                "persistence.namespace must be alphanumeric/_/-, got {:?}",
                self.namespace
            ));
        }
        if self.flush_every_samples == 0 {
            return Err("persistence.flush_every_samples must be positive".into());
        }
        Ok(())
    }
}

/// `[runtime]` — loop pacing and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Control tick rate [Hz].
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Bound of the sample channel toward the adaptation worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Tick-statistics log interval [s]; 0 disables.
    #[serde(default = "default_stats_log_secs")]
    pub stats_log_secs: u64,
    /// SCHED_FIFO priority for the control thread (rt builds).
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,
    /// CPU to pin the control thread to (rt builds); absent = no pinning.
    #[serde(default)]
    pub rt_cpu: Option<usize>,
}

fn default_tick_hz() -> u32 {
    DEFAULT_TICK_HZ
}

fn default_channel_capacity() -> usize {
    8
}

fn default_stats_log_secs() -> u64 {
    60
}

fn default_rt_priority() -> i32 {
    40
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            channel_capacity: default_channel_capacity(),
            stats_log_secs: default_stats_log_secs(),
            rt_priority: default_rt_priority(),
            rt_cpu: None,
        }
    }
}

impl RuntimeSection {
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_hz == 0 || self.tick_hz > MAX_TICK_HZ {
            return Err(format!(
                "runtime.tick_hz must be in 1..={MAX_TICK_HZ}, got {}",
                self.tick_hz
            ));
        }
        if self.channel_capacity == 0 {
            return Err("runtime.channel_capacity must be positive".into());
        }
        if !(1..=99).contains(&self.rt_priority) {
            return Err(format!(
                "runtime.rt_priority must be in 1..=99, got {}",
                self.rt_priority
            ));
        }
        Ok(())
    }
}

/// `[fault]` — Automatic→Fault heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultSection {
    /// Consecutive sensor faults that latch Fault mode.
    #[serde(default = "default_sensor_fault_limit")]
    pub sensor_fault_limit: u32,
    /// Error magnitude that counts as "large" while railed.
    #[serde(default = "default_rail_error_threshold")]
    pub rail_error_threshold: f64,
    /// Seconds of railed output with large error before Fault.
    #[serde(default = "default_rail_stuck_secs")]
    pub rail_stuck_secs: f64,
}

fn default_sensor_fault_limit() -> u32 {
    10
}

fn default_rail_error_threshold() -> f64 {
    5.0
}

fn default_rail_stuck_secs() -> f64 {
    120.0
}

impl Default for FaultSection {
    fn default() -> Self {
        Self {
            sensor_fault_limit: default_sensor_fault_limit(),
            rail_error_threshold: default_rail_error_threshold(),
            rail_stuck_secs: default_rail_stuck_secs(),
        }
    }
}

impl FaultSection {
    pub fn validate(&self) -> Result<(), String> {
        if self.sensor_fault_limit == 0 {
            return Err("fault.sensor_fault_limit must be positive".into());
        }
        if !(self.rail_error_threshold.is_finite() && self.rail_error_threshold > 0.0) {
            return Err(format!(
                "fault.rail_error_threshold must be positive, got {}",
                self.rail_error_threshold
            ));
        }
        if !(self.rail_stuck_secs.is_finite() && self.rail_stuck_secs > 0.0) {
            return Err(format!(
                "fault.rail_stuck_secs must be positive, got {}",
                self.rail_stuck_secs
            ));
        }
        Ok(())
    }
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub feedforward: FeedForwardSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub adaptation: AdaptationSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub fault: FaultSection,
}

impl ControlConfig {
    /// Run every section validation plus cross-section checks.
    pub fn validate(&self) -> Result<(), String> {
        self.controller.validate()?;
        self.feedforward.validate()?;
        self.monitor.validate()?;
        self.context.validate()?;
        self.adaptation.validate()?;
        self.persistence.validate()?;
        self.runtime.validate()?;
        self.fault.validate()?;

        // The perf window keeps a fixed-capacity tail ring; bound the
        // tick count a window can span.
        let window_ticks = self.monitor.window_secs.saturating_mul(self.runtime.tick_hz as u64);
        if window_ticks > MAX_WINDOW_TICKS {
            return Err(format!(
                "monitor.window_secs x runtime.tick_hz = {window_ticks} ticks exceeds \
                 the supported maximum of {MAX_WINDOW_TICKS}"
            ));
        }
        // Initial gains must not exceed the absolute maxima. The minima only
        // bind adapted gains: a configured zero gain is a disabled term.
        let g = &self.controller.gains;
        let b = &self.controller.bounds;
        if g.kp > b.kp_max || g.ki > b.ki_max || g.kd > b.kd_max {
            return Err(format!(
                "controller.gains {g:?} exceed controller.bounds maxima"
            ));
        }
        Ok(())
    }

    /// Seconds per control tick.
    #[inline]
    pub fn tick_period_s(&self) -> f64 {
        1.0 / self.runtime.tick_hz as f64
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Parse and validate a configuration from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<ControlConfig, ConfigError> {
    let config: ControlConfig =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate().map_err(ConfigError::ValidationError)?;
    Ok(config)
}

/// Load and validate a configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControlConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.runtime.tick_hz, DEFAULT_TICK_HZ);
        assert_eq!(config.monitor.window_secs, 600);
        assert_eq!(config.adaptation.blend_cap, 0.7);
        assert_eq!(config.controller.gains, ControlParameters::default());
    }

    #[test]
    fn load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[controller]\ntarget = 26.5\n\n[runtime]\ntick_hz = 20\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.controller.target, 26.5);
        assert_eq!(config.runtime.tick_hz, 20);
        // Sections the file omits still come up with defaults.
        assert_eq!(config.monitor.window_secs, 600);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let result = load_config(Path::new("/nonexistent/reef/controller.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn defaults_validate() {
        assert!(ControlConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_error_reported() {
        let result = load_config_from_str("[controller\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn window_tick_bound_enforced() {
        let toml_str = r#"
[monitor]
window_secs = 600

[runtime]
tick_hz = 1000
"#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn negative_gain_rejected_at_load() {
        let toml_str = r#"
[controller.gains]
kp = -1.0
"#;
        let result = load_config_from_str(toml_str);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        let toml_str = r#"
[controller]
derivative_filter_alpha = 1.5
"#;
        assert!(load_config_from_str(toml_str).is_err());
    }

    #[test]
    fn tick_period() {
        let mut config = ControlConfig::default();
        config.runtime.tick_hz = 10;
        assert!((config.tick_period_s() - 0.1).abs() < 1e-12);
    }
}
