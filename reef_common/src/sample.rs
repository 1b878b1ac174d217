//! Per-window performance sample.

use serde::{Deserialize, Serialize};

use crate::context::{ContextFeatures, ContextKey};
use crate::params::ControlParameters;

/// Immutable result of one closed performance window.
///
/// Produced by the control context, consumed by the adaptation worker
/// (lookup-table upsert, history, export). A window that recorded zero
/// ticks produces no sample at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Wall-clock time the window closed [Unix seconds].
    pub timestamp_s: u64,
    /// Context features captured at window close.
    pub context: ContextFeatures,
    /// Gains that were active while the window accumulated.
    pub gains: ControlParameters,
    /// Seconds from window start until the error entered the settled band
    /// for good; equals the window duration when it never converged.
    pub settling_time_s: f64,
    /// Peak excursion past the target in the approach direction, as percent
    /// of target magnitude.
    pub max_overshoot_pct: f64,
    /// Mean error over the final 10% of the window.
    pub steady_state_error: f64,
    /// Population variance of the output command over the window.
    pub output_variance: f64,
    /// Composite fitness score ∈ [0,100].
    pub score: f64,
    /// Ticks recorded in the window.
    pub ticks: u32,
}

impl PerformanceSample {
    /// Discretize this sample's context into a lookup key.
    #[inline]
    pub fn context_key(&self, band_width: f64, block_hours: u8) -> ContextKey {
        ContextKey::from_features(&self.context, band_width, block_hours)
    }

    /// Returns true if every metric is finite (checked before the sample
    /// may touch the lookup table).
    pub fn is_finite(&self) -> bool {
        self.gains.is_finite()
            && self.settling_time_s.is_finite()
            && self.max_overshoot_pct.is_finite()
            && self.steady_state_error.is_finite()
            && self.output_variance.is_finite()
            && self.score.is_finite()
    }
}
