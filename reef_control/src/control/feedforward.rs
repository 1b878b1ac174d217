//! Feed-forward disturbance model.
//!
//! Dissolved-solids FF (influence × normalized TDS), ambient FF
//! (influence × ambient differential), chemistry FF (influence ×
//! normalized chemistry level). Zero influences disable each component.
//!
//! Disturbances like a scheduled dilution or a known ambient swing are
//! measurable before they show up as control error; this term spends that
//! lead time instead of waiting for P/I/D to react.

use reef_common::config::FeedForwardSection;

/// Auxiliary measurements, updated at their own cadence by collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedForwardInputs {
    /// Dissolved-solids trend [ppm].
    pub dissolved_solids: f64,
    /// Ambient minus process temperature [units], already a differential.
    pub ambient_differential: f64,
    /// Chemistry level (e.g. pH).
    pub chemistry_level: f64,
}

/// Map a raw measurement into [-1, 1] around its configured baseline.
#[inline]
fn normalize(value: f64, baseline: f64, scale: f64) -> f64 {
    if scale == 0.0 {
        return 0.0;
    }
    ((value - baseline) / scale).clamp(-1.0, 1.0)
}

/// Compute the open-loop correction added to the PID sum.
///
/// ```text
/// ff = a × normalize(tds) + b × ambient_differential + c × normalize(chem)
/// ```
///
/// Each term is independently disabled when its influence is zero; a
/// disabled section yields exactly 0.0. The ambient differential enters
/// raw because it is already a signed difference in process units.
#[inline]
pub fn feedforward_compute(cfg: &FeedForwardSection, inputs: &FeedForwardInputs) -> f64 {
    if !cfg.enabled {
        return 0.0;
    }

    let mut correction = 0.0;

    // Dissolved-solids trend
    if cfg.dissolved_solids_influence != 0.0 {
        correction += cfg.dissolved_solids_influence
            * normalize(
                inputs.dissolved_solids,
                cfg.dissolved_solids_baseline,
                cfg.dissolved_solids_scale,
            );
    }

    // Ambient differential
    if cfg.ambient_influence != 0.0 {
        correction += cfg.ambient_influence * inputs.ambient_differential;
    }

    // Chemistry level
    if cfg.chemistry_influence != 0.0 {
        correction += cfg.chemistry_influence
            * normalize(
                inputs.chemistry_level,
                cfg.chemistry_baseline,
                cfg.chemistry_scale,
            );
    }

    correction
}

// ─── Tests ──────────────────────────────────────────────────────────
