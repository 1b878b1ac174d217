//! PID step with derivative-on-measurement, low-pass derivative filtering,
//! and two-stage anti-windup (conditional integration + hard clamp).
//!
//! Zero Ki disables integral; zero Kd disables derivative; zero filter α
//! passes the raw derivative through.

use reef_common::params::ControlParameters;

/// Internal state of the PID evaluator.
///
/// Preserves the integral accumulator, previous measurement and filtered
/// derivative across ticks. Must be reset (via [`PidState::reset`]) on a
/// Manual→Automatic transition, then primed with the current measurement
/// so the first automatic tick sees no phantom derivative.
#[derive(Debug, Clone, Copy)]
pub struct PidState {
    /// Integral accumulator. Holds the summed `Ki × error × dt` product,
    /// so a later Ki change does not rescale already-earned history.
    integral: f64,
    /// Previous measured input (for derivative-on-measurement).
    prev_input: f64,
    /// Filtered derivative of the measurement.
    derivative_filtered: f64,
}

impl Default for PidState {
    fn default() -> Self {
        Self {
            integral: 0.0,
            prev_input: 0.0,
            derivative_filtered: 0.0,
        }
    }
}

impl PidState {
    /// Reset all internal state to zero.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Seed the previous measurement without touching accumulated state.
    #[inline]
    pub fn prime(&mut self, input: f64) {
        self.prev_input = input;
        self.derivative_filtered = 0.0;
    }

    /// Current integral accumulator value (diagnostics).
    #[inline]
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

/// Static evaluator settings, extracted from the controller section.
#[derive(Debug, Clone, Copy)]
pub struct PidSettings {
    /// Hard clamp on the integral accumulator magnitude.
    pub integral_max: f64,
    /// Derivative low-pass retention α ∈ [0,1]; 0 = unfiltered.
    pub filter_alpha: f64,
    /// Lower output rail.
    pub out_min: f64,
    /// Upper output rail.
    pub out_max: f64,
}

/// Per-tick term breakdown (diagnostics and the output stage).
#[derive(Debug, Clone, Copy, Default)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub feedforward: f64,
    /// Unclamped sum of all terms; the caller clamps to the rails.
    pub raw: f64,
}

/// Compute one PID step.
///
/// # Arguments
/// - `state`: mutable evaluator state (integral, previous input, filter).
/// - `gains`: working gain triple.
/// - `settings`: clamp/filter settings.
/// - `error`: control error (ramped target − input) [process units].
/// - `input`: measured input [process units] — derivative source.
/// - `feedforward`: open-loop correction added after P+I+D.
/// - `prev_output`: previous tick's clamped output — arms the integral
///   freeze while the output was railed in the windup direction.
/// - `dt`: tick period [s].
///
/// # Returns
/// Term breakdown with the unclamped sum; clamping is done in the output
/// stage so its saturation state can feed back into the next step.
#[inline]
pub fn pid_step(
    state: &mut PidState,
    gains: &ControlParameters,
    settings: &PidSettings,
    error: f64,
    input: f64,
    feedforward: f64,
    prev_output: f64,
    dt: f64,
) -> PidTerms {
    if dt <= 0.0 {
        return PidTerms::default();
    }

    // ── P term ──────────────────────────────────────────────
    let p = gains.kp * error;

    // ── I term (conditional integration + hard clamp) ───────
    let i = if gains.ki != 0.0 {
        // Freeze accumulation while the previous output sat on a rail and
        // the current error would push it further into that rail.
        let railed_high = prev_output >= settings.out_max && error > 0.0;
        let railed_low = prev_output <= settings.out_min && error < 0.0;
        if !(railed_high || railed_low) {
            state.integral += gains.ki * error * dt;
        }
        state.integral = state
            .integral
            .clamp(-settings.integral_max, settings.integral_max);
        state.integral
    } else {
        // Ki == 0 → integral disabled, accumulator stays at 0.
        state.integral = 0.0;
        0.0
    };

    // ── D term (on measurement, with retention filter) ──────
    let d = if gains.kd != 0.0 {
        let raw_derivative = (input - state.prev_input) / dt;
        if settings.filter_alpha > 0.0 {
            state.derivative_filtered = settings.filter_alpha * state.derivative_filtered
                + (1.0 - settings.filter_alpha) * raw_derivative;
        } else {
            state.derivative_filtered = raw_derivative;
        }
        // Measurement rising = negative corrective action; a target jump
        // never appears here, so no derivative kick.
        -gains.kd * state.derivative_filtered
    } else {
        state.derivative_filtered = 0.0;
        0.0
    };

    state.prev_input = input;

    let raw = p + i + d + feedforward;
    PidTerms {
        p,
        i,
        d,
        feedforward,
        raw,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
