//! Relay-feedback autotune.
//!
//! Drives the loop with a relay (full amplitude above target, zero below)
//! and measures the induced limit-cycle oscillation. Three full cycles
//! give the ultimate gain `Ku = 4d / (π·a)` and ultimate period `Tu`,
//! from which classic Ziegler-Nichols gains are derived:
//!
//! ```text
//! Kp = 0.6·Ku     Ki = 1.2·Ku / Tu     Kd = 0.075·Ku·Tu
//! ```
//!
//! The result is raw; callers clamp it against their configured gain
//! bounds before applying.

use std::f64::consts::PI;

use tracing::info;

use reef_common::params::ControlParameters;

/// Measured amplitudes below this are treated as "no oscillation yet".
const MIN_OSCILLATION_AMPLITUDE: f64 = 1e-9;

/// Full oscillation cycles required before the estimate is trusted.
const REQUIRED_OSCILLATIONS: u32 = 3;

/// Relay autotune session.
///
/// Feed it the control error every tick via [`RelayTune::drive`] and apply
/// the returned output instead of the PID command. Once
/// [`RelayTune::is_complete`] reports true, [`RelayTune::result`] holds the
/// derived gain triple.
#[derive(Debug)]
pub struct RelayTune {
    /// Relay drive amplitude `d` [% duty].
    amplitude: f64,

    elapsed_s: f64,
    last_error: f64,
    rising: bool,

    peak_seen: bool,
    last_peak_elapsed_s: f64,
    /// Minimum error observed since the previous maximum.
    cycle_min: f64,

    oscillation_period_s: f64,
    oscillation_amplitude: f64,
    oscillations: u32,

    result: Option<ControlParameters>,
}

impl RelayTune {
    /// Start a session with the given relay amplitude.
    pub fn new(amplitude: f64) -> Self {
        Self {
            amplitude,
            elapsed_s: 0.0,
            last_error: 0.0,
            rising: false,
            peak_seen: false,
            last_peak_elapsed_s: 0.0,
            cycle_min: f64::INFINITY,
            oscillation_period_s: 0.0,
            oscillation_amplitude: 0.0,
            oscillations: 0,
            result: None,
        }
    }

    /// One tick of the relay: measure the oscillation, return the drive.
    ///
    /// Output is `amplitude` while the process sits below target (error
    /// positive) and zero above it.
    pub fn drive(&mut self, error: f64, dt: f64) -> f64 {
        if dt > 0.0 {
            self.elapsed_s += dt;
            if self.result.is_none() {
                self.detect_oscillation(error);
            }
        }
        if error > 0.0 { self.amplitude } else { 0.0 }
    }

    /// True once enough oscillations have been measured.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Derived gains, available once complete.
    #[inline]
    pub fn result(&self) -> Option<ControlParameters> {
        self.result
    }

    /// Seconds spent tuning so far, for caller-side timeouts.
    #[inline]
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    /// Peak detection on the error signal.
    ///
    /// A maximum is a rising edge followed by a falling one. Each maximum
    /// closes one cycle: the period is the spacing between maxima and the
    /// amplitude is half the peak-to-trough swing inside the cycle.
    fn detect_oscillation(&mut self, error: f64) {
        if error < self.cycle_min {
            self.cycle_min = error;
        }

        if error > self.last_error {
            self.rising = true;
        } else if error < self.last_error && self.rising {
            // Maximum detected at the previous sample.
            if self.peak_seen {
                let period = self.elapsed_s - self.last_peak_elapsed_s;
                let amplitude = (self.last_error - self.cycle_min) / 2.0;
                if period > 0.0 && amplitude > MIN_OSCILLATION_AMPLITUDE {
                    self.oscillation_period_s = period;
                    self.oscillation_amplitude = amplitude;
                    self.oscillations += 1;
                    if self.oscillations >= REQUIRED_OSCILLATIONS {
                        self.finalize();
                    }
                }
            }
            self.peak_seen = true;
            self.last_peak_elapsed_s = self.elapsed_s;
            self.cycle_min = error;
            self.rising = false;
        }

        self.last_error = error;
    }

    fn finalize(&mut self) {
        let ku = (4.0 * self.amplitude) / (PI * self.oscillation_amplitude);
        let tu = self.oscillation_period_s;
        let gains = ControlParameters::new(0.6 * ku, 1.2 * ku / tu, 0.075 * ku * tu);
        info!(
            ku,
            tu,
            kp = gains.kp,
            ki = gains.ki,
            kd = gains.kd,
            "relay autotune complete"
        );
        self.result = Some(gains);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
