//! Windowed performance measurement.
//!
//! Accumulates per-tick error/output statistics over a fixed window
//! (default 10 minutes) and condenses them into one `PerformanceSample`
//! with a 0..100 composite score. The score is the sole fitness signal
//! the adaptation side ever sees; it never inspects PID internals.
//!
//! All per-tick work is O(1) with no allocation: streaming sums for the
//! variance, a running max for the overshoot, a last-exit timestamp for
//! the settling time, and a fixed-capacity ring holding the tail of the
//! window for the steady-state average.

use heapless::Deque;

use reef_common::config::MonitorSection;
use reef_common::consts::{PERF_TAIL_CAPACITY, SETTLED_BAND_FRACTION};
use reef_common::context::ContextFeatures;
use reef_common::params::ControlParameters;
use reef_common::sample::PerformanceSample;

// ─── Composite Score ────────────────────────────────────────────────

/// Weighted composite of the four window metrics, clamped to [0, 100].
///
/// Each metric is normalized against its configured saturation point and
/// clamped to [0, 1] before weighting, so one pathological metric can at
/// most consume its own weight:
///
/// ```text
/// score = 100 × (1 − (w_settle×n_settle + w_over×n_over + w_sse×n_sse + w_var×n_var))
/// ```
pub fn compute_score(
    cfg: &MonitorSection,
    settling_time_s: f64,
    max_overshoot_pct: f64,
    steady_state_error: f64,
    output_variance: f64,
) -> f64 {
    let n_settle = safe_ratio(settling_time_s, cfg.norm_settling_secs);
    let n_over = safe_ratio(max_overshoot_pct, cfg.norm_overshoot_pct);
    let n_sse = (steady_state_error.abs() * cfg.norm_sse_scale).clamp(0.0, 1.0);
    let n_var = safe_ratio(output_variance, cfg.norm_variance);

    let penalty = cfg.w_settling * n_settle
        + cfg.w_overshoot * n_over
        + cfg.w_sse * n_sse
        + cfg.w_variance * n_var;

    (100.0 * (1.0 - penalty)).clamp(0.0, 100.0)
}

#[inline]
fn safe_ratio(value: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return 0.0;
    }
    (value / saturation).clamp(0.0, 1.0)
}

// ─── Window Summary ─────────────────────────────────────────────────

/// Condensed metrics of the most recently closed window, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct WindowSummary {
    /// Seconds until the error last left the ±2% band.
    pub settling_time_s: f64,
    /// Largest deviation beyond the target, percent of target magnitude.
    pub max_overshoot_pct: f64,
    /// Signed error averaged over the final 10% of the window.
    pub steady_state_error: f64,
    /// Population variance of the output command.
    pub output_variance: f64,
    /// Composite score, 0..100.
    pub score: f64,
    /// Ticks recorded in the window.
    pub ticks: u32,
}

// ─── Performance Window ─────────────────────────────────────────────

/// Accumulator for one performance window.
///
/// `record` every tick, `is_due` from the loop, `close` when due. Closing
/// resets the accumulator for the next window and returns the sample, or
/// `None` for a window that saw no ticks (startup, fault dwell).
#[derive(Debug)]
pub struct PerfWindow {
    cfg: MonitorSection,
    /// Tail ring length target: 10% of the expected window, at least 1.
    tail_target: usize,

    ticks: u32,
    elapsed_s: f64,
    /// +1 approaching from below, −1 from above. Captured at first tick.
    approach_sign: f64,
    max_overshoot_pct: f64,
    /// Elapsed time at the last tick whose error was outside the band.
    last_band_exit_s: f64,
    in_band: bool,
    output_sum: f64,
    output_sum_sq: f64,
    tail: Deque<f64, PERF_TAIL_CAPACITY>,

    last_summary: Option<WindowSummary>,
}

impl PerfWindow {
    /// `expected_ticks` sizes the steady-state tail (window_secs × tick rate).
    pub fn new(cfg: &MonitorSection, expected_ticks: u32) -> Self {
        let tail_target = ((expected_ticks / 10).max(1) as usize).min(PERF_TAIL_CAPACITY);
        Self {
            cfg: cfg.clone(),
            tail_target,
            ticks: 0,
            elapsed_s: 0.0,
            approach_sign: 0.0,
            max_overshoot_pct: 0.0,
            last_band_exit_s: 0.0,
            in_band: false,
            output_sum: 0.0,
            output_sum_sq: 0.0,
            tail: Deque::new(),
            last_summary: None,
        }
    }

    /// Record one control tick. O(1), no allocation.
    ///
    /// `error` is measured against the true target (not the ramped one),
    /// otherwise settling during a long ramp would be vacuous.
    #[inline]
    pub fn record(&mut self, error: f64, output: f64, target: f64, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        if self.ticks == 0 {
            self.approach_sign = if error >= 0.0 { 1.0 } else { -1.0 };
        }
        self.ticks += 1;
        self.elapsed_s += dt;

        // Settling: remember when the error was last outside ±2% of target.
        let band = target.abs() * SETTLED_BAND_FRACTION;
        self.in_band = error.abs() <= band;
        if !self.in_band {
            self.last_band_exit_s = self.elapsed_s;
        }

        // Overshoot: deviation past the target in the approach direction.
        if target.abs() > f64::EPSILON {
            let beyond_pct = self.approach_sign * (-error) / target.abs() * 100.0;
            if beyond_pct > self.max_overshoot_pct {
                self.max_overshoot_pct = beyond_pct;
            }
        }

        // Variance inputs.
        self.output_sum += output;
        self.output_sum_sq += output * output;

        // Steady-state tail: keep only the newest `tail_target` errors.
        if self.tail.len() >= self.tail_target {
            self.tail.pop_front();
        }
        // Capacity bound, cannot fail after the pop above.
        let _ = self.tail.push_back(error);
    }

    /// True once the window has accumulated its configured duration.
    #[inline]
    pub fn is_due(&self) -> bool {
        self.elapsed_s >= self.cfg.window_secs as f64
    }

    /// True while the most recent error sits inside the ±2% band.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.ticks > 0 && self.in_band
    }

    /// Metrics of the last closed window, if any.
    pub fn last_summary(&self) -> Option<WindowSummary> {
        self.last_summary
    }

    /// Close the window, emit a sample, and reset for the next window.
    ///
    /// A window with zero ticks produces no sample. A window whose error
    /// never re-entered the band reports its full elapsed duration as the
    /// settling time, which the score reads as non-convergence.
    pub fn close(
        &mut self,
        timestamp_s: u64,
        context: &ContextFeatures,
        gains: &ControlParameters,
    ) -> Option<PerformanceSample> {
        if self.ticks == 0 {
            return None;
        }

        let n = self.ticks as f64;
        let mean = self.output_sum / n;
        let output_variance = (self.output_sum_sq / n - mean * mean).max(0.0);

        let steady_state_error = if self.tail.is_empty() {
            0.0
        } else {
            self.tail.iter().sum::<f64>() / self.tail.len() as f64
        };

        let settling_time_s = self.last_band_exit_s;
        let max_overshoot_pct = self.max_overshoot_pct.max(0.0);

        let score = compute_score(
            &self.cfg,
            settling_time_s,
            max_overshoot_pct,
            steady_state_error,
            output_variance,
        );

        let summary = WindowSummary {
            settling_time_s,
            max_overshoot_pct,
            steady_state_error,
            output_variance,
            score,
            ticks: self.ticks,
        };
        let sample = PerformanceSample {
            timestamp_s,
            context: *context,
            gains: *gains,
            settling_time_s,
            max_overshoot_pct,
            steady_state_error,
            output_variance,
            score,
            ticks: self.ticks,
        };

        self.reset();
        self.last_summary = Some(summary);
        Some(sample)
    }

    fn reset(&mut self) {
        self.ticks = 0;
        self.elapsed_s = 0.0;
        self.approach_sign = 0.0;
        self.max_overshoot_pct = 0.0;
        self.last_band_exit_s = 0.0;
        self.in_band = false;
        self.output_sum = 0.0;
        self.output_sum_sq = 0.0;
        self.tail.clear();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
