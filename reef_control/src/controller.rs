//! Per-loop controller engine.
//!
//! Owns every piece of per-tick state (PID accumulator, ramp, derivative
//! filter, performance window, mode machine) for one regulated quantity.
//! Multiple loops coexist as independent `Controller` values sharing only
//! their read-only context source.
//!
//! The tick path is allocation-free and lock-free. Gain updates arrive
//! between ticks via `set_parameters`; the tick itself never blocks.

use tracing::{info, warn};

use reef_common::config::ControlConfig;
use reef_common::consts::MAX_WINDOW_TICKS;
use reef_common::context::ContextFeatures;
use reef_common::flags::StatusFlags;
use reef_common::params::ControlParameters;
use reef_common::sample::PerformanceSample;

use crate::control::feedforward::{FeedForwardInputs, feedforward_compute};
use crate::control::pid::{PidSettings, PidState, pid_step};
use crate::control::ramp::SetpointRamp;
use crate::mode::{ControlMode, ModeEvent, ModeMachine, TransitionResult};
use crate::perf::{PerfWindow, WindowSummary};

/// Output while a fault is latched. Dead-off regardless of the configured
/// low rail; a latched fault must not keep an actuator energized.
const FAULT_OUTPUT: f64 = 0.0;

// ─── Diagnostics ────────────────────────────────────────────────────

/// Read-only projection of controller internals for presentation layers.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    pub mode: ControlMode,
    pub flags: StatusFlags,
    /// True operator setpoint.
    pub effective_target: f64,
    /// Setpoint the evaluator currently chases.
    pub ramped_target: f64,
    pub gains: ControlParameters,
    pub integral: f64,
    pub last_output: f64,
    pub is_settled: bool,
    pub tick_count: u64,
    /// Metrics of the last closed performance window.
    pub last_window: Option<WindowSummary>,
}

// ─── Controller ─────────────────────────────────────────────────────

/// One closed-loop regulator (e.g. tank temperature).
#[derive(Debug)]
pub struct Controller {
    cfg: ControlConfig,
    gains: ControlParameters,
    mode: ModeMachine,
    flags: StatusFlags,

    pid: PidState,
    pid_settings: PidSettings,
    ramp: SetpointRamp,
    monitor: PerfWindow,

    true_target: f64,
    ff_inputs: FeedForwardInputs,
    context: ContextFeatures,

    last_input: f64,
    last_output: f64,
    manual_output: f64,

    consecutive_sensor_faults: u32,
    rail_stuck_s: f64,
    tick_count: u64,
}

impl Controller {
    /// Build a controller from a validated configuration.
    ///
    /// Starts in Manual with the output at the low rail; closed-loop
    /// regulation is enabled explicitly via [`Controller::enable_automatic`].
    pub fn new(cfg: ControlConfig) -> Self {
        let expected_ticks = (cfg.monitor.window_secs * cfg.runtime.tick_hz as u64)
            .min(MAX_WINDOW_TICKS) as u32;
        let monitor = PerfWindow::new(&cfg.monitor, expected_ticks);
        let pid_settings = PidSettings {
            integral_max: cfg.controller.integral_max,
            filter_alpha: cfg.controller.derivative_filter_alpha,
            out_min: cfg.controller.output_min,
            out_max: cfg.controller.output_max,
        };
        let gains = cfg.controller.gains;
        let true_target = cfg.controller.target;
        let out_min = cfg.controller.output_min;
        Self {
            cfg,
            gains,
            mode: ModeMachine::new(),
            flags: StatusFlags::empty(),
            pid: PidState::default(),
            pid_settings,
            ramp: SetpointRamp::new(true_target),
            monitor,
            true_target,
            ff_inputs: FeedForwardInputs::default(),
            context: ContextFeatures::default(),
            last_input: true_target,
            last_output: out_min,
            manual_output: out_min,
            consecutive_sensor_faults: 0,
            rail_stuck_s: 0.0,
            tick_count: 0,
        }
    }

    // ── Collaborator inputs (own cadence, between ticks) ──

    /// Update the true operator setpoint.
    pub fn set_target(&mut self, target: f64) {
        self.true_target = target;
    }

    /// Update the auxiliary feed-forward measurements.
    pub fn set_feedforward_inputs(&mut self, inputs: FeedForwardInputs) {
        self.ff_inputs = inputs;
    }

    /// Update the context features attached to performance samples.
    pub fn set_context(&mut self, context: ContextFeatures) {
        self.context = context;
    }

    /// Output applied while in Manual, clamped to the output range.
    pub fn set_manual_output(&mut self, output: f64) {
        self.manual_output = output.clamp(
            self.cfg.controller.output_min,
            self.cfg.controller.output_max,
        );
    }

    /// Replace the working gain triple at a tick boundary.
    ///
    /// Rejects non-finite or negative gains; zero stays legal because a
    /// zero gain is how a term is disabled.
    pub fn set_parameters(&mut self, gains: ControlParameters) -> Result<(), String> {
        gains.validate()?;
        self.gains = gains;
        Ok(())
    }

    // ── Mode transitions ──

    /// Enable closed-loop regulation.
    ///
    /// Primes the evaluator from the last valid reading: integral and
    /// derivative state reset to zero, the ramped target snaps to the
    /// measurement so regulation starts from where the process actually is.
    pub fn enable_automatic(&mut self) -> TransitionResult {
        let result = self.mode.handle_event(ModeEvent::EnableAutomatic);
        if let TransitionResult::Ok(mode) = result {
            self.pid.reset();
            self.pid.prime(self.last_input);
            self.ramp.snap_to(self.last_input);
            self.rail_stuck_s = 0.0;
            info!(input = self.last_input, ?mode, "closed-loop regulation enabled");
        }
        result
    }

    /// Hand the loop back to the operator.
    pub fn manual_override(&mut self) -> TransitionResult {
        let result = self.mode.handle_event(ModeEvent::ManualOverride);
        if let TransitionResult::Ok(mode) = result {
            info!(?mode, "manual override");
        }
        result
    }

    /// Clear a latched fault. The controller lands in Manual; re-enabling
    /// Automatic is a separate deliberate step.
    pub fn acknowledge_fault(&mut self) -> TransitionResult {
        let result = self.mode.handle_event(ModeEvent::AcknowledgeFault);
        if let TransitionResult::Ok(mode) = result {
            self.consecutive_sensor_faults = 0;
            self.rail_stuck_s = 0.0;
            info!(?mode, "fault acknowledged");
        }
        result
    }

    fn latch_fault(&mut self, reason: &'static str) {
        self.mode.force_fault();
        self.rail_stuck_s = 0.0;
        warn!(reason, "fault latched, output forced to safe default");
    }

    /// Drop flags that only describe an active closed loop.
    fn clear_loop_flags(&mut self) {
        self.flags.remove(
            StatusFlags::RAMPING
                | StatusFlags::SATURATED_HIGH
                | StatusFlags::SATURATED_LOW
                | StatusFlags::SETTLED
                | StatusFlags::SAFETY_CUTOFF,
        );
    }

    // ── Tick path ──

    /// Evaluate one control tick.
    ///
    /// Never fails from the caller's point of view: every tick yields
    /// either a freshly computed output or the last known safe one.
    pub fn tick(&mut self, reading: f64, dt: f64) -> f64 {
        self.tick_count += 1;

        // ── 1. Sensor validation ────────────────────────────
        if !reading.is_finite() {
            self.flags.insert(StatusFlags::SENSOR_FAULT);
            self.consecutive_sensor_faults += 1;
            if self.mode.is_automatic()
                && self.consecutive_sensor_faults >= self.cfg.fault.sensor_fault_limit
            {
                self.latch_fault("sensor fault streak");
                self.last_output = FAULT_OUTPUT;
            }
            // Hold the last valid output; integral and ramp untouched.
            return self.last_output;
        }
        self.flags.remove(StatusFlags::SENSOR_FAULT);
        self.consecutive_sensor_faults = 0;
        self.last_input = reading;

        if dt <= 0.0 {
            return self.last_output;
        }

        match self.mode.mode() {
            ControlMode::Manual => {
                // Track the measurement so a later enable starts bumplessly.
                self.pid.prime(reading);
                self.clear_loop_flags();
                self.last_output = self.manual_output;
                return self.last_output;
            }
            ControlMode::Fault => {
                self.clear_loop_flags();
                self.last_output = FAULT_OUTPUT;
                return FAULT_OUTPUT;
            }
            ControlMode::Automatic => {}
        }

        let out_min = self.cfg.controller.output_min;
        let out_max = self.cfg.controller.output_max;

        // ── 2. Setpoint ramp ────────────────────────────────
        let ramped = self
            .ramp
            .advance(self.true_target, self.cfg.controller.ramp_rate, dt);
        self.flags
            .set(StatusFlags::RAMPING, !self.ramp.arrived(self.true_target));

        let true_error = self.true_target - reading;

        // ── 3. Safety cutoff ────────────────────────────────
        // Overshoot past the margin drives the actuator to the low rail
        // without touching integral state; recovery is automatic once the
        // process falls back below the margin.
        let margin = self.cfg.controller.safety_margin;
        if margin > 0.0 && reading > self.true_target + margin {
            if !self.flags.contains(StatusFlags::SAFETY_CUTOFF) {
                warn!(reading, target = self.true_target, margin, "safety cutoff engaged");
            }
            self.flags.insert(StatusFlags::SAFETY_CUTOFF);
            self.pid.prime(reading);
            self.monitor.record(true_error, out_min, self.true_target, dt);
            self.flags.set(StatusFlags::SETTLED, self.monitor.is_settled());
            self.rail_stuck_s = 0.0;
            self.last_output = out_min;
            return out_min;
        }
        self.flags.remove(StatusFlags::SAFETY_CUTOFF);

        // ── 4. Feed-forward ─────────────────────────────────
        let ff = feedforward_compute(&self.cfg.feedforward, &self.ff_inputs);

        // ── 5. PID ──────────────────────────────────────────
        let error = ramped - reading;
        let terms = pid_step(
            &mut self.pid,
            &self.gains,
            &self.pid_settings,
            error,
            reading,
            ff,
            self.last_output,
            dt,
        );

        // ── 6. Clamp and saturation flags ───────────────────
        let output = terms.raw.clamp(out_min, out_max);
        self.flags
            .set(StatusFlags::SATURATED_HIGH, output >= out_max && terms.raw >= out_max);
        self.flags
            .set(StatusFlags::SATURATED_LOW, output <= out_min && terms.raw <= out_min);

        // ── 7. Performance window ───────────────────────────
        // Measured against the true target, not the ramped one; settling
        // against a moving target would be vacuous.
        self.monitor.record(true_error, output, self.true_target, dt);
        self.flags.set(StatusFlags::SETTLED, self.monitor.is_settled());

        // ── 8. Actuator-health heuristic ────────────────────
        // Output pinned to a rail while the error stays large means the
        // actuator is not moving the process; latch Fault after the dwell.
        if self.flags.is_saturated() && true_error.abs() > self.cfg.fault.rail_error_threshold {
            self.rail_stuck_s += dt;
            if self.rail_stuck_s >= self.cfg.fault.rail_stuck_secs {
                self.latch_fault("output railed with large error");
                self.last_output = FAULT_OUTPUT;
                return FAULT_OUTPUT;
            }
        } else {
            self.rail_stuck_s = 0.0;
        }

        self.last_output = output;
        output
    }

    /// Close the performance window if its duration has elapsed.
    ///
    /// Called from the loop after the tick. A window that saw no ticks
    /// (Manual or Fault dwell) produces no sample.
    pub fn close_window_if_due(&mut self, timestamp_s: u64) -> Option<PerformanceSample> {
        if !self.monitor.is_due() {
            return None;
        }
        self.monitor.close(timestamp_s, &self.context, &self.gains)
    }

    // ── Read-only projections ──

    #[inline]
    pub fn mode(&self) -> ControlMode {
        self.mode.mode()
    }

    #[inline]
    pub fn flags(&self) -> StatusFlags {
        self.flags
    }

    #[inline]
    pub fn gains(&self) -> ControlParameters {
        self.gains
    }

    #[inline]
    pub fn context(&self) -> ContextFeatures {
        self.context
    }

    #[inline]
    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Full diagnostic snapshot.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            mode: self.mode.mode(),
            flags: self.flags,
            effective_target: self.true_target,
            ramped_target: self.ramp.current(),
            gains: self.gains,
            integral: self.pid.integral(),
            last_output: self.last_output,
            is_settled: self.monitor.is_settled(),
            tick_count: self.tick_count,
            last_window: self.monitor.last_summary(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
