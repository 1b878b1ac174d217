//! Integration test: closed-loop regulation accuracy.
//!
//! Drives the assembled `Controller` against a first-order thermal plant
//! and validates convergence, overshoot, steady-state error, disturbance
//! rejection and setpoint ramping.

use reef_common::config::ControlConfig;
use reef_common::flags::StatusFlags;
use reef_control::controller::Controller;
use reef_control::mode::TransitionResult;

// ─── Simulated Plant ────────────────────────────────────────────────

const DT: f64 = 0.1; // 10 Hz tick
const TARGET: f64 = 25.0;

/// Heater authority [°C/s per % duty].
const HEAT_GAIN: f64 = 0.004;
/// Passive exchange with ambient [1/s].
const LOSS_RATE: f64 = 0.01;

/// First-order thermal model of a heated tank.
struct SimulatedTank {
    temp: f64,
    ambient: f64,
}

impl SimulatedTank {
    fn new(initial: f64, ambient: f64) -> Self {
        Self {
            temp: initial,
            ambient,
        }
    }

    /// Advance the water temperature one tick under `output` % duty.
    fn step(&mut self, output: f64, dt: f64) {
        self.temp += (output * HEAT_GAIN - (self.temp - self.ambient) * LOSS_RATE) * dt;
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config() -> ControlConfig {
    let mut cfg = ControlConfig::default();
    cfg.controller.target = TARGET;
    cfg.controller.ramp_rate = 0.0; // instant tracking unless a test opts in
    cfg.feedforward.enabled = false; // aux sensors out of scope here
    cfg
}

/// Controller primed from the tank and switched to Automatic.
fn automatic_controller(cfg: ControlConfig, tank: &SimulatedTank) -> Controller {
    let mut c = Controller::new(cfg);
    c.tick(tank.temp, DT);
    assert!(matches!(c.enable_automatic(), TransitionResult::Ok(_)));
    c
}

/// Run the closed loop for `ticks`; returns per-tick (temps, outputs).
fn run_closed_loop(
    c: &mut Controller,
    tank: &mut SimulatedTank,
    ticks: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut temps = Vec::with_capacity(ticks);
    let mut outputs = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        let out = c.tick(tank.temp, DT);
        tank.step(out, DT);
        temps.push(tank.temp);
        outputs.push(out);
    }
    (temps, outputs)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[test]
fn step_response_converges_to_target() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut c = automatic_controller(test_config(), &tank);

    // 3000 s of simulated time, far past the loop's settling horizon.
    let (temps, _) = run_closed_loop(&mut c, &mut tank, 30_000);

    let final_error = (temps[temps.len() - 1] - TARGET).abs();
    assert!(
        final_error < 0.1,
        "step response did not converge: final error {final_error:.4} °C"
    );
}

#[test]
fn overshoot_never_reaches_the_safety_margin() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let cfg = test_config();
    let margin = cfg.controller.safety_margin;
    let mut c = automatic_controller(cfg, &tank);

    let mut max_temp = tank.temp;
    for _ in 0..30_000 {
        let out = c.tick(tank.temp, DT);
        tank.step(out, DT);
        if tank.temp > max_temp {
            max_temp = tank.temp;
        }
        assert!(
            !c.flags().contains(StatusFlags::SAFETY_CUTOFF),
            "safety cutoff engaged during a nominal step response (temp {:.3})",
            tank.temp
        );
    }
    assert!(
        max_temp < TARGET + margin,
        "overshoot peak {max_temp:.3} °C reached the safety margin at {:.1} °C",
        TARGET + margin
    );
}

#[test]
fn settled_flag_raises_inside_the_band() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut c = automatic_controller(test_config(), &tank);

    run_closed_loop(&mut c, &mut tank, 30_000);

    assert!(
        c.flags().contains(StatusFlags::SETTLED),
        "controller never reported settled, final temp {:.3}",
        tank.temp
    );
    assert!(c.diagnostics().is_settled);
}

#[test]
fn steady_state_error_vanishes_with_integral_action() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut c = automatic_controller(test_config(), &tank);

    let (temps, _) = run_closed_loop(&mut c, &mut tank, 30_000);

    // The heat-loss load must be carried entirely by the integral term.
    let tail = &temps[temps.len() - 2000..];
    let mean_error = tail.iter().map(|t| (t - TARGET).abs()).sum::<f64>() / tail.len() as f64;
    assert!(
        mean_error < 0.05,
        "steady-state error persists: mean |error| {mean_error:.4} °C over the last 200 s"
    );
    let integral = c.diagnostics().integral;
    assert!(
        integral > 0.0,
        "integral term {integral:.3} is not carrying the heat-loss load"
    );
}

#[test]
fn output_stays_on_the_actuator_range() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut c = automatic_controller(test_config(), &tank);

    let (_, outputs) = run_closed_loop(&mut c, &mut tank, 30_000);

    for (tick, out) in outputs.iter().enumerate() {
        assert!(
            (0.0..=100.0).contains(out),
            "output {out:.3} left the actuator range at tick {tick}"
        );
    }
}

#[test]
fn cold_snap_disturbance_is_rejected() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut c = automatic_controller(test_config(), &tank);

    // 1. Settle at the target.
    run_closed_loop(&mut c, &mut tank, 20_000);
    assert!((tank.temp - TARGET).abs() < 0.1, "precondition: not settled");

    // 2. Room temperature drops 3 °C; the load on the heater rises.
    tank.ambient = 20.0;
    let (temps, _) = run_closed_loop(&mut c, &mut tank, 3_000);
    let dip = temps.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(
        dip < TARGET - 0.02,
        "disturbance never showed up in the process (min temp {dip:.4})"
    );

    // 3. Integral re-absorbs the new load and the loop recovers.
    let (temps, _) = run_closed_loop(&mut c, &mut tank, 30_000);
    let final_error = (temps[temps.len() - 1] - TARGET).abs();
    assert!(
        final_error < 0.1,
        "loop did not recover from the cold snap: final error {final_error:.4} °C"
    );
}

#[test]
fn setpoint_step_produces_no_derivative_kick() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let cfg = test_config();
    let kp = cfg.controller.gains.kp;
    let mut c = automatic_controller(cfg, &tank);

    run_closed_loop(&mut c, &mut tank, 20_000);
    let out_before = c.last_output();

    // A 1 °C setpoint step. Derivative-on-measurement means the only
    // instantaneous response is the proportional one, kp × 1 °C.
    c.set_target(TARGET + 1.0);
    let out_after = c.tick(tank.temp, DT);
    let jump = out_after - out_before;

    assert!(
        jump > kp * 1.0 - 0.5,
        "proportional response missing from the step: jump {jump:.3}"
    );
    assert!(
        jump < kp * 1.0 + 0.5,
        "output jump {jump:.3} exceeds the proportional response, derivative kick suspected"
    );
}

#[test]
fn ramped_setpoint_walks_to_the_target() {
    let mut tank = SimulatedTank::new(22.0, 23.0);
    let mut cfg = test_config();
    cfg.controller.ramp_rate = 0.02; // °C/s
    let rate = cfg.controller.ramp_rate;
    let mut c = automatic_controller(cfg, &tank);

    let max_step = rate * DT;
    let arrival_ticks = ((TARGET - 22.0) / max_step).ceil() as usize;

    let mut prev_ramped = c.diagnostics().ramped_target;
    let mut arrived_at = None;
    for tick in 1..=arrival_ticks + 40 {
        let out = c.tick(tank.temp, DT);
        tank.step(out, DT);
        let d = c.diagnostics();
        assert!(
            d.ramped_target >= prev_ramped,
            "ramp moved backward at tick {tick}"
        );
        assert!(
            d.ramped_target - prev_ramped <= max_step + 1e-9,
            "ramp step {:.6} exceeds the configured rate at tick {tick}",
            d.ramped_target - prev_ramped
        );
        prev_ramped = d.ramped_target;
        if d.ramped_target == TARGET {
            arrived_at = Some(tick);
            break;
        }
        assert!(
            c.flags().contains(StatusFlags::RAMPING),
            "RAMPING flag dropped mid-ramp at tick {tick}"
        );
    }
    let arrived_at = arrived_at.expect("ramp never arrived at the target");
    assert!(
        arrived_at <= arrival_ticks + 2,
        "ramp took {arrived_at} ticks, expected about {arrival_ticks}"
    );
    assert!(!c.flags().contains(StatusFlags::RAMPING));

    // The process follows the ramp in, then converges as usual.
    let (temps, _) = run_closed_loop(&mut c, &mut tank, 15_000);
    let final_error = (temps[temps.len() - 1] - TARGET).abs();
    assert!(
        final_error < 0.1,
        "loop did not converge after the ramp: final error {final_error:.4} °C"
    );
}
