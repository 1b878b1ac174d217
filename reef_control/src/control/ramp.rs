//! Bounded-rate setpoint ramp.
//!
//! Converts an instantaneous target change into a trajectory the process
//! can actually follow, so a 2-degree setpoint jump does not slam the
//! heater to full duty. Rate 0 disables ramping (instant tracking).

/// Ramp state: the setpoint the evaluator currently chases.
#[derive(Debug, Clone, Copy)]
pub struct SetpointRamp {
    current: f64,
}

impl SetpointRamp {
    /// Start at `initial` (typically the last known measurement).
    pub const fn new(initial: f64) -> Self {
        Self { current: initial }
    }

    /// Ramped value the evaluator treats as its target.
    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Snap directly to `value` (mode transitions).
    #[inline]
    pub fn snap_to(&mut self, value: f64) {
        self.current = value;
    }

    /// Advance one tick toward `true_target`.
    ///
    /// Within `rate × dt` of the target the ramp snaps (arrival); otherwise
    /// it steps by exactly `±rate × dt`. A non-positive rate tracks the
    /// target instantaneously.
    #[inline]
    pub fn advance(&mut self, true_target: f64, rate: f64, dt: f64) -> f64 {
        if rate <= 0.0 || dt <= 0.0 {
            self.current = true_target;
            return self.current;
        }
        let max_step = rate * dt;
        let delta = true_target - self.current;
        if delta.abs() <= max_step {
            self.current = true_target;
        } else {
            self.current += max_step.copysign(delta);
        }
        self.current
    }

    /// True once the ramp sits exactly on the target.
    #[inline]
    pub fn arrived(&self, true_target: f64) -> bool {
        self.current == true_target
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.1;

    #[test]
    fn steps_toward_target_at_rate() {
        let mut ramp = SetpointRamp::new(20.0);
        let v = ramp.advance(25.0, 0.5, DT);
        assert!((v - 20.05).abs() < 1e-12);
    }

    #[test]
    fn snaps_on_arrival() {
        let mut ramp = SetpointRamp::new(24.96);
        let v = ramp.advance(25.0, 0.5, DT);
        assert_eq!(v, 25.0);
        assert!(ramp.arrived(25.0));
    }

    #[test]
    fn monotonic_and_bounded_arrival() {
        let mut ramp = SetpointRamp::new(20.0);
        let target = 25.0;
        let rate = 0.5;
        let max_ticks = ((target - 20.0_f64).abs() / (rate * DT)).ceil() as usize;
        let mut prev = ramp.current();
        let mut arrived_at = None;
        for tick in 1..=max_ticks {
            let v = ramp.advance(target, rate, DT);
            assert!(v >= prev, "ramp moved backward at tick {tick}");
            assert!(v <= target + 1e-12);
            prev = v;
            if v == target {
                arrived_at = Some(tick);
                break;
            }
        }
        let arrived_at = arrived_at.expect("ramp never arrived");
        assert!(arrived_at <= max_ticks);
    }

    #[test]
    fn descends_toward_lower_target() {
        let mut ramp = SetpointRamp::new(25.0);
        let v = ramp.advance(20.0, 0.5, DT);
        assert!((v - 24.95).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_tracks_instantly() {
        let mut ramp = SetpointRamp::new(20.0);
        assert_eq!(ramp.advance(30.0, 0.0, DT), 30.0);
    }

    #[test]
    fn target_move_mid_ramp_reverses_cleanly() {
        let mut ramp = SetpointRamp::new(20.0);
        for _ in 0..10 {
            ramp.advance(25.0, 0.5, DT);
        }
        let high_water = ramp.current();
        let v = ramp.advance(18.0, 0.5, DT);
        assert!(v < high_water);
    }
}
