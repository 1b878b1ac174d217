//! PID gain triple and absolute gain bounds.
//!
//! `ControlParameters` is the unit of exchange between the control loop,
//! the lookup table and the adaptation worker: it is always handed over as
//! a complete triple, never field by field.

use serde::{Deserialize, Serialize};

/// PID gain triple.
///
/// All gains are non-negative; negative values are rejected by
/// [`ControlParameters::validate`] at every boundary (config load, store
/// load, adapter output).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Proportional gain.
    #[serde(default = "default_kp")]
    pub kp: f64,
    /// Integral gain (0 = disabled).
    #[serde(default = "default_ki")]
    pub ki: f64,
    /// Derivative gain (0 = disabled).
    #[serde(default = "default_kd")]
    pub kd: f64,
}

fn default_kp() -> f64 {
    2.0
}

fn default_ki() -> f64 {
    0.1
}

fn default_kd() -> f64 {
    1.0
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
        }
    }
}

impl ControlParameters {
    /// Create a triple, without validation.
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Returns true if all gains are finite (not NaN, not Inf).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()
    }

    /// Reject non-finite or negative gains.
    pub fn validate(&self) -> Result<(), String> {
        if !self.is_finite() {
            return Err(format!(
                "gains must be finite: kp={} ki={} kd={}",
                self.kp, self.ki, self.kd
            ));
        }
        if self.kp < 0.0 || self.ki < 0.0 || self.kd < 0.0 {
            return Err(format!(
                "gains must be non-negative: kp={} ki={} kd={}",
                self.kp, self.ki, self.kd
            ));
        }
        Ok(())
    }

    /// Linear blend toward `other` by weight `w` ∈ [0,1].
    ///
    /// `w = 0` returns `self` unchanged, `w = 1` returns `other`.
    #[inline]
    pub fn blend_toward(&self, other: &Self, w: f64) -> Self {
        let w = w.clamp(0.0, 1.0);
        Self {
            kp: self.kp * (1.0 - w) + other.kp * w,
            ki: self.ki * (1.0 - w) + other.ki * w,
            kd: self.kd * (1.0 - w) + other.kd * w,
        }
    }

    /// Clamp each gain into its absolute bound.
    #[inline]
    pub fn clamp_to(&self, bounds: &GainBounds) -> Self {
        Self {
            kp: self.kp.clamp(bounds.kp_min, bounds.kp_max),
            ki: self.ki.clamp(bounds.ki_min, bounds.ki_max),
            kd: self.kd.clamp(bounds.kd_min, bounds.kd_max),
        }
    }
}

/// Absolute per-gain bounds applied to every adapted or tuned triple
/// before it reaches the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainBounds {
    #[serde(default = "default_kp_min")]
    pub kp_min: f64,
    #[serde(default = "default_kp_max")]
    pub kp_max: f64,
    #[serde(default = "default_ki_min")]
    pub ki_min: f64,
    #[serde(default = "default_ki_max")]
    pub ki_max: f64,
    #[serde(default = "default_kd_min")]
    pub kd_min: f64,
    #[serde(default = "default_kd_max")]
    pub kd_max: f64,
}

fn default_kp_min() -> f64 {
    0.1
}

fn default_kp_max() -> f64 {
    20.0
}

fn default_ki_min() -> f64 {
    0.01
}

fn default_ki_max() -> f64 {
    5.0
}

fn default_kd_min() -> f64 {
    0.01
}

fn default_kd_max() -> f64 {
    10.0
}

impl Default for GainBounds {
    fn default() -> Self {
        Self {
            kp_min: default_kp_min(),
            kp_max: default_kp_max(),
            ki_min: default_ki_min(),
            ki_max: default_ki_max(),
            kd_min: default_kd_min(),
            kd_max: default_kd_max(),
        }
    }
}

impl GainBounds {
    pub fn validate(&self) -> Result<(), String> {
        for (name, min, max) in [
            ("kp", self.kp_min, self.kp_max),
            ("ki", self.ki_min, self.ki_max),
            ("kd", self.kd_min, self.kd_max),
        ] {
            if !min.is_finite() || !max.is_finite() {
                return Err(format!("{name} bounds must be finite"));
            }
            if min < 0.0 {
                return Err(format!("{name}_min must be non-negative, got {min}"));
            }
            if min > max {
                return Err(format!("{name}_min {min} exceeds {name}_max {max}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gains_validate() {
        let p = ControlParameters::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.kp, 2.0);
        assert_eq!(p.ki, 0.1);
        assert_eq!(p.kd, 1.0);
    }

    #[test]
    fn negative_gain_rejected() {
        let p = ControlParameters::new(1.0, -0.1, 0.5);
        assert!(p.validate().is_err());
    }

    #[test]
    fn non_finite_gain_rejected() {
        let p = ControlParameters::new(f64::NAN, 0.1, 0.5);
        assert!(p.validate().is_err());
        let p = ControlParameters::new(1.0, f64::INFINITY, 0.5);
        assert!(p.validate().is_err());
    }

    #[test]
    fn blend_endpoints() {
        let a = ControlParameters::new(1.0, 0.1, 0.5);
        let b = ControlParameters::new(3.0, 0.3, 1.5);
        assert_eq!(a.blend_toward(&b, 0.0), a);
        assert_eq!(a.blend_toward(&b, 1.0), b);
        let mid = a.blend_toward(&b, 0.5);
        assert!((mid.kp - 2.0).abs() < 1e-12);
        assert!((mid.ki - 0.2).abs() < 1e-12);
        assert!((mid.kd - 1.0).abs() < 1e-12);
    }

    #[test]
    fn blend_weight_is_clamped() {
        let a = ControlParameters::new(1.0, 0.1, 0.5);
        let b = ControlParameters::new(3.0, 0.3, 1.5);
        assert_eq!(a.blend_toward(&b, 2.0), b);
        assert_eq!(a.blend_toward(&b, -1.0), a);
    }

    #[test]
    fn clamp_to_bounds() {
        let bounds = GainBounds::default();
        let wild = ControlParameters::new(100.0, 0.0, 50.0);
        let clamped = wild.clamp_to(&bounds);
        assert_eq!(clamped.kp, 20.0);
        assert_eq!(clamped.ki, 0.01);
        assert_eq!(clamped.kd, 10.0);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut b = GainBounds::default();
        b.kp_min = 5.0;
        b.kp_max = 1.0;
        assert!(b.validate().is_err());
    }
}
