//! Control engine root.
//!
//! PID with derivative-on-measurement + setpoint ramp + disturbance
//! feed-forward. Each component is activated/deactivated by setting its
//! gain or rate parameter to zero.

pub mod feedforward;
pub mod pid;
pub mod ramp;
