//! # Reef Control Library
//!
//! Adaptive regulation core for closed-loop environmental control
//! (aquarium temperature and chemistry). Provides a deterministic control
//! tick that ramps the setpoint, evaluates a PID with derivative-on-
//! measurement filtering and two-stage anti-windup, adds disturbance
//! feed-forward, and scores its own performance over rolling windows.
//! A lower-priority adaptation worker learns per-context gains from those
//! scores and hands them back through a lock-free cell.
//!
//! ## Execution Contexts
//!
//! 1. **Control tick** — fixed period, never blocks, owns all PID state
//! 2. **Adaptation worker** — best effort, owns the lookup table and store
//!
//! ## Zero-Allocation Tick
//!
//! All tick-path state is pre-allocated at startup: streaming window
//! accumulators, a fixed-capacity steady-state tail ring, and plain value
//! structs. The tick performs zero heap allocations.

#![deny(clippy::disallowed_types)]

pub mod control;
pub mod controller;
pub mod mode;
pub mod perf;
pub mod runner;
pub mod tune;
