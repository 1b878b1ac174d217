//! Reef Common Library
//!
//! Shared types for the reefctl workspace: control parameters, environmental
//! context features, performance samples, status flags, the TOML
//! configuration model, and the lock-free gain handoff cell used between the
//! control loop and the adaptation worker.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide numeric limits and default paths
//! - [`params`] - PID gain triple and absolute gain bounds
//! - [`context`] - Season calculation and context-key discretization
//! - [`sample`] - Per-window performance sample
//! - [`flags`] - Per-tick controller status bitflags
//! - [`config`] - TOML configuration model with validation
//! - [`handoff`] - Single-writer/single-reader gain cell (seqlock)

pub mod config;
pub mod consts;
pub mod context;
pub mod flags;
pub mod handoff;
pub mod params;
pub mod sample;
