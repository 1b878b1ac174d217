//! Controller mode machine: Manual ↔ Automatic, with a latched Fault state.
//!
//! Fault entry is allowed from anywhere (repeated sensor faults, output
//! stuck at a rail with a large error). Fault exit requires an explicit
//! external acknowledgment and always lands in Manual, never straight back
//! into Automatic.

use serde::{Deserialize, Serialize};

/// Controller operating mode.
///
/// Only one mode is active at any time. `Fault` exits only via an
/// explicit acknowledgment back to `Manual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlMode {
    /// Operator drives the output directly; the loop only tracks.
    Manual = 0,
    /// Closed-loop regulation.
    Automatic = 1,
    /// Latched fault; output forced to the safe default.
    Fault = 2,
}

impl ControlMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Manual),
            1 => Some(Self::Automatic),
            2 => Some(Self::Fault),
            _ => None,
        }
    }
}

impl Default for ControlMode {
    fn default() -> Self {
        Self::Manual
    }
}

/// Event that can trigger a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// Operator enables closed-loop regulation.
    EnableAutomatic,
    /// Operator takes the loop back.
    ManualOverride,
    /// Sensor-fault streak or actuator-health heuristic tripped.
    FaultDetected,
    /// Explicit external acknowledgment of a latched fault.
    AcknowledgeFault,
}

/// Result of a mode transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded — new mode.
    Ok(ControlMode),
    /// Transition rejected — reason.
    Rejected(&'static str),
}

/// Mode machine holding the current mode.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: ControlMode,
}

impl ModeMachine {
    /// Start in Manual; automatic regulation is always opt-in.
    pub const fn new() -> Self {
        Self {
            mode: ControlMode::Manual,
        }
    }

    /// Current mode.
    #[inline]
    pub const fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: ModeEvent) -> TransitionResult {
        use ControlMode::*;
        use ModeEvent::*;

        let next = match (self.mode, event) {
            (Manual, EnableAutomatic) => Automatic,
            (Automatic, ManualOverride) => Manual,

            // Fault entry is valid from anywhere, including Fault itself.
            (_, FaultDetected) => Fault,

            // Fault exits to Manual only; re-enabling Automatic is a
            // separate deliberate step after the operator has looked.
            (Fault, AcknowledgeFault) => Manual,

            _ => {
                return TransitionResult::Rejected(invalid_transition_reason(self.mode, event));
            }
        };

        self.mode = next;
        TransitionResult::Ok(next)
    }

    /// Latch Fault directly (tick-path detection, no event plumbing).
    #[inline]
    pub fn force_fault(&mut self) {
        self.mode = ControlMode::Fault;
    }

    /// True while closed-loop regulation is active.
    #[inline]
    pub const fn is_automatic(&self) -> bool {
        matches!(self.mode, ControlMode::Automatic)
    }

    /// True while a fault is latched.
    #[inline]
    pub const fn is_fault(&self) -> bool {
        matches!(self.mode, ControlMode::Fault)
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_transition_reason(mode: ControlMode, event: ModeEvent) -> &'static str {
    use ControlMode::*;
    use ModeEvent::*;
    match (mode, event) {
        (Fault, EnableAutomatic) => "Fault: acknowledge before re-enabling automatic",
        (Fault, ManualOverride) => "Fault: acknowledge required, override has no effect",
        (_, AcknowledgeFault) => "no fault latched",
        (Automatic, EnableAutomatic) => "already in Automatic",
        (Manual, ManualOverride) => "already in Manual",
        _ => "invalid event for current mode",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
