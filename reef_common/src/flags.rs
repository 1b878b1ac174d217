//! Per-tick controller status bitflags.
//!
//! Compact condition word updated by the evaluator every tick. Flags marked
//! CRITICAL feed the fault heuristics that may latch the controller into
//! `Fault` mode.

use bitflags::bitflags;

bitflags! {
    /// Controller status flags.
    ///
    /// CRITICAL flags (counted toward the Fault transition): SENSOR_FAULT,
    /// SAFETY_CUTOFF.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// Measured input was NaN/Inf; last valid output held. **CRITICAL**.
        const SENSOR_FAULT   = 0x0001;
        /// Output clamped at the upper rail.
        const SATURATED_HIGH = 0x0002;
        /// Output clamped at the lower rail.
        const SATURATED_LOW  = 0x0004;
        /// Error currently inside the settled band.
        const SETTLED        = 0x0008;
        /// Ramped target still moving toward the true target.
        const RAMPING        = 0x0010;
        /// Input exceeded target + safety margin; output forced to 0. **CRITICAL**.
        const SAFETY_CUTOFF  = 0x0020;
    }
}

impl StatusFlags {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self =
        Self::from_bits_truncate(Self::SENSOR_FAULT.bits() | Self::SAFETY_CUTOFF.bits());

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }

    /// Returns true if the output sits at either rail.
    #[inline]
    pub const fn is_saturated(&self) -> bool {
        self.intersects(Self::SATURATED_HIGH.union(Self::SATURATED_LOW))
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::empty()
    }
}
