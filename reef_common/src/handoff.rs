//! Single-writer/single-reader gain handoff cell.
//!
//! The adaptation worker publishes complete `(kp, ki, kd)` triples; the
//! control loop picks them up at tick boundaries. The cell is a seqlock:
//!
//! - Odd sequence = publish in progress (reader must retry)
//! - Even sequence = committed (reader can safely read the triple)
//!
//! The reader never blocks and never observes a torn triple. Exactly one
//! writer may call [`GainCell::publish`]; that contract is held by
//! construction (the worker owns the write side).

use std::sync::atomic::{AtomicU64, Ordering, fence};

use static_assertions::const_assert_eq;

use crate::params::ControlParameters;

/// Lock-free gain cell, cache-line aligned so the sequence word and the
/// payload never share a line with unrelated data.
#[derive(Debug)]
#[repr(C, align(64))]
pub struct GainCell {
    seq: AtomicU64,
    kp_bits: AtomicU64,
    ki_bits: AtomicU64,
    kd_bits: AtomicU64,
}

const_assert_eq!(core::mem::size_of::<GainCell>(), 64);
const_assert_eq!(core::mem::align_of::<GainCell>(), 64);

impl GainCell {
    /// Create a cell seeded with `initial`; generation starts at 0.
    pub fn new(initial: ControlParameters) -> Self {
        Self {
            seq: AtomicU64::new(0),
            kp_bits: AtomicU64::new(initial.kp.to_bits()),
            ki_bits: AtomicU64::new(initial.ki.to_bits()),
            kd_bits: AtomicU64::new(initial.kd.to_bits()),
        }
    }

    /// Publish a complete triple. Single writer only.
    pub fn publish(&self, params: &ControlParameters) {
        let s = self.seq.load(Ordering::Relaxed);
        self.seq.store(s.wrapping_add(1), Ordering::Relaxed); // odd: in progress
        fence(Ordering::Release);
        self.kp_bits.store(params.kp.to_bits(), Ordering::Relaxed);
        self.ki_bits.store(params.ki.to_bits(), Ordering::Relaxed);
        self.kd_bits.store(params.kd.to_bits(), Ordering::Relaxed);
        self.seq.store(s.wrapping_add(2), Ordering::Release); // even: committed
    }

    /// Read the last committed triple together with its generation number.
    ///
    /// Lock-free and wait-bounded in practice: a retry only happens while a
    /// publish is mid-flight, and a publish is four stores.
    pub fn snapshot(&self) -> (ControlParameters, u64) {
        loop {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 != 0 {
                core::hint::spin_loop();
                continue;
            }
            let kp = f64::from_bits(self.kp_bits.load(Ordering::Relaxed));
            let ki = f64::from_bits(self.ki_bits.load(Ordering::Relaxed));
            let kd = f64::from_bits(self.kd_bits.load(Ordering::Relaxed));
            fence(Ordering::Acquire);
            let s2 = self.seq.load(Ordering::Relaxed);
            if s1 == s2 {
                return (ControlParameters::new(kp, ki, kd), s1 >> 1);
            }
        }
    }

    /// Generation of the last committed publish (0 = initial seed).
    ///
    /// One atomic load; the control loop polls this each tick and only
    /// takes a full [`GainCell::snapshot`] when the generation moved.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.seq.load(Ordering::Acquire) >> 1
    }
}
