//! Bounded sample history with CSV export.

use std::collections::VecDeque;
use std::fmt::Write as _;

use reef::sample::PerformanceSample;

/// Header row of an exported history.
pub const CSV_HEADER: &str =
    "timestamp,ambient,hour,season,scale,settling_s,overshoot_pct,steady_state_error,variance,score";

/// Ring of the most recent performance samples.
///
/// Keeps at most `capacity` samples, dropping the oldest first. Exists for
/// operator export and post-hoc tuning analysis; nothing in the adaptation
/// path reads back from it.
pub struct SampleHistory {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
    total_seen: u64,
}

impl SampleHistory {
    /// Create a history holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_seen: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: PerformanceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_seen += 1;
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples ever pushed, including evicted ones.
    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<&PerformanceSample> {
        self.samples.back()
    }

    /// Oldest-first iteration over the retained samples.
    pub fn iter(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }

    /// Render the retained samples as CSV, header included.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 * (self.samples.len() + 1));
        out.push_str(CSV_HEADER);
        out.push('\n');
        for s in &self.samples {
            // writeln! to a String cannot fail.
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{}",
                s.timestamp_s,
                s.context.ambient,
                s.context.hour,
                s.context.season.name(),
                s.context.scale,
                s.settling_time_s,
                s.max_overshoot_pct,
                s.steady_state_error,
                s.output_variance,
                s.score
            );
        }
        out
    }
}
