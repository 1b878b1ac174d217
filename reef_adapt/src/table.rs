//! Context-keyed gain lookup table.
//!
//! One entry per discretized operating context. Entries learn by exponential
//! moving average, pulled harder toward gains that scored better than the
//! context's running average, and carry a confidence value the adapter uses
//! to decide how much of the learned triple to trust.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use reef::config::AdaptationSection;
use reef::consts::CONFIDENCE_COUNT_OFFSET;
use reef::context::ContextKey;
use reef::params::ControlParameters;
use reef::sample::PerformanceSample;

/// Retention of the per-entry running score average.
const SCORE_EMA_RETAIN: f64 = 0.9;

/// One learned cell of the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    /// Learned gain triple for this context.
    pub gains: ControlParameters,
    /// Trust in `gains`, ∈ [0,1].
    pub confidence: f64,
    /// Samples folded into this entry.
    pub sample_count: u32,
    /// Running average of sample scores (EMA).
    pub avg_score: f64,
    /// Wall-clock time of the last contributing sample [Unix seconds].
    pub last_update_s: u64,
}

/// Per-context gain memory.
///
/// Entries are only ever added or aged, never removed: a context that was
/// worth learning once stays addressable, and persistence round-trips the
/// whole map.
pub struct GainTable {
    entries: HashMap<ContextKey, LookupEntry>,
    better_weight: f64,
    worse_weight: f64,
    min_trust_samples: u32,
    confidence_ceiling: f64,
    stale_after_secs: u64,
    stale_decay: f64,
}

impl GainTable {
    /// Create an empty table with the given learning knobs.
    pub fn new(cfg: &AdaptationSection) -> Self {
        Self {
            entries: HashMap::new(),
            better_weight: cfg.better_weight,
            worse_weight: cfg.worse_weight,
            min_trust_samples: cfg.min_trust_samples,
            confidence_ceiling: cfg.confidence_ceiling,
            stale_after_secs: cfg.stale_after_secs,
            stale_decay: cfg.stale_decay,
        }
    }

    /// Confidence law: `count / (count + offset)`, held at 0.5 until the
    /// entry has seen `min_trust_samples`, and never above the ceiling.
    ///
    /// First sample lands at 0.1, the hold binds from the 9th sample on, and
    /// with the default ceiling the law tops out at 0.9 around count 81.
    fn confidence_for(&self, count: u32) -> f64 {
        let base = count as f64 / (count + CONFIDENCE_COUNT_OFFSET) as f64;
        let gated = if count < self.min_trust_samples {
            base.min(0.5)
        } else {
            base
        };
        gated.min(self.confidence_ceiling)
    }

    /// Fold one performance sample into the entry for `key`.
    ///
    /// A first sample seeds the entry with its gains verbatim. Later samples
    /// move the learned gains by EMA: the sample's score is compared against
    /// the entry's running average BEFORE that average absorbs it, and the
    /// blend weight is `better_weight` when the sample scored at least as
    /// well, `worse_weight` otherwise. Returns the updated entry.
    pub fn upsert(&mut self, key: ContextKey, sample: &PerformanceSample) -> LookupEntry {
        let updated = match self.entries.get(&key) {
            None => LookupEntry {
                gains: sample.gains,
                confidence: self.confidence_for(1),
                sample_count: 1,
                avg_score: sample.score,
                last_update_s: sample.timestamp_s,
            },
            Some(entry) => {
                let weight = if sample.score >= entry.avg_score {
                    self.better_weight
                } else {
                    self.worse_weight
                };
                let count = entry.sample_count.saturating_add(1);
                LookupEntry {
                    gains: entry.gains.blend_toward(&sample.gains, weight),
                    confidence: self.confidence_for(count),
                    sample_count: count,
                    avg_score: SCORE_EMA_RETAIN * entry.avg_score
                        + (1.0 - SCORE_EMA_RETAIN) * sample.score,
                    last_update_s: sample.timestamp_s,
                }
            }
        };
        self.entries.insert(key, updated);
        updated
    }

    /// Learned entry for `key`, if any.
    pub fn lookup(&self, key: &ContextKey) -> Option<LookupEntry> {
        self.entries.get(key).copied()
    }

    /// Insert an entry directly (store load path). Confidence is clamped
    /// into [0,1]; the stored value may predate a config change.
    pub fn insert(&mut self, key: ContextKey, mut entry: LookupEntry) {
        entry.confidence = entry.confidence.clamp(0.0, 1.0);
        self.entries.insert(key, entry);
    }

    /// Age out contexts that have not seen a sample in `stale_after_secs`:
    /// each sweep multiplies their confidence by `stale_decay`. The sweep
    /// cadence is the caller's policy; the entry itself is never removed.
    /// Returns the number of entries decayed.
    pub fn decay_stale(&mut self, now_s: u64) -> usize {
        let mut decayed = 0;
        for entry in self.entries.values_mut() {
            if now_s.saturating_sub(entry.last_update_s) > self.stale_after_secs {
                entry.confidence *= self.stale_decay;
                decayed += 1;
            }
        }
        decayed
    }

    /// Number of learned contexts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no context has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries (persistence and diagnostics).
    pub fn entries(&self) -> impl Iterator<Item = (&ContextKey, &LookupEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef::context::{ContextFeatures, Season};

    fn key() -> ContextKey {
        ContextKey {
            ambient_band: 10,
            hour_block: 2,
            season: Season::Summer,
        }
    }

    fn sample(score: f64, gains: ControlParameters, timestamp_s: u64) -> PerformanceSample {
        PerformanceSample {
            timestamp_s,
            context: ContextFeatures {
                ambient: 21.0,
                hour: 14,
                season: Season::Summer,
                scale: 1.0,
            },
            gains,
            settling_time_s: 60.0,
            max_overshoot_pct: 2.0,
            steady_state_error: 0.01,
            output_variance: 0.5,
            score,
            ticks: 600,
        }
    }

    #[test]
    fn first_sample_seeds_entry_verbatim() {
        let mut table = GainTable::new(&AdaptationSection::default());
        let gains = ControlParameters::new(2.0, 0.1, 1.0);
        let entry = table.upsert(key(), &sample(50.0, gains, 1_000));

        assert_eq!(entry.gains, gains);
        assert_eq!(entry.sample_count, 1);
        assert_eq!(entry.avg_score, 50.0);
        assert_eq!(entry.last_update_s, 1_000);
        // 1 / (1 + 9)
        assert!((entry.confidence - 0.1).abs() < 1e-12);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn better_sample_pulls_at_seven_tenths() {
        let mut table = GainTable::new(&AdaptationSection::default());
        table.upsert(key(), &sample(50.0, ControlParameters::new(2.0, 0.1, 1.0), 0));

        // 80 beats the running average of 50, so weight 0.7:
        // kp = 2*0.3 + 4*0.7 = 3.4, avg = 0.9*50 + 0.1*80 = 53.
        let entry = table.upsert(key(), &sample(80.0, ControlParameters::new(4.0, 0.3, 2.0), 10));
        assert!((entry.gains.kp - 3.4).abs() < 1e-12);
        assert!((entry.gains.ki - 0.24).abs() < 1e-12);
        assert!((entry.gains.kd - 1.7).abs() < 1e-12);
        assert!((entry.avg_score - 53.0).abs() < 1e-12);
        assert_eq!(entry.sample_count, 2);
    }

    #[test]
    fn worse_sample_pulls_at_three_tenths() {
        let mut table = GainTable::new(&AdaptationSection::default());
        table.upsert(key(), &sample(50.0, ControlParameters::new(2.0, 0.1, 1.0), 0));

        // 20 loses to the running average of 50, so weight 0.3:
        // kp = 2*0.7 + 4*0.3 = 2.6.
        let entry = table.upsert(key(), &sample(20.0, ControlParameters::new(4.0, 0.3, 2.0), 10));
        assert!((entry.gains.kp - 2.6).abs() < 1e-12);
        assert!((entry.avg_score - 47.0).abs() < 1e-12);
    }

    #[test]
    fn confidence_holds_at_half_then_follows_the_law() {
        let mut table = GainTable::new(&AdaptationSection::default());
        let gains = ControlParameters::new(2.0, 0.1, 1.0);

        let mut last = 0.0;
        for i in 0..120u32 {
            last = table.upsert(key(), &sample(50.0, gains, i as u64)).confidence;
            let count = i + 1;
            if count == 9 {
                // 9 / 18 reaches the hold exactly.
                assert!((last - 0.5).abs() < 1e-12);
            }
            if count == 49 {
                assert!((last - 0.5).abs() < 1e-12, "hold binds below 50 samples");
            }
            if count == 50 {
                assert!((last - 50.0 / 59.0).abs() < 1e-12, "law resumes at 50");
            }
        }
        // 120 / 129 ≈ 0.930 would exceed the ceiling.
        assert!((last - 0.9).abs() < 1e-12);
    }

    #[test]
    fn stale_entries_decay_but_are_never_removed() {
        let cfg = AdaptationSection::default();
        let mut table = GainTable::new(&cfg);
        table.upsert(key(), &sample(50.0, ControlParameters::new(2.0, 0.1, 1.0), 0));
        let fresh_key = ContextKey {
            ambient_band: 11,
            ..key()
        };
        let now = cfg.stale_after_secs + 100;
        table.upsert(fresh_key, &sample(60.0, ControlParameters::new(3.0, 0.2, 1.5), now));

        assert_eq!(table.decay_stale(now), 1);
        let stale = table.lookup(&key()).unwrap();
        assert!((stale.confidence - 0.1 * cfg.stale_decay).abs() < 1e-12);
        let fresh = table.lookup(&fresh_key).unwrap();
        assert!((fresh.confidence - 0.1).abs() < 1e-12);

        // Repeated sweeps keep aging the same entry toward zero trust.
        for _ in 0..200 {
            table.decay_stale(now);
        }
        let aged = table.lookup(&key()).unwrap();
        assert!(aged.confidence < 1e-6);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn insert_clamps_loaded_confidence() {
        let mut table = GainTable::new(&AdaptationSection::default());
        table.insert(
            key(),
            LookupEntry {
                gains: ControlParameters::new(2.0, 0.1, 1.0),
                confidence: 3.7,
                sample_count: 5,
                avg_score: 70.0,
                last_update_s: 0,
            },
        );
        assert_eq!(table.lookup(&key()).unwrap().confidence, 1.0);
    }
}
