//! Confidence-weighted gain blending against the lookup table.
//!
//! The adapter never hands back learned gains verbatim. It moves the current
//! working triple TOWARD the table entry by `confidence * blend_cap`, so even
//! a fully trusted entry contributes at most the cap (0.7 by default) and a
//! bad learned triple can never yank the loop in one step.

use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use reef::config::AdaptationSection;
use reef::context::ContextKey;
use reef::params::{ControlParameters, GainBounds};

use crate::table::GainTable;

/// How long a lookup may wait on the table lock before the adapter gives up
/// and keeps the current gains for this round.
const LOOKUP_TIMEOUT: Duration = Duration::from_millis(5);

/// Last blend decision, reused while the inputs and table plausibly match.
struct CachedBlend {
    key: ContextKey,
    current: ControlParameters,
    result: ControlParameters,
    computed_at_s: u64,
}

/// Blends current working gains toward learned ones.
pub struct GainAdapter {
    min_confidence: f64,
    blend_cap: f64,
    bounds: GainBounds,
    cache_validity_s: u64,
    cache: Option<CachedBlend>,
    cache_hits: u64,
    cache_misses: u64,
}

impl GainAdapter {
    /// Create an adapter with the given trust knobs and absolute bounds.
    pub fn new(cfg: &AdaptationSection, bounds: GainBounds) -> Self {
        Self {
            min_confidence: cfg.min_confidence,
            blend_cap: cfg.blend_cap,
            bounds,
            cache_validity_s: cfg.cache_validity_secs,
            cache: None,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Produce the gains to run with for context `key`.
    ///
    /// Falls back to `current` unchanged when the context has no entry, the
    /// entry's confidence is below the floor, or the table lock cannot be
    /// taken within [`LOOKUP_TIMEOUT`]. Otherwise blends toward the learned
    /// triple by `confidence * blend_cap` and clamps into the absolute
    /// bounds. With no table change in between, repeated calls return the
    /// same triple (memoized for `cache_validity_secs`).
    pub fn adapt(
        &mut self,
        current: ControlParameters,
        key: &ContextKey,
        table: &RwLock<GainTable>,
        now_s: u64,
    ) -> ControlParameters {
        if let Some(cached) = &self.cache {
            if cached.key == *key
                && cached.current == current
                && now_s.saturating_sub(cached.computed_at_s) <= self.cache_validity_s
            {
                self.cache_hits += 1;
                return cached.result;
            }
        }

        let entry = match table.try_read_for(LOOKUP_TIMEOUT) {
            Some(guard) => guard.lookup(key),
            None => {
                // Persistence may be flushing; stay on the current triple.
                warn!("gain table lock timed out; keeping current gains");
                return current;
            }
        };

        let result = match entry {
            Some(entry) if entry.confidence >= self.min_confidence => {
                let weight = entry.confidence * self.blend_cap;
                let blended = current.blend_toward(&entry.gains, weight).clamp_to(&self.bounds);
                debug!(
                    confidence = entry.confidence,
                    weight,
                    kp = blended.kp,
                    ki = blended.ki,
                    kd = blended.kd,
                    "blended toward learned gains"
                );
                blended
            }
            Some(entry) => {
                debug!(
                    confidence = entry.confidence,
                    floor = self.min_confidence,
                    "entry below confidence floor; keeping current gains"
                );
                current
            }
            None => current,
        };

        self.cache_misses += 1;
        self.cache = Some(CachedBlend {
            key: *key,
            current,
            result,
            computed_at_s: now_s,
        });
        result
    }

    /// Blend decisions served from the memo cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Blend decisions freshly computed against the table.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }
}
