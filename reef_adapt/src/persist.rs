//! Table and calibration round-trips through a [`KvStore`].
//!
//! Every learned context is one store value under
//! `<namespace>/gains/<encoded key>`, calibration lives at
//! `<namespace>/calibration`. Loading is strictly best-effort: an empty
//! store is a normal first boot and a corrupt value costs exactly that one
//! entry, never the rest of the table.

use serde::{Deserialize, Serialize};
use tracing::warn;

use reef::config::FeedForwardSection;
use reef::context::ContextKey;

use crate::store::{KvStore, StoreResult};
use crate::table::{GainTable, LookupEntry};

fn gains_key(namespace: &str, key: &ContextKey) -> String {
    format!("{namespace}/gains/{}", key.encode())
}

fn gains_prefix(namespace: &str) -> String {
    format!("{namespace}/gains/")
}

fn calibration_key(namespace: &str) -> String {
    format!("{namespace}/calibration")
}

/// Installation-specific trims persisted alongside the table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Reference temperature the input sensor was trimmed against.
    pub reference_temp: f64,
    /// Installed feed-forward weight of the dissolved-solids trend.
    pub dissolved_solids_weight: f64,
    /// Installed feed-forward weight of the ambient differential.
    pub ambient_weight: f64,
    /// Installed feed-forward weight of the chemistry level.
    pub chemistry_weight: f64,
}

impl Default for CalibrationData {
    fn default() -> Self {
        let ff = FeedForwardSection::default();
        Self {
            reference_temp: 25.0,
            dissolved_solids_weight: ff.dissolved_solids_influence,
            ambient_weight: ff.ambient_influence,
            chemistry_weight: ff.chemistry_influence,
        }
    }
}

/// Write every table entry into the store. Returns the number written.
pub fn save_table(
    store: &mut dyn KvStore,
    namespace: &str,
    table: &GainTable,
) -> StoreResult<usize> {
    let mut written = 0;
    for (key, entry) in table.entries() {
        let bytes = serde_json::to_vec(entry)?;
        store.put(&gains_key(namespace, key), &bytes)?;
        written += 1;
    }
    Ok(written)
}

/// Load every parseable entry under the namespace into `table`.
///
/// An empty store loads nothing and is not an error. Entries whose key does
/// not decode, whose JSON does not parse, or whose gains fail validation are
/// logged and skipped. Returns the number loaded.
pub fn load_table(
    store: &dyn KvStore,
    namespace: &str,
    table: &mut GainTable,
) -> StoreResult<usize> {
    let prefix = gains_prefix(namespace);
    let mut loaded = 0;
    for store_key in store.keys(&prefix)? {
        let Some(encoded) = store_key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        let Some(key) = ContextKey::decode(encoded) else {
            warn!(store_key, "skipping entry with unparseable context key");
            continue;
        };
        let bytes = match store.get(&store_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                warn!(store_key, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let entry: LookupEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(store_key, error = %e, "skipping corrupt entry");
                continue;
            }
        };
        if entry.gains.validate().is_err()
            || !entry.confidence.is_finite()
            || !entry.avg_score.is_finite()
        {
            warn!(store_key, "skipping entry with invalid gains or metrics");
            continue;
        }
        table.insert(key, entry);
        loaded += 1;
    }
    Ok(loaded)
}

/// Persist the calibration record.
pub fn save_calibration(
    store: &mut dyn KvStore,
    namespace: &str,
    calibration: &CalibrationData,
) -> StoreResult<()> {
    let bytes = serde_json::to_vec(calibration)?;
    store.put(&calibration_key(namespace), &bytes)
}

/// Fetch the calibration record; `None` when absent or unreadable.
pub fn load_calibration(store: &dyn KvStore, namespace: &str) -> Option<CalibrationData> {
    let key = calibration_key(namespace);
    let bytes = match store.get(&key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "calibration record unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(calibration) => Some(calibration),
        Err(e) => {
            warn!(error = %e, "calibration record corrupt; using defaults");
            None
        }
    }
}

/// Remove every key under the namespace (operator reset). Returns the
/// number of keys removed.
pub fn clear_namespace(store: &mut dyn KvStore, namespace: &str) -> StoreResult<usize> {
    let keys = store.keys(&format!("{namespace}/"))?;
    let removed = keys.len();
    for key in &keys {
        store.remove(key)?;
    }
    Ok(removed)
}
