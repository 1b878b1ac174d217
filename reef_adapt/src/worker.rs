//! The adaptation thread: ingest, learn, publish, persist.
//!
//! Runs beside the control loop and owns everything slow: the lookup table,
//! the store, the sample history and the adapter. Samples arrive over a
//! bounded channel; adapted gains leave through the lock-free cell. The
//! worker can stall on disk for as long as it likes without the control
//! loop ever noticing.
//!
//! Adaptation needs a context to look up, so until the first performance
//! window closes the worker only restores and persists state.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use reef::config::ControlConfig;
use reef::context::ContextKey;
use reef::handoff::GainCell;
use reef::sample::PerformanceSample;

use crate::adapter::GainAdapter;
use crate::history::SampleHistory;
use crate::persist::{self, CalibrationData};
use crate::store::KvStore;
use crate::table::GainTable;

/// Channel poll granularity; bounds shutdown latency.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How often stale contexts are aged.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSummary {
    /// Samples folded into the lookup table.
    pub samples_ingested: u64,
    /// Samples dropped for non-finite metrics.
    pub samples_rejected: u64,
    /// Gain triples published to the control loop.
    pub gains_published: u64,
    /// Contexts in the table at exit.
    pub contexts_learned: usize,
    /// Adapter memo-cache hits.
    pub cache_hits: u64,
    /// Adapter blend computations.
    pub cache_misses: u64,
}

/// Handle to a running adaptation worker.
pub struct WorkerHandle {
    table: Arc<RwLock<GainTable>>,
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<WorkerSummary>,
}

impl WorkerHandle {
    /// Shared view of the lookup table (diagnostics, export).
    pub fn table(&self) -> Arc<RwLock<GainTable>> {
        Arc::clone(&self.table)
    }

    /// Ask the worker to stop, wait for its final flush, and return its
    /// counters.
    pub fn shutdown(self) -> WorkerSummary {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.join.join() {
            Ok(summary) => summary,
            Err(_) => {
                warn!("adaptation worker panicked before shutdown");
                WorkerSummary::default()
            }
        }
    }
}

/// Spawn the adaptation worker.
///
/// `store` is where learned gains live across restarts; pass a
/// [`crate::store::MemoryStore`] when persistence is disabled. `export_csv`
/// writes the retained sample history on shutdown when set.
pub fn spawn_worker(
    cfg: &ControlConfig,
    store: Box<dyn KvStore>,
    gain_cell: Arc<GainCell>,
    sample_rx: Receiver<PerformanceSample>,
    export_csv: Option<PathBuf>,
) -> WorkerHandle {
    let table = Arc::new(RwLock::new(GainTable::new(&cfg.adaptation)));
    let shutdown = Arc::new(AtomicBool::new(false));

    let cfg = cfg.clone();
    let thread_table = Arc::clone(&table);
    let thread_shutdown = Arc::clone(&shutdown);
    let join = std::thread::spawn(move || {
        worker_loop(
            cfg,
            store,
            gain_cell,
            sample_rx,
            thread_table,
            thread_shutdown,
            export_csv,
        )
    });

    WorkerHandle {
        table,
        shutdown,
        join,
    }
}

fn worker_loop(
    cfg: ControlConfig,
    mut store: Box<dyn KvStore>,
    gain_cell: Arc<GainCell>,
    sample_rx: Receiver<PerformanceSample>,
    table: Arc<RwLock<GainTable>>,
    shutdown: Arc<AtomicBool>,
    export_csv: Option<PathBuf>,
) -> WorkerSummary {
    let namespace = cfg.persistence.namespace.clone();
    let persist_enabled = cfg.persistence.enabled;

    if persist_enabled {
        match store.stats() {
            Ok(stats) => info!(entries = stats.entries, bytes = stats.bytes, "gain store opened"),
            Err(e) => warn!(error = %e, "gain store stats unavailable"),
        }
        let mut guard = table.write();
        match persist::load_table(store.as_ref(), &namespace, &mut guard) {
            Ok(loaded) => info!(loaded, "lookup table restored"),
            Err(e) => warn!(error = %e, "could not read gain store; starting cold"),
        }
    }

    let calibration = match persist::load_calibration(store.as_ref(), &namespace) {
        Some(calibration) => calibration,
        None => {
            // Seed the record so installers have something to edit.
            let calibration = CalibrationData::default();
            if persist_enabled {
                if let Err(e) = persist::save_calibration(&mut *store, &namespace, &calibration) {
                    warn!(error = %e, "could not seed calibration record");
                }
            }
            calibration
        }
    };
    info!(reference_temp = calibration.reference_temp, "calibration active");

    let mut adapter = GainAdapter::new(&cfg.adaptation, cfg.controller.bounds);
    let mut history = SampleHistory::new(cfg.monitor.history_capacity);
    let mut summary = WorkerSummary::default();
    let mut unflushed: u32 = 0;
    let mut last_context: Option<ContextKey> = None;
    let cadence = Duration::from_secs(cfg.adaptation.cadence_secs.max(1));
    let mut last_adapt = Instant::now();
    let mut last_sweep = Instant::now();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match sample_rx.recv_timeout(POLL_INTERVAL) {
            Ok(sample) => {
                if !sample.is_finite() {
                    summary.samples_rejected += 1;
                    warn!("dropping sample with non-finite metrics");
                } else {
                    let key = sample
                        .context_key(cfg.context.ambient_band_width, cfg.context.hour_block_hours);
                    let entry = table.write().upsert(key, &sample);
                    last_context = Some(key);
                    history.push(sample);
                    summary.samples_ingested += 1;
                    unflushed += 1;
                    debug!(
                        key = %key.encode(),
                        score = sample.score,
                        confidence = entry.confidence,
                        samples = entry.sample_count,
                        "sample folded into table"
                    );
                    if persist_enabled && unflushed >= cfg.persistence.flush_every_samples {
                        flush_table(store.as_mut(), &namespace, &table);
                        unflushed = 0;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("sample channel closed; adaptation worker exiting");
                break;
            }
        }

        if cfg.adaptation.enabled && last_adapt.elapsed() >= cadence {
            last_adapt = Instant::now();
            if let Some(key) = last_context {
                let (current, _) = gain_cell.snapshot();
                let adapted = adapter.adapt(current, &key, &table, unix_now_s());
                if adapted != current {
                    gain_cell.publish(&adapted);
                    summary.gains_published += 1;
                    info!(
                        kp = adapted.kp,
                        ki = adapted.ki,
                        kd = adapted.kd,
                        "published adapted gains"
                    );
                }
            }
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            last_sweep = Instant::now();
            let decayed = table.write().decay_stale(unix_now_s());
            if decayed > 0 {
                info!(decayed, "aged stale contexts");
            }
        }
    }

    if persist_enabled {
        flush_table(store.as_mut(), &namespace, &table);
    }
    if let Some(path) = &export_csv {
        match std::fs::write(path, history.to_csv()) {
            Ok(()) => info!(
                path = %path.display(),
                samples = history.len(),
                "sample history exported"
            ),
            Err(e) => warn!(error = %e, "sample history export failed"),
        }
    }

    summary.contexts_learned = table.read().len();
    summary.cache_hits = adapter.cache_hits();
    summary.cache_misses = adapter.cache_misses();
    summary
}

fn flush_table(store: &mut dyn KvStore, namespace: &str, table: &RwLock<GainTable>) {
    let guard = table.read();
    match persist::save_table(store, namespace, &guard) {
        Ok(written) => debug!(written, "lookup table flushed"),
        Err(e) => warn!(error = %e, "lookup table flush failed"),
    }
}

fn unix_now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
