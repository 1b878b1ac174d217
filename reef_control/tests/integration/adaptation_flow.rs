//! Integration test: control-to-adaptation handoff.
//!
//! Exercises the seam shared by the two halves of the controller:
//! performance windows closed on the control side flow over the bounded
//! sample channel, the adaptation worker folds them into its lookup
//! table, and learned gains come back through the gain cell at a tick
//! boundary. Also covers the non-blocking guarantee when the adaptation
//! side backs up.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reef_adapt::persist::save_table;
use reef_adapt::store::MemoryStore;
use reef_adapt::table::{GainTable, LookupEntry};
use reef_adapt::worker::spawn_worker;
use reef_common::config::ControlConfig;
use reef_common::context::{ContextFeatures, ContextKey, Season};
use reef_common::handoff::GainCell;
use reef_common::params::ControlParameters;
use reef_control::controller::Controller;
use reef_control::mode::TransitionResult;
use reef_control::runner::{ControlRunner, ProcessIo};

// ─── Helpers ────────────────────────────────────────────────────────

/// Trivial process boundary: a probe pinned near the target. The runner
/// tests here are about plumbing, not plant dynamics.
struct SteadyProbe {
    reading: f64,
    last_output: f64,
}

impl SteadyProbe {
    fn new(reading: f64) -> Self {
        Self {
            reading,
            last_output: 0.0,
        }
    }
}

impl ProcessIo for SteadyProbe {
    fn read_input(&mut self) -> f64 {
        self.reading
    }

    fn apply_output(&mut self, output: f64) {
        self.last_output = output;
    }
}

fn fast_config() -> ControlConfig {
    let mut cfg = ControlConfig::default();
    cfg.controller.target = 25.0;
    cfg.controller.ramp_rate = 0.0;
    cfg.feedforward.enabled = false;
    cfg.runtime.tick_hz = 50;
    cfg.monitor.window_secs = 1;
    cfg
}

// ─── Tests ──────────────────────────────────────────────────────────

#[test]
fn runner_applies_published_gains_and_emits_window_samples() {
    let cfg = fast_config();

    let mut controller = Controller::new(cfg.clone());
    controller.tick(24.9, cfg.tick_period_s());
    assert!(matches!(controller.enable_automatic(), TransitionResult::Ok(_)));

    let gain_cell = Arc::new(GainCell::new(cfg.controller.gains));
    let (tx, rx) = mpsc::sync_channel(cfg.runtime.channel_capacity);

    // Published before the run: the first tick boundary must pick it up.
    let published = ControlParameters::new(3.0, 0.2, 0.8);
    gain_cell.publish(&published);

    let probe = SteadyProbe::new(24.9);
    let mut runner = ControlRunner::new(controller, probe, Arc::clone(&gain_cell), tx, &cfg.runtime);
    runner.run(Some(2)).expect("bounded run failed");

    assert_eq!(runner.stats().tick_count, 100);
    assert_eq!(
        runner.controller().gains().kp,
        published.kp,
        "published gains never reached the loop"
    );
    assert_eq!(runner.dropped_samples(), 0);

    // Dropping the runner closes the send side; drain what the windows
    // produced. Two one-second windows fit in a two-second run.
    drop(runner);
    let samples: Vec<_> = rx.try_iter().collect();
    assert!(!samples.is_empty(), "no window samples reached the channel");
    for s in &samples {
        assert!(
            (50..=51).contains(&s.ticks),
            "one-second window at 50 Hz closed with {} ticks",
            s.ticks
        );
        assert!(s.score.is_finite());
    }
}

#[test]
fn worker_learns_from_live_windows_and_republishes() {
    let mut cfg = ControlConfig::default();
    cfg.controller.target = 25.0;
    cfg.controller.ramp_rate = 0.0;
    cfg.feedforward.enabled = false;
    cfg.monitor.window_secs = 1;
    cfg.adaptation.cadence_secs = 1;

    // 1. A previous deployment left a confident entry for tonight's
    //    operating context in the store.
    let features = ContextFeatures {
        ambient: 23.0,
        hour: 14,
        season: Season::Summer,
        scale: 1.0,
    };
    let key = ContextKey::from_features(
        &features,
        cfg.context.ambient_band_width,
        cfg.context.hour_block_hours,
    );
    let learned = ControlParameters::new(4.0, 0.3, 2.0);
    let mut store = MemoryStore::new();
    let mut seed = GainTable::new(&cfg.adaptation);
    seed.insert(
        key,
        LookupEntry {
            gains: learned,
            confidence: 0.8,
            sample_count: 80,
            avg_score: 90.0,
            last_update_s: 1_700_000_000,
        },
    );
    save_table(&mut store, &cfg.persistence.namespace, &seed).expect("seeding the store");

    // 2. Boot the adaptation side against that store.
    let gain_cell = Arc::new(GainCell::new(cfg.controller.gains));
    let (tx, rx) = mpsc::sync_channel(8);
    let worker = spawn_worker(&cfg, Box::new(store), Arc::clone(&gain_cell), rx, None);

    // 3. The control side closes one window under the seeded context and
    //    hands the sample over.
    let mut c = Controller::new(cfg.clone());
    c.set_context(features);
    c.tick(24.9, 0.1);
    assert!(matches!(c.enable_automatic(), TransitionResult::Ok(_)));
    for _ in 0..15 {
        c.tick(24.9, 0.1);
    }
    let sample = c.close_window_if_due(1_700_000_600).expect("window should be due");
    assert_eq!(
        sample.context_key(cfg.context.ambient_band_width, cfg.context.hour_block_hours),
        key,
        "live context must land on the seeded table entry"
    );
    tx.send(sample).expect("worker hung up");

    // 4. The next cadence pass blends the working gains toward the
    //    learned entry and publishes the result.
    thread::sleep(Duration::from_millis(2_000));
    let (blended, generation) = gain_cell.snapshot();
    assert!(generation >= 1, "no gains were published");
    assert!(
        blended.kp > cfg.controller.gains.kp && blended.kp < learned.kp,
        "published kp {} is not a blend of current {} and learned {}",
        blended.kp,
        cfg.controller.gains.kp,
        learned.kp
    );
    assert!(blended.ki > cfg.controller.gains.ki);

    // 5. Orderly shutdown accounts for everything that happened.
    drop(tx);
    let summary = worker.shutdown();
    assert_eq!(summary.samples_ingested, 1);
    assert_eq!(summary.samples_rejected, 0);
    assert!(summary.gains_published >= 1);
    assert_eq!(summary.contexts_learned, 1);
}

#[test]
fn control_tick_never_blocks_on_a_backlogged_channel() {
    let cfg = fast_config();

    let mut controller = Controller::new(cfg.clone());
    controller.tick(24.9, cfg.tick_period_s());
    assert!(matches!(controller.enable_automatic(), TransitionResult::Ok(_)));

    let gain_cell = Arc::new(GainCell::new(cfg.controller.gains));
    // Capacity one and nobody draining: later windows must be shed, not
    // awaited.
    let (tx, _rx) = mpsc::sync_channel(1);

    let probe = SteadyProbe::new(24.9);
    let mut runner = ControlRunner::new(controller, probe, Arc::clone(&gain_cell), tx, &cfg.runtime);
    runner.run(Some(3)).expect("bounded run failed");

    assert_eq!(runner.stats().tick_count, 150, "ticks were lost to backpressure");
    assert!(
        runner.dropped_samples() >= 1,
        "expected shed samples with a full channel, got {}",
        runner.dropped_samples()
    );
}
