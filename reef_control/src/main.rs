//! # Reef Controller
//!
//! Adaptive closed-loop controller for aquarium temperature.
//!
//! Wires the two halves together: the fixed-period control loop on this
//! thread (RT-scheduled when built with the `rt` feature) and the
//! adaptation worker on a normal thread. They share only the bounded
//! sample channel and the lock-free gain cell.
//!
//! Without real plumbing attached, the process boundary is a simulated
//! tank: a first-order thermal model whose ambient wanders with the wall
//! clock, which also supplies plausible auxiliary readings for the
//! feed-forward terms.

use clap::Parser;
use reef_adapt::persist::clear_namespace;
use reef_adapt::store::{FileStore, KvStore, MemoryStore};
use reef_adapt::worker::spawn_worker;
use reef_common::config::{ControlConfig, load_config};
use reef_common::consts::DEFAULT_CONFIG_PATH;
use reef_common::context::{ContextFeatures, Season, SeasonPreset};
use reef_common::handoff::GainCell;
use reef_control::control::feedforward::FeedForwardInputs;
use reef_control::controller::Controller;
use reef_control::runner::{ControlRunner, ProcessIo, rt_setup};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reef Controller — adaptive thermal regulation loop
#[derive(Parser, Debug)]
#[command(name = "reef_control")]
#[command(author = "reefctl")]
#[command(version)]
#[command(about = "Adaptive PID control loop for closed-loop tank regulation")]
struct Args {
    /// Path to the controller TOML. Defaults to /etc/reef/controller.toml;
    /// built-in defaults are used when that file does not exist.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run for this many seconds, then exit (omit to run until killed).
    #[arg(long, value_name = "SECONDS")]
    duration: Option<u64>,

    /// Write the retained sample history as CSV on shutdown.
    #[arg(long, value_name = "FILE")]
    export_history: Option<PathBuf>,

    /// Clear every learned gain in this loop's namespace before starting.
    #[arg(long)]
    reset_store: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Reef Controller v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Reef Controller shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_or_default(args)?;
    info!(
        tick_hz = cfg.runtime.tick_hz,
        target = cfg.controller.target,
        window_secs = cfg.monitor.window_secs,
        adaptation = cfg.adaptation.enabled,
        "Config OK"
    );

    // Persistence backend. A broken store must not keep the loop from
    // running; it only costs learning across restarts.
    let mut store: Box<dyn KvStore> = if cfg.persistence.enabled {
        match FileStore::open(&cfg.persistence.path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %cfg.persistence.path,
                    "gain store unavailable; learning will not survive restarts"
                );
                Box::new(MemoryStore::new())
            }
        }
    } else {
        info!("persistence disabled; using in-memory store");
        Box::new(MemoryStore::new())
    };

    if args.reset_store {
        match clear_namespace(store.as_mut(), &cfg.persistence.namespace) {
            Ok(removed) => info!(removed, namespace = %cfg.persistence.namespace, "store reset"),
            Err(e) => warn!(error = %e, "store reset failed"),
        }
    }

    // Worker first: threads spawned after rt_setup would inherit the RT
    // scheduling class.
    let gain_cell = Arc::new(GainCell::new(cfg.controller.gains));
    let (sample_tx, sample_rx) = mpsc::sync_channel(cfg.runtime.channel_capacity);
    let worker = spawn_worker(
        &cfg,
        store,
        Arc::clone(&gain_cell),
        sample_rx,
        args.export_history.clone(),
    );

    rt_setup(cfg.runtime.rt_cpu, cfg.runtime.rt_priority)?;
    info!(
        cpu = ?cfg.runtime.rt_cpu,
        priority = cfg.runtime.rt_priority,
        "RT setup complete"
    );

    let mut tank = SimulatedTank::new(&cfg);
    let mut controller = Controller::new(cfg.clone());
    // Prime with one manual tick so automatic mode starts bumplessly from
    // the measured temperature instead of the configured target.
    let first_reading = tank.read_input();
    controller.tick(first_reading, cfg.tick_period_s());
    controller.enable_automatic();

    let mut runner = ControlRunner::new(controller, tank, gain_cell, sample_tx, &cfg.runtime);
    info!("entering control loop");
    runner.run(args.duration)?;

    let stats = runner.stats().clone();
    let diag = runner.controller().diagnostics();
    info!(
        ticks = stats.tick_count,
        avg_ns = stats.avg_tick_ns(),
        max_ns = stats.max_tick_ns,
        overruns = stats.overruns,
        dropped_samples = runner.dropped_samples(),
        mode = ?diag.mode,
        output = diag.last_output,
        "control loop finished"
    );
    if let Some(window) = diag.last_window {
        info!(
            score = window.score,
            settling_s = window.settling_time_s,
            overshoot_pct = window.max_overshoot_pct,
            "last closed window"
        );
    }

    // Closing the sample channel lets the worker drain and exit.
    drop(runner);
    let summary = worker.shutdown();
    info!(
        ingested = summary.samples_ingested,
        rejected = summary.samples_rejected,
        published = summary.gains_published,
        contexts = summary.contexts_learned,
        "adaptation summary"
    );

    Ok(())
}

/// Load the configuration, falling back to built-in defaults only when no
/// path was given and the default file is absent.
fn load_or_default(args: &Args) -> Result<ControlConfig, Box<dyn std::error::Error>> {
    match &args.config {
        Some(path) => Ok(load_config(path)?),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Ok(load_config(default_path)?)
            } else {
                warn!("no config at {DEFAULT_CONFIG_PATH}; using built-in defaults");
                Ok(ControlConfig::default())
            }
        }
    }
}

// ─── Simulated Process ──────────────────────────────────────────────

/// Seconds between auxiliary (feed-forward) sensor refreshes.
const AUX_REFRESH_SECS: u64 = 1;

/// Seconds between context refreshes.
const CONTEXT_REFRESH_SECS: u64 = 60;

/// Heating rate per percent duty [°C/s].
const HEAT_GAIN: f64 = 0.004;

/// Loss rate toward ambient [1/s].
const LOSS_RATE: f64 = 0.01;

/// First-order thermal stand-in for the tank.
///
/// Heater duty warms the water, losses pull it toward an ambient that
/// follows a diurnal swing around a seasonal base. Auxiliary readings sit
/// near the configured feed-forward baselines with slow drifts, so the
/// feed-forward path has something real to chew on.
struct SimulatedTank {
    temp: f64,
    output: f64,
    dt_s: f64,
    ticks: u64,
    aux_refresh_ticks: u64,
    context_refresh_ticks: u64,
    ambient_base: f64,
    tds_baseline: f64,
    chem_baseline: f64,
    season_preset: SeasonPreset,
}

impl SimulatedTank {
    fn new(cfg: &ControlConfig) -> Self {
        let tick_hz = cfg.runtime.tick_hz.max(1) as u64;
        Self {
            // Start a few degrees low so the loop has work to do.
            temp: cfg.controller.target - 3.0,
            output: 0.0,
            dt_s: cfg.tick_period_s(),
            ticks: 0,
            aux_refresh_ticks: AUX_REFRESH_SECS * tick_hz,
            context_refresh_ticks: CONTEXT_REFRESH_SECS * tick_hz,
            ambient_base: 21.0,
            tds_baseline: cfg.feedforward.dissolved_solids_baseline,
            chem_baseline: cfg.feedforward.chemistry_baseline,
            season_preset: cfg.context.season_preset,
        }
    }

    /// Room temperature right now: seasonal base plus a day/night swing.
    fn ambient(&self) -> f64 {
        use chrono::Timelike;
        let hour = chrono::Local::now().hour() as f64;
        self.ambient_base + 1.5 * ((hour - 6.0) / 24.0 * std::f64::consts::TAU).sin()
    }

    fn due(&self, every_ticks: u64) -> bool {
        // Fires on the very first tick, then at the given cadence.
        (self.ticks - 1) % every_ticks == 0
    }
}

impl ProcessIo for SimulatedTank {
    fn read_input(&mut self) -> f64 {
        self.ticks += 1;
        let ambient = self.ambient();
        self.temp += (self.output * HEAT_GAIN - (self.temp - ambient) * LOSS_RATE) * self.dt_s;
        self.temp
    }

    fn apply_output(&mut self, output: f64) {
        self.output = output;
    }

    fn feedforward_inputs(&mut self) -> Option<FeedForwardInputs> {
        if !self.due(self.aux_refresh_ticks) {
            return None;
        }
        let t = self.ticks as f64 * self.dt_s;
        Some(FeedForwardInputs {
            dissolved_solids: self.tds_baseline + 15.0 * (t / 3600.0).sin(),
            ambient_differential: self.ambient() - self.temp,
            chemistry_level: self.chem_baseline + 0.1 * (t / 7200.0).sin(),
        })
    }

    fn context_features(&mut self) -> Option<ContextFeatures> {
        if !self.due(self.context_refresh_ticks) {
            return None;
        }
        use chrono::{Datelike, Timelike};
        let now = chrono::Local::now();
        Some(ContextFeatures {
            ambient: self.ambient(),
            hour: now.hour() as u8,
            season: Season::from_month(now.month(), self.season_preset),
            scale: 1.0,
        })
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
