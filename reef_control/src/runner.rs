//! Fixed-period control loop host.
//!
//! Runs the controller on a drift-free schedule: `clock_nanosleep`
//! (`TIMER_ABSTIME`, `CLOCK_MONOTONIC`) under the `rt` feature,
//! `Instant`-paced `thread::sleep` in simulation builds.
//!
//! ## RT setup sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to a core, when configured.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)` — RT priority.
//!
//! ## Tick body
//! Read sensor → pick up published gains at the boundary → evaluate the
//! controller → apply output → hand a closed performance sample to the
//! adaptation worker without blocking. An overrun is counted and logged,
//! never fatal: the regulated processes have time constants of minutes,
//! so a late tick degrades nothing.

use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use reef_common::config::RuntimeSection;
use reef_common::handoff::GainCell;
use reef_common::sample::PerformanceSample;

use crate::control::feedforward::FeedForwardInputs;
use crate::controller::Controller;
use reef_common::context::ContextFeatures;

// ─── Tick Statistics ────────────────────────────────────────────────

/// O(1) per-tick timing statistics.
///
/// Updated every tick with no allocation. Provides min/max/avg for
/// latency monitoring and overrun counting.
#[derive(Debug, Clone)]
pub struct TickStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Last tick duration [ns].
    pub last_tick_ns: i64,
    /// Minimum tick duration [ns].
    pub min_tick_ns: i64,
    /// Maximum tick duration [ns].
    pub max_tick_ns: i64,
    /// Running sum for average computation.
    pub sum_tick_ns: i64,
    /// Ticks that exceeded the period budget.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl TickStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns < self.min_tick_ns {
            self.min_tick_ns = duration_ns;
        }
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        self.sum_tick_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average tick time [ns] (returns 0 if no ticks).
    #[inline]
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during loop setup.
#[derive(Debug)]
pub enum RunnerError {
    /// RT system call failed.
    RtSetup(String),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
        }
    }
}

impl std::error::Error for RunnerError {}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (prevent page faults in the loop).
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RunnerError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RunnerError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RunnerError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages so the loop never takes a stack page fault.
fn prefault_stack() {
    // Touch 256 KB of stack to prefault pages.
    let mut buf = [0u8; 256 * 1024];
    // Prevent compiler from optimizing away the write.
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RunnerError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RunnerError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RunnerError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RunnerError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RunnerError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RunnerError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RunnerError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
///
/// Must be called before entering the loop. In simulation mode (no `rt`
/// feature), all RT calls are no-ops.
pub fn rt_setup(cpu: Option<usize>, rt_priority: i32) -> Result<(), RunnerError> {
    rt_mlockall()?;
    prefault_stack();
    if let Some(core) = cpu {
        rt_set_affinity(core)?;
    }
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Process Boundary ───────────────────────────────────────────────

/// Sensor/actuator boundary driven by the loop.
///
/// One call pair per tick; both must be non-blocking. The optional
/// getters let slower collaborators (aux sensors, clock/context source)
/// refresh their values at their own cadence.
pub trait ProcessIo {
    /// Sensor reading for this tick. NaN/Inf signals a sensor fault.
    fn read_input(&mut self) -> f64;

    /// Apply the computed duty command [%].
    fn apply_output(&mut self, output: f64);

    /// Fresh auxiliary feed-forward measurements, if any.
    fn feedforward_inputs(&mut self) -> Option<FeedForwardInputs> {
        None
    }

    /// Fresh context features, if any.
    fn context_features(&mut self) -> Option<ContextFeatures> {
        None
    }
}

// ─── Control Runner ─────────────────────────────────────────────────

/// The fixed-period loop host.
///
/// Owns the controller and the process boundary; shares only the gain
/// cell (read side) and the bounded sample channel (send side) with the
/// adaptation worker.
pub struct ControlRunner<P: ProcessIo> {
    controller: Controller,
    io: P,
    gain_cell: Arc<GainCell>,
    last_gain_generation: u64,
    sample_tx: SyncSender<PerformanceSample>,

    tick_period_ns: i64,
    tick_dt_s: f64,
    tick_hz: u32,
    stats_log_ticks: u64,
    stats: TickStats,
    dropped_samples: u64,
}

impl<P: ProcessIo> ControlRunner<P> {
    /// Wire a controller to its process boundary and the adaptation side.
    pub fn new(
        controller: Controller,
        io: P,
        gain_cell: Arc<GainCell>,
        sample_tx: SyncSender<PerformanceSample>,
        runtime: &RuntimeSection,
    ) -> Self {
        let tick_period_ns = 1_000_000_000i64 / runtime.tick_hz.max(1) as i64;
        Self {
            controller,
            io,
            // Start from the seed generation so a publish that landed
            // before the loop was wired up is still picked up at the
            // first tick boundary.
            last_gain_generation: 0,
            gain_cell,
            sample_tx,
            tick_period_ns,
            tick_dt_s: 1.0 / runtime.tick_hz.max(1) as f64,
            tick_hz: runtime.tick_hz.max(1),
            stats_log_ticks: runtime.stats_log_secs * runtime.tick_hz.max(1) as u64,
            stats: TickStats::new(),
            dropped_samples: 0,
        }
    }

    /// Enter the loop, bounded to `duration_s` when given.
    pub fn run(&mut self, duration_s: Option<u64>) -> Result<(), RunnerError> {
        let max_ticks = duration_s.map(|s| s.saturating_mul(self.tick_hz as u64));
        info!(
            tick_hz = self.tick_hz,
            duration_s, "entering control loop"
        );

        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(max_ticks)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(max_ticks)
        }
    }

    /// RT loop using `clock_nanosleep(TIMER_ABSTIME)` for drift-free pacing.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, max_ticks: Option<u64>) -> Result<(), RunnerError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let mut next_wake = clock_gettime(clock)
            .map_err(|e| RunnerError::RtSetup(format!("clock_gettime: {e}")))?;

        loop {
            next_wake = timespec_add_ns(next_wake, self.tick_period_ns);

            let tick_start = clock_gettime(clock)
                .map_err(|e| RunnerError::RtSetup(format!("clock_gettime: {e}")))?;
            let wake_latency_ns = timespec_diff_ns(&tick_start, &next_wake).abs();

            self.tick_body();

            let tick_end = clock_gettime(clock)
                .map_err(|e| RunnerError::RtSetup(format!("clock_gettime: {e}")))?;
            let duration_ns = timespec_diff_ns(&tick_end, &tick_start);

            self.stats.record(duration_ns, wake_latency_ns);
            if duration_ns > self.tick_period_ns {
                self.stats.overruns += 1;
                warn!(duration_ns, budget_ns = self.tick_period_ns, "tick overrun");
            }
            self.log_stats_if_due();

            if let Some(limit) = max_ticks {
                if self.stats.tick_count >= limit {
                    return Ok(());
                }
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }

    /// Simulation loop using `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, max_ticks: Option<u64>) -> Result<(), RunnerError> {
        use std::time::Instant;

        let period = std::time::Duration::from_nanos(self.tick_period_ns as u64);

        loop {
            let tick_start = Instant::now();

            self.tick_body();

            let elapsed = tick_start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;

            self.stats.record(duration_ns, 0);
            if duration_ns > self.tick_period_ns {
                self.stats.overruns += 1;
            }
            self.log_stats_if_due();

            if let Some(limit) = max_ticks {
                if self.stats.tick_count >= limit {
                    return Ok(());
                }
            }

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }

    /// One tick: read → gains pickup → evaluate → write → sample handoff.
    fn tick_body(&mut self) {
        // ═══ READ PHASE ═══
        let reading = self.io.read_input();
        if let Some(ff) = self.io.feedforward_inputs() {
            self.controller.set_feedforward_inputs(ff);
        }
        if let Some(ctx) = self.io.context_features() {
            self.controller.set_context(ctx);
        }

        // Gains land exactly at a tick boundary, never mid-computation.
        let generation = self.gain_cell.generation();
        if generation != self.last_gain_generation {
            let (gains, generation) = self.gain_cell.snapshot();
            match self.controller.set_parameters(gains) {
                Ok(()) => info!(
                    kp = gains.kp,
                    ki = gains.ki,
                    kd = gains.kd,
                    generation,
                    "adapted gains applied"
                ),
                Err(reason) => warn!(%reason, "published gains rejected"),
            }
            self.last_gain_generation = generation;
        }

        // ═══ PROCESS PHASE ═══
        let output = self.controller.tick(reading, self.tick_dt_s);

        // ═══ WRITE PHASE ═══
        self.io.apply_output(output);

        // Hand a finished window to the adaptation side without blocking.
        if let Some(sample) = self.controller.close_window_if_due(unix_now_s()) {
            match self.sample_tx.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped_samples += 1;
                    warn!(dropped = self.dropped_samples, "sample channel full, dropping sample");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped_samples += 1;
                }
            }
        }
    }

    fn log_stats_if_due(&self) {
        if self.stats_log_ticks == 0 || self.stats.tick_count % self.stats_log_ticks != 0 {
            return;
        }
        let d = self.controller.diagnostics();
        info!(
            ticks = self.stats.tick_count,
            avg_ns = self.stats.avg_tick_ns(),
            max_ns = self.stats.max_tick_ns,
            overruns = self.stats.overruns,
            mode = ?d.mode,
            output = d.last_output,
            settled = d.is_settled,
            "tick stats"
        );
    }

    /// Controller access for setup and post-run inspection.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Mutable controller access (mode transitions, target changes).
    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Timing statistics so far.
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Samples lost to a full or closed channel.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }
}

fn unix_now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let total = ts.tv_nsec() + ns;
    let mut secs = ts.tv_sec() + total / 1_000_000_000;
    let mut nanos = total % 1_000_000_000;
    if nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
