//! Fixed-period match clock for Stakegrid.
//!
//! Every room in `playing` owns one [`TickScheduler`]. The scheduler is
//! created stopped; the room starts it when the countdown ends and stops
//! it the moment the match has a result.
//!
//! The scheduler sits in the room actor's `tokio::select!` loop next to
//! the command channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* handle command */ }
//!         info = clock.wait_for_tick() => {
//!             let outcome = advance(&mut state, &mut rng);
//!             clock.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! While stopped, [`TickScheduler::wait_for_tick`] pends forever, so the
//! select loop only services commands.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a match clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Time between ticks.
    pub period: Duration,

    /// Upper bound of the random delay added to the *first* tick, so
    /// rooms started in the same instant do not tick in lockstep.
    pub initial_jitter: Duration,

    /// Fraction of `period` (0.0–1.0) a tick's work may use before a
    /// budget warning is logged.
    pub budget_warn_ratio: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(150),
            initial_jitter: Duration::from_millis(2),
            budget_warn_ratio: 0.80,
        }
    }
}

impl TickConfig {
    /// Shortest accepted period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(5);

    /// A config with the given period and default everything else.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_secs_f64() * 1000.0,
                min_ms = Self::MIN_PERIOD.as_secs_f64() * 1000.0,
                "tick period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self.budget_warn_ratio = self.budget_warn_ratio.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// TickInfo / TickStats
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Tick number since the clock was created, starting at 1.
    pub tick: u64,
    /// How late the tick fired relative to its deadline.
    pub late_by: Duration,
    /// Whole periods dropped because the clock fell behind.
    pub skipped: u64,
}

/// Counters kept over the clock's lifetime, logged when a match ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Longest tick work measured by [`TickScheduler::record_tick_end`].
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-period clock for one room.
///
/// Missed deadlines are skipped, never caught up in a burst: after a late
/// tick the next one is scheduled a full period from *now*.
pub struct TickScheduler {
    config: TickConfig,
    /// Deadline of the next tick; `None` while stopped.
    next_tick: Option<TokioInstant>,
    tick_count: u64,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    /// Creates a stopped clock.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(
            period_ms = config.period.as_secs_f64() * 1000.0,
            "match clock created"
        );
        Self {
            config,
            next_tick: None,
            tick_count: 0,
            tick_start: None,
            stats: TickStats::default(),
        }
    }

    /// A stopped clock with the given period.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TickConfig::with_period(period))
    }

    /// Starts the clock. The first tick fires one period (plus jitter)
    /// from now. Idempotent while running.
    pub fn start(&mut self) {
        if self.next_tick.is_some() {
            return;
        }
        let jitter = if self.config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = self.config.initial_jitter.as_micros().max(1) as u64;
            Duration::from_micros(rand::rng().random_range(0..max_us))
        };
        self.next_tick = Some(TokioInstant::now() + self.config.period + jitter);
        debug!(tick = self.tick_count, "match clock started");
    }

    /// Stops the clock. `wait_for_tick` pends until the next `start`.
    pub fn stop(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(tick = self.tick_count, "match clock stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Waits for the next tick.
    ///
    /// Pends forever while stopped; inside `tokio::select!` the other
    /// branches keep running.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(deadline) = self.next_tick else {
            return std::future::pending().await;
        };
        let period = self.config.period;

        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(deadline);
        let overrun = late_by > period / 10;
        let skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "match clock fell behind, skipping ahead"
            );
        }

        self.next_tick = Some(now + period);

        self.stats.total_ticks += 1;
        self.stats.total_skipped += skipped;
        if overrun {
            self.stats.total_overruns += 1;
        }
        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            late_by,
            skipped,
        }
    }

    /// Marks the end of the current tick's work for budget monitoring.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed > self.stats.max_tick_time {
            self.stats.max_tick_time = elapsed;
        }

        let utilization = elapsed.as_secs_f64() / self.config.period.as_secs_f64();
        if utilization >= self.config.budget_warn_ratio {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = self.config.period.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching its period"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}
