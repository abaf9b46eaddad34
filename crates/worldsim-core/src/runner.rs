//! Paced simulation loop with operator controls.
//!
//! [`run_simulation`] drives a [`TimeSystem`] one hour at a time with
//! support for:
//!
//! - **Bounded runs**: stop after `max_hours` advances
//! - **Pause/resume**: an operator can halt and continue the loop
//! - **Variable pacing**: real-time delay between hours, adjustable at runtime
//! - **Clean stop**: a stop request ends the loop between two hours
//!
//! Pacing only ever happens *between* advances. An advance itself never
//! awaits, so pacing cannot change the order in which subscribers fire.
//!
//! [`RunControl`] holds the control plane. Its fields are atomics so it can
//! be shared through an [`Arc`] with a signal handler or any other task.
//!
//! [`Arc`]: std::sync::Arc

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{info, warn};
use worldsim_types::SubscriptionId;

use crate::clock::WorldClock;
use crate::events::EventManager;
use crate::tick::{TickError, TickSummary, TimeSystem};

/// Something the loop can drive one hour at a time.
pub trait Advance {
    /// Advance by one in-game hour and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if the clock overflows or a subscriber halts
    /// dispatch.
    fn advance_hour(&mut self) -> Result<TickSummary, TickError>;

    /// Current world clock.
    fn world_clock(&self) -> &WorldClock;
}

impl<C> Advance for TimeSystem<C> {
    fn advance_hour(&mut self) -> Result<TickSummary, TickError> {
        self.advance_one_hour()
    }

    fn world_clock(&self) -> &WorldClock {
        self.clock()
    }
}

impl<W: 'static, C: 'static> Advance for EventManager<W, C> {
    fn advance_hour(&mut self) -> Result<TickSummary, TickError> {
        self.advance_one_hour()
    }

    fn world_clock(&self) -> &WorldClock {
        self.time_system().clock()
    }
}

/// Errors that can end a run abnormally.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// An advance failed for a reason other than a halting subscriber.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Reason why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEndReason {
    /// Reached the configured `max_hours` bound.
    MaxHoursReached,
    /// An operator issued a stop request.
    OperatorStop,
    /// A subscriber failed under the halt policy.
    SubscriberFailure {
        /// The failing subscription.
        id: SubscriptionId,
        /// What the callback reported.
        message: String,
    },
}

/// Result of a run.
#[derive(Debug)]
pub struct RunResult {
    /// The reason the run ended.
    pub end_reason: RunEndReason,
    /// Hours advanced during this run.
    pub total_hours: u64,
    /// The last successful tick summary, if any hour completed.
    pub final_summary: Option<TickSummary>,
}

/// Shared run control state.
#[derive(Debug)]
pub struct RunControl {
    /// Whether the loop is currently paused.
    paused: AtomicBool,

    /// Notification used to wake the loop when resumed or stopped.
    wake: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Real-time milliseconds between hours (0 = no delay).
    tick_interval_ms: AtomicU64,

    /// Maximum number of hours to advance (0 = unlimited).
    max_hours: u64,

    /// Wall-clock time when the control was created.
    started_at: DateTime<Utc>,
}

impl RunControl {
    /// Create run controls.
    pub fn new(tick_interval_ms: u64, max_hours: u64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            wake: Notify::new(),
            stop_requested: AtomicBool::new(false),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            max_hours,
            started_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether the loop is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause the loop after the current hour.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume the loop and wake it.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Wait until the loop is no longer paused or a stop was requested.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.wake.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. Also wakes a paused loop.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Pacing and bounds
    // -----------------------------------------------------------------------

    /// Current delay between hours in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the delay between hours. Returns the previous value.
    pub fn set_tick_interval_ms(&self, ms: u64) -> u64 {
        self.tick_interval_ms.swap(ms, Ordering::AcqRel)
    }

    /// Configured hour bound (0 = unlimited).
    pub const fn max_hours(&self) -> u64 {
        self.max_hours
    }

    /// Whether `hours` advances reach the bound.
    pub const fn hour_limit_reached(&self, hours: u64) -> bool {
        self.max_hours > 0 && hours >= self.max_hours
    }

    /// Wall-clock start time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Elapsed wall-clock seconds since creation.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

/// Run the loop until a bound, a stop request or a halting subscriber
/// ends it.
///
/// With `max_hours == 0` and no stop request the loop runs indefinitely.
///
/// # Errors
///
/// Returns [`RunnerError::Tick`] if the clock overflows. A subscriber
/// failure under the halt policy is not an error: it ends the run with
/// [`RunEndReason::SubscriberFailure`].
pub async fn run_simulation<S: Advance + ?Sized>(
    system: &mut S,
    control: &RunControl,
) -> Result<RunResult, RunnerError> {
    let mut final_summary: Option<TickSummary> = None;
    let mut total_hours: u64 = 0;

    info!(
        max_hours = control.max_hours(),
        tick_interval_ms = control.tick_interval_ms(),
        start = %system.world_clock(),
        "Simulation starting"
    );

    loop {
        if control.is_paused() {
            info!("Simulation paused, waiting for resume...");
            control.wait_if_paused().await;
            info!("Simulation resumed");
        }

        if control.is_stop_requested() {
            info!(total_hours, "Operator stop requested");
            return Ok(RunResult {
                end_reason: RunEndReason::OperatorStop,
                total_hours,
                final_summary,
            });
        }

        if control.hour_limit_reached(total_hours) {
            info!(total_hours, "Hour limit reached");
            return Ok(RunResult {
                end_reason: RunEndReason::MaxHoursReached,
                total_hours,
                final_summary,
            });
        }

        match system.advance_hour() {
            Ok(summary) => {
                total_hours = total_hours.saturating_add(1);
                final_summary = Some(summary);
            }
            Err(TickError::Subscriber { id, source, .. }) => {
                // The clock moved before dispatch halted.
                total_hours = total_hours.saturating_add(1);
                warn!(%id, error = %source, "Run halted by subscriber failure");
                return Ok(RunResult {
                    end_reason: RunEndReason::SubscriberFailure {
                        id,
                        message: source.message().to_owned(),
                    },
                    total_hours,
                    final_summary,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let interval_ms = control.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        } else {
            // Give signal handlers a chance to run on a current-thread runtime.
            tokio::task::yield_now().await;
        }
    }
}

/// Measure the average wall-clock time one simulated hour takes, over
/// `hours` advances.
///
/// Returns [`Duration::ZERO`] when `hours` is 0.
///
/// # Errors
///
/// Propagates the first [`TickError`].
pub fn measure_simulation_speed<S: Advance + ?Sized>(
    system: &mut S,
    hours: u32,
) -> Result<Duration, TickError> {
    let started = Instant::now();
    for _ in 0..hours {
        system.advance_hour()?;
    }
    let per_hour = started.elapsed().checked_div(hours).unwrap_or(Duration::ZERO);
    info!(
        hours,
        per_hour_us = per_hour.as_micros(),
        "Measured simulation speed"
    );
    Ok(per_hour)
}

/// Log the outcome of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_hours = result.total_hours,
        "Simulation ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            day = summary.clock.global_tick(),
            hour = summary.clock.local_tick(),
            time_of_day = %summary.clock.time_of_day(),
            elapsed_hours = summary.elapsed_hours,
            "Final clock"
        );
    } else {
        warn!("Simulation ended with no hours advanced");
    }
}
