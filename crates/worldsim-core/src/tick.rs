//! Tick orchestration: advance the world clock and notify subscribers.
//!
//! [`TimeSystem`] owns the [`WorldClock`], the regional clocks and three
//! subscriber registries, one per cadence tier. Each call to
//! [`advance_one_hour`](TimeSystem::advance_one_hour) runs to completion:
//!
//! 1. **Clock** -- advance one local tick, rolling the day at hour 24.
//! 2. **Regions** -- re-derive every regional hour from the new world hour.
//! 3. **Local** -- every hourly subscriber, in registration order.
//! 4. **Global** -- every daily subscriber, only if the day rolled over.
//! 5. **Every N** -- periodic subscribers whose period divides the number
//!    of advances performed so far, in registration order among themselves.
//!
//! Registries are plain vectors, so dispatch order never depends on hashing
//! or wall-clock time: the same subscriptions and the same number of
//! advances always yield the same sequence of callbacks.
//!
//! Callbacks only ever see `&WorldClock` and their own context token while
//! `advance_one_hour` holds `&mut self`, which rules out re-entrant advances
//! at compile time.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use worldsim_types::{Cadence, OrchestratorState, ParseCadenceError, RegionId, SubscriptionId};

use crate::clock::{ClockError, RegionClock, WorldClock};
use crate::config::SimulationConfig;

/// Boxed subscriber callback: `(clock, context)`, side effects only.
pub type Callback<C> = Box<dyn FnMut(&WorldClock, Option<&C>) -> Result<(), CallbackError>>;

/// A failure reported by a subscriber callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    /// Create an error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors rejected at subscription time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The textual cadence label is not recognised.
    #[error("unknown cadence {label:?}")]
    UnknownCadence {
        /// The rejected label.
        label: String,
    },

    /// A periodic subscription asked for a period of zero hours or less.
    #[error("period must be a positive number of hours, got {label}")]
    NonPositivePeriod {
        /// The rejected period as written by the caller.
        label: String,
    },
}

impl From<ParseCadenceError> for ScheduleError {
    fn from(err: ParseCadenceError) -> Self {
        match err {
            ParseCadenceError::Unknown { label } => Self::UnknownCadence { label },
            ParseCadenceError::NonPositivePeriod { label } => Self::NonPositivePeriod { label },
        }
    }
}

/// Errors that can occur during an advance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A subscriber failed under [`FailurePolicy::Halt`].
    #[error("subscriber {id} ({cadence}) failed: {source}")]
    Subscriber {
        /// The failing subscription.
        id: SubscriptionId,
        /// Its cadence.
        cadence: Cadence,
        /// What the callback reported.
        source: CallbackError,
    },
}

/// What the orchestrator does when a callback returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and record the failure, then keep notifying the remaining
    /// subscribers of the same tick.
    #[default]
    Isolate,
    /// Stop notifying at the failing subscriber and return the error. The
    /// clock has already advanced.
    Halt,
}

/// One callback failure recorded under [`FailurePolicy::Isolate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    /// The failing subscription.
    pub id: SubscriptionId,
    /// Its cadence.
    pub cadence: Cadence,
    /// What the callback reported.
    pub error: CallbackError,
}

/// Summary of a single advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Clock state after the advance.
    pub clock: WorldClock,
    /// Whether this advance started a new day.
    pub day_rolled_over: bool,
    /// Advances performed by the orchestrator so far, this one included.
    pub elapsed_hours: u64,
    /// Number of callbacks invoked, failed ones included.
    pub invoked: usize,
    /// Isolated callback failures, in dispatch order.
    pub failures: Vec<SubscriberFailure>,
}

/// Number of live subscriptions per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberCounts {
    /// Hourly subscribers.
    pub local: usize,
    /// Daily subscribers.
    pub global: usize,
    /// Every-N-hours subscribers.
    pub periodic: usize,
}

/// A registered observer.
struct Subscription<C> {
    id: SubscriptionId,
    cadence: Cadence,
    context: Option<C>,
    callback: Callback<C>,
}

impl<C: fmt::Debug> fmt::Debug for Subscription<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cadence", &self.cadence)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// The tick orchestrator.
///
/// `C` is the context token type handed back to subscribers that
/// registered one; it defaults to [`RegionId`]. The orchestrator never
/// inspects it.
#[derive(Debug)]
pub struct TimeSystem<C = RegionId> {
    clock: WorldClock,
    elapsed_hours: u64,
    local: Vec<Subscription<C>>,
    global: Vec<Subscription<C>>,
    periodic: Vec<Subscription<C>>,
    regions: Vec<RegionClock>,
    next_id: u64,
    policy: FailurePolicy,
    state: OrchestratorState,
}

impl<C> TimeSystem<C> {
    /// Create an orchestrator around an existing clock, with no
    /// subscribers and the default [`FailurePolicy::Isolate`].
    pub const fn new(clock: WorldClock) -> Self {
        Self {
            clock,
            elapsed_hours: 0,
            local: Vec::new(),
            global: Vec::new(),
            periodic: Vec::new(),
            regions: Vec::new(),
            next_id: 0,
            policy: FailurePolicy::Isolate,
            state: OrchestratorState::Idle,
        }
    }

    /// Build an orchestrator from configuration: start position, seed,
    /// failure policy and regions.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidStart`] if the start hour is invalid.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ClockError> {
        let clock = WorldClock::from_parts(
            config.time.start_day,
            config.time.start_hour,
            config.world.seed,
        )?;
        let mut system = Self::new(clock).with_failure_policy(config.dispatch.failure_policy);
        for region in &config.time.regions {
            system.add_region(region.name.clone(), region.offset_hours);
        }
        Ok(system)
    }

    /// Replace the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Register a callback for a cadence. Duplicates are allowed and each
    /// registration fires independently.
    pub fn subscribe<F>(&mut self, cadence: Cadence, callback: F) -> SubscriptionId
    where
        F: FnMut(&WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        self.insert(cadence, None, Box::new(callback))
    }

    /// Register a callback that receives `context` on every invocation.
    pub fn subscribe_with_context<F>(
        &mut self,
        cadence: Cadence,
        context: C,
        callback: F,
    ) -> SubscriptionId
    where
        F: FnMut(&WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        self.insert(cadence, Some(context), Box::new(callback))
    }

    /// Register a callback by textual cadence: `"local"`, `"global"`,
    /// `"every:N"` or a bare hour count.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownCadence`] for an unrecognised label
    /// and [`ScheduleError::NonPositivePeriod`] for a period of zero or less.
    pub fn subscribe_label<F>(
        &mut self,
        label: &str,
        callback: F,
    ) -> Result<SubscriptionId, ScheduleError>
    where
        F: FnMut(&WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        let cadence: Cadence = label.parse()?;
        Ok(self.subscribe(cadence, callback))
    }

    /// Register a callback that fires every `hours` advances.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NonPositivePeriod`] if `hours` is zero.
    pub fn subscribe_every<F>(
        &mut self,
        hours: u32,
        callback: F,
    ) -> Result<SubscriptionId, ScheduleError>
    where
        F: FnMut(&WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        let period = NonZeroU32::new(hours).ok_or_else(|| ScheduleError::NonPositivePeriod {
            label: hours.to_string(),
        })?;
        Ok(self.subscribe(Cadence::Every(period), callback))
    }

    /// Remove a subscription. Returns `false` if the id is unknown.
    ///
    /// The remaining subscriptions keep their relative order.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for tier in [&mut self.local, &mut self.global, &mut self.periodic] {
            if let Some(pos) = tier.iter().position(|s| s.id == id) {
                tier.remove(pos);
                debug!(%id, "Subscription removed");
                return true;
            }
        }
        false
    }

    /// Whether `id` is still subscribed.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.local
            .iter()
            .chain(&self.global)
            .chain(&self.periodic)
            .any(|s| s.id == id)
    }

    fn insert(
        &mut self,
        cadence: Cadence,
        context: Option<C>,
        callback: Callback<C>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        let subscription = Subscription {
            id,
            cadence,
            context,
            callback,
        };
        match cadence {
            Cadence::Local => self.local.push(subscription),
            Cadence::Global => self.global.push(subscription),
            Cadence::Every(_) => self.periodic.push(subscription),
        }
        debug!(%id, %cadence, "Subscription registered");
        id
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance the clock by one hour and notify every applicable subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] if a counter would overflow (nothing
    /// is advanced or notified), or [`TickError::Subscriber`] if a callback
    /// fails under [`FailurePolicy::Halt`].
    pub fn advance_one_hour(&mut self) -> Result<TickSummary, TickError> {
        self.state = OrchestratorState::Advancing;
        let result = self.advance_and_notify();
        self.state = OrchestratorState::Idle;
        result
    }

    /// Advance `hours` times, stopping at the first error.
    ///
    /// Returns the summary of the last advance, or `None` when `hours` is 0.
    ///
    /// # Errors
    ///
    /// Propagates the first [`TickError`].
    pub fn run(&mut self, hours: u64) -> Result<Option<TickSummary>, TickError> {
        let mut last = None;
        for _ in 0..hours {
            last = Some(self.advance_one_hour()?);
        }
        Ok(last)
    }

    fn advance_and_notify(&mut self) -> Result<TickSummary, TickError> {
        let elapsed = self
            .elapsed_hours
            .checked_add(1)
            .ok_or(ClockError::TickOverflow)?;
        let day_rolled_over = self.clock.advance()?;
        self.elapsed_hours = elapsed;

        for region in &mut self.regions {
            region.sync(&self.clock);
        }

        let mut dispatch = Dispatch {
            clock: &self.clock,
            policy: self.policy,
            invoked: 0,
            failures: Vec::new(),
        };

        dispatch.notify(&mut self.local, |_| true)?;
        if day_rolled_over {
            info!(
                day = self.clock.global_tick(),
                subscribers = self.global.len(),
                "Day rolled over"
            );
            dispatch.notify(&mut self.global, |_| true)?;
        }
        dispatch.notify(&mut self.periodic, |cadence| {
            cadence
                .period()
                .and_then(|n| elapsed.checked_rem(u64::from(n.get())))
                == Some(0)
        })?;

        let Dispatch {
            invoked, failures, ..
        } = dispatch;

        debug!(
            day = self.clock.global_tick(),
            hour = self.clock.local_tick(),
            elapsed_hours = elapsed,
            invoked,
            failures = failures.len(),
            "Hour advanced"
        );

        Ok(TickSummary {
            clock: self.clock,
            day_rolled_over,
            elapsed_hours: elapsed,
            invoked,
            failures,
        })
    }

    // -----------------------------------------------------------------------
    // Regions
    // -----------------------------------------------------------------------

    /// Add a regional clock, synced to the current world hour.
    pub fn add_region(&mut self, name: impl Into<String>, offset_hours: i32) -> RegionId {
        let mut region = RegionClock::new(name, offset_hours);
        region.sync(&self.clock);
        let id = region.id();
        debug!(region = region.name(), offset_hours, "Region added");
        self.regions.push(region);
        id
    }

    /// Look up a region by name.
    pub fn region(&self, name: &str) -> Option<&RegionClock> {
        self.regions.iter().find(|r| r.name() == name)
    }

    /// Look up a region by id.
    pub fn region_by_id(&self, id: RegionId) -> Option<&RegionClock> {
        self.regions.iter().find(|r| r.id() == id)
    }

    /// All regions, in the order they were added.
    pub fn regions(&self) -> &[RegionClock] {
        &self.regions
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The world clock.
    pub const fn clock(&self) -> &WorldClock {
        &self.clock
    }

    /// Advances performed since this orchestrator was created.
    pub const fn elapsed_hours(&self) -> u64 {
        self.elapsed_hours
    }

    /// Current lifecycle state. Always [`OrchestratorState::Idle`] when
    /// observed from outside an advance.
    pub const fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The active failure policy.
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Live subscriptions per tier.
    pub fn subscriber_counts(&self) -> SubscriberCounts {
        SubscriberCounts {
            local: self.local.len(),
            global: self.global.len(),
            periodic: self.periodic.len(),
        }
    }
}

/// Per-advance dispatch bookkeeping.
struct Dispatch<'a> {
    clock: &'a WorldClock,
    policy: FailurePolicy,
    invoked: usize,
    failures: Vec<SubscriberFailure>,
}

impl Dispatch<'_> {
    /// Invoke every subscription in `tier` whose cadence passes `due`.
    fn notify<C>(
        &mut self,
        tier: &mut [Subscription<C>],
        due: impl Fn(Cadence) -> bool,
    ) -> Result<(), TickError> {
        for sub in tier.iter_mut().filter(|s| due(s.cadence)) {
            self.invoked = self.invoked.saturating_add(1);
            let Err(error) = (sub.callback)(self.clock, sub.context.as_ref()) else {
                continue;
            };
            match self.policy {
                FailurePolicy::Halt => {
                    warn!(
                        id = %sub.id,
                        cadence = %sub.cadence,
                        %error,
                        "Subscriber failed, halting dispatch"
                    );
                    return Err(TickError::Subscriber {
                        id: sub.id,
                        cadence: sub.cadence,
                        source: error,
                    });
                }
                FailurePolicy::Isolate => {
                    warn!(
                        id = %sub.id,
                        cadence = %sub.cadence,
                        %error,
                        "Subscriber failed, continuing"
                    );
                    self.failures.push(SubscriberFailure {
                        id: sub.id,
                        cadence: sub.cadence,
                        error,
                    });
                }
            }
        }
        Ok(())
    }
}
