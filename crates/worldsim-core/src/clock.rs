//! World clock and regional time for the worldsim simulation.
//!
//! The [`WorldClock`] is the single source of truth for simulation time.
//! It counts whole in-game days (`global_tick`) and the hour within the
//! current day (`local_tick`, 0-23). Everything else is derived from
//! those two counters: absolute hours, time-of-day band, regional hours
//! and the per-tick random streams.
//!
//! # Design Principles
//!
//! - All counter arithmetic is checked. Overflow is an error, never a wrap.
//! - The clock is only mutated by the orchestrator's advance.
//! - Randomness is derived from `(seed, absolute hour, stream)` rather
//!   than held as mutable state, so any subscriber can draw numbers without
//!   perturbing what other subscribers see.

use core::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use worldsim_types::{RegionId, TimeOfDay};

/// Number of local ticks in one global tick.
pub const HOURS_PER_DAY: u8 = 24;

/// Seed used when a run does not supply one.
pub const DEFAULT_SEED: u64 = 999_999;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// A tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// The requested starting hour is not a valid hour of day.
    #[error("invalid start hour {hour}: must be within 0..=23")]
    InvalidStart {
        /// The rejected hour.
        hour: u8,
    },
}

/// Calendar position as a plain pair, e.g. for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    /// Days elapsed.
    pub day: u64,
    /// Hour of day (0-23).
    pub hour: u8,
}

/// Simulation time: whole days plus the hour within the current day.
///
/// Deserialization goes through [`WorldClock::from_parts`], so a stored
/// clock with an hour outside 0..=23 is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredClock")]
pub struct WorldClock {
    /// In-game days elapsed. Never decreases.
    global_tick: u64,

    /// Hour of day, always within 0..=23.
    local_tick: u8,

    /// Seed for the run's derived random streams.
    seed: u64,
}

/// Unchecked serialized form of a [`WorldClock`].
#[derive(Deserialize)]
struct StoredClock {
    global_tick: u64,
    local_tick: u8,
    seed: u64,
}

impl TryFrom<StoredClock> for WorldClock {
    type Error = ClockError;

    fn try_from(stored: StoredClock) -> Result<Self, Self::Error> {
        Self::from_parts(stored.global_tick, stored.local_tick, stored.seed)
    }
}

impl WorldClock {
    /// Create a clock at day 0, hour 0.
    pub const fn new(seed: u64) -> Self {
        Self {
            global_tick: 0,
            local_tick: 0,
            seed,
        }
    }

    /// Create a clock at an explicit position (useful for testing and
    /// state restoration).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidStart`] if `start_hour` is above 23.
    pub const fn from_parts(start_day: u64, start_hour: u8, seed: u64) -> Result<Self, ClockError> {
        if start_hour >= HOURS_PER_DAY {
            return Err(ClockError::InvalidStart { hour: start_hour });
        }
        Ok(Self {
            global_tick: start_day,
            local_tick: start_hour,
            seed,
        })
    }

    /// Advance by one local tick. Returns `true` when the hour wrapped
    /// and a new day began.
    ///
    /// On error the clock is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the day counter would
    /// exceed `u64::MAX`.
    pub fn advance(&mut self) -> Result<bool, ClockError> {
        let next_hour = self.local_tick.saturating_add(1);
        if next_hour >= HOURS_PER_DAY {
            self.global_tick = self
                .global_tick
                .checked_add(1)
                .ok_or(ClockError::TickOverflow)?;
            self.local_tick = 0;
            Ok(true)
        } else {
            self.local_tick = next_hour;
            Ok(false)
        }
    }

    /// Days elapsed.
    pub const fn global_tick(&self) -> u64 {
        self.global_tick
    }

    /// Hour of day (0-23).
    pub const fn local_tick(&self) -> u8 {
        self.local_tick
    }

    /// The run seed.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Absolute hours since day 0, hour 0.
    ///
    /// Returns `None` if the value does not fit in a `u64`.
    pub fn total_hours(&self) -> Option<u64> {
        self.global_tick
            .checked_mul(u64::from(HOURS_PER_DAY))?
            .checked_add(u64::from(self.local_tick))
    }

    /// Descriptive band for the current hour.
    pub const fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.local_tick)
    }

    /// Current position as a plain `{ day, hour }` pair.
    pub const fn as_time(&self) -> ClockTime {
        ClockTime {
            day: self.global_tick,
            hour: self.local_tick,
        }
    }

    /// Deterministic random stream for the current hour.
    ///
    /// The same `(seed, hour, stream)` triple always yields the same
    /// sequence. Subscribers pick distinct `stream` values so that their
    /// draws are independent of each other and of registration order.
    pub fn rng(&self, stream: u64) -> StdRng {
        let hour = self
            .global_tick
            .wrapping_mul(u64::from(HOURS_PER_DAY))
            .wrapping_add(u64::from(self.local_tick));
        StdRng::seed_from_u64(mix_seed(self.seed, hour, stream))
    }
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl fmt::Display for WorldClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Day {}, {:02}:00", self.global_tick, self.local_tick)
    }
}

/// Fold seed, hour and stream into one 64-bit seed (splitmix64 finalizer).
const fn mix_seed(seed: u64, hour: u64, stream: u64) -> u64 {
    let mut z = seed
        .wrapping_add(hour.wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(stream.wrapping_mul(0x517c_c1b7_2722_0a95));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// RegionClock
// ---------------------------------------------------------------------------

/// A regional clock locked to the world clock with a timezone offset.
///
/// Positive offsets are east of the reference meridian (ahead), negative
/// offsets west (behind). Only the hour shifts; days are always counted
/// on the world clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionClock {
    id: RegionId,
    name: String,
    offset_hours: i32,
    local_hour: u8,
}

impl RegionClock {
    /// Create a region at hour 0. Call [`sync`](Self::sync) to align it.
    pub fn new(name: impl Into<String>, offset_hours: i32) -> Self {
        Self {
            id: RegionId::new(),
            name: name.into(),
            offset_hours,
            local_hour: 0,
        }
    }

    /// Re-derive the regional hour from the world clock.
    pub fn sync(&mut self, clock: &WorldClock) {
        self.local_hour = Self::hour_at(clock.local_tick(), self.offset_hours);
    }

    /// Regional hour for a world hour and an offset, always within 0..=23.
    pub fn hour_at(world_hour: u8, offset_hours: i32) -> u8 {
        let shifted = i64::from(world_hour).saturating_add(i64::from(offset_hours));
        let wrapped = shifted
            .checked_rem_euclid(i64::from(HOURS_PER_DAY))
            .unwrap_or(0);
        u8::try_from(wrapped).unwrap_or(0)
    }

    /// Region identifier.
    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset from the world clock in hours.
    pub const fn offset_hours(&self) -> i32 {
        self.offset_hours
    }

    /// Hour of day in this region as of the last sync.
    pub const fn local_hour(&self) -> u8 {
        self.local_hour
    }

    /// Descriptive band for the regional hour.
    pub const fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.local_hour)
    }
}

impl fmt::Display for RegionClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:02}:00 (offset {:+})",
            self.name, self.local_hour, self.offset_hours
        )
    }
}
