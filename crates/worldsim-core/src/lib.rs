//! World clock, tick orchestration and event dispatch for worldsim.
//!
//! The simulation advances one in-game hour at a time. Each advance
//! notifies subscribers in three tiers: hourly ("local"), daily ("global")
//! and every-N-hours. Ordering is fixed by registration, so a given script
//! of subscriptions and advances always produces the same sequence of
//! callbacks.
//!
//! # Modules
//!
//! - [`clock`] -- [`WorldClock`] day/hour counters, regional clocks and
//!   per-tick deterministic random streams.
//! - [`config`] -- Configuration loading from `worldsim-config.yaml` into
//!   strongly-typed structs.
//! - [`tick`] -- The [`TimeSystem`] orchestrator and its subscriber tiers.
//! - [`events`] -- [`EventManager`], which feeds ticks into a world state.
//! - [`runner`] -- Paced async run loop with operator controls.
//!
//! [`WorldClock`]: clock::WorldClock
//! [`TimeSystem`]: tick::TimeSystem
//! [`EventManager`]: events::EventManager

pub mod clock;
pub mod config;
pub mod events;
pub mod runner;
pub mod tick;

pub use clock::{ClockError, ClockTime, RegionClock, WorldClock};
pub use events::EventManager;
pub use tick::{CallbackError, FailurePolicy, TickError, TickSummary, TimeSystem};
