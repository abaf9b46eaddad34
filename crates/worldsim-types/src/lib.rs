//! Shared type definitions for the worldsim tick orchestrator.
//!
//! Everything here is plain data: identifiers, the closed set of subscriber
//! cadences, the orchestrator's lifecycle state and the time-of-day bands
//! used for narration. Behavior lives in `worldsim-core`.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes for regions and subscriptions
//! - [`enums`] -- Cadences, orchestrator state and time-of-day bands

pub mod enums;
pub mod ids;

pub use enums::{Cadence, OrchestratorState, ParseCadenceError, TimeOfDay};
pub use ids::{RegionId, SubscriptionId};
