//! Enumeration types shared across the workspace.

use core::fmt;
use core::num::NonZeroU32;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// How often a subscriber is notified.
///
/// The set is closed: hourly, daily, or every N hours. Textual labels only
/// exist at the edges (config files, CLI) and are parsed once through
/// [`FromStr`]; after that the orchestrator dispatches on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every local tick (one in-game hour).
    Local,
    /// Every global tick (one in-game day), on the hour the day rolls over.
    Global,
    /// Every N local ticks, counted from the orchestrator's first advance.
    Every(NonZeroU32),
}

impl Cadence {
    /// Build an [`Cadence::Every`] cadence, or `None` when `hours` is zero.
    pub const fn every(hours: u32) -> Option<Self> {
        match NonZeroU32::new(hours) {
            Some(n) => Some(Self::Every(n)),
            None => None,
        }
    }

    /// Return the period in hours for [`Cadence::Every`], `None` otherwise.
    pub const fn period(self) -> Option<NonZeroU32> {
        match self {
            Self::Every(n) => Some(n),
            Self::Local | Self::Global => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Global => f.write_str("global"),
            Self::Every(n) => write!(f, "every:{n}"),
        }
    }
}

/// Errors produced when parsing a textual cadence label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCadenceError {
    /// The label is not `local`, `global`, `every:N` or a bare integer.
    #[error("unknown cadence label {label:?}; expected \"local\", \"global\" or \"every:N\"")]
    Unknown {
        /// The rejected label.
        label: String,
    },

    /// The label names a periodic cadence with a period of zero or less.
    #[error("cadence period must be a positive number of hours, got {label:?}")]
    NonPositivePeriod {
        /// The rejected label.
        label: String,
    },
}

impl FromStr for Cadence {
    type Err = ParseCadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        match label.as_str() {
            "local" => return Ok(Self::Local),
            "global" => return Ok(Self::Global),
            _ => {}
        }

        let digits = label.strip_prefix("every:").unwrap_or(&label);
        let Ok(period) = digits.trim().parse::<i64>() else {
            return Err(ParseCadenceError::Unknown {
                label: s.to_owned(),
            });
        };
        u32::try_from(period)
            .ok()
            .and_then(Self::every)
            .ok_or_else(|| ParseCadenceError::NonPositivePeriod {
                label: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator state
// ---------------------------------------------------------------------------

/// Lifecycle of a tick orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrchestratorState {
    /// No advance in progress.
    #[default]
    Idle,
    /// Subscribers are being notified for the current tick.
    Advancing,
}

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// Descriptive band of the day, derived from the hour (0-23).
///
/// Used for NPC schedules, lighting and narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 04:00 to 05:59.
    Dawn,
    /// 06:00 to 11:59.
    Morning,
    /// 12:00 to 16:59.
    Afternoon,
    /// 17:00 to 18:59.
    Evening,
    /// 19:00 to 20:59.
    Dusk,
    /// 21:00 to 03:59.
    Night,
}

impl TimeOfDay {
    /// Map an hour of day to its band. Hours outside 0-23 fall into `Night`.
    pub const fn from_hour(hour: u8) -> Self {
        match hour {
            4..=5 => Self::Dawn,
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=18 => Self::Evening,
            19..=20 => Self::Dusk,
            _ => Self::Night,
        }
    }

    /// Lowercase label, e.g. `"dawn"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Dusk => "dusk",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_cadences() {
        assert_eq!("local".parse::<Cadence>().unwrap(), Cadence::Local);
        assert_eq!(" Global ".parse::<Cadence>().unwrap(), Cadence::Global);
    }

    #[test]
    fn parses_periodic_cadences() {
        assert_eq!("every:6".parse::<Cadence>().unwrap(), Cadence::every(6).unwrap());
        assert_eq!("48".parse::<Cadence>().unwrap(), Cadence::every(48).unwrap());
    }

    #[test]
    fn rejects_unknown_label() {
        let err = "weekly".parse::<Cadence>().unwrap_err();
        assert!(matches!(err, ParseCadenceError::Unknown { .. }));
    }

    #[test]
    fn rejects_non_positive_period() {
        for label in ["0", "every:0", "-6", "every:-1"] {
            let err = label.parse::<Cadence>().unwrap_err();
            assert!(
                matches!(err, ParseCadenceError::NonPositivePeriod { .. }),
                "{label} should be a non-positive period"
            );
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for cadence in [Cadence::Local, Cadence::Global, Cadence::every(12).unwrap()] {
            assert_eq!(cadence.to_string().parse::<Cadence>().unwrap(), cadence);
        }
    }

    #[test]
    fn every_zero_is_none() {
        assert_eq!(Cadence::every(0), None);
        assert_eq!(Cadence::Local.period(), None);
        assert_eq!(Cadence::every(3).and_then(Cadence::period).map(NonZeroU32::get), Some(3));
    }

    #[test]
    fn time_of_day_bands() {
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(3), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Dawn);
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(19), TimeOfDay::Dusk);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
    }

    #[test]
    fn orchestrator_starts_idle() {
        assert_eq!(OrchestratorState::default(), OrchestratorState::Idle);
    }

    #[test]
    fn cadence_serde_roundtrip() {
        assert_eq!(serde_json::to_string(&Cadence::Local).unwrap(), r#""local""#);
        assert_eq!(
            serde_json::to_string(&Cadence::every(6).unwrap()).unwrap(),
            r#"{"every":6}"#
        );
        for cadence in [Cadence::Local, Cadence::Global, Cadence::every(24).unwrap()] {
            let json = serde_json::to_string(&cadence).unwrap();
            assert_eq!(serde_json::from_str::<Cadence>(&json).unwrap(), cadence);
        }
    }

    #[test]
    fn cadence_serde_rejects_zero_period() {
        assert!(serde_json::from_str::<Cadence>(r#"{"every":0}"#).is_err());
    }

    #[test]
    fn orchestrator_state_serde_roundtrip() {
        for state in [OrchestratorState::Idle, OrchestratorState::Advancing] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(serde_json::from_str::<OrchestratorState>(&json).unwrap(), state);
        }
    }
}
