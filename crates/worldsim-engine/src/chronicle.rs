//! Demo world state driven by the orchestrator.
//!
//! A [`Chronicle`] keeps a record of what the clock told it: how many hours
//! passed in each day, which bands of the day were entered, and an omen
//! drawn at every watch. It simulates nothing on its own.

use rand::seq::IndexedRandom;
use serde::Serialize;
use tracing::{debug, info};
use worldsim_core::events::EventManager;
use worldsim_core::tick::ScheduleError;
use worldsim_core::WorldClock;
use worldsim_types::TimeOfDay;

/// Random stream used for watch omens.
const WATCH_STREAM: u64 = 0x0057_4154_4348;

/// What the watch reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Omen {
    /// Nothing of note.
    Quiet,
    /// Rain on the roads.
    Rain,
    /// Travelers at the gate.
    Travelers,
    /// Wolves heard in the hills.
    Wolves,
    /// Lanterns lit for a festival.
    Festival,
}

const OMENS: [Omen; 5] = [
    Omen::Quiet,
    Omen::Rain,
    Omen::Travelers,
    Omen::Wolves,
    Omen::Festival,
];

/// One watch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    /// Day of the watch.
    pub day: u64,
    /// Hour of the watch.
    pub hour: u8,
    /// What was seen.
    pub omen: Omen,
}

/// Hours and band changes observed during one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayRecord {
    /// Day the record belongs to.
    pub day: u64,
    /// Hour advances observed until the day closed.
    pub hours_observed: u32,
    /// Bands entered, in order.
    pub bands: Vec<TimeOfDay>,
}

/// The chronicle world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chronicle {
    name: String,
    closed_days: Vec<DayRecord>,
    current: DayRecord,
    watches: Vec<WatchReport>,
    last_band: TimeOfDay,
}

impl Chronicle {
    /// Start a chronicle at the given clock position.
    pub fn new(name: impl Into<String>, clock: &WorldClock) -> Self {
        Self {
            name: name.into(),
            closed_days: Vec::new(),
            current: DayRecord {
                day: clock.global_tick(),
                ..DayRecord::default()
            },
            watches: Vec::new(),
            last_band: clock.time_of_day(),
        }
    }

    /// Count an hour and note a band change.
    pub fn observe_hour(&mut self, clock: &WorldClock) {
        self.current.hours_observed = self.current.hours_observed.saturating_add(1);
        let band = clock.time_of_day();
        if band != self.last_band {
            debug!(%clock, %band, "Band changed");
            self.current.bands.push(band);
            self.last_band = band;
        }
    }

    /// Close the running day record and open the next one.
    pub fn close_day(&mut self, clock: &WorldClock) {
        let next = DayRecord {
            day: clock.global_tick(),
            ..DayRecord::default()
        };
        let closed = std::mem::replace(&mut self.current, next);
        info!(
            chronicle = %self.name,
            day = closed.day,
            hours = closed.hours_observed,
            watches = self.watches.iter().filter(|w| w.day == closed.day).count(),
            "Day closed"
        );
        self.closed_days.push(closed);
    }

    /// Draw an omen for this hour's watch.
    pub fn record_watch(&mut self, clock: &WorldClock) {
        let mut rng = clock.rng(WATCH_STREAM);
        let omen = OMENS.choose(&mut rng).copied().unwrap_or(Omen::Quiet);
        debug!(%clock, ?omen, "Watch reported");
        self.watches.push(WatchReport {
            day: clock.global_tick(),
            hour: clock.local_tick(),
            omen,
        });
    }

    /// Chronicle name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Days closed so far, oldest first.
    pub fn closed_days(&self) -> &[DayRecord] {
        &self.closed_days
    }

    /// All watch reports, oldest first.
    pub fn watches(&self) -> &[WatchReport] {
        &self.watches
    }
}

/// Register the chronicle's hourly, daily and watch handlers.
///
/// # Errors
///
/// Returns [`ScheduleError::NonPositivePeriod`] if `watch_hours` is zero.
pub fn register<C: 'static>(
    manager: &mut EventManager<Chronicle, C>,
    watch_hours: u32,
) -> Result<(), ScheduleError> {
    manager.register_hourly(|chronicle: &mut Chronicle, clock, _| {
        chronicle.observe_hour(clock);
        Ok(())
    });
    manager.register_global(|chronicle: &mut Chronicle, clock, _| {
        chronicle.close_day(clock);
        Ok(())
    });
    manager.register_interval(watch_hours, |chronicle: &mut Chronicle, clock, _| {
        chronicle.record_watch(clock);
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use worldsim_core::TimeSystem;

    use super::*;

    fn run_chronicle(seed: u64, hours: u64) -> Chronicle {
        let system: TimeSystem = TimeSystem::new(WorldClock::new(seed));
        let chronicle = Chronicle::new("Test", system.clock());
        let mut manager = EventManager::new(chronicle, system);
        register(&mut manager, 6).unwrap();
        manager.run(hours).unwrap();
        manager.into_world().unwrap()
    }

    #[test]
    fn two_days_are_closed() {
        let chronicle = run_chronicle(11, 48);
        let days = chronicle.closed_days();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, 0);
        assert_eq!(days[0].hours_observed, 24);
        assert_eq!(days[1].day, 1);
        assert_eq!(
            days[0].bands,
            vec![
                TimeOfDay::Dawn,
                TimeOfDay::Morning,
                TimeOfDay::Afternoon,
                TimeOfDay::Evening,
                TimeOfDay::Dusk,
                TimeOfDay::Night,
            ]
        );
    }

    #[test]
    fn watches_follow_the_interval() {
        let chronicle = run_chronicle(11, 48);
        let hours: Vec<(u64, u8)> = chronicle
            .watches()
            .iter()
            .map(|w| (w.day, w.hour))
            .collect();
        assert_eq!(
            hours,
            vec![(0, 6), (0, 12), (0, 18), (1, 0), (1, 6), (1, 12), (1, 18), (2, 0)]
        );
    }

    #[test]
    fn same_seed_same_chronicle() {
        assert_eq!(run_chronicle(5, 72), run_chronicle(5, 72));
    }

    #[test]
    fn zero_watch_interval_is_rejected() {
        let system: TimeSystem = TimeSystem::new(WorldClock::new(1));
        let chronicle = Chronicle::new("Test", system.clock());
        let mut manager = EventManager::new(chronicle, system);
        assert!(register(&mut manager, 0).is_err());
    }
}
