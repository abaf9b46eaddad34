//! Property and scenario tests for the tick orchestrator.
//!
//! These drive a [`TimeSystem`] through generated start positions and
//! advance counts and check the clock arithmetic, tier cadences and
//! deterministic ordering that every run depends on.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rand::Rng;
use worldsim_core::config::SimulationConfig;
use worldsim_core::{RegionClock, TimeSystem, WorldClock};
use worldsim_types::Cadence;

type Log = Rc<RefCell<Vec<String>>>;

/// Subscribe one recorder per tier and return the shared log.
fn wire_recorders(system: &mut TimeSystem) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    for (name, cadence) in [
        ("local-a", Cadence::Local),
        ("every-5", Cadence::every(5).unwrap()),
        ("global", Cadence::Global),
        ("local-b", Cadence::Local),
        ("every-2", Cadence::every(2).unwrap()),
    ] {
        let sink = Rc::clone(&log);
        system.subscribe(cadence, move |clock, _| {
            let draw: u32 = clock.rng(7).random_range(0..1000);
            sink.borrow_mut().push(format!("{name}@{clock}#{draw}"));
            Ok(())
        });
    }
    log
}

fn counter(system: &mut TimeSystem, cadence: Cadence) -> Rc<RefCell<u64>> {
    let count = Rc::new(RefCell::new(0_u64));
    let sink = Rc::clone(&count);
    system.subscribe(cadence, move |_, _| {
        *sink.borrow_mut() += 1;
        Ok(())
    });
    count
}

#[test]
fn start_near_midnight_rolls_over_once() {
    let clock = WorldClock::from_parts(0, 22, 1).unwrap();
    let mut ts = TimeSystem::new(clock);
    let globals = counter(&mut ts, Cadence::Global);
    let locals = counter(&mut ts, Cadence::Local);

    ts.run(3).unwrap();

    assert_eq!(ts.clock().global_tick(), 1);
    assert_eq!(ts.clock().local_tick(), 1);
    assert_eq!(*globals.borrow(), 1);
    assert_eq!(*locals.borrow(), 3);
}

#[test]
fn every_n_counts_advances_not_hours_of_day() {
    let start = WorldClock::from_parts(0, 22, 1).unwrap();
    let mut ts: TimeSystem = TimeSystem::new(start);
    let fired: Rc<RefCell<Vec<(u64, u64, u8)>>> = Rc::default();
    let sink = Rc::clone(&fired);
    ts.subscribe_every(6, move |clock, _| {
        let advanced = clock.total_hours().unwrap() - start.total_hours().unwrap();
        sink.borrow_mut()
            .push((advanced, clock.global_tick(), clock.local_tick()));
        Ok(())
    })
    .unwrap();

    ts.run(20).unwrap();

    assert_eq!(
        *fired.borrow(),
        vec![(6, 1, 4), (12, 1, 10), (18, 1, 16)]
    );
}

#[test]
fn mixed_tiers_fire_in_fixed_order() {
    let mut ts = TimeSystem::new(WorldClock::from_parts(0, 23, 5).unwrap());
    let log = wire_recorders(&mut ts);

    ts.run(2).unwrap();

    let names: Vec<String> = log
        .borrow()
        .iter()
        .map(|entry| entry.split('@').next().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            // hour 1: rollover to day 1
            "local-a", "local-b", "global",
            // hour 2
            "local-a", "local-b", "every-2",
        ]
    );
}

#[test]
fn identical_scripts_produce_identical_logs() {
    let run = || {
        let config = SimulationConfig::parse("world:\n  seed: 4242\ntime:\n  start_hour: 17\n")
            .unwrap();
        let mut ts: TimeSystem = TimeSystem::from_config(&config).unwrap();
        let log = wire_recorders(&mut ts);
        ts.run(100).unwrap();
        let entries = log.borrow().clone();
        entries
    };
    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

#[test]
fn different_seeds_draw_different_values() {
    let draws = |seed| {
        let mut ts = TimeSystem::new(WorldClock::new(seed));
        let log = wire_recorders(&mut ts);
        ts.run(48).unwrap();
        let entries = log.borrow().clone();
        entries
    };
    assert_ne!(draws(1), draws(2));
}

#[test]
fn regions_follow_the_world_clock() {
    let config = SimulationConfig::parse(
        "time:\n  start_hour: 20\n  regions:\n    - name: East\n      offset_hours: 5\n    - name: West\n      offset_hours: -21\n",
    )
    .unwrap();
    let mut ts: TimeSystem = TimeSystem::from_config(&config).unwrap();
    ts.run(4).unwrap();

    assert_eq!(ts.clock().local_tick(), 0);
    assert_eq!(ts.region("East").map(RegionClock::local_hour), Some(5));
    assert_eq!(ts.region("West").map(RegionClock::local_hour), Some(3));
    assert!(ts.region("North").is_none());
}

proptest! {
    #[test]
    fn clock_arithmetic_matches_closed_form(start_hour in 0_u8..24, hours in 0_u64..2_000) {
        let mut ts: TimeSystem = TimeSystem::new(WorldClock::from_parts(0, start_hour, 0).unwrap());
        ts.run(hours).unwrap();
        let total = u64::from(start_hour) + hours;
        prop_assert_eq!(ts.clock().global_tick(), total / 24);
        prop_assert_eq!(u64::from(ts.clock().local_tick()), total % 24);
        prop_assert_eq!(ts.elapsed_hours(), hours);
    }

    #[test]
    fn tier_counts_match_cadences(start_hour in 0_u8..24, hours in 0_u64..500, period in 1_u32..50) {
        let mut ts: TimeSystem = TimeSystem::new(WorldClock::from_parts(0, start_hour, 0).unwrap());
        let locals = counter(&mut ts, Cadence::Local);
        let globals = counter(&mut ts, Cadence::Global);
        let periodic = counter(&mut ts, Cadence::every(period).unwrap());

        ts.run(hours).unwrap();

        let total = u64::from(start_hour) + hours;
        prop_assert_eq!(*locals.borrow(), hours);
        prop_assert_eq!(*globals.borrow(), total / 24);
        prop_assert_eq!(*periodic.borrow(), hours / u64::from(period));
    }

    #[test]
    fn every_n_fires_on_multiples_of_elapsed(start_hour in 1_u8..24, hours in 0_u64..300, period in 1_u32..40) {
        let mut ts: TimeSystem = TimeSystem::new(WorldClock::from_parts(0, start_hour, 0).unwrap());
        let origin = u64::from(start_hour);
        let fired: Rc<RefCell<Vec<u64>>> = Rc::default();
        let sink = Rc::clone(&fired);
        ts.subscribe_every(period, move |clock, _| {
            sink.borrow_mut().push(clock.total_hours().unwrap() - origin);
            Ok(())
        })
        .unwrap();

        ts.run(hours).unwrap();

        let expected: Vec<u64> = (1..=hours).filter(|n| n % u64::from(period) == 0).collect();
        prop_assert_eq!(fired.borrow().clone(), expected);
    }

    #[test]
    fn region_hour_is_offset_modulo_day(world_hour in 0_u8..24, offset in -200_i32..200) {
        let hour = RegionClock::hour_at(world_hour, offset);
        prop_assert!(hour < 24);
        prop_assert_eq!(i32::from(hour), (i32::from(world_hour) + offset).rem_euclid(24));
    }
}
