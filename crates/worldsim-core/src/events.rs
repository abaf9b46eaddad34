//! World-state event manager.
//!
//! [`EventManager`] connects orchestrator ticks with updates to a world
//! state `W`. Handlers receive `(&mut W, &WorldClock, Option<&C>)`; the
//! manager registers a thin wrapper for each one with its [`TimeSystem`],
//! and keeps its own ordered lists so that every handler can also be run
//! on demand through [`trigger_all`](EventManager::trigger_all).
//!
//! The world sits in an `Rc<RefCell<W>>` shared with the wrappers. Only one
//! handler runs at a time, so the borrow is always free; if it ever is not,
//! the handler fails with a [`CallbackError`] instead of panicking.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use tracing::{debug, warn};
use worldsim_types::{Cadence, RegionId, SubscriptionId};

use crate::clock::WorldClock;
use crate::tick::{
    CallbackError, FailurePolicy, ScheduleError, SubscriberFailure, TickError, TickSummary,
    TimeSystem,
};

/// Boxed world handler: `(world, clock, context)`.
pub type Handler<W, C> =
    Box<dyn FnMut(&mut W, &WorldClock, Option<&C>) -> Result<(), CallbackError>>;

type SharedHandler<W, C> = Rc<RefCell<Handler<W, C>>>;

/// A handler together with the subscription that drives it.
struct Registered<W, C> {
    id: SubscriptionId,
    cadence: Cadence,
    handler: SharedHandler<W, C>,
}

/// Owns a world state and a [`TimeSystem`], and routes ticks into the world.
pub struct EventManager<W, C = RegionId> {
    world: Rc<RefCell<W>>,
    time_system: TimeSystem<C>,
    global: Vec<Registered<W, C>>,
    hourly: Vec<Registered<W, C>>,
    interval: Vec<Registered<W, C>>,
}

impl<W: 'static, C: 'static> EventManager<W, C> {
    /// Wrap a world state and an orchestrator.
    pub fn new(world: W, time_system: TimeSystem<C>) -> Self {
        Self {
            world: Rc::new(RefCell::new(world)),
            time_system,
            global: Vec::new(),
            hourly: Vec::new(),
            interval: Vec::new(),
        }
    }

    /// Run `handler` once per in-game day.
    pub fn register_global<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut W, &WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        let registered = self.register(Cadence::Global, Box::new(handler));
        let id = registered.id;
        self.global.push(registered);
        id
    }

    /// Run `handler` every in-game hour.
    pub fn register_hourly<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut W, &WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        let registered = self.register(Cadence::Local, Box::new(handler));
        let id = registered.id;
        self.hourly.push(registered);
        id
    }

    /// Run `handler` every `hours` in-game hours.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NonPositivePeriod`] if `hours` is zero.
    pub fn register_interval<F>(
        &mut self,
        hours: u32,
        handler: F,
    ) -> Result<SubscriptionId, ScheduleError>
    where
        F: FnMut(&mut W, &WorldClock, Option<&C>) -> Result<(), CallbackError> + 'static,
    {
        let cadence = Cadence::every(hours).ok_or_else(|| ScheduleError::NonPositivePeriod {
            label: hours.to_string(),
        })?;
        let registered = self.register(cadence, Box::new(handler));
        let id = registered.id;
        self.interval.push(registered);
        Ok(id)
    }

    /// Remove a handler from both the manager and the orchestrator.
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        let removed = self.time_system.unsubscribe(id);
        for list in [&mut self.global, &mut self.hourly, &mut self.interval] {
            list.retain(|r| r.id != id);
        }
        removed
    }

    /// Forget handlers whose subscription was removed directly on the
    /// orchestrator.
    fn prune_detached(&mut self) {
        let Self {
            time_system,
            global,
            hourly,
            interval,
            ..
        } = self;
        for list in [global, hourly, interval] {
            list.retain(|r| time_system.contains(r.id));
        }
    }

    fn register(&mut self, cadence: Cadence, handler: Handler<W, C>) -> Registered<W, C> {
        let handler = Rc::new(RefCell::new(handler));
        let world = Rc::clone(&self.world);
        let shared = Rc::clone(&handler);
        let id = self
            .time_system
            .subscribe(cadence, move |clock: &WorldClock, context: Option<&C>| {
                invoke(&world, &shared, clock, context)
            });
        Registered {
            id,
            cadence,
            handler,
        }
    }

    /// Run every registered handler once against the current clock without
    /// advancing time: daily handlers first, then hourly, then interval
    /// handlers, each in registration order.
    ///
    /// Failures follow the orchestrator's [`FailurePolicy`]. Under
    /// [`FailurePolicy::Isolate`] they are returned in run order.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Subscriber`] for the first failure under
    /// [`FailurePolicy::Halt`].
    pub fn trigger_all(&mut self) -> Result<Vec<SubscriberFailure>, TickError> {
        self.prune_detached();
        let clock = *self.time_system.clock();
        let policy = self.time_system.failure_policy();
        let mut failures = Vec::new();

        for registered in self.global.iter().chain(&self.hourly).chain(&self.interval) {
            let Err(error) = invoke(&self.world, &registered.handler, &clock, None) else {
                continue;
            };
            warn!(
                id = %registered.id,
                cadence = %registered.cadence,
                %error,
                "Handler failed during trigger_all"
            );
            if policy == FailurePolicy::Halt {
                return Err(TickError::Subscriber {
                    id: registered.id,
                    cadence: registered.cadence,
                    source: error,
                });
            }
            failures.push(SubscriberFailure {
                id: registered.id,
                cadence: registered.cadence,
                error,
            });
        }

        debug!(
            handlers = self.handler_count(),
            failures = failures.len(),
            "Triggered all handlers"
        );
        Ok(failures)
    }

    /// Advance the orchestrator by one hour.
    ///
    /// # Errors
    ///
    /// Propagates [`TickError`] from [`TimeSystem::advance_one_hour`].
    pub fn advance_one_hour(&mut self) -> Result<TickSummary, TickError> {
        self.time_system.advance_one_hour()
    }

    /// Advance the orchestrator by `hours` hours.
    ///
    /// # Errors
    ///
    /// Propagates the first [`TickError`].
    pub fn run(&mut self, hours: u64) -> Result<Option<TickSummary>, TickError> {
        self.time_system.run(hours)
    }

    /// Borrow the world state.
    pub fn world(&self) -> Ref<'_, W> {
        self.world.borrow()
    }

    /// Mutably borrow the world state between ticks.
    pub fn world_mut(&mut self) -> RefMut<'_, W> {
        self.world.borrow_mut()
    }

    /// Consume the manager and return the world state.
    ///
    /// Returns `None` only if the world is still shared, which cannot
    /// happen once every handler has been dropped with the orchestrator.
    pub fn into_world(self) -> Option<W> {
        let Self {
            world,
            time_system,
            global,
            hourly,
            interval,
        } = self;
        drop((time_system, global, hourly, interval));
        Rc::try_unwrap(world).ok().map(RefCell::into_inner)
    }

    /// The wrapped orchestrator.
    pub const fn time_system(&self) -> &TimeSystem<C> {
        &self.time_system
    }

    /// The wrapped orchestrator, e.g. to add regions or plain subscribers.
    ///
    /// A handler unsubscribed here is also dropped from
    /// [`trigger_all`](Self::trigger_all) and [`handler_count`](Self::handler_count).
    pub const fn time_system_mut(&mut self) -> &mut TimeSystem<C> {
        &mut self.time_system
    }

    /// Number of handlers currently registered.
    pub fn handler_count(&self) -> usize {
        self.global
            .iter()
            .chain(&self.hourly)
            .chain(&self.interval)
            .filter(|r| self.time_system.contains(r.id))
            .count()
    }
}

fn invoke<W, C>(
    world: &Rc<RefCell<W>>,
    handler: &SharedHandler<W, C>,
    clock: &WorldClock,
    context: Option<&C>,
) -> Result<(), CallbackError> {
    let mut world = world
        .try_borrow_mut()
        .map_err(|_err| CallbackError::new("world state is already borrowed"))?;
    let mut handler = handler
        .try_borrow_mut()
        .map_err(|_err| CallbackError::new("handler is already running"))?;
    (*handler)(&mut world, clock, context)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Ledger {
        hours: u32,
        days: Vec<u64>,
        watches: Vec<u8>,
        notes: Vec<&'static str>,
    }

    fn manager() -> EventManager<Ledger> {
        EventManager::new(Ledger::default(), TimeSystem::new(WorldClock::new(9)))
    }

    #[test]
    fn handlers_mutate_world_on_their_cadence() {
        let mut em = manager();
        em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        em.register_global(|w: &mut Ledger, clock, _| {
            w.days.push(clock.global_tick());
            Ok(())
        });
        em.register_interval(6, |w: &mut Ledger, clock, _| {
            w.watches.push(clock.local_tick());
            Ok(())
        })
        .unwrap();

        em.run(48).unwrap();

        let world = em.world();
        assert_eq!(world.hours, 48);
        assert_eq!(world.days, vec![1, 2]);
        assert_eq!(world.watches, vec![6, 12, 18, 0, 6, 12, 18, 0]);
    }

    #[test]
    fn trigger_all_runs_each_handler_once_in_order() {
        let mut em = manager();
        em.register_interval(48, |w: &mut Ledger, _, _| {
            w.notes.push("interval");
            Ok(())
        })
        .unwrap();
        em.register_hourly(|w: &mut Ledger, _, _| {
            w.notes.push("hourly");
            Ok(())
        });
        em.register_global(|w: &mut Ledger, _, _| {
            w.notes.push("global");
            Ok(())
        });

        let failures = em.trigger_all().unwrap();
        assert!(failures.is_empty());
        assert_eq!(em.world().notes, vec!["global", "hourly", "interval"]);
        assert_eq!(em.time_system().clock().local_tick(), 0);
        assert_eq!(em.time_system().elapsed_hours(), 0);
    }

    #[test]
    fn trigger_all_isolates_failures() {
        let mut em = manager();
        let bad = em.register_global(|_: &mut Ledger, _, _| Err("no harvest".into()));
        em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        let failures = em.trigger_all().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.first().map(|f| f.id), Some(bad));
        assert_eq!(em.world().hours, 1);
    }

    #[test]
    fn trigger_all_halts_under_halt_policy() {
        let ts = TimeSystem::new(WorldClock::new(9)).with_failure_policy(FailurePolicy::Halt);
        let mut em: EventManager<Ledger> = EventManager::new(Ledger::default(), ts);
        em.register_global(|_: &mut Ledger, _, _| Err("no harvest".into()));
        em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        assert!(matches!(em.trigger_all(), Err(TickError::Subscriber { .. })));
        assert_eq!(em.world().hours, 0);
    }

    #[test]
    fn register_interval_rejects_zero() {
        let mut em = manager();
        let result = em.register_interval(0, |_: &mut Ledger, _, _| Ok(()));
        assert!(matches!(result, Err(ScheduleError::NonPositivePeriod { .. })));
        assert_eq!(em.handler_count(), 0);
    }

    #[test]
    fn unregister_removes_everywhere() {
        let mut em = manager();
        let id = em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        assert!(em.unregister(id));
        assert!(!em.unregister(id));
        em.run(3).unwrap();
        em.trigger_all().unwrap();
        assert_eq!(em.world().hours, 0);
        assert_eq!(em.handler_count(), 0);
    }

    #[test]
    fn into_world_returns_final_state() {
        let mut em = manager();
        em.register_global(|w: &mut Ledger, clock, _| {
            w.days.push(clock.global_tick());
            Ok(())
        });
        em.run(72).unwrap();
        let ledger = em.into_world().unwrap();
        assert_eq!(ledger.days, vec![1, 2, 3]);
    }

    #[test]
    fn handler_removed_on_orchestrator_stays_removed() {
        let mut em = manager();
        let id = em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        em.register_global(|w: &mut Ledger, _, _| {
            w.notes.push("global");
            Ok(())
        });
        assert!(em.time_system_mut().unsubscribe(id));
        assert_eq!(em.handler_count(), 1);

        let failures = em.trigger_all().unwrap();
        assert!(failures.is_empty());
        em.run(2).unwrap();
        assert_eq!(em.world().hours, 0);
        assert_eq!(em.world().notes, vec!["global"]);
        assert!(!em.unregister(id));
        assert_eq!(em.handler_count(), 1);
    }

    #[test]
    fn world_mut_between_ticks() {
        let mut em = manager();
        em.world_mut().hours = 10;
        em.register_hourly(|w: &mut Ledger, _, _| {
            w.hours += 1;
            Ok(())
        });
        em.advance_one_hour().unwrap();
        assert_eq!(em.world().hours, 11);
    }
}
