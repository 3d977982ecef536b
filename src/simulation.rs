/// Simulation execution loop.
///
/// Owns the clock and the event queue: pops the earliest event, advances
/// simulated time to it and hands it to an [`EventHandler`]. The loop is
/// synchronous and single-threaded, so a fixed seed and a fixed input
/// always give the same dispatch order.

use tracing::trace;

use crate::clock::Timestamp;
use crate::error::ProtocolViolation;
use crate::event::{Event, EventId, EventKind};
use crate::eventlog::EventLog;
use crate::node::NodeId;
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Reacts to dispatched events.
///
/// The handler receives a [`SimulationContext`] so it can schedule
/// follow-up events. Returning an error stops the run.
pub trait EventHandler {
    /// Called for every dispatched event.
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> Result<(), ProtocolViolation>;

    /// Deterministic hash of the handler's state, used for log checkpoints.
    fn state_hash(&self) -> u64 {
        0
    }
}

/// A handler backed by a closure, for tests and one-off scripts.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event) -> Result<(), ProtocolViolation>,
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> Result<(), ProtocolViolation> {
        (self)(ctx, event)
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable view of the simulation handed to the handler on each dispatch.
///
/// Borrows the scheduler, so a handler can only add events relative to the
/// current instant and never reorder what is already queued.
pub struct SimulationContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) now: VirtualTime,
}

impl<'a> SimulationContext<'a> {
    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule an event `delay` ticks from now.
    ///
    /// A zero delay fires at the current instant, after everything already
    /// queued for it.
    pub fn schedule_after(
        &mut self,
        delay: u64,
        kind: EventKind,
        target: NodeId,
        sender: NodeId,
        timestamp: Timestamp,
    ) -> EventId {
        // Saturates; such an event lies past any horizon.
        let at = self.now.plus(delay).unwrap_or(VirtualTime::new(u64::MAX));
        self.scheduler.schedule(at, kind, target, sender, timestamp)
    }

    /// Number of pending events in the scheduler.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────

/// Why the loop stopped. Both are normal terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SimulationEnd {
    /// No events remain.
    Drained,
    /// The next event lies past the horizon; it stays queued.
    HorizonReached { next: VirtualTime },
}

/// Result of a single [`Simulation::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Dispatched(Event),
    Finished(SimulationEnd),
}

/// Summary of a [`Simulation::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Events dispatched during this call.
    pub processed: u64,
    pub end: SimulationEnd,
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Time never runs backward: it only changes in [`Simulation::advance`],
/// which moves it to the popped event's time.
#[derive(Debug, Clone)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    horizon: Option<VirtualTime>,
    events_processed: u64,
    log: Option<EventLog>,
}

impl Simulation {
    /// Create an unbounded simulation starting at time zero.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            horizon: None,
            events_processed: 0,
            log: None,
        }
    }

    /// Create a simulation that stops once the next event is after `horizon`.
    pub fn with_horizon(horizon: VirtualTime) -> Self {
        Simulation {
            horizon: Some(horizon),
            ..Self::new()
        }
    }

    /// Record every dispatched event.
    pub fn enable_logging(&mut self) {
        self.log = Some(EventLog::new());
    }

    /// Record every dispatched event and checkpoint the handler state every
    /// `interval` events.
    pub fn enable_logging_with_checkpoints(&mut self, interval: u64) {
        self.log = Some(EventLog::with_checkpoint_interval(interval));
    }

    /// The event log, if logging is enabled.
    pub fn event_log(&self) -> Option<&EventLog> {
        self.log.as_ref()
    }

    /// Current simulated time.
    pub fn now(&self) -> VirtualTime {
        self.current_time
    }

    pub fn horizon(&self) -> Option<VirtualTime> {
        self.horizon
    }

    /// Total events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Schedule an event `delay` ticks after the current time.
    pub fn schedule(
        &mut self,
        delay: u64,
        kind: EventKind,
        target: NodeId,
        sender: NodeId,
        timestamp: Timestamp,
    ) -> EventId {
        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        ctx.schedule_after(delay, kind, target, sender, timestamp)
    }

    /// Schedule an event at an absolute time, used for initial seeding.
    ///
    /// # Panics
    /// Panics if `at` is before the current time.
    pub fn schedule_at(
        &mut self,
        at: VirtualTime,
        kind: EventKind,
        target: NodeId,
        sender: NodeId,
        timestamp: Timestamp,
    ) -> EventId {
        assert!(
            at >= self.current_time,
            "Cannot schedule event in the past: now={}, at={}",
            self.current_time,
            at
        );
        self.scheduler.schedule(at, kind, target, sender, timestamp)
    }

    /// Remove the earliest event and move the clock to its time.
    ///
    /// Leaves the queue untouched when the next event is past the horizon.
    pub fn advance(&mut self) -> Result<Event, SimulationEnd> {
        let next = match self.scheduler.peek_next() {
            None => return Err(SimulationEnd::Drained),
            Some(event) => event.scheduled_at,
        };
        if let Some(horizon) = self.horizon {
            if next.is_after(horizon) {
                return Err(SimulationEnd::HorizonReached { next });
            }
        }
        let event = self.scheduler.pop_next().ok_or(SimulationEnd::Drained)?;

        assert!(
            event.scheduled_at >= self.current_time,
            "Time went backward! current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        Ok(event)
    }

    /// Advance by exactly one event and dispatch it.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> Result<Step, ProtocolViolation> {
        let event = match self.advance() {
            Ok(event) => event,
            Err(end) => return Ok(Step::Finished(end)),
        };
        self.events_processed += 1;
        trace!(time = self.current_time.ticks(), event = %event, "dispatch");

        if let Some(log) = self.log.as_mut() {
            log.record(event.clone());
        }

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event)?;

        if let Some(log) = self.log.as_mut() {
            if log.should_checkpoint(self.events_processed) {
                log.add_checkpoint(self.events_processed, self.current_time, handler.state_hash());
            }
        }

        Ok(Step::Dispatched(event))
    }

    /// Run until the queue drains or the horizon is reached.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> Result<RunOutcome, ProtocolViolation> {
        let start = self.events_processed;
        loop {
            if let Step::Finished(end) = self.step(handler)? {
                return Ok(RunOutcome {
                    processed: self.events_processed - start,
                    end,
                });
            }
        }
    }

    /// Run at most `max_steps` events. Returns how many were dispatched.
    pub fn run_for(
        &mut self,
        max_steps: u64,
        handler: &mut dyn EventHandler,
    ) -> Result<u64, ProtocolViolation> {
        let start = self.events_processed;
        for _ in 0..max_steps {
            if let Step::Finished(_) = self.step(handler)? {
                break;
            }
        }
        Ok(self.events_processed - start)
    }

    /// `true` if no event can be dispatched anymore.
    pub fn is_finished(&self) -> bool {
        self.end().is_some()
    }

    /// How the run ended, or `None` while events remain to dispatch.
    pub fn end(&self) -> Option<SimulationEnd> {
        match (self.scheduler.peek_next(), self.horizon) {
            (None, _) => Some(SimulationEnd::Drained),
            (Some(next), Some(horizon)) if next.scheduled_at.is_after(horizon) => {
                Some(SimulationEnd::HorizonReached {
                    next: next.scheduled_at,
                })
            }
            _ => None,
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
