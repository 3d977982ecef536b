/// Deterministic event queue.
///
/// A `BinaryHeap` over `Event`, whose `Ord` is reversed so the heap pops
/// the smallest `(scheduled_at, event_id)` first. Event IDs come from a
/// single monotonic counter, so same-time events leave in insertion order.

use std::collections::BinaryHeap;

use crate::clock::Timestamp;
use crate::event::{Event, EventId, EventIdGen, EventKind};
use crate::node::NodeId;
use crate::time::VirtualTime;

/// Owns the pending events and the ID generator.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Queue an event at absolute time `at`. Returns its ID.
    pub fn schedule(
        &mut self,
        at: VirtualTime,
        kind: EventKind,
        target: NodeId,
        sender: NodeId,
        timestamp: Timestamp,
    ) -> EventId {
        let id = self.id_gen.next_id();
        self.queue
            .push(Event::new(id, at, kind, target, sender, timestamp));
        id
    }

    /// Pop the next event (earliest time, lowest ID).
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// Peek at the next event without removing it.
    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// The ID the next scheduled event will receive.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Drain all events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            events.push(e);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(sched: &mut Scheduler, at: u64, target: u64) -> EventId {
        let node = NodeId::new(target);
        sched.schedule(
            VirtualTime::new(at),
            EventKind::Request,
            node,
            node,
            Timestamp::ZERO,
        )
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();
        push(&mut sched, 10, 0);
        push(&mut sched, 10, 1);
        push(&mut sched, 10, 2);

        let targets: Vec<u64> = sched
            .drain_ordered()
            .iter()
            .map(|e| e.target.raw())
            .collect();
        assert_eq!(targets, vec![0, 1, 2]);
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();
        push(&mut sched, 30, 0);
        push(&mut sched, 10, 1);
        push(&mut sched, 20, 2);

        let times: Vec<u64> = sched
            .drain_ordered()
            .iter()
            .map(|e| e.scheduled_at.ticks())
            .collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn test_mixed_ordering() {
        let mut sched = Scheduler::new();
        for (i, at) in [50, 10, 10, 30, 10, 0, 30].into_iter().enumerate() {
            push(&mut sched, at, i as u64);
        }

        let events = sched.drain_ordered();
        assert_eq!(events.len(), 7);
        for window in events.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            assert!(
                (a.scheduled_at, a.id) < (b.scheduled_at, b.id),
                "Events out of order: {:?} vs {:?}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut sched = Scheduler::new();
        let id = push(&mut sched, 5, 0);
        assert_eq!(sched.peek_next().map(|e| e.id), Some(id));
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.pop_next().map(|e| e.id), Some(id));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_empty_scheduler() {
        let mut sched = Scheduler::new();
        assert!(sched.is_empty());
        assert_eq!(sched.len(), 0);
        assert!(sched.pop_next().is_none());
        assert_eq!(sched.next_event_id(), EventId::new(0));
    }
}
