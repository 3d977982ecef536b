/// Event records for the discrete-event loop.
///
/// Every protocol step is an `Event` placed on the scheduler's priority
/// queue. Events are immutable once scheduled and are dispatched in
/// `(scheduled_at, id)` order.

use crate::clock::Timestamp;
use crate::node::NodeId;
use crate::time::VirtualTime;
use std::cmp::Ordering;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing event identifier.
///
/// Two events scheduled at the same `VirtualTime` are ordered by their
/// `EventId`, i.e. by insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly increasing event-ID generator.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Kind ────────────────────────────────────────────────────────

/// What the target node should do when the event fires.
///
/// `Request` and `Release` are self-events; the other two are message
/// deliveries carrying the sender and its clock value at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// The node asks for the critical region.
    Request,
    /// A peer's request arrives.
    ReceiveRequest,
    /// A peer's permission arrives.
    ReceiveReply,
    /// The node leaves the critical region.
    Release,
}

impl EventKind {
    /// Stable upper-case tag used in logs and exports.
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Request => "REQUEST",
            EventKind::ReceiveRequest => "RECEIVE_REQUEST",
            EventKind::ReceiveReply => "RECEIVE_REPLY",
            EventKind::Release => "RELEASE",
        }
    }

    /// Inverse of [`EventKind::tag`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "REQUEST" => Some(EventKind::Request),
            "RECEIVE_REQUEST" => Some(EventKind::ReceiveRequest),
            "RECEIVE_REPLY" => Some(EventKind::ReceiveReply),
            "RELEASE" => Some(EventKind::Release),
            _ => None,
        }
    }

    /// `true` for events that model a message between two nodes.
    pub fn is_message(self) -> bool {
        matches!(self, EventKind::ReceiveRequest | EventKind::ReceiveReply)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single scheduled occurrence.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Unique identifier (monotonically increasing).
    pub id: EventId,
    /// The simulated time at which this event fires.
    pub scheduled_at: VirtualTime,
    pub kind: EventKind,
    /// Node that processes the event.
    pub target: NodeId,
    /// Originating node; equals `target` for self-events.
    pub sender: NodeId,
    /// Sender's logical clock when the event was created.
    pub timestamp: Timestamp,
}

impl Event {
    pub fn new(
        id: EventId,
        scheduled_at: VirtualTime,
        kind: EventKind,
        target: NodeId,
        sender: NodeId,
        timestamp: Timestamp,
    ) -> Self {
        Event {
            id,
            scheduled_at,
            kind,
            target,
            sender,
            timestamp,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind.is_message() {
            write!(
                f,
                "{} {} {} → {} ({})",
                self.id, self.kind, self.sender, self.target, self.timestamp
            )
        } else {
            write!(f, "{} {} {}", self.id, self.kind, self.target)
        }
    }
}

/// Ordering: smallest `(scheduled_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
