//! Structured protocol trace.
//!
//! Every state change a node makes is reported as a [`TraceRecord`]. The
//! runtime keeps all records and also forwards them to an optional
//! [`TraceSink`], so tests can assert on data while the binary prints text.

use std::io::Write;

use tracing::warn;

use crate::clock::Timestamp;
use crate::event::{EventId, EventKind};
use crate::time::VirtualTime;

use super::id::NodeId;

/// What a node did while processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceAction {
    /// Issued a request stamped `timestamp`.
    Requested { timestamp: Timestamp },
    RequestSent {
        to: NodeId,
        timestamp: Timestamp,
        delay: u64,
    },
    RequestReceived { from: NodeId, timestamp: Timestamp },
    ReplySent {
        to: NodeId,
        timestamp: Timestamp,
        delay: u64,
    },
    /// Held back the reply to `from` until release.
    Deferred { from: NodeId },
    ReplyReceived {
        from: NodeId,
        timestamp: Timestamp,
        /// Replies still missing after this one.
        remaining: usize,
    },
    Entered,
    Released,
}

impl std::fmt::Display for TraceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceAction::Requested { timestamp } => {
                write!(f, "requests the critical region with {}", timestamp)
            }
            TraceAction::RequestSent { to, timestamp, delay } => {
                write!(f, "sends REQUEST({}) to {}, delay {}", timestamp, to, delay)
            }
            TraceAction::RequestReceived { from, timestamp } => {
                write!(f, "receives REQUEST({}) from {}", timestamp, from)
            }
            TraceAction::ReplySent { to, timestamp, delay } => {
                write!(f, "sends REPLY({}) to {}, delay {}", timestamp, to, delay)
            }
            TraceAction::Deferred { from } => write!(f, "defers reply to {}", from),
            TraceAction::ReplyReceived {
                from,
                timestamp,
                remaining,
            } => write!(
                f,
                "receives REPLY({}) from {}, {} outstanding",
                timestamp, from, remaining
            ),
            TraceAction::Entered => write!(f, "enters the critical region"),
            TraceAction::Released => write!(f, "leaves the critical region"),
        }
    }
}

/// A single trace line. One event yields one or more records, all
/// carrying the event's id and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceRecord {
    /// Simulated time of the event being processed.
    pub time: VirtualTime,
    pub event_id: EventId,
    /// Kind of the dispatched event that produced this record.
    pub kind: EventKind,
    pub node: NodeId,
    /// The node's logical clock after the action.
    pub clock: Timestamp,
    pub action: TraceAction,
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[T={} E=#{} {} {} {}] {}",
            self.time.ticks(),
            self.event_id.raw(),
            self.kind.tag(),
            self.node,
            self.clock,
            self.action,
        )
    }
}

/// Receives trace records as they are produced.
pub trait TraceSink {
    fn record(&mut self, record: &TraceRecord);
}

impl TraceSink for Vec<TraceRecord> {
    fn record(&mut self, record: &TraceRecord) {
        self.push(*record);
    }
}

/// Renders each record as one line of text.
///
/// Write failures are logged once and further output is dropped; the
/// simulation itself keeps running.
pub struct WriterSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        WriterSink {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn record(&mut self, record: &TraceRecord) {
        if self.failed {
            return;
        }
        if let Err(err) = writeln!(self.writer, "{}", record) {
            warn!(error = %err, "trace output failed, dropping further lines");
            self.failed = true;
        }
    }
}
