/// Event recording and replay verification.
///
/// Records every dispatched event into an append-only log, takes
/// checkpoints of the handler's state hash, and exports/imports a plain
/// text format so two runs can be compared or diffed offline.

use std::io::{self, BufRead, Write};

use crate::clock::Timestamp;
use crate::event::{Event, EventId, EventKind};
use crate::node::NodeId;
use crate::time::VirtualTime;

const LOG_HEADER: &str = "# RAMUTEX EVENT LOG v1";

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── Checkpoint ────────────────────────────────────────────────────────

/// Handler state at a point in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Checkpoint {
    /// Number of events processed when this checkpoint was taken.
    pub event_index: u64,
    pub time: VirtualTime,
    /// Combined hash of all node states.
    pub state_hash: u64,
}

// ── Event Log ─────────────────────────────────────────────────────────

/// Append-only log of dispatched events with optional checkpointing.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventLog {
    events: Vec<Event>,
    checkpoints: Vec<Checkpoint>,
    checkpoint_interval: Option<u64>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog {
            events: Vec::new(),
            checkpoints: Vec::new(),
            checkpoint_interval: None,
        }
    }

    /// Create an event log that checkpoints every `n` events.
    pub fn with_checkpoint_interval(n: u64) -> Self {
        EventLog {
            checkpoint_interval: Some(n),
            ..Self::new()
        }
    }

    /// Record a dispatched event.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn add_checkpoint(&mut self, event_index: u64, time: VirtualTime, state_hash: u64) {
        self.checkpoints.push(Checkpoint {
            event_index,
            time,
            state_hash,
        });
    }

    /// Whether a checkpoint is due after `events_processed` events.
    pub fn should_checkpoint(&self, events_processed: u64) -> bool {
        match self.checkpoint_interval {
            Some(n) if n > 0 => events_processed % n == 0,
            _ => false,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Deterministic hash over every field of every recorded event.
    pub fn log_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for event in &self.events {
            h = hash_combine(h, event.id.raw());
            h = hash_combine(h, event.scheduled_at.ticks());
            h = hash_combine(h, kind_code(event.kind));
            h = hash_combine(h, event.target.raw());
            h = hash_combine(h, event.sender.raw());
            h = hash_combine(h, event.timestamp.raw());
        }
        h
    }

    // ── Export / Import ───────────────────────────────────────────

    /// Write the log in a line-oriented text format.
    ///
    /// ```text
    /// E <id> <time> <KIND> <target> <sender> <timestamp>
    /// C <event_index> <time> <state_hash hex>
    /// ```
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", LOG_HEADER)?;
        writeln!(w, "# events: {}", self.events.len())?;
        writeln!(w, "# checkpoints: {}", self.checkpoints.len())?;

        for event in &self.events {
            writeln!(
                w,
                "E {} {} {} {} {} {}",
                event.id.raw(),
                event.scheduled_at.ticks(),
                event.kind.tag(),
                event.target.raw(),
                event.sender.raw(),
                event.timestamp.raw()
            )?;
        }

        for cp in &self.checkpoints {
            writeln!(
                w,
                "C {} {} {:016x}",
                cp.event_index,
                cp.time.ticks(),
                cp.state_hash
            )?;
        }

        Ok(())
    }

    pub fn export_to_file(&self, path: impl AsRef<std::path::Path>) -> io::Result<()> {
        let mut f = io::BufWriter::new(std::fs::File::create(path)?);
        self.export(&mut f)?;
        f.flush()
    }

    /// Read a log previously written by [`EventLog::export`].
    pub fn import<R: BufRead>(r: R) -> io::Result<Self> {
        let mut log = EventLog::new();

        for line in r.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parsed = if line.starts_with("E ") {
                deserialize_event(line).map(|e| log.events.push(e))
            } else if line.starts_with("C ") {
                deserialize_checkpoint(line).map(|c| log.checkpoints.push(c))
            } else {
                Err(format!("unrecognised line: {}", line))
            };
            parsed.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }

        Ok(log)
    }

    pub fn import_from_file(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let f = std::fs::File::open(path)?;
        Self::import(io::BufReader::new(f))
    }
}

// ── Verification ──────────────────────────────────────────────────────

/// Compare two event logs for identical dispatch sequences.
pub fn logs_match(a: &EventLog, b: &EventLog) -> bool {
    a.events == b.events
}

/// Compare checkpoints between two logs.
pub fn checkpoints_match(a: &EventLog, b: &EventLog) -> bool {
    a.checkpoints == b.checkpoints
}

// ── Serialization helpers ─────────────────────────────────────────────

fn kind_code(kind: EventKind) -> u64 {
    match kind {
        EventKind::Request => 1,
        EventKind::ReceiveRequest => 2,
        EventKind::ReceiveReply => 3,
        EventKind::Release => 4,
    }
}

fn parse_u64(field: Option<&str>, label: &str) -> Result<u64, String> {
    field
        .ok_or_else(|| format!("missing {}", label))?
        .parse()
        .map_err(|e| format!("{}: {}", label, e))
}

fn deserialize_event(line: &str) -> Result<Event, String> {
    let mut parts = line.split_whitespace().skip(1);

    let id = parse_u64(parts.next(), "id")?;
    let time = parse_u64(parts.next(), "time")?;
    let tag = parts.next().ok_or("missing kind")?;
    let kind = EventKind::from_tag(tag).ok_or_else(|| format!("unknown event kind: {}", tag))?;
    let target = parse_u64(parts.next(), "target")?;
    let sender = parse_u64(parts.next(), "sender")?;
    let timestamp = parse_u64(parts.next(), "timestamp")?;

    if parts.next().is_some() {
        return Err(format!("trailing fields in event line: {}", line));
    }

    Ok(Event::new(
        EventId::new(id),
        VirtualTime::new(time),
        kind,
        NodeId::new(target),
        NodeId::new(sender),
        Timestamp::new(timestamp),
    ))
}

fn deserialize_checkpoint(line: &str) -> Result<Checkpoint, String> {
    let mut parts = line.split_whitespace().skip(1);
    let event_index = parse_u64(parts.next(), "index")?;
    let time = parse_u64(parts.next(), "time")?;
    let hash = parts.next().ok_or("missing hash")?;
    let state_hash = u64::from_str_radix(hash, 16).map_err(|e| format!("hash: {}", e))?;
    Ok(Checkpoint {
        event_index,
        time: VirtualTime::new(time),
        state_hash,
    })
}
