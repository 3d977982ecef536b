//! Lamport logical clocks.
//!
//! Sending attaches the current value without bumping it. Receiving merges
//! with `max(local, received) + 1`. A release is a local event and bumps the
//! clock by one.

/// A logical-clock reading attached to a message or a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn new(value: u64) -> Self {
        Timestamp(value)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L={}", self.0)
    }
}

/// Per-node Lamport counter. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// A clock starting at zero.
    pub fn new() -> Self {
        LamportClock { value: 0 }
    }

    /// Current reading.
    #[inline]
    pub fn now(&self) -> Timestamp {
        Timestamp(self.value)
    }

    /// The value to attach to an outgoing message.
    ///
    /// Sending is not a clock event here: the counter is left untouched.
    #[inline]
    pub fn stamp(&self) -> Timestamp {
        self.now()
    }

    /// Receive rule: `max(local, received) + 1`.
    pub fn merge(&mut self, received: Timestamp) -> Timestamp {
        self.value = self.value.max(received.0) + 1;
        self.now()
    }

    /// Local event: bump by one.
    pub fn tick(&mut self) -> Timestamp {
        self.value += 1;
        self.now()
    }
}
