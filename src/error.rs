//! Structured error types.
//!
//! Configuration problems are user errors and are reported before any
//! event runs. Protocol violations mean the state machine itself is broken;
//! the run loop stops on the first one.

use crate::node::NodeId;
use crate::time::VirtualTime;

/// Invalid command-line input or simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No node request times were supplied.
    #[error("at least one node request time is required")]
    MissingRequestTimes,

    /// A request time is not a non-negative integer.
    #[error("request time #{position} is not a non-negative integer: {value:?}")]
    InvalidRequestTime { position: usize, value: String },

    #[error("simulation horizon must be greater than zero")]
    ZeroHorizon,

    #[error("critical-region running interval must be greater than zero")]
    ZeroRunningInterval,
}

/// A safety or bookkeeping invariant of the protocol was broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Two nodes would occupy the critical region at once.
    #[error("{intruder} entered the critical region at {at} while {holder} holds it")]
    MutualExclusion {
        holder: NodeId,
        intruder: NodeId,
        at: VirtualTime,
    },

    /// A reply arrived from a peer the node was not waiting on.
    #[error("{node} received an unexpected reply from {from} at {at}")]
    UnexpectedReply {
        node: NodeId,
        from: NodeId,
        at: VirtualTime,
    },

    /// A node issued a request while already requesting or running.
    #[error("{node} requested the critical region at {at} while not idle")]
    DuplicateRequest { node: NodeId, at: VirtualTime },

    /// A release fired for a node outside the critical region.
    #[error("{node} released the critical region at {at} without holding it")]
    ReleaseWithoutEntry { node: NodeId, at: VirtualTime },

    /// An event referenced a node id outside `[0, N)`.
    #[error("event references unknown node {node}")]
    UnknownNode { node: NodeId },
}

/// Top-level error for the library surface.
#[derive(Debug, thiserror::Error)]
pub enum RamutexError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// Event logging was requested but not enabled on the simulation.
    #[error("event logging is not enabled")]
    LogNotEnabled,

    #[error("event log I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, RamutexError>`.
pub type RamutexResult<T> = Result<T, RamutexError>;
