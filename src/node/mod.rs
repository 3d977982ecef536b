//! Participants and the Ricart–Agrawala protocol.
//!
//! Nodes never share state. Every interaction is an event on the
//! scheduler, dispatched to [`MutexRuntime`], which updates one node at a
//! time and schedules whatever messages the transition produces.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`] newtype |
//! | [`set`] | [`NodeSet`] for deferred / awaited peers |
//! | [`state`] | [`Node`], [`NodeState`], [`RequestDecision`] |
//! | [`trace`] | [`TraceRecord`], [`TraceAction`], [`TraceSink`] |
//! | [`runtime`] | [`MutexRuntime`] event handler |

pub mod id;
pub mod runtime;
pub mod set;
pub mod state;
pub mod trace;

pub use id::NodeId;
pub use runtime::{CriticalSection, MessageStats, MutexRuntime};
pub use set::NodeSet;
pub use state::{Node, NodeState, RequestDecision};
pub use trace::{TraceAction, TraceRecord, TraceSink, WriterSink};

#[cfg(test)]
mod tests;
