//! # ramutex: Ricart–Agrawala mutual exclusion, simulated
//!
//! A deterministic discrete-event simulation of distributed mutual
//! exclusion. Nodes exchange REQUEST and REPLY messages stamped with
//! Lamport clocks; a node enters the critical region once every peer has
//! replied. No threads, no wall-clock time: one queue of events ordered
//! by `(time, id)` and a seeded delay stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │     MutexSimulation      │ ← config + request schedule
//! │  ┌───────────────────┐  │
//! │  │   MutexRuntime     │  │ ← node table, protocol handlers
//! │  │   DelayModel       │  │ ← seeded message delays
//! │  └───────────────────┘  │
//! │  ┌───────────────────┐  │
//! │  │    Simulation      │  │ ← execution loop, horizon
//! │  │  ┌─────────────┐  │  │
//! │  │  │  Scheduler   │  │  │ ← (time, id) min-heap
//! │  │  └─────────────┘  │  │
//! │  │  ┌─────────────┐  │  │
//! │  │  │  EventLog    │  │  │ ← record / checkpoint / export
//! │  │  └─────────────┘  │  │
//! │  └───────────────────┘  │
//! └─────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use ramutex::{MutexSimulation, RequestSchedule, SimConfig};
//!
//! let schedule = RequestSchedule::parse(&["0", "5", "10"]).unwrap();
//! let mut sim = MutexSimulation::new(SimConfig::new(), &schedule).unwrap();
//! let report = sim.run().unwrap();
//! assert_eq!(report.sessions.len(), 3);
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod delay;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod node;
pub mod priority;
pub mod scheduler;
pub mod simulation;
pub mod time;

// Re-exports for convenience.
pub use api::{MutexSimulation, RunReport, StepResult};
pub use clock::{LamportClock, Timestamp};
pub use config::{RequestSchedule, SimConfig};
pub use delay::DelayModel;
pub use error::{ConfigError, ProtocolViolation, RamutexError, RamutexResult};
pub use event::{Event, EventId, EventIdGen, EventKind};
pub use eventlog::{Checkpoint, EventLog};
pub use node::{
    CriticalSection, MessageStats, MutexRuntime, Node, NodeId, NodeState, TraceAction, TraceRecord,
    TraceSink, WriterSink,
};
pub use priority::{priority, RequestKey};
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, RunOutcome, Simulation, SimulationContext, SimulationEnd, Step};
pub use time::VirtualTime;
