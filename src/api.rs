/// Step-by-step driver for a complete mutual-exclusion run.
///
/// Bundles the [`Simulation`] loop with a [`MutexRuntime`] seeded from a
/// [`SimConfig`] and a [`RequestSchedule`], so callers (the CLI, tests,
/// anything embedding the crate) never wire the pieces by hand.

use std::path::Path;

use tracing::info;

use crate::clock::Timestamp;
use crate::config::{RequestSchedule, SimConfig};
use crate::error::{ConfigError, ProtocolViolation, RamutexError, RamutexResult};
use crate::event::EventKind;
use crate::eventlog::EventLog;
use crate::node::{CriticalSection, MessageStats, MutexRuntime, Node, NodeId, TraceSink};
use crate::simulation::{Simulation, SimulationEnd, Step};
use crate::time::VirtualTime;

// ── StepResult ────────────────────────────────────────────────────────

/// Result of a single [`MutexSimulation::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StepResult {
    pub event_id: u64,
    pub time: u64,
    /// Rendered event, e.g. `E#4 RECEIVE_REQUEST N0 → N2 (L=3)`.
    pub description: String,
    /// Total events processed so far.
    pub total_events: u64,
}

// ── RunReport ─────────────────────────────────────────────────────────

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    /// Events dispatched over the whole run.
    pub processed: u64,
    pub final_time: VirtualTime,
    pub end: SimulationEnd,
    pub sessions: Vec<CriticalSection>,
    pub stats: MessageStats,
}

impl RunReport {
    /// Nodes in the order they entered the critical region.
    pub fn entry_order(&self) -> Vec<NodeId> {
        self.sessions.iter().map(|s| s.node).collect()
    }
}

// ── MutexSimulation ───────────────────────────────────────────────────

/// A configured Ricart–Agrawala run.
pub struct MutexSimulation {
    sim: Simulation,
    rt: MutexRuntime,
    config: SimConfig,
}

impl MutexSimulation {
    /// Validate `config` and queue one REQUEST per node at its scheduled time.
    pub fn new(config: SimConfig, schedule: &RequestSchedule) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut sim = Simulation::with_horizon(config.horizon);
        let rt = MutexRuntime::from_config(schedule.node_count(), &config);
        for (node, at) in schedule.iter() {
            sim.schedule_at(at, EventKind::Request, node, node, Timestamp::ZERO);
        }

        info!(
            nodes = schedule.node_count(),
            seed = config.seed,
            horizon = config.horizon.ticks(),
            "simulation seeded"
        );
        Ok(MutexSimulation { sim, rt, config })
    }

    /// Forward every trace record to `sink` as well.
    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.rt = self.rt.with_sink(sink);
        self
    }

    /// Do not keep trace records in memory; only the sink sees them.
    pub fn without_trace_buffer(mut self) -> Self {
        self.rt = self.rt.without_trace_buffer();
        self
    }

    /// Record every dispatched event.
    pub fn enable_logging(&mut self) {
        self.sim.enable_logging();
    }

    /// Record events and checkpoint node state every `interval` events.
    pub fn enable_logging_with_checkpoints(&mut self, interval: u64) {
        self.sim.enable_logging_with_checkpoints(interval);
    }

    /// Dispatch one event. Returns `None` once the run is over.
    pub fn step(&mut self) -> Result<Option<StepResult>, ProtocolViolation> {
        match self.sim.step(&mut self.rt)? {
            Step::Dispatched(event) => Ok(Some(StepResult {
                event_id: event.id.raw(),
                time: event.scheduled_at.ticks(),
                description: event.to_string(),
                total_events: self.sim.events_processed(),
            })),
            Step::Finished(_) => Ok(None),
        }
    }

    /// Run up to `n` steps. Returns how many were dispatched.
    pub fn run_steps(&mut self, n: u64) -> Result<u64, ProtocolViolation> {
        self.sim.run_for(n, &mut self.rt)
    }

    /// Run until the queue drains or the horizon is reached.
    pub fn run(&mut self) -> RamutexResult<RunReport> {
        let outcome = self.sim.run(&mut self.rt)?;
        let report = self.report(outcome.end);
        info!(
            processed = report.processed,
            final_time = report.final_time.ticks(),
            entries = report.sessions.len(),
            "simulation finished"
        );
        Ok(report)
    }

    fn report(&self, end: SimulationEnd) -> RunReport {
        RunReport {
            processed: self.sim.events_processed(),
            final_time: self.sim.now(),
            end,
            sessions: self.rt.sessions().to_vec(),
            stats: self.rt.stats(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.sim.is_finished()
    }

    pub fn current_time(&self) -> VirtualTime {
        self.sim.now()
    }

    pub fn events_processed(&self) -> u64 {
        self.sim.events_processed()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Inspect one node's protocol state.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.rt.node(id)
    }

    pub fn runtime(&self) -> &MutexRuntime {
        &self.rt
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn event_log(&self) -> Option<&EventLog> {
        self.sim.event_log()
    }

    /// Write the event log in its text format.
    pub fn export_log(&self, path: impl AsRef<Path>) -> RamutexResult<()> {
        let log = self.sim.event_log().ok_or(RamutexError::LogNotEnabled)?;
        log.export_to_file(path)?;
        Ok(())
    }

    // ── JSON Export ───────────────────────────────────────────

    /// Node states plus loop position, as pretty JSON.
    #[cfg(feature = "serialize")]
    pub fn state_json(&self) -> String {
        #[derive(serde::Serialize)]
        struct ApiState<'a> {
            current_time: u64,
            events_processed: u64,
            pending_events: usize,
            is_finished: bool,
            holder: Option<NodeId>,
            nodes: &'a [Node],
        }

        let state = ApiState {
            current_time: self.sim.now().ticks(),
            events_processed: self.sim.events_processed(),
            pending_events: self.sim.pending_count(),
            is_finished: self.sim.is_finished(),
            holder: self.rt.holder(),
            nodes: self.rt.nodes(),
        };
        serde_json::to_string_pretty(&state).unwrap_or_else(|_| "{}".into())
    }

    /// The structured trace as a JSON array.
    #[cfg(feature = "serialize")]
    pub fn trace_json(&self) -> String {
        serde_json::to_string_pretty(&self.rt.trace).unwrap_or_else(|_| "[]".into())
    }

    /// Run summary as JSON, once the run is over.
    #[cfg(feature = "serialize")]
    pub fn report_json(&self) -> Option<String> {
        let report = self.report(self.sim.end()?);
        Some(serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".into()))
    }
}
