//! `MutexRuntime`: owns every node and drives the Ricart–Agrawala
//! state machine.

use tracing::debug;

use crate::clock::Timestamp;
use crate::config::SimConfig;
use crate::delay::DelayModel;
use crate::error::ProtocolViolation;
use crate::event::{Event, EventKind};
use crate::eventlog::hash_combine;
use crate::simulation::{EventHandler, SimulationContext};
use crate::time::VirtualTime;

use super::id::NodeId;
use super::state::{Node, RequestDecision};
use super::trace::{TraceAction, TraceRecord, TraceSink};

/// One stay in the critical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CriticalSection {
    pub node: NodeId,
    pub entered_at: VirtualTime,
    /// `None` if the run stopped while the node was still inside.
    pub released_at: Option<VirtualTime>,
}

/// Message counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageStats {
    pub requests_sent: u64,
    /// Immediate and deferred replies combined.
    pub replies_sent: u64,
    pub replies_deferred: u64,
}

/// The node table plus everything the protocol needs to send messages.
///
/// Implements [`EventHandler`], so it can be passed straight to
/// [`Simulation::run`](crate::simulation::Simulation::run). The runtime is
/// the only owner of node state; handlers borrow one node at a time.
pub struct MutexRuntime {
    nodes: Vec<Node>,
    delays: DelayModel,
    running_interval: u64,
    /// Node currently in the critical region.
    holder: Option<NodeId>,
    sessions: Vec<CriticalSection>,
    stats: MessageStats,
    /// Every record produced so far, in order. Grows by a handful of
    /// records per event for the whole run; see
    /// [`MutexRuntime::without_trace_buffer`].
    pub trace: Vec<TraceRecord>,
    buffer_trace: bool,
    sink: Option<Box<dyn TraceSink>>,
}

impl MutexRuntime {
    /// `node_count` idle nodes with ids `0..node_count`.
    pub fn new(node_count: usize, delays: DelayModel, running_interval: u64) -> Self {
        MutexRuntime {
            nodes: NodeId::all(node_count).map(Node::new).collect(),
            delays,
            running_interval,
            holder: None,
            sessions: Vec::new(),
            stats: MessageStats::default(),
            trace: Vec::new(),
            buffer_trace: true,
            sink: None,
        }
    }

    /// Build a runtime from the run configuration.
    pub fn from_config(node_count: usize, config: &SimConfig) -> Self {
        Self::new(
            node_count,
            DelayModel::new(config.max_message_delay, config.seed),
            config.running_interval,
        )
    }

    /// Also forward every record to `sink`.
    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Stop keeping records in [`MutexRuntime::trace`]. A sink, if any,
    /// still receives every record.
    pub fn without_trace_buffer(mut self) -> Self {
        self.buffer_trace = false;
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node currently in the critical region, if any.
    pub fn holder(&self) -> Option<NodeId> {
        self.holder
    }

    /// Critical-region stays in entry order.
    pub fn sessions(&self) -> &[CriticalSection] {
        &self.sessions
    }

    pub fn stats(&self) -> MessageStats {
        self.stats
    }

    pub fn delays(&self) -> &DelayModel {
        &self.delays
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ProtocolViolation> {
        self.nodes
            .get_mut(id.index())
            .ok_or(ProtocolViolation::UnknownNode { node: id })
    }

    fn check_node(&self, id: NodeId) -> Result<(), ProtocolViolation> {
        match self.nodes.get(id.index()) {
            Some(_) => Ok(()),
            None => Err(ProtocolViolation::UnknownNode { node: id }),
        }
    }

    fn emit(&mut self, time: VirtualTime, event: &Event, node: NodeId, action: TraceAction) {
        let clock = self
            .nodes
            .get(node.index())
            .map_or(Timestamp::ZERO, Node::clock);
        let record = TraceRecord {
            time,
            event_id: event.id,
            kind: event.kind,
            node,
            clock,
            action,
        };
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&record);
        }
        if self.buffer_trace {
            self.trace.push(record);
        }
    }

    /// Draw a delay and schedule a message event to `to`.
    fn send(
        &mut self,
        ctx: &mut SimulationContext,
        kind: EventKind,
        from: NodeId,
        to: NodeId,
        timestamp: Timestamp,
    ) -> u64 {
        let delay = self.delays.delay();
        ctx.schedule_after(delay, kind, to, from, timestamp);
        delay
    }

    // ── Handlers ──────────────────────────────────────────────────

    fn on_request(&mut self, ctx: &mut SimulationContext, event: &Event) -> Result<(), ProtocolViolation> {
        let me = event.target;
        let now = ctx.now();
        let peers: Vec<NodeId> = NodeId::all(self.nodes.len()).filter(|p| *p != me).collect();

        let timestamp = self.node_mut(me)?.begin_request(&peers, now)?;
        debug!(node = %me, %timestamp, peers = peers.len(), "request");
        self.emit(now, event, me, TraceAction::Requested { timestamp });

        for peer in peers {
            let delay = self.send(ctx, EventKind::ReceiveRequest, me, peer, timestamp);
            self.stats.requests_sent += 1;
            self.emit(
                now,
                event,
                me,
                TraceAction::RequestSent {
                    to: peer,
                    timestamp,
                    delay,
                },
            );
        }

        // No peers to ask.
        if self.nodes[me.index()].waiting_reply_from().is_empty() {
            self.enter(ctx, event, me)?;
        }
        Ok(())
    }

    fn on_receive_request(
        &mut self,
        ctx: &mut SimulationContext,
        event: &Event,
    ) -> Result<(), ProtocolViolation> {
        let (me, from, timestamp) = (event.target, event.sender, event.timestamp);
        let now = ctx.now();
        self.check_node(from)?;

        let decision = self.node_mut(me)?.receive_request(from, timestamp);
        self.emit(now, event, me, TraceAction::RequestReceived { from, timestamp });

        match decision {
            RequestDecision::Grant(reply_ts) => {
                let delay = self.send(ctx, EventKind::ReceiveReply, me, from, reply_ts);
                self.stats.replies_sent += 1;
                debug!(node = %me, to = %from, delay, "reply granted");
                self.emit(
                    now,
                    event,
                    me,
                    TraceAction::ReplySent {
                        to: from,
                        timestamp: reply_ts,
                        delay,
                    },
                );
            }
            RequestDecision::Defer => {
                self.stats.replies_deferred += 1;
                debug!(node = %me, to = %from, "reply deferred");
                self.emit(now, event, me, TraceAction::Deferred { from });
            }
        }
        Ok(())
    }

    fn on_receive_reply(
        &mut self,
        ctx: &mut SimulationContext,
        event: &Event,
    ) -> Result<(), ProtocolViolation> {
        let (me, from, timestamp) = (event.target, event.sender, event.timestamp);
        let now = ctx.now();

        let remaining = self.node_mut(me)?.receive_reply(from, timestamp, now)?;
        self.emit(
            now,
            event,
            me,
            TraceAction::ReplyReceived {
                from,
                timestamp,
                remaining,
            },
        );

        if remaining == 0 {
            self.enter(ctx, event, me)?;
        }
        Ok(())
    }

    fn enter(
        &mut self,
        ctx: &mut SimulationContext,
        event: &Event,
        me: NodeId,
    ) -> Result<(), ProtocolViolation> {
        let now = ctx.now();
        if let Some(holder) = self.holder {
            return Err(ProtocolViolation::MutualExclusion {
                holder,
                intruder: me,
                at: now,
            });
        }

        let timestamp = self.node_mut(me)?.enter();
        self.holder = Some(me);
        self.sessions.push(CriticalSection {
            node: me,
            entered_at: now,
            released_at: None,
        });
        ctx.schedule_after(self.running_interval, EventKind::Release, me, me, timestamp);

        debug!(node = %me, time = now.ticks(), "entered critical region");
        self.emit(now, event, me, TraceAction::Entered);
        Ok(())
    }

    fn on_release(&mut self, ctx: &mut SimulationContext, event: &Event) -> Result<(), ProtocolViolation> {
        let me = event.target;
        let now = ctx.now();

        if self.holder != Some(me) {
            return Err(ProtocolViolation::ReleaseWithoutEntry { node: me, at: now });
        }
        let (timestamp, deferred) = self.node_mut(me)?.release(now)?;
        self.holder = None;
        if let Some(session) = self
            .sessions
            .iter_mut()
            .rev()
            .find(|s| s.node == me && s.released_at.is_none())
        {
            session.released_at = Some(now);
        }

        debug!(node = %me, time = now.ticks(), deferred = deferred.len(), "left critical region");
        self.emit(now, event, me, TraceAction::Released);

        for to in deferred {
            let delay = self.send(ctx, EventKind::ReceiveReply, me, to, timestamp);
            self.stats.replies_sent += 1;
            self.emit(
                now,
                event,
                me,
                TraceAction::ReplySent {
                    to,
                    timestamp,
                    delay,
                },
            );
        }
        Ok(())
    }
}

impl EventHandler for MutexRuntime {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> Result<(), ProtocolViolation> {
        self.check_node(event.target)?;
        match event.kind {
            EventKind::Request => self.on_request(ctx, event),
            EventKind::ReceiveRequest => self.on_receive_request(ctx, event),
            EventKind::ReceiveReply => self.on_receive_reply(ctx, event),
            EventKind::Release => self.on_release(ctx, event),
        }
    }

    fn state_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for node in &self.nodes {
            h = hash_combine(h, node.state_hash());
        }
        hash_combine(h, self.holder.map_or(u64::MAX, NodeId::raw))
    }
}
