//! `Node`: per-participant Ricart–Agrawala state.
//!
//! The transitions here only touch the node itself. Scheduling the
//! resulting messages is left to [`MutexRuntime`](super::MutexRuntime).

use crate::clock::{LamportClock, Timestamp};
use crate::error::ProtocolViolation;
use crate::eventlog::hash_combine;
use crate::priority::RequestKey;
use crate::time::VirtualTime;

use super::id::NodeId;
use super::set::NodeSet;

/// Coarse protocol phase, derived from the node's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeState {
    Idle,
    /// Broadcast a request and is collecting replies.
    Requesting,
    InCriticalRegion,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Idle => write!(f, "idle"),
            NodeState::Requesting => write!(f, "requesting"),
            NodeState::InCriticalRegion => write!(f, "in critical region"),
        }
    }
}

/// What to do with an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Reply now, stamped with the receiver's clock.
    Grant(Timestamp),
    /// Hold the reply until this node releases.
    Defer,
}

/// One participant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    id: NodeId,
    clock: LamportClock,
    /// Clock value of the outstanding request; `None` when not requesting.
    request_timestamp: Option<Timestamp>,
    running: bool,
    /// Peers whose requests were deferred.
    pending: NodeSet,
    /// Peers that have not yet replied to the current request.
    waiting_reply_from: NodeSet,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Node {
            id,
            clock: LamportClock::new(),
            request_timestamp: None,
            running: false,
            pending: NodeSet::new(),
            waiting_reply_from: NodeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current logical clock reading.
    pub fn clock(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn request_timestamp(&self) -> Option<Timestamp> {
        self.request_timestamp
    }

    /// `true` exactly while this node occupies the critical region.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending(&self) -> &NodeSet {
        &self.pending
    }

    pub fn waiting_reply_from(&self) -> &NodeSet {
        &self.waiting_reply_from
    }

    pub fn state(&self) -> NodeState {
        if self.running {
            NodeState::InCriticalRegion
        } else if self.request_timestamp.is_some() {
            NodeState::Requesting
        } else {
            NodeState::Idle
        }
    }

    /// Start a request: record the current clock as the request timestamp
    /// and wait on every peer.
    pub fn begin_request(
        &mut self,
        peers: &[NodeId],
        at: VirtualTime,
    ) -> Result<Timestamp, ProtocolViolation> {
        if self.state() != NodeState::Idle {
            return Err(ProtocolViolation::DuplicateRequest { node: self.id, at });
        }
        let timestamp = self.clock.stamp();
        self.request_timestamp = Some(timestamp);
        self.waiting_reply_from = peers.iter().copied().filter(|p| *p != self.id).collect();
        Ok(timestamp)
    }

    /// Handle a peer's request stamped `timestamp`.
    ///
    /// Grants unless this node is in the critical region or its own request
    /// outranks the sender's. A node that is not requesting always grants.
    pub fn receive_request(&mut self, sender: NodeId, timestamp: Timestamp) -> RequestDecision {
        self.clock.merge(timestamp);

        let sender_first = match self.request_timestamp {
            None => true,
            Some(mine) => RequestKey::new(sender, timestamp).outranks(&RequestKey::new(self.id, mine)),
        };

        if !self.running && sender_first {
            RequestDecision::Grant(self.clock.stamp())
        } else {
            self.pending.insert(sender);
            RequestDecision::Defer
        }
    }

    /// Handle a peer's reply. Returns how many replies are still missing.
    pub fn receive_reply(
        &mut self,
        sender: NodeId,
        timestamp: Timestamp,
        at: VirtualTime,
    ) -> Result<usize, ProtocolViolation> {
        if !self.waiting_reply_from.remove(sender) {
            return Err(ProtocolViolation::UnexpectedReply {
                node: self.id,
                from: sender,
                at,
            });
        }
        self.clock.merge(timestamp);
        Ok(self.waiting_reply_from.len())
    }

    /// Occupy the critical region. Only valid once every reply is in.
    pub fn enter(&mut self) -> Timestamp {
        debug_assert!(self.waiting_reply_from.is_empty());
        self.running = true;
        self.clock.now()
    }

    /// Leave the critical region.
    ///
    /// Bumps the clock (a local event), clears the request and returns the
    /// release timestamp with the deferred peers in ascending order.
    pub fn release(&mut self, at: VirtualTime) -> Result<(Timestamp, Vec<NodeId>), ProtocolViolation> {
        if !self.running {
            return Err(ProtocolViolation::ReleaseWithoutEntry { node: self.id, at });
        }
        let timestamp = self.clock.tick();
        self.running = false;
        self.request_timestamp = None;
        Ok((timestamp, self.pending.take()))
    }

    /// Deterministic hash of every field, for checkpoints.
    pub fn state_hash(&self) -> u64 {
        let mut h = hash_combine(self.id.raw(), self.clock.now().raw());
        h = hash_combine(h, self.request_timestamp.map_or(u64::MAX, Timestamp::raw));
        h = hash_combine(h, self.running as u64);
        for id in self.pending.iter() {
            h = hash_combine(h, id.raw());
        }
        h = hash_combine(h, u64::MAX);
        for id in self.waiting_reply_from.iter() {
            h = hash_combine(h, id.raw());
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn t(v: u64) -> VirtualTime {
        VirtualTime::new(v)
    }

    #[test]
    fn test_fresh_node_is_idle() {
        let node = Node::new(n(2));
        assert_eq!(node.state(), NodeState::Idle);
        assert_eq!(node.clock(), Timestamp::ZERO);
        assert!(node.pending().is_empty());
        assert!(node.waiting_reply_from().is_empty());
    }

    #[test]
    fn test_begin_request_waits_on_peers_only() {
        let mut node = Node::new(n(1));
        let ts = node.begin_request(&[n(0), n(1), n(2)], t(0)).unwrap();
        assert_eq!(ts, Timestamp::ZERO);
        assert_eq!(node.state(), NodeState::Requesting);
        assert_eq!(node.waiting_reply_from().to_string(), "{N0, N2}");
        // Sending does not move the clock.
        assert_eq!(node.clock(), Timestamp::ZERO);

        assert_eq!(
            node.begin_request(&[n(0)], t(3)),
            Err(ProtocolViolation::DuplicateRequest { node: n(1), at: t(3) })
        );
    }

    #[test]
    fn test_idle_node_always_grants() {
        let mut node = Node::new(n(0));
        let decision = node.receive_request(n(5), Timestamp::new(9));
        assert_eq!(decision, RequestDecision::Grant(Timestamp::new(10)));
        assert!(node.pending().is_empty());
    }

    #[test]
    fn test_requesting_node_defers_to_lower_priority() {
        let mut node = Node::new(n(0));
        node.begin_request(&[n(0), n(1)], t(0)).unwrap();

        // Same timestamp, higher id: node 0 wins.
        assert_eq!(node.receive_request(n(1), Timestamp::ZERO), RequestDecision::Defer);
        assert!(node.pending().contains(n(1)));
        assert_eq!(node.clock(), Timestamp::new(1));
    }

    #[test]
    fn test_requesting_node_yields_to_earlier_request() {
        let mut node = Node::new(n(0));
        node.receive_request(n(2), Timestamp::new(4));
        node.begin_request(&[n(0), n(1), n(2)], t(10)).unwrap();
        assert_eq!(node.request_timestamp(), Some(Timestamp::new(5)));

        let decision = node.receive_request(n(1), Timestamp::new(3));
        assert_eq!(decision, RequestDecision::Grant(Timestamp::new(6)));
    }

    #[test]
    fn test_running_node_defers_everyone() {
        let mut node = Node::new(n(3));
        node.begin_request(&[], t(0)).unwrap();
        node.enter();
        assert_eq!(node.state(), NodeState::InCriticalRegion);

        assert_eq!(node.receive_request(n(0), Timestamp::ZERO), RequestDecision::Defer);
        assert_eq!(node.receive_request(n(1), Timestamp::ZERO), RequestDecision::Defer);
        assert_eq!(node.pending().len(), 2);
    }

    #[test]
    fn test_reply_bookkeeping() {
        let mut node = Node::new(n(0));
        node.begin_request(&[n(1), n(2)], t(0)).unwrap();

        assert_eq!(node.receive_reply(n(2), Timestamp::new(3), t(4)), Ok(1));
        assert_eq!(node.clock(), Timestamp::new(4));
        assert_eq!(
            node.receive_reply(n(2), Timestamp::new(3), t(5)),
            Err(ProtocolViolation::UnexpectedReply {
                node: n(0),
                from: n(2),
                at: t(5)
            })
        );
        assert_eq!(node.receive_reply(n(1), Timestamp::new(1), t(6)), Ok(0));
        assert_eq!(node.clock(), Timestamp::new(5));
    }

    #[test]
    fn test_release_flushes_pending_and_resets_request() {
        let mut node = Node::new(n(1));
        node.begin_request(&[], t(0)).unwrap();
        node.enter();
        node.receive_request(n(2), Timestamp::ZERO);
        node.receive_request(n(0), Timestamp::ZERO);
        let clock_before = node.clock();

        let (ts, deferred) = node.release(t(50)).unwrap();
        assert_eq!(ts.raw(), clock_before.raw() + 1);
        assert_eq!(deferred, vec![n(0), n(2)]);
        assert_eq!(node.state(), NodeState::Idle);
        assert!(node.pending().is_empty());
        assert_eq!(node.request_timestamp(), None);

        assert_eq!(
            node.release(t(60)),
            Err(ProtocolViolation::ReleaseWithoutEntry { node: n(1), at: t(60) })
        );
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut a = Node::new(n(0));
        let b = Node::new(n(0));
        assert_eq!(a.state_hash(), b.state_hash());
        a.receive_request(n(1), Timestamp::ZERO);
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
