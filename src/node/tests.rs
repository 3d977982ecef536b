//! Protocol scenarios for `MutexRuntime`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing_test::traced_test;

use crate::clock::Timestamp;
use crate::config::SimConfig;
use crate::error::ProtocolViolation;
use crate::event::EventKind;
use crate::node::{MutexRuntime, NodeId, NodeState, TraceAction, TraceRecord, TraceSink};
use crate::simulation::{RunOutcome, Simulation, SimulationEnd};
use crate::time::VirtualTime;

fn n(id: u64) -> NodeId {
    NodeId::new(id)
}

fn seed_requests(sim: &mut Simulation, times: &[u64]) {
    for (i, t) in times.iter().enumerate() {
        let node = n(i as u64);
        sim.schedule_at(VirtualTime::new(*t), EventKind::Request, node, node, Timestamp::ZERO);
    }
}

fn run(times: &[u64], config: &SimConfig) -> (Simulation, MutexRuntime, RunOutcome) {
    let mut sim = Simulation::with_horizon(config.horizon);
    sim.enable_logging();
    let mut rt = MutexRuntime::from_config(times.len(), config);
    seed_requests(&mut sim, times);
    let outcome = sim.run(&mut rt).expect("protocol violation");
    (sim, rt, outcome)
}

fn instant() -> SimConfig {
    SimConfig::new().with_max_message_delay(0)
}

fn entry_order(rt: &MutexRuntime) -> Vec<u64> {
    rt.sessions().iter().map(|s| s.node.raw()).collect()
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_single_node_enters_immediately() {
    let (sim, rt, outcome) = run(&[0], &SimConfig::new());

    assert_eq!(outcome.end, SimulationEnd::Drained);
    let kinds: Vec<EventKind> = sim
        .event_log()
        .unwrap()
        .events()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EventKind::Request, EventKind::Release]);

    let session = rt.sessions()[0];
    assert_eq!(session.entered_at, VirtualTime::ZERO);
    assert_eq!(session.released_at, Some(VirtualTime::new(50)));
    assert_eq!(rt.stats().requests_sent, 0);
    assert_eq!(rt.delays().draws(), 0);
}

#[test]
fn test_two_node_tie_lower_id_wins() {
    let (_sim, rt, outcome) = run(&[0, 0], &instant());

    assert_eq!(outcome.end, SimulationEnd::Drained);
    assert_eq!(entry_order(&rt), vec![0, 1]);

    let s0 = rt.sessions()[0];
    let s1 = rt.sessions()[1];
    assert_eq!((s0.entered_at.ticks(), s0.released_at.map(VirtualTime::ticks)), (0, Some(50)));
    assert_eq!((s1.entered_at.ticks(), s1.released_at.map(VirtualTime::ticks)), (50, Some(100)));

    // Node 0 held back its reply to node 1 until release.
    let deferrals: Vec<(u64, u64)> = rt
        .trace
        .iter()
        .filter_map(|r| match r.action {
            TraceAction::Deferred { from } => Some((r.node.raw(), from.raw())),
            _ => None,
        })
        .collect();
    assert_eq!(deferrals, vec![(0, 1)]);

    let stats = rt.stats();
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.replies_sent, 2);
    assert_eq!(stats.replies_deferred, 1);

    // Both nodes attached timestamp 0 to their request.
    let stamps: Vec<(u64, u64)> = rt
        .trace
        .iter()
        .filter_map(|r| match r.action {
            TraceAction::Requested { timestamp } => Some((r.node.raw(), timestamp.raw())),
            _ => None,
        })
        .collect();
    assert_eq!(stamps, vec![(0, 0), (1, 0)]);
}

#[test]
fn test_two_node_tie_exact_clocks() {
    let (_sim, rt, _) = run(&[0, 0], &instant());

    // N0: merge(0)=1, reply from N1 (L=1) → 2, release tick → 3.
    // N1: merge(0)=1, deferred reply (L=3) → 4, release tick → 5.
    assert_eq!(rt.node(n(0)).unwrap().clock(), Timestamp::new(3));
    assert_eq!(rt.node(n(1)).unwrap().clock(), Timestamp::new(5));
    for node in rt.nodes() {
        assert_eq!(node.state(), NodeState::Idle);
    }
}

#[test]
fn test_staggered_requests_served_in_order() {
    let (_sim, rt, _) = run(&[0, 5, 10], &instant());
    assert_eq!(entry_order(&rt), vec![0, 1, 2]);

    let entries: Vec<u64> = rt.sessions().iter().map(|s| s.entered_at.ticks()).collect();
    assert_eq!(entries, vec![0, 50, 100]);
}

#[test]
fn test_staggered_requests_first_requester_wins_for_any_seed() {
    for seed in 0..40 {
        let config = SimConfig::new().with_seed(seed);
        let (_sim, rt, _) = run(&[0, 5, 10], &config);
        let order = entry_order(&rt);
        assert_eq!(order.len(), 3, "seed {}: not every node entered", seed);
        assert_eq!(order[0], 0, "seed {}: order {:?}", seed, order);
    }
}

#[test]
fn test_zero_delay_delivers_at_send_instant() {
    let (sim, _rt, _) = run(&[0, 5, 10], &instant());
    let log = sim.event_log().unwrap();

    let request_times: BTreeMap<u64, u64> = log
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Request)
        .map(|e| (e.target.raw(), e.scheduled_at.ticks()))
        .collect();

    for e in log.events().iter().filter(|e| e.kind == EventKind::ReceiveRequest) {
        assert_eq!(
            Some(&e.scheduled_at.ticks()),
            request_times.get(&e.sender.raw()),
            "request {:?} not delivered at its send instant",
            e
        );
    }
}

#[test]
fn test_horizon_cuts_run_short() {
    let config = instant().with_horizon(VirtualTime::new(30));
    let (sim, rt, outcome) = run(&[0, 0], &config);

    assert_eq!(
        outcome.end,
        SimulationEnd::HorizonReached {
            next: VirtualTime::new(50)
        }
    );
    assert_eq!(sim.pending_count(), 1);
    assert_eq!(rt.holder(), Some(n(0)));
    assert_eq!(rt.sessions()[0].released_at, None);
    assert_eq!(rt.node(n(1)).unwrap().state(), NodeState::Requesting);
}

// ── Properties across seeds ──────────────────────────────────────────

const WORKLOADS: &[&[u64]] = &[
    &[0, 0],
    &[0, 0, 0],
    &[0, 5, 10],
    &[10, 3, 3, 0],
    &[0, 1, 2, 3, 4],
    &[7, 7, 20, 0, 45],
];

fn check_properties(times: &[u64], rt: &MutexRuntime) {
    // Mutual exclusion: stays never overlap.
    for pair in rt.sessions().windows(2) {
        let released = pair[0].released_at.expect("earlier session still open");
        assert!(
            released <= pair[1].entered_at,
            "{:?} overlaps {:?}",
            pair[0],
            pair[1]
        );
    }

    // No starvation: every node got in exactly once and left.
    let mut entered: Vec<u64> = entry_order(rt);
    entered.sort_unstable();
    assert_eq!(entered, (0..times.len() as u64).collect::<Vec<_>>());
    assert!(rt.sessions().iter().all(|s| s.released_at.is_some()));

    // Clock monotonicity per node.
    let mut last: BTreeMap<NodeId, Timestamp> = BTreeMap::new();
    for r in &rt.trace {
        if let Some(prev) = last.insert(r.node, r.clock) {
            assert!(prev <= r.clock, "{} clock went back at {}", r.node, r);
        }
    }

    check_deferred_replies(&rt.trace);
}

/// Every request gets exactly one reply, and a deferred one only after the
/// deferring node's next release.
fn check_deferred_replies(trace: &[TraceRecord]) {
    let mut received: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
    let mut replied: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();

    for (i, r) in trace.iter().enumerate() {
        match r.action {
            TraceAction::RequestReceived { from, .. } => {
                *received.entry((r.node, from)).or_default() += 1;
            }
            TraceAction::ReplySent { to, .. } => {
                *replied.entry((r.node, to)).or_default() += 1;
            }
            TraceAction::Deferred { from } => {
                let holder = r.node;
                let release = trace[i..]
                    .iter()
                    .position(|x| x.node == holder && x.action == TraceAction::Released)
                    .map(|p| p + i)
                    .expect("deferring node never released");
                let reply = trace[i..]
                    .iter()
                    .position(|x| {
                        x.node == holder && matches!(x.action, TraceAction::ReplySent { to, .. } if to == from)
                    })
                    .map(|p| p + i)
                    .expect("deferred reply never sent");
                assert!(reply > release, "deferred reply to {} sent before release", from);
            }
            _ => {}
        }
    }

    assert_eq!(received, replied);
}

#[test]
fn test_protocol_properties_hold_across_seeds() {
    let base = SimConfig::new().with_horizon(VirtualTime::new(10_000));
    for times in WORKLOADS {
        for seed in 0..25 {
            let (_sim, rt, outcome) = run(times, &base.clone().with_seed(seed));
            assert_eq!(outcome.end, SimulationEnd::Drained, "times {:?} seed {}", times, seed);
            check_properties(times, &rt);
        }
    }
}

#[test]
fn test_same_seed_same_trace() {
    fn trace_for(seed: u64) -> (Vec<TraceRecord>, u64) {
        let config = SimConfig::new().with_seed(seed);
        let (sim, rt, _) = run(&[0, 3, 3, 9], &config);
        (rt.trace.clone(), sim.event_log().unwrap().log_hash())
    }

    let (trace1, hash1) = trace_for(11);
    let (trace2, hash2) = trace_for(11);
    assert_eq!(trace1, trace2, "Simulation is not deterministic!");
    assert_eq!(hash1, hash2);
}

// ── Violations ────────────────────────────────────────────────────────

#[test]
fn test_unsolicited_reply_is_fatal() {
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(2, &instant());
    sim.schedule_at(VirtualTime::new(4), EventKind::ReceiveReply, n(1), n(0), Timestamp::ZERO);

    let err = sim.run(&mut rt).unwrap_err();
    assert_eq!(
        err,
        ProtocolViolation::UnexpectedReply {
            node: n(1),
            from: n(0),
            at: VirtualTime::new(4)
        }
    );
}

#[test]
fn test_unknown_node_is_fatal() {
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(2, &instant());
    sim.schedule_at(VirtualTime::ZERO, EventKind::Request, n(5), n(5), Timestamp::ZERO);

    assert_eq!(
        sim.run(&mut rt).unwrap_err(),
        ProtocolViolation::UnknownNode { node: n(5) }
    );
}

#[test]
fn test_request_while_running_is_fatal() {
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(2, &instant());
    seed_requests(&mut sim, &[0]);
    sim.schedule_at(VirtualTime::new(1), EventKind::Request, n(0), n(0), Timestamp::ZERO);

    assert_eq!(
        sim.run(&mut rt).unwrap_err(),
        ProtocolViolation::DuplicateRequest {
            node: n(0),
            at: VirtualTime::new(1)
        }
    );
}

#[test]
fn test_release_by_non_holder_leaves_state_untouched() {
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(2, &instant());
    seed_requests(&mut sim, &[0]);
    sim.schedule_at(VirtualTime::new(1), EventKind::Release, n(1), n(1), Timestamp::ZERO);

    assert_eq!(
        sim.run(&mut rt).unwrap_err(),
        ProtocolViolation::ReleaseWithoutEntry {
            node: n(1),
            at: VirtualTime::new(1)
        }
    );
    assert_eq!(rt.holder(), Some(n(0)));
    assert_eq!(rt.node(n(0)).unwrap().state(), NodeState::InCriticalRegion);
    let bystander = rt.node(n(1)).unwrap();
    assert_eq!(bystander.state(), NodeState::Idle);
    assert_eq!(bystander.clock(), Timestamp::new(1));
}

#[test]
fn test_stray_release_is_fatal() {
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(3, &instant());
    sim.schedule_at(VirtualTime::new(2), EventKind::Release, n(2), n(2), Timestamp::ZERO);

    assert_eq!(
        sim.run(&mut rt).unwrap_err(),
        ProtocolViolation::ReleaseWithoutEntry {
            node: n(2),
            at: VirtualTime::new(2)
        }
    );
}

// ── Sink & logging ────────────────────────────────────────────────────

struct Shared(Rc<RefCell<Vec<TraceRecord>>>);

impl TraceSink for Shared {
    fn record(&mut self, record: &TraceRecord) {
        self.0.borrow_mut().push(*record);
    }
}

#[test]
fn test_sink_receives_same_records_as_trace() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(3, &SimConfig::new()).with_sink(Box::new(Shared(seen.clone())));
    seed_requests(&mut sim, &[0, 2, 4]);
    sim.run(&mut rt).unwrap();

    assert!(!rt.trace.is_empty());
    assert_eq!(*seen.borrow(), rt.trace);
}

#[test]
fn test_trace_buffer_can_be_disabled() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut sim = Simulation::new();
    let mut rt = MutexRuntime::from_config(3, &SimConfig::new())
        .without_trace_buffer()
        .with_sink(Box::new(Shared(seen.clone())));
    seed_requests(&mut sim, &[0, 2, 4]);
    sim.run(&mut rt).unwrap();

    assert!(rt.trace.is_empty());
    assert_eq!(rt.sessions().len(), 3);
    assert!(seen.borrow().iter().any(|r| r.action == TraceAction::Entered));
}

#[test]
fn test_every_dispatch_is_traced_with_its_kind() {
    let (sim, rt, _) = run(&[0, 0, 3], &SimConfig::new().with_seed(4));
    let log = sim.event_log().unwrap();

    for event in log.events() {
        let records: Vec<&TraceRecord> = rt.trace.iter().filter(|r| r.event_id == event.id).collect();
        assert!(!records.is_empty(), "{} left no trace", event);
        assert!(records.iter().all(|r| r.kind == event.kind && r.time == event.scheduled_at));
        assert!(records[0].to_string().contains(event.kind.tag()));
    }
}

#[test]
fn test_checkpoints_are_reproducible() {
    fn checkpoints() -> Vec<crate::eventlog::Checkpoint> {
        let mut sim = Simulation::new();
        sim.enable_logging_with_checkpoints(3);
        let mut rt = MutexRuntime::from_config(3, &SimConfig::new().with_seed(5));
        seed_requests(&mut sim, &[0, 0, 1]);
        sim.run(&mut rt).unwrap();
        sim.event_log().unwrap().checkpoints().to_vec()
    }

    let cp1 = checkpoints();
    assert!(!cp1.is_empty());
    assert_eq!(cp1, checkpoints());
}

#[test]
#[traced_test]
fn test_transitions_are_logged() {
    let (_sim, _rt, _) = run(&[0, 0], &instant());
    assert!(logs_contain("entered critical region"));
    assert!(logs_contain("reply deferred"));
    assert!(logs_contain("left critical region"));
}
