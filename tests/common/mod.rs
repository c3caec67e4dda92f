//! In-memory cluster harness for end-to-end protocol tests.
//!
//! Each node runs a real engine over a [`ChannelTransport`]; the harness
//! plays the network, routing queued commands between nodes one batch at a
//! time. Dials to live nodes succeed, anything addressed to a removed node
//! surfaces as the matching failure callback, and timers are left to the
//! tests to fire explicitly.

use std::collections::{HashMap, HashSet};

use async_channel::Receiver;
use rand::rngs::StdRng;
use rand::SeedableRng;

use hyparview::testing::{test_peer, CollectingDelegate};
use hyparview::{
    ChannelTransport, Hyparview, HyparviewConfig, HyparviewMessage, Peer, Timer, TransportCommand,
    PROTOCOL_ID,
};

/// Upper bound on routing rounds before a settle is considered diverged.
const MAX_ROUNDS: usize = 256;

type Engine = Hyparview<ChannelTransport, CollectingDelegate, StdRng>;

/// A node under test: engine plus the observation handles.
pub struct Node {
    /// The engine itself.
    pub engine: Engine,
    /// Collects neighbour up/down notifications.
    pub delegate: CollectingDelegate,
    rx: Receiver<TransportCommand>,
}

/// Build a config for `test_peer(n)` with the given bootstrap peers.
pub fn config(n: u16, bootstraps: &[Peer]) -> HyparviewConfig {
    HyparviewConfig::new(test_peer(n)).with_bootstrap_peers(bootstraps.iter().copied())
}

/// A simulated overlay of engines wired together in memory.
#[derive(Default)]
pub struct Cluster {
    nodes: HashMap<Peer, Node>,
    order: Vec<Peer>,
    /// Messages that were addressed to a node no longer in the cluster:
    /// (source, target, message).
    pub dropped: Vec<(Peer, Peer, HyparviewMessage)>,
    seed: u64,
}

impl Cluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given configuration (not yet started).
    pub fn add_node(&mut self, config: HyparviewConfig) -> Peer {
        let (transport, rx) = ChannelTransport::unbounded();
        let delegate = CollectingDelegate::new();
        self.seed += 1;
        let engine =
            Hyparview::with_rng(config, transport, delegate.clone(), StdRng::seed_from_u64(self.seed))
                .expect("valid test config");
        let peer = engine.self_peer();
        self.order.push(peer);
        self.nodes.insert(
            peer,
            Node {
                engine,
                delegate,
                rx,
            },
        );
        peer
    }

    /// Start a node's engine.
    pub fn start(&mut self, peer: Peer) {
        self.nodes
            .get_mut(&peer)
            .expect("node exists")
            .engine
            .start()
            .expect("start succeeds");
    }

    /// Access a node.
    pub fn node(&self, peer: Peer) -> &Node {
        self.nodes.get(&peer).expect("node exists")
    }

    /// Access a node's engine mutably, to inject events directly.
    pub fn engine_mut(&mut self, peer: Peer) -> &mut Engine {
        &mut self.nodes.get_mut(&peer).expect("node exists").engine
    }

    /// Remove a node from the overlay. In-flight traffic towards it will
    /// fail; the node's own queue is discarded.
    pub fn kill(&mut self, peer: Peer) {
        self.nodes.remove(&peer);
        self.order.retain(|p| *p != peer);
    }

    /// Fire a timer on a node.
    pub fn fire_timer(&mut self, peer: Peer, timer: Timer) {
        self.nodes
            .get_mut(&peer)
            .expect("node exists")
            .engine
            .handle_timer(timer)
            .expect("timer handler succeeds");
    }

    /// Route queued commands until no node emits anything new.
    pub fn settle(&mut self) {
        for _ in 0..MAX_ROUNDS {
            if !self.step() {
                return;
            }
        }
        panic!("cluster did not settle within {} rounds", MAX_ROUNDS);
    }

    /// Route one batch of queued commands. Returns false if there was
    /// nothing to route.
    fn step(&mut self) -> bool {
        let mut batch = Vec::new();
        for peer in &self.order {
            if let Some(node) = self.nodes.get(peer) {
                while let Ok(command) = node.rx.try_recv() {
                    batch.push((*peer, command));
                }
            }
        }
        if batch.is_empty() {
            return false;
        }

        for (src, command) in batch {
            if !self.nodes.contains_key(&src) {
                continue;
            }
            match command {
                TransportCommand::Message { msg, target }
                | TransportCommand::SideStream { msg, target } => {
                    if self.nodes.contains_key(&target) {
                        self.nodes
                            .get_mut(&target)
                            .unwrap()
                            .engine
                            .handle_message(src, msg)
                            .expect("handler succeeds");
                    } else {
                        self.dropped.push((src, target, msg.clone()));
                        self.nodes
                            .get_mut(&src)
                            .unwrap()
                            .engine
                            .message_delivery_error(&msg, target);
                    }
                }
                TransportCommand::Dial { peer } => {
                    let accepted = self
                        .nodes
                        .get(&peer)
                        .map(|n| n.engine.in_conn_requested(PROTOCOL_ID, src))
                        .unwrap_or(false);
                    let src_engine = &mut self.nodes.get_mut(&src).unwrap().engine;
                    if accepted {
                        src_engine.dial_success(PROTOCOL_ID, peer);
                    } else {
                        src_engine.dial_failed(peer).expect("recovery succeeds");
                    }
                }
                // closing our outbound stream has no remote-side callback
                TransportCommand::Disconnect { .. } => {}
                // timers are fired explicitly by the tests
                TransportCommand::Timer { .. } | TransportCommand::PeriodicTimer { .. } => {}
            }
        }
        true
    }

    /// Check the per-node state invariants on every live node.
    pub fn assert_invariants(&self) {
        for node in self.nodes.values() {
            let engine = &node.engine;
            let me = engine.self_peer();
            let active = engine.active_peers();
            let passive = engine.passive_peers();

            assert!(!active.contains(&me), "{me}: self in active view");
            assert!(!passive.contains(&me), "{me}: self in passive view");

            let active_set: HashSet<Peer> = active.iter().copied().collect();
            let passive_set: HashSet<Peer> = passive.iter().copied().collect();
            assert_eq!(active_set.len(), active.len(), "{me}: duplicate in active view");
            assert_eq!(passive_set.len(), passive.len(), "{me}: duplicate in passive view");
            assert!(
                active_set.is_disjoint(&passive_set),
                "{me}: views overlap"
            );

            assert!(
                active.len() <= engine.config().active_view_size,
                "{me}: active view over capacity"
            );
            assert!(
                passive.len() <= engine.config().passive_view_size,
                "{me}: passive view over capacity"
            );

            for pending in engine.pending_dials() {
                assert!(
                    active_set.contains(&pending),
                    "{me}: orphan dial towards {pending}"
                );
            }
        }
    }
}
