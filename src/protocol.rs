//! Core HyParView membership protocol implementation.
//!
//! This module provides the [`Hyparview`] engine: a single-threaded state
//! machine that consumes transport callbacks, protocol messages, and timer
//! events, maintains the active and passive views, and emits outgoing
//! messages, dial requests, and membership notifications.

use rand::rngs::ThreadRng;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::{
    config::HyparviewConfig,
    error::{Error, Result},
    message::{HyparviewMessage, PeerList},
    notification::MembershipDelegate,
    peer::{Peer, PeerState},
    transport::{Timer, Transport},
    view::View,
};

/// Protocol identifier presented to the transport multiplexer.
pub const PROTOCOL_ID: u16 = 1000;

/// Delay before the first shuffle after start; later shuffles re-arm
/// themselves with the configured interval plus jitter.
const INITIAL_SHUFFLE_DELAY: Duration = Duration::from_secs(3);

/// Interval of the passive-view promotion / re-join check.
const PROMOTE_INTERVAL: Duration = Duration::from_secs(7);

/// Interval of the neighbour liveness maintenance loop.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Maintenance probes tolerated from a non-neighbour before telling it to
/// disconnect and forget us.
const DANGLING_DISCONNECT_THRESHOLD: u32 = 3;

/// The shuffle this node sent and has not yet seen answered.
#[derive(Debug, Clone)]
struct PendingShuffle {
    id: u32,
    peers: PeerList,
}

/// HyParView membership engine.
///
/// Maintains a small symmetric active view used as the message-delivery
/// substrate and a larger passive reserve used to repair the overlay under
/// churn. All handlers run to completion on the caller's thread and only
/// queue side effects through the injected [`Transport`]; the external event
/// loop must deliver one event at a time.
///
/// # Type parameters
///
/// - `T`: transport implementation
/// - `D`: delegate receiving neighbour up/down notifications
/// - `R`: random source, swappable for deterministic tests
pub struct Hyparview<T, D, R = ThreadRng> {
    config: HyparviewConfig,
    transport: T,
    delegate: D,
    rng: R,

    self_peer: Peer,
    bootstrap_peers: Vec<Peer>,
    self_is_bootstrap: bool,
    next_bootstrap: usize,

    active_view: View,
    passive_view: View,
    last_shuffle: Option<PendingShuffle>,
    dangling_counters: HashMap<Peer, u32>,
    pending_dials: HashSet<Peer>,
    started_at: Option<Instant>,
}

impl<T, D> Hyparview<T, D>
where
    T: Transport,
    D: MembershipDelegate,
{
    /// Create an engine using the thread-local random source.
    pub fn new(config: HyparviewConfig, transport: T, delegate: D) -> Result<Self> {
        Self::with_rng(config, transport, delegate, rand::rng())
    }
}

impl<T, D, R> Hyparview<T, D, R>
where
    T: Transport,
    D: MembershipDelegate,
    R: Rng,
{
    /// Create an engine with an explicit random source.
    ///
    /// Seed the source for deterministic peer selection in tests.
    pub fn with_rng(config: HyparviewConfig, transport: T, delegate: D, rng: R) -> Result<Self> {
        config.validate()?;

        let self_peer = config.self_peer;
        let bootstrap_peers = config.bootstrap_peers.clone();
        let self_is_bootstrap = bootstrap_peers.contains(&self_peer);
        let active_view = View::new(config.active_view_size);
        let passive_view = View::new(config.passive_view_size);

        Ok(Self {
            config,
            transport,
            delegate,
            rng,
            self_peer,
            bootstrap_peers,
            self_is_bootstrap,
            next_bootstrap: 0,
            active_view,
            passive_view,
            last_shuffle: None,
            dangling_counters: HashMap::new(),
            pending_dials: HashSet::new(),
            started_at: None,
        })
    }

    /// This node's identity.
    pub fn self_peer(&self) -> Peer {
        self.self_peer
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &HyparviewConfig {
        &self.config
    }

    /// Peers currently in the active view.
    pub fn active_peers(&self) -> Vec<Peer> {
        self.active_view.peers()
    }

    /// Peers currently in the passive view.
    pub fn passive_peers(&self) -> Vec<Peer> {
        self.passive_view.peers()
    }

    /// Active-view peers with an established outbound stream.
    ///
    /// This is the snapshot handed to delegates on every notification.
    pub fn connected_neighbours(&self) -> Vec<Peer> {
        self.active_view
            .iter()
            .filter(|s| s.is_out_connected())
            .map(|s| s.peer())
            .collect()
    }

    /// Peers with an outstanding dial. For testing and debugging.
    pub fn pending_dials(&self) -> Vec<Peer> {
        self.pending_dials.iter().copied().collect()
    }

    /// Register timers and join the overlay.
    ///
    /// Must be called exactly once before any other event is delivered.
    /// Fails if the bootstrap list is empty; a node that is its own sole
    /// bootstrap starts quietly and waits to be joined.
    pub fn start(&mut self) -> Result<()> {
        tracing::info!(
            self_peer = %self.self_peer,
            bootstrap = ?self.bootstrap_peers.iter().map(Peer::to_string).collect::<Vec<_>>(),
            self_is_bootstrap = self.self_is_bootstrap,
            "starting membership protocol",
        );
        self.transport
            .register_timer(INITIAL_SHUFFLE_DELAY, Timer::Shuffle);
        self.transport
            .register_periodic_timer(PROMOTE_INTERVAL, Timer::Promote, true);
        self.transport
            .register_periodic_timer(self.config.debug_interval, Timer::Debug, true);
        self.transport
            .register_periodic_timer(MAINTENANCE_INTERVAL, Timer::Maintenance, false);
        self.join_overlay()?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Send a Join towards the next bootstrap peer.
    ///
    /// Rate-limited: once started, re-joins are suppressed until the
    /// configured join grace period has elapsed. Rotates cyclically through
    /// the bootstrap list across calls, always skipping this node itself.
    fn join_overlay(&mut self) -> Result<()> {
        if let Some(started) = self.started_at {
            if started.elapsed() < self.config.join_time {
                tracing::debug!("not rejoining, join grace period has not elapsed");
                return Ok(());
            }
        }

        if self.bootstrap_peers.is_empty() {
            return Err(Error::NoBootstrapPeers);
        }

        for _ in 0..self.bootstrap_peers.len() {
            let candidate = self.bootstrap_peers[self.next_bootstrap % self.bootstrap_peers.len()];
            self.next_bootstrap = self.next_bootstrap.wrapping_add(1);
            if candidate == self.self_peer {
                continue;
            }
            tracing::info!(bootstrap = %candidate, "joining overlay");
            self.transport
                .send_side_stream(HyparviewMessage::Join, &candidate);
            return Ok(());
        }

        tracing::debug!("this node is the only bootstrap peer, waiting to be joined");
        Ok(())
    }

    // ---------------- Transport callbacks ----------------

    /// An inbound connection was requested by `peer`.
    ///
    /// Accepted iff the dialing protocol is this protocol; admission into
    /// the active view is decided by the message handlers.
    pub fn in_conn_requested(&self, dialer_proto: u16, peer: Peer) -> bool {
        if dialer_proto != PROTOCOL_ID {
            tracing::warn!(peer = %peer, proto = dialer_proto, "denying connection from foreign protocol");
            return false;
        }
        true
    }

    /// A previously requested dial completed.
    ///
    /// Returns whether the connection should be kept.
    pub fn dial_success(&mut self, source_proto: u16, peer: Peer) -> bool {
        self.pending_dials.remove(&peer);
        if source_proto != PROTOCOL_ID {
            return false;
        }

        let in_active = match self.active_view.get_mut(&peer) {
            Some(state) => {
                state.set_out_connected(true);
                true
            }
            None => false,
        };

        if in_active {
            tracing::info!(peer = %peer, "dialed node in active view");
            let view = self.connected_neighbours();
            self.delegate.on_neighbour_up(&peer, &view);
            true
        } else {
            // evicted between dial request and completion
            tracing::warn!(peer = %peer, "dialed peer is not in the active view, disconnecting");
            self.transport.disconnect(&peer);
            false
        }
    }

    /// A previously requested dial failed.
    pub fn dial_failed(&mut self, peer: Peer) -> Result<()> {
        tracing::error!(peer = %peer, "failed to dial peer");
        self.handle_node_down(peer)
    }

    /// The established outbound stream to `peer` went down.
    pub fn out_conn_down(&mut self, peer: Peer) -> Result<()> {
        tracing::error!(peer = %peer, "outbound connection went down");
        self.handle_node_down(peer)
    }

    /// A message was delivered to `peer`. Logging only.
    pub fn message_delivered(&self, msg: &HyparviewMessage, peer: &Peer) {
        tracing::debug!(peer = %peer, tag = ?msg.tag(), "message delivered");
    }

    /// A message could not be delivered to `peer`.
    ///
    /// A failed Neighbour request means the passive entry is unreachable and
    /// is pruned; any other failure is left to the overlay's self-repair.
    pub fn message_delivery_error(&mut self, msg: &HyparviewMessage, peer: Peer) {
        tracing::warn!(peer = %peer, tag = ?msg.tag(), "message could not be delivered");
        if msg.is_neighbour() {
            self.passive_view.remove(&peer);
        }
    }

    // ---------------- Message handlers ----------------

    /// Dispatch a protocol message received from `from`.
    pub fn handle_message(&mut self, from: Peer, msg: HyparviewMessage) -> Result<()> {
        match msg {
            HyparviewMessage::Join => {
                self.on_join(from);
                Ok(())
            }
            HyparviewMessage::ForwardJoin {
                ttl,
                original_sender,
            } => self.on_forward_join(from, ttl, original_sender),
            HyparviewMessage::ForwardJoinReply => {
                self.on_forward_join_reply(from);
                Ok(())
            }
            HyparviewMessage::Neighbour { high_prio } => {
                self.on_neighbour(from, high_prio);
                Ok(())
            }
            HyparviewMessage::NeighbourReply { accepted } => {
                self.on_neighbour_reply(from, accepted);
                Ok(())
            }
            HyparviewMessage::Shuffle { id, ttl, peers } => {
                self.on_shuffle(from, id, ttl, peers);
                Ok(())
            }
            HyparviewMessage::ShuffleReply { id, peers } => {
                self.on_shuffle_reply(from, id, peers);
                Ok(())
            }
            HyparviewMessage::Disconnect => self.on_disconnect(from),
            HyparviewMessage::NeighbourMaintenance => {
                self.on_neighbour_maintenance(from);
                Ok(())
            }
        }
    }

    fn on_join(&mut self, sender: Peer) {
        tracing::info!(peer = %sender, "received join");
        if self.active_view.is_full() {
            self.drop_random_from_active_view();
        }
        let forward = HyparviewMessage::ForwardJoin {
            ttl: self.config.active_random_walk_length,
            original_sender: sender,
        };
        self.add_to_active_view(sender);
        // the joiner holds no stream to us yet, answer out of band
        self.transport
            .send_side_stream(HyparviewMessage::ForwardJoinReply, &sender);
        for state in self.active_view.iter() {
            if state.peer() == sender || !state.is_out_connected() {
                continue;
            }
            tracing::debug!(original = %sender, peer = %state.peer(), "sending forward join");
            self.transport.send_message(forward.clone(), &state.peer());
        }
    }

    fn on_forward_join(&mut self, sender: Peer, ttl: u32, original_sender: Peer) -> Result<()> {
        tracing::debug!(
            ttl,
            original = %original_sender,
            peer = %sender,
            "received forward join",
        );

        if original_sender == self.self_peer {
            return Err(Error::Protocol(
                "received a forward join originated by this node".to_string(),
            ));
        }

        if ttl == 0 || self.active_view.len() == 1 {
            tracing::info!(original = %original_sender, ttl, "accepting forward join");
            if self.add_to_active_view(original_sender) {
                self.transport
                    .send_side_stream(HyparviewMessage::ForwardJoinReply, &original_sender);
            }
            return Ok(());
        }

        if ttl == self.config.passive_random_walk_length {
            self.add_to_passive_view(original_sender);
        }

        let sample = self
            .active_view
            .random_sample(&mut self.rng, 1, &[original_sender, sender]);
        match sample.first() {
            None => {
                // nobody left to walk to, act as if this were a join
                tracing::info!(original = %original_sender, "cannot forward, accepting locally");
                if self.add_to_active_view(original_sender) {
                    self.transport
                        .send_side_stream(HyparviewMessage::ForwardJoinReply, &original_sender);
                }
            }
            Some(next) => {
                tracing::debug!(original = %original_sender, ttl = ttl - 1, peer = %next, "forwarding join walk");
                self.transport.send_message(
                    HyparviewMessage::ForwardJoin {
                        ttl: ttl - 1,
                        original_sender,
                    },
                    next,
                );
            }
        }
        Ok(())
    }

    fn on_forward_join_reply(&mut self, sender: Peer) {
        tracing::info!(peer = %sender, "received forward join reply");
        self.add_to_active_view(sender);
    }

    fn on_neighbour(&mut self, sender: Peer, high_prio: bool) {
        tracing::info!(peer = %sender, high_prio, "received neighbour request");

        if high_prio {
            if self.add_to_active_view(sender) {
                self.transport.send_side_stream(
                    HyparviewMessage::NeighbourReply { accepted: true },
                    &sender,
                );
            }
            return;
        }

        if self.active_view.is_full() {
            self.transport.send_side_stream(
                HyparviewMessage::NeighbourReply { accepted: false },
                &sender,
            );
            return;
        }
        if self.add_to_active_view(sender) {
            self.transport
                .send_side_stream(HyparviewMessage::NeighbourReply { accepted: true }, &sender);
        }
    }

    fn on_neighbour_reply(&mut self, sender: Peer, accepted: bool) {
        tracing::info!(peer = %sender, accepted, "received neighbour reply");
        if accepted {
            self.add_to_active_view(sender);
        }
    }

    fn on_neighbour_maintenance(&mut self, sender: Peer) {
        match self.active_view.get(&sender).map(PeerState::is_out_connected) {
            Some(true) => {
                self.dangling_counters.remove(&sender);
            }
            Some(false) => {
                self.dial(sender);
            }
            None => {
                tracing::warn!(peer = %sender, "maintenance probe from a peer that is not a neighbour");
                let count = self.dangling_counters.entry(sender).or_insert(0);
                *count += 1;
                if *count >= DANGLING_DISCONNECT_THRESHOLD {
                    tracing::warn!(peer = %sender, "telling dangling peer to disconnect");
                    self.transport
                        .send_side_stream(HyparviewMessage::Disconnect, &sender);
                }
            }
        }
    }

    fn on_shuffle(&mut self, sender: Peer, id: u32, ttl: u32, peers: PeerList) {
        if ttl > 0 {
            let sample = self.active_view.random_sample(&mut self.rng, 1, &[sender]);
            if let Some(&next) = sample.first() {
                tracing::debug!(id, ttl = ttl - 1, peer = %next, "forwarding shuffle");
                self.transport.send_message(
                    HyparviewMessage::Shuffle {
                        id,
                        ttl: ttl - 1,
                        peers,
                    },
                    &next,
                );
                return;
            }
        }

        // walk is over: answer with a sample of our own and absorb theirs,
        // preferring to evict exactly what we are sending back
        let mut exclusions: Vec<Peer> = peers.to_vec();
        exclusions.push(sender);
        let reply_peers =
            self.passive_view
                .random_sample(&mut self.rng, peers.len(), &exclusions);
        self.merge_into_passive_view(&peers, &reply_peers);
        self.transport.send_side_stream(
            HyparviewMessage::ShuffleReply {
                id,
                peers: reply_peers.into(),
            },
            &sender,
        );
    }

    fn on_shuffle_reply(&mut self, sender: Peer, id: u32, peers: PeerList) {
        tracing::debug!(id, peer = %sender, count = peers.len(), "received shuffle reply");
        let first_to_evict = match self.last_shuffle.take() {
            Some(last) if last.id == id => last.peers,
            _ => PeerList::new(),
        };
        self.merge_into_passive_view(&peers, &first_to_evict);
    }

    fn on_disconnect(&mut self, sender: Peer) -> Result<()> {
        tracing::warn!(peer = %sender, "received disconnect");
        self.handle_node_down(sender)
    }

    // ---------------- Timer handlers ----------------

    /// Dispatch a fired timer.
    pub fn handle_timer(&mut self, timer: Timer) -> Result<()> {
        match timer {
            Timer::Shuffle => {
                self.on_shuffle_timer();
                Ok(())
            }
            Timer::Promote => self.on_promote_timer(),
            Timer::Maintenance => {
                self.on_maintenance_timer();
                Ok(())
            }
            Timer::Debug => {
                self.log_state();
                Ok(())
            }
        }
    }

    fn on_shuffle_timer(&mut self) {
        let min = self.config.min_shuffle_interval;
        let jitter = min.mul_f64(self.rng.random::<f64>());
        self.transport.register_timer(min + jitter, Timer::Shuffle);

        if self.active_view.is_empty() {
            tracing::info!("no neighbours to shuffle with");
            return;
        }

        let Some(&target) = self
            .active_view
            .random_sample(&mut self.rng, 1, &[])
            .first()
        else {
            return;
        };

        let passive_count = self.config.shuffle_passive_count.saturating_sub(1);
        let mut peers: PeerList = self
            .passive_view
            .random_sample(&mut self.rng, passive_count, &[target])
            .into();
        peers.extend(self.active_view.random_sample(
            &mut self.rng,
            self.config.shuffle_active_count,
            &[target],
        ));
        peers.push(self.self_peer);

        let id: u32 = self.rng.random();
        self.last_shuffle = Some(PendingShuffle {
            id,
            peers: peers.clone(),
        });
        tracing::info!(id, peer = %target, "sending shuffle");
        self.transport.send_message(
            HyparviewMessage::Shuffle {
                id,
                ttl: self.config.passive_random_walk_length,
                peers,
            },
            &target,
        );
    }

    fn on_promote_timer(&mut self) -> Result<()> {
        let Some(started) = self.started_at else {
            return Ok(());
        };
        if started.elapsed() <= self.config.join_time {
            return Ok(());
        }

        if self.active_view.is_empty() && self.passive_view.is_empty() {
            return self.join_overlay();
        }

        if !self.active_view.is_full() && !self.passive_view.is_empty() {
            let sample = self.passive_view.random_sample(&mut self.rng, 1, &[]);
            if let Some(&candidate) = sample.first() {
                tracing::warn!(peer = %candidate, "promoting peer from passive view");
                let high_prio = self.active_view.len() <= 1;
                self.transport
                    .send_side_stream(HyparviewMessage::Neighbour { high_prio }, &candidate);
            }
        }
        Ok(())
    }

    fn on_maintenance_timer(&mut self) {
        let neighbours: Vec<(Peer, bool)> = self
            .active_view
            .iter()
            .map(|s| (s.peer(), s.is_out_connected()))
            .collect();
        for (peer, connected) in neighbours {
            if !connected {
                self.dial(peer);
            }
            self.transport
                .send_message(HyparviewMessage::NeighbourMaintenance, &peer);
        }
    }

    // ---------------- View mutation ----------------

    /// Admit a peer into the active view, evicting a random neighbour if it
    /// is full, and request an outbound stream.
    ///
    /// Returns false if the peer is this node or already a neighbour.
    fn add_to_active_view(&mut self, peer: Peer) -> bool {
        if peer == self.self_peer {
            tracing::error!("refusing to add this node to its own active view");
            return false;
        }
        if self.active_view.contains(&peer) {
            return false;
        }
        if self.active_view.is_full() {
            self.drop_random_from_active_view();
        }
        self.passive_view.remove(&peer);
        let added = self.active_view.add(PeerState::new(peer));
        debug_assert!(added, "active view rejected insert after eviction");
        if added {
            tracing::info!(peer = %peer, "added peer to active view");
            self.dial(peer);
        }
        added
    }

    /// Record a peer in the passive view, evicting a random entry if it is
    /// full. Peers already present in either view and this node itself are
    /// ignored.
    fn add_to_passive_view(&mut self, peer: Peer) -> bool {
        if peer == self.self_peer
            || self.active_view.contains(&peer)
            || self.passive_view.contains(&peer)
        {
            return false;
        }
        if self.passive_view.is_full() {
            self.passive_view.drop_random(&mut self.rng);
        }
        let added = self.passive_view.add(PeerState::new(peer));
        if added {
            tracing::debug!(peer = %peer, "added peer to passive view");
        }
        added
    }

    /// Fold received shuffle peers into the passive view.
    ///
    /// When room must be made, peers named in `evict_first` are removed in
    /// order before falling back to random eviction; a matched entry stops
    /// the scan. This biases eviction towards what we just advertised.
    fn merge_into_passive_view(&mut self, received: &[Peer], evict_first: &[Peer]) {
        for &peer in received {
            if peer == self.self_peer
                || self.active_view.contains(&peer)
                || self.passive_view.contains(&peer)
            {
                continue;
            }
            if self.passive_view.is_full() {
                let evicted = evict_first
                    .iter()
                    .any(|candidate| self.passive_view.remove(candidate).is_some());
                if !evicted {
                    self.passive_view.drop_random(&mut self.rng);
                }
            }
            self.passive_view.add(PeerState::new(peer));
        }
    }

    /// Evict a uniformly random neighbour, demote it to the passive view,
    /// and tell it to disconnect.
    ///
    /// The send and the close are queued on the transport; the handler never
    /// waits for them.
    fn drop_random_from_active_view(&mut self) {
        let Some(dropped) = self.active_view.drop_random(&mut self.rng) else {
            return;
        };
        let peer = dropped.peer();
        tracing::warn!(peer = %peer, "evicting random peer from active view");
        self.pending_dials.remove(&peer);
        if dropped.is_out_connected() {
            let view = self.connected_neighbours();
            self.delegate.on_neighbour_down(&peer, &view);
        }
        self.add_to_passive_view(peer);
        self.transport
            .send_message(HyparviewMessage::Disconnect, &peer);
        self.transport.disconnect(&peer);
    }

    /// React to a peer that failed, disconnected, or could not be dialed.
    fn handle_node_down(&mut self, peer: Peer) -> Result<()> {
        tracing::error!(peer = %peer, "node down");
        self.pending_dials.remove(&peer);

        let result = match self.active_view.remove(&peer) {
            Some(removed) => {
                if removed.is_out_connected() {
                    let view = self.connected_neighbours();
                    self.delegate.on_neighbour_down(&peer, &view);
                } else {
                    tracing::warn!(peer = %peer, "downed peer was in the active view but not connected");
                }
                self.replace_downed_neighbour()
            }
            None => {
                tracing::warn!(peer = %peer, "downed peer was not in the active view");
                Ok(())
            }
        };

        self.transport.disconnect(&peer);
        self.log_state();
        result
    }

    /// Refill the active view after a loss: ask a random passive peer to
    /// become a neighbour, or re-join if both views are exhausted.
    fn replace_downed_neighbour(&mut self) -> Result<()> {
        if self.active_view.is_full() {
            return Ok(());
        }
        if self.passive_view.is_empty() {
            if self.active_view.is_empty() {
                return self.join_overlay();
            }
            return Ok(());
        }
        let sample = self.passive_view.random_sample(&mut self.rng, 1, &[]);
        if let Some(&candidate) = sample.first() {
            tracing::warn!(peer = %candidate, "replacing downed neighbour from passive view");
            let high_prio = self.active_view.len() <= 1;
            self.transport
                .send_side_stream(HyparviewMessage::Neighbour { high_prio }, &candidate);
        }
        Ok(())
    }

    /// Request a dial unless one is already outstanding.
    fn dial(&mut self, peer: Peer) {
        if !self.pending_dials.insert(peer) {
            return;
        }
        self.transport.dial(&peer);
    }

    fn log_state(&self) {
        tracing::debug!(
            active = ?self.active_view.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            passive = ?self.passive_view.peers().iter().map(Peer::to_string).collect::<Vec<_>>(),
            "membership state",
        );
    }
}
