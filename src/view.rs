//! Bounded peer views.
//!
//! A [`View`] is a capacity-bounded collection of [`PeerState`] records with
//! O(1) membership tests and uniform random sampling. The protocol keeps two
//! of them: the small active view of maintained neighbours and the larger
//! passive reserve used to repair the active view under churn.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::peer::{Peer, PeerState};

/// A bounded, unordered collection of peer records.
///
/// Insertion never grows the view past its capacity and never stores
/// duplicates; callers decide the eviction policy by pre-checking with
/// [`View::is_full`] and [`View::contains`].
#[derive(Debug, Clone)]
pub struct View {
    capacity: usize,
    entries: Vec<PeerState>,
    index: HashSet<Peer>,
}

impl View {
    /// Create an empty view with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
        }
    }

    /// The maximum number of peers the view can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of peers currently in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the view holds no peers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the view is at capacity.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Whether the view contains the given peer.
    #[inline]
    pub fn contains(&self, peer: &Peer) -> bool {
        self.index.contains(peer)
    }

    /// Look up the record for a peer.
    pub fn get(&self, peer: &Peer) -> Option<&PeerState> {
        if !self.index.contains(peer) {
            return None;
        }
        self.entries.iter().find(|s| s.peer() == *peer)
    }

    /// Look up the record for a peer, mutably.
    pub fn get_mut(&mut self, peer: &Peer) -> Option<&mut PeerState> {
        if !self.index.contains(peer) {
            return None;
        }
        self.entries.iter_mut().find(|s| s.peer() == *peer)
    }

    /// Insert a peer record.
    ///
    /// Returns false without modifying the view if the peer is already
    /// present or the view is full.
    pub fn add(&mut self, state: PeerState) -> bool {
        if self.is_full() || self.index.contains(&state.peer()) {
            return false;
        }
        self.index.insert(state.peer());
        self.entries.push(state);
        true
    }

    /// Remove a peer, returning its record.
    ///
    /// Idempotent: removing an absent peer returns `None`.
    pub fn remove(&mut self, peer: &Peer) -> Option<PeerState> {
        if !self.index.remove(peer) {
            return None;
        }
        let pos = self.entries.iter().position(|s| s.peer() == *peer)?;
        Some(self.entries.swap_remove(pos))
    }

    /// Remove a uniformly random peer, returning its record.
    ///
    /// Returns `None` on an empty view.
    pub fn drop_random(&mut self, rng: &mut impl Rng) -> Option<PeerState> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = rng.random_range(0..self.entries.len());
        let state = self.entries.swap_remove(pos);
        self.index.remove(&state.peer());
        Some(state)
    }

    /// Draw up to `amount` distinct peers uniformly at random, skipping any
    /// peer listed in `exclusions`.
    pub fn random_sample(
        &self,
        rng: &mut impl Rng,
        amount: usize,
        exclusions: &[Peer],
    ) -> Vec<Peer> {
        if amount == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.shuffle(rng);

        let mut sample = Vec::with_capacity(amount.min(self.entries.len()));
        for i in order {
            if sample.len() == amount {
                break;
            }
            let peer = self.entries[i].peer();
            if exclusions.contains(&peer) {
                continue;
            }
            sample.push(peer);
        }
        sample
    }

    /// Iterate over the peer records in the view.
    pub fn iter(&self) -> impl Iterator<Item = &PeerState> {
        self.entries.iter()
    }

    /// The peer identities currently in the view.
    pub fn peers(&self) -> Vec<Peer> {
        self.entries.iter().map(|s| s.peer()).collect()
    }
}
