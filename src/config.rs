//! Configuration for the HyParView protocol.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::peer::Peer;

/// Configuration options for a HyParView node.
///
/// These parameters control view sizes, random-walk lengths, and the cadence
/// of the periodic shuffle. The active view should stay small (message
/// delivery fan-out) while the passive view is the larger repair reserve.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HyparviewConfig {
    /// Identity of this node: address, listen port, analytics port.
    pub self_peer: Peer,

    /// Peers contacted to join the overlay.
    ///
    /// May include this node itself; it is skipped when joining. A node that
    /// is its own sole bootstrap simply waits to be joined.
    pub bootstrap_peers: Vec<Peer>,

    /// How long the transport waits before reporting a dial as failed.
    ///
    /// The engine never waits on this itself; it only observes the eventual
    /// dial-success or dial-failed callback.
    ///
    /// Default: 1s
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub dial_timeout: Duration,

    /// Startup grace period and re-join rate limit.
    ///
    /// Re-joins are suppressed until this long after start, and the promote
    /// timer only repairs the overlay past this point.
    ///
    /// Default: 10s
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub join_time: Duration,

    /// Capacity of the active view.
    ///
    /// Default: 4
    pub active_view_size: usize,

    /// Capacity of the passive view. Should exceed the active view size.
    ///
    /// Default: 8
    pub passive_view_size: usize,

    /// Active random walk length: hop budget of a ForwardJoin walk.
    ///
    /// Default: 6
    pub active_random_walk_length: u32,

    /// Passive random walk length: the hop at which a walking ForwardJoin
    /// caches the joiner in the passive view. Must be smaller than the
    /// active random walk length.
    ///
    /// Default: 3
    pub passive_random_walk_length: u32,

    /// Number of active-view peers included in a shuffle sample.
    ///
    /// Default: 3
    pub shuffle_active_count: usize,

    /// Number of passive-view peers included in a shuffle sample
    /// (one slot is reserved for this node itself).
    ///
    /// Default: 4
    pub shuffle_passive_count: usize,

    /// Minimum interval between shuffles. Each shuffle re-arms the timer
    /// with this duration plus a uniform jitter in `[0, interval)`.
    ///
    /// Default: 10s
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub min_shuffle_interval: Duration,

    /// Interval of the periodic state-dump log line.
    ///
    /// Default: 30s
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub debug_interval: Duration,
}

impl HyparviewConfig {
    /// Create a configuration with default protocol parameters for the
    /// given node identity and no bootstrap peers.
    pub fn new(self_peer: Peer) -> Self {
        Self {
            self_peer,
            bootstrap_peers: Vec::new(),
            dial_timeout: Duration::from_secs(1),
            join_time: Duration::from_secs(10),
            active_view_size: 4,
            passive_view_size: 8,
            active_random_walk_length: 6,
            passive_random_walk_length: 3,
            shuffle_active_count: 3,
            shuffle_passive_count: 4,
            min_shuffle_interval: Duration::from_secs(10),
            debug_interval: Duration::from_secs(30),
        }
    }

    /// Set the bootstrap peers (builder pattern).
    pub fn with_bootstrap_peers(mut self, peers: impl IntoIterator<Item = Peer>) -> Self {
        self.bootstrap_peers = peers.into_iter().collect();
        self
    }

    /// Set the dial timeout (builder pattern).
    pub const fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the join grace period (builder pattern).
    pub const fn with_join_time(mut self, join_time: Duration) -> Self {
        self.join_time = join_time;
        self
    }

    /// Set the active view capacity (builder pattern).
    pub const fn with_active_view_size(mut self, size: usize) -> Self {
        self.active_view_size = size;
        self
    }

    /// Set the passive view capacity (builder pattern).
    pub const fn with_passive_view_size(mut self, size: usize) -> Self {
        self.passive_view_size = size;
        self
    }

    /// Set the active random walk length (builder pattern).
    pub const fn with_active_random_walk_length(mut self, arwl: u32) -> Self {
        self.active_random_walk_length = arwl;
        self
    }

    /// Set the passive random walk length (builder pattern).
    pub const fn with_passive_random_walk_length(mut self, prwl: u32) -> Self {
        self.passive_random_walk_length = prwl;
        self
    }

    /// Set the active shuffle sample size (builder pattern).
    pub const fn with_shuffle_active_count(mut self, count: usize) -> Self {
        self.shuffle_active_count = count;
        self
    }

    /// Set the passive shuffle sample size (builder pattern).
    pub const fn with_shuffle_passive_count(mut self, count: usize) -> Self {
        self.shuffle_passive_count = count;
        self
    }

    /// Set the minimum shuffle interval (builder pattern).
    pub const fn with_min_shuffle_interval(mut self, interval: Duration) -> Self {
        self.min_shuffle_interval = interval;
        self
    }

    /// Set the debug log interval (builder pattern).
    pub const fn with_debug_interval(mut self, interval: Duration) -> Self {
        self.debug_interval = interval;
        self
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.active_view_size == 0 {
            return Err(Error::Config(
                "active view size must be at least 1".to_string(),
            ));
        }
        if self.passive_random_walk_length >= self.active_random_walk_length {
            return Err(Error::Config(format!(
                "passive random walk length ({}) must be shorter than active ({})",
                self.passive_random_walk_length, self.active_random_walk_length
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
