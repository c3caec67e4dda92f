//! Transport abstraction for protocol side effects.
//!
//! The engine never performs I/O itself: every outgoing message, dial,
//! disconnect, and timer registration goes through the [`Transport`] trait,
//! fire-and-forget. The transport queues the request and surfaces the
//! outcome later as an engine callback (dial success/failure, connection
//! down, message delivery error), which keeps every handler non-blocking.
//!
//! # Streams and side streams
//!
//! Regular messages travel on the established outbound stream to the target
//! and are ordered per peer. Side-stream sends are one-shot
//! connect-send-close exchanges used when no established stream exists
//! (Join, Neighbour, the various replies); they carry no ordering guarantee
//! relative to stream traffic.
//!
//! # Available transports
//!
//! - [`ChannelTransport`]: queues [`TransportCommand`]s on a channel for an
//!   external driver, also the workhorse of the integration tests
//! - [`NoopTransport`]: discards everything

use std::time::Duration;

use crate::message::HyparviewMessage;
use crate::peer::Peer;

/// Timers the engine registers with the transport's timer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// One-shot shuffle trigger; re-armed with jitter from its own handler.
    Shuffle,
    /// Periodic passive-view promotion and re-join check.
    Promote,
    /// Periodic neighbour liveness maintenance.
    Maintenance,
    /// Periodic state-dump log line.
    Debug,
}

/// Host interface the engine drives its side effects through.
///
/// All methods are fire-and-forget: implementations must queue the request
/// and return immediately. Implementations multiplex by the protocol
/// identifier ([`crate::PROTOCOL_ID`]) and apply the configured dial timeout
/// themselves.
#[auto_impl::auto_impl(Box, Arc)]
pub trait Transport: Send + Sync + 'static {
    /// Send a message on the established outbound stream to `target`.
    fn send_message(&self, msg: HyparviewMessage, target: &Peer);

    /// Send a message on an ephemeral connect-send-close side stream.
    fn send_side_stream(&self, msg: HyparviewMessage, target: &Peer);

    /// Request an outbound stream to `peer`. The outcome arrives later as a
    /// dial-success or dial-failed callback.
    fn dial(&self, peer: &Peer);

    /// Close the outbound stream to `peer`, if any.
    fn disconnect(&self, peer: &Peer);

    /// Arm a one-shot timer.
    fn register_timer(&self, delay: Duration, timer: Timer);

    /// Arm a periodic timer, optionally firing immediately as well.
    fn register_periodic_timer(&self, period: Duration, timer: Timer, trigger_immediately: bool);
}

/// A transport request captured as a value.
///
/// Produced by [`ChannelTransport`] and the recording transport in
/// [`crate::testing`]; consumed by whatever drives the real network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send on the established stream.
    Message {
        /// The message to send.
        msg: HyparviewMessage,
        /// The peer to send it to.
        target: Peer,
    },
    /// Send on an ephemeral side stream.
    SideStream {
        /// The message to send.
        msg: HyparviewMessage,
        /// The peer to send it to.
        target: Peer,
    },
    /// Open an outbound stream.
    Dial {
        /// The peer to dial.
        peer: Peer,
    },
    /// Close the outbound stream.
    Disconnect {
        /// The peer to disconnect from.
        peer: Peer,
    },
    /// Arm a one-shot timer.
    Timer {
        /// Delay until the timer fires.
        delay: Duration,
        /// Which timer to fire.
        timer: Timer,
    },
    /// Arm a periodic timer.
    PeriodicTimer {
        /// Interval between firings.
        period: Duration,
        /// Which timer to fire.
        timer: Timer,
        /// Whether to fire once immediately as well.
        immediate: bool,
    },
}

/// A transport that forwards every request onto a channel.
///
/// The receiving end belongs to the driver (or test harness) that owns the
/// actual sockets and timer wheel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: async_channel::Sender<TransportCommand>,
}

impl ChannelTransport {
    /// Create a channel transport over an existing sender.
    pub fn new(tx: async_channel::Sender<TransportCommand>) -> Self {
        Self { tx }
    }

    /// Create a channel transport with a new unbounded channel.
    ///
    /// Returns the transport and the receiver for the queued commands.
    pub fn unbounded() -> (Self, async_channel::Receiver<TransportCommand>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }

    fn push(&self, command: TransportCommand) {
        if let Err(err) = self.tx.try_send(command) {
            tracing::warn!("transport channel closed, dropping command: {}", err);
        }
    }
}

impl Transport for ChannelTransport {
    fn send_message(&self, msg: HyparviewMessage, target: &Peer) {
        self.push(TransportCommand::Message {
            msg,
            target: *target,
        });
    }

    fn send_side_stream(&self, msg: HyparviewMessage, target: &Peer) {
        self.push(TransportCommand::SideStream {
            msg,
            target: *target,
        });
    }

    fn dial(&self, peer: &Peer) {
        self.push(TransportCommand::Dial { peer: *peer });
    }

    fn disconnect(&self, peer: &Peer) {
        self.push(TransportCommand::Disconnect { peer: *peer });
    }

    fn register_timer(&self, delay: Duration, timer: Timer) {
        self.push(TransportCommand::Timer { delay, timer });
    }

    fn register_periodic_timer(&self, period: Duration, timer: Timer, trigger_immediately: bool) {
        self.push(TransportCommand::PeriodicTimer {
            period,
            timer,
            immediate: trigger_immediately,
        });
    }
}

/// A transport that discards all requests.
///
/// Useful for tests that only inspect view state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send_message(&self, _msg: HyparviewMessage, _target: &Peer) {}

    fn send_side_stream(&self, _msg: HyparviewMessage, _target: &Peer) {}

    fn dial(&self, _peer: &Peer) {}

    fn disconnect(&self, _peer: &Peer) {}

    fn register_timer(&self, _delay: Duration, _timer: Timer) {}

    fn register_periodic_timer(
        &self,
        _period: Duration,
        _timer: Timer,
        _trigger_immediately: bool,
    ) {
    }
}
