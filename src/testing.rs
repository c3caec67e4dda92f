//! Test utilities for exercising the membership engine.
//!
//! The engine only talks to the outside world through its [`Transport`] and
//! [`MembershipDelegate`](crate::MembershipDelegate) seams, so a recording
//! implementation of each is enough to drive and observe it without any
//! network. Both types here are cheap clones over shared state: hand one
//! clone to the engine and keep the other for assertions.
//!
//! ## Example
//!
//! ```
//! use hyparview::testing::{test_peer, CollectingDelegate, RecordingTransport};
//! use hyparview::{Hyparview, HyparviewConfig};
//!
//! let transport = RecordingTransport::new();
//! let delegate = CollectingDelegate::new();
//! let config = HyparviewConfig::new(test_peer(0)).with_bootstrap_peers([test_peer(1)]);
//! let mut node = Hyparview::new(config, transport.clone(), delegate.clone()).unwrap();
//!
//! node.start().unwrap();
//! assert!(!transport.take().is_empty());
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::message::HyparviewMessage;
use crate::notification::{MembershipDelegate, MembershipEvent};
use crate::peer::Peer;
use crate::transport::{Timer, Transport, TransportCommand};

/// Construct a distinct loopback peer for the given index.
pub fn test_peer(n: u16) -> Peer {
    Peer::localhost(9000 + n, 10000 + n)
}

/// A transport that records every request for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    commands: Arc<Mutex<Vec<TransportCommand>>>,
}

impl RecordingTransport {
    /// Create an empty recording transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// All commands recorded so far, in order.
    pub fn commands(&self) -> Vec<TransportCommand> {
        self.commands.lock().clone()
    }

    /// Drain and return all recorded commands.
    pub fn take(&self) -> Vec<TransportCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    fn push(&self, command: TransportCommand) {
        self.commands.lock().push(command);
    }
}

impl Transport for RecordingTransport {
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

/// A delegate that collects every membership notification.
#[derive(Debug, Clone, Default)]
pub struct CollectingDelegate {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
}

impl CollectingDelegate {
    /// Create an empty collecting delegate.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events collected so far, in order.
    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    /// Drain and return all collected events.
    pub fn take(&self) -> Vec<MembershipEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl MembershipDelegate for CollectingDelegate {
    fn on_neighbour_up(&self, peer: &Peer, view: &[Peer]) {
        self.events.lock().push(MembershipEvent::NeighbourUp {
            peer: *peer,
            view: view.to_vec(),
        });
    }

    fn on_neighbour_down(&self, peer: &Peer, view: &[Peer]) {
        self.events.lock().push(MembershipEvent::NeighbourDown {
            peer: *peer,
            view: view.to_vec(),
        });
    }
}
