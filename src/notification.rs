//! Membership notifications for overlay consumers.
//!
//! Application-layer protocols (broadcast trees, aggregation layers) react
//! to neighbours appearing and disappearing. The engine reports both through
//! a [`MembershipDelegate`], handing over an owned snapshot of the currently
//! connected active view at emission time.

use crate::peer::Peer;

/// A membership change notification as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// An active-view peer's outbound stream became usable.
    NeighbourUp {
        /// The neighbour that came up.
        peer: Peer,
        /// All out-connected active-view peers at emission time.
        view: Vec<Peer>,
    },
    /// An active-view peer was lost (failure, disconnect, or eviction).
    NeighbourDown {
        /// The neighbour that went down.
        peer: Peer,
        /// All out-connected active-view peers at emission time.
        view: Vec<Peer>,
    },
}

/// Delegate trait for receiving membership notifications.
///
/// Callbacks are invoked synchronously from the engine's event handlers and
/// must return quickly; queue any heavy work elsewhere. The `view` slice is
/// a snapshot taken at emission time and never aliases engine state.
#[auto_impl::auto_impl(Box, Arc)]
pub trait MembershipDelegate: Send + Sync + 'static {
    /// Called when a neighbour's outbound stream becomes usable.
    fn on_neighbour_up(&self, _peer: &Peer, _view: &[Peer]) {}

    /// Called when a neighbour is removed from the active view.
    fn on_neighbour_down(&self, _peer: &Peer, _view: &[Peer]) {}
}

/// No-op delegate for when no handler is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl MembershipDelegate for NoopDelegate {}
