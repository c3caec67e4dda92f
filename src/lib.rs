//! # hyparview
//!
//! HyParView membership protocol for unstructured peer-to-peer overlays.
//!
//! Every node maintains two partial views of the overlay: a small,
//! symmetric **active view** of neighbours used as the actual
//! message-delivery substrate, and a larger **passive view** of known peers
//! kept in reserve to repair the overlay when neighbours fail. The union of
//! all active views forms a connected, low-diameter random graph with
//! bounded degree, continuously refreshed under churn.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Application                               │
//! │                  (MembershipDelegate)                            │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ on_neighbour_up / on_neighbour_down
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │                        Hyparview                                 │
//! │  (join / forward-join walk, neighbour promotion, shuffle,        │
//! │   failure recovery, maintenance)                                 │
//! ├──────────────┬──────────────┬──────────────┬────────────────────┤
//! │  View (A)    │   View (P)   │   Messages   │      Timers        │
//! │ active view  │ passive view │ (tag codec)  │ shuffle/promote/.. │
//! └──────────────┴──────────────┴──────┬───────┴────────────────────┘
//!                                      │ send / dial / disconnect
//! ┌────────────────────────────────────▼────────────────────────────┐
//! │                        Transport                                 │
//! │  (streams, side streams, dials, timer service; external)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is a synchronous state machine: the external transport owns
//! the event loop and delivers one event at a time (message, timer,
//! connection callback). Handlers run to completion, mutate the views, and
//! queue side effects through the [`Transport`] trait without ever
//! blocking.
//!
//! ## Example
//!
//! ```
//! use hyparview::{Hyparview, HyparviewConfig, NoopDelegate, NoopTransport, Peer};
//!
//! let self_peer = Peer::localhost(9000, 9090);
//! let bootstrap = Peer::localhost(9001, 9091);
//! let config = HyparviewConfig::new(self_peer).with_bootstrap_peers([bootstrap]);
//!
//! let mut node = Hyparview::new(config, NoopTransport, NoopDelegate).unwrap();
//! node.start().unwrap();
//! // feed transport callbacks, messages and timers into `node` from the
//! // event loop: node.handle_message(..), node.handle_timer(..), ...
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod config;
mod error;
mod message;
mod notification;
mod peer;
mod protocol;
pub mod testing;
mod transport;
mod view;

// Re-export config types
pub use config::HyparviewConfig;

// Re-export error types
pub use error::{Error, Result};

// Re-export message types
pub use message::{HyparviewMessage, MessageTag, PeerList, MAX_SHUFFLE_PEERS};

// Re-export notification types
pub use notification::{MembershipDelegate, MembershipEvent, NoopDelegate};

// Re-export peer types
pub use peer::{Peer, PeerState};

// Re-export the core engine
pub use protocol::{Hyparview, PROTOCOL_ID};

// Re-export transport types
pub use transport::{ChannelTransport, NoopTransport, Timer, Transport, TransportCommand};

// Re-export view type
pub use view::View;
