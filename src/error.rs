//! Error types for the HyParView protocol.

use std::fmt;

/// Result type alias for HyParView operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the membership state machine.
///
/// Only protocol-invariant violations and configuration mistakes surface as
/// errors; transient transport failures (failed dials, dropped connections,
/// undeliverable messages) are absorbed by the recovery logic and never
/// reach the caller.
#[derive(Debug)]
pub enum Error {
    /// A protocol invariant was violated. The overlay state can no longer be
    /// trusted and the driver should abort rather than continue.
    Protocol(String),

    /// The bootstrap peer list was empty when a join was required.
    NoBootstrapPeers,

    /// Configuration error.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(msg) => {
                write!(f, "protocol invariant violated: {}", msg)
            }
            Error::NoBootstrapPeers => {
                write!(f, "no bootstrap peers to join the overlay")
            }
            Error::Config(msg) => {
                write!(f, "configuration error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}
