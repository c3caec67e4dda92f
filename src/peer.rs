//! Peer identity and per-neighbour connection state.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{
    fmt::{self, Display},
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

/// Stable identity of a node in the overlay.
///
/// A peer is identified by its network address plus two ports: the listen
/// port used for protocol traffic and an auxiliary analytics port carried
/// along for external tooling. Two peers are equal iff all three components
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peer {
    host: IpAddr,
    port: u16,
    analytics_port: u16,
}

impl Peer {
    /// Create a new peer identity.
    pub const fn new(host: IpAddr, port: u16, analytics_port: u16) -> Self {
        Self {
            host,
            port,
            analytics_port,
        }
    }

    /// Create a peer on the IPv4 loopback address.
    ///
    /// Convenience constructor for tests and local clusters.
    pub const fn localhost(port: u16, analytics_port: u16) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            analytics_port,
        }
    }

    /// The peer's network address.
    #[inline]
    pub const fn host(&self) -> IpAddr {
        self.host
    }

    /// The peer's protocol listen port.
    #[inline]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The peer's auxiliary analytics port.
    #[inline]
    pub const fn analytics_port(&self) -> u16 {
        self.analytics_port
    }

    /// The socket address protocol traffic is sent to.
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        let addr_len = match self.host {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 16,
        };
        1 + addr_len + 2 + 2
    }

    /// Encode the peer into a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        match self.host {
            IpAddr::V4(v4) => {
                buf.put_u8(4);
                buf.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                buf.put_u8(6);
                buf.put_slice(&v6.octets());
            }
        }
        buf.put_u16(self.port);
        buf.put_u16(self.analytics_port);
    }

    /// Encode the peer into a new `Bytes` buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a peer from a buffer.
    ///
    /// Returns `None` if the buffer is truncated or the address family tag
    /// is unknown.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < 1 {
            return None;
        }

        let host = match buf.get_u8() {
            4 => {
                if buf.remaining() < 4 {
                    return None;
                }
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                IpAddr::from(octets)
            }
            6 => {
                if buf.remaining() < 16 {
                    return None;
                }
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                IpAddr::from(octets)
            }
            _ => return None,
        };

        if buf.remaining() < 4 {
            return None;
        }

        Some(Self {
            host,
            port: buf.get_u16(),
            analytics_port: buf.get_u16(),
        })
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A peer tracked in a view, together with the state of the outbound stream
/// towards it.
///
/// `out_connected` is true iff this node holds an established outbound
/// stream to the peer suitable for subsequent sends. A peer in the active
/// view may transiently be unconnected while a dial is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerState {
    peer: Peer,
    out_connected: bool,
}

impl PeerState {
    /// Create a record for a peer with no established outbound stream.
    pub const fn new(peer: Peer) -> Self {
        Self {
            peer,
            out_connected: false,
        }
    }

    /// The peer identity.
    #[inline]
    pub const fn peer(&self) -> Peer {
        self.peer
    }

    /// Whether an outbound stream to the peer is established.
    #[inline]
    pub const fn is_out_connected(&self) -> bool {
        self.out_connected
    }

    /// Record the outbound stream state.
    pub fn set_out_connected(&mut self, connected: bool) {
        self.out_connected = connected;
    }
}

impl Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.peer,
            if self.out_connected { "" } else { " (dialing)" }
        )
    }
}
