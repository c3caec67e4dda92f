//! HyParView protocol message types.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use crate::peer::Peer;

/// Maximum number of peers accepted in a single shuffle peer list.
///
/// A well-formed shuffle carries `Ka + Kp` peers; anything near this bound
/// is garbage and rejected at decode time.
pub const MAX_SHUFFLE_PEERS: usize = 64;

/// Inline-allocated peer list carried by shuffle traffic.
pub type PeerList = SmallVec<[Peer; 8]>;

/// Protocol messages exchanged between overlay members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HyparviewMessage {
    /// Bootstrap request, sent on a side stream to a bootstrap peer.
    ///
    /// The receiver admits the sender into its active view and starts the
    /// forward-join random walk on its behalf.
    Join,

    /// Random-walk hop introducing a freshly joined node to the overlay.
    ForwardJoin {
        /// Remaining hop budget; decremented at every forward.
        ttl: u32,
        /// The node that originally joined.
        original_sender: Peer,
    },

    /// Confirmation that the sender admitted the receiver into its active
    /// view, completing the join handshake.
    ForwardJoinReply,

    /// Request to become a neighbour of the receiver.
    Neighbour {
        /// When set, the receiver must admit the sender even if it has to
        /// evict a random neighbour. Asserted by near-isolated nodes.
        high_prio: bool,
    },

    /// Answer to a [`HyparviewMessage::Neighbour`] request.
    NeighbourReply {
        /// Whether the sender admitted the requester.
        accepted: bool,
    },

    /// Passive-view exchange walking randomly through the overlay.
    Shuffle {
        /// Correlates the eventual reply with the request.
        id: u32,
        /// Remaining hop budget for the walk.
        ttl: u32,
        /// Sample of the initiator's views plus the initiator itself.
        peers: PeerList,
    },

    /// Terminal answer to a shuffle, carrying the receiver's own sample.
    ShuffleReply {
        /// Id of the shuffle being answered.
        id: u32,
        /// Sample drawn from the receiver's passive view.
        peers: PeerList,
    },

    /// Notice that the sender removed the receiver from its active view.
    Disconnect,

    /// Periodic neighbour liveness/symmetry probe.
    NeighbourMaintenance,
}

/// Message type tags for encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    /// Join message tag.
    Join = 1,
    /// ForwardJoin message tag.
    ForwardJoin = 2,
    /// ForwardJoinReply message tag.
    ForwardJoinReply = 3,
    /// Neighbour message tag.
    Neighbour = 4,
    /// NeighbourReply message tag.
    NeighbourReply = 5,
    /// Shuffle message tag.
    Shuffle = 6,
    /// ShuffleReply message tag.
    ShuffleReply = 7,
    /// Disconnect message tag.
    Disconnect = 8,
    /// NeighbourMaintenance message tag.
    NeighbourMaintenance = 9,
}

impl TryFrom<u8> for MessageTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageTag::Join),
            2 => Ok(MessageTag::ForwardJoin),
            3 => Ok(MessageTag::ForwardJoinReply),
            4 => Ok(MessageTag::Neighbour),
            5 => Ok(MessageTag::NeighbourReply),
            6 => Ok(MessageTag::Shuffle),
            7 => Ok(MessageTag::ShuffleReply),
            8 => Ok(MessageTag::Disconnect),
            9 => Ok(MessageTag::NeighbourMaintenance),
            _ => Err(value),
        }
    }
}

fn encode_peer_list(peers: &[Peer], buf: &mut impl BufMut) {
    buf.put_u16(peers.len() as u16);
    for peer in peers {
        peer.encode(buf);
    }
}

fn decode_peer_list(buf: &mut impl Buf) -> Option<PeerList> {
    if buf.remaining() < 2 {
        return None;
    }
    let count = buf.get_u16() as usize;
    if count > MAX_SHUFFLE_PEERS {
        return None;
    }
    let mut peers = PeerList::with_capacity(count);
    for _ in 0..count {
        peers.push(Peer::decode(buf)?);
    }
    Some(peers)
}

impl HyparviewMessage {
    /// Encode the message into a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        match self {
            HyparviewMessage::Join => {
                buf.put_u8(MessageTag::Join as u8);
            }
            HyparviewMessage::ForwardJoin {
                ttl,
                original_sender,
            } => {
                buf.put_u8(MessageTag::ForwardJoin as u8);
                buf.put_u32(*ttl);
                original_sender.encode(buf);
            }
            HyparviewMessage::ForwardJoinReply => {
                buf.put_u8(MessageTag::ForwardJoinReply as u8);
            }
            HyparviewMessage::Neighbour { high_prio } => {
                buf.put_u8(MessageTag::Neighbour as u8);
                buf.put_u8(u8::from(*high_prio));
            }
            HyparviewMessage::NeighbourReply { accepted } => {
                buf.put_u8(MessageTag::NeighbourReply as u8);
                buf.put_u8(u8::from(*accepted));
            }
            HyparviewMessage::Shuffle { id, ttl, peers } => {
                buf.put_u8(MessageTag::Shuffle as u8);
                buf.put_u32(*id);
                buf.put_u32(*ttl);
                encode_peer_list(peers, buf);
            }
            HyparviewMessage::ShuffleReply { id, peers } => {
                buf.put_u8(MessageTag::ShuffleReply as u8);
                buf.put_u32(*id);
                encode_peer_list(peers, buf);
            }
            HyparviewMessage::Disconnect => {
                buf.put_u8(MessageTag::Disconnect as u8);
            }
            HyparviewMessage::NeighbourMaintenance => {
                buf.put_u8(MessageTag::NeighbourMaintenance as u8);
            }
        }
    }

    /// Encode the message into a new `Bytes` buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Calculate the encoded length of the message.
    pub fn encoded_len(&self) -> usize {
        match self {
            HyparviewMessage::Join
            | HyparviewMessage::ForwardJoinReply
            | HyparviewMessage::Disconnect
            | HyparviewMessage::NeighbourMaintenance => 1,
            HyparviewMessage::ForwardJoin {
                original_sender, ..
            } => 1 + 4 + original_sender.encoded_len(),
            HyparviewMessage::Neighbour { .. } | HyparviewMessage::NeighbourReply { .. } => 1 + 1,
            HyparviewMessage::Shuffle { peers, .. } => {
                1 + 4 + 4 + 2 + peers.iter().map(Peer::encoded_len).sum::<usize>()
            }
            HyparviewMessage::ShuffleReply { peers, .. } => {
                1 + 4 + 2 + peers.iter().map(Peer::encoded_len).sum::<usize>()
            }
        }
    }

    /// Decode a message from a buffer.
    ///
    /// Returns `None` on a truncated buffer, unknown tag, or oversized peer
    /// list.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < 1 {
            return None;
        }

        let tag = MessageTag::try_from(buf.get_u8()).ok()?;

        match tag {
            MessageTag::Join => Some(HyparviewMessage::Join),
            MessageTag::ForwardJoin => {
                if buf.remaining() < 4 {
                    return None;
                }
                let ttl = buf.get_u32();
                let original_sender = Peer::decode(buf)?;
                Some(HyparviewMessage::ForwardJoin {
                    ttl,
                    original_sender,
                })
            }
            MessageTag::ForwardJoinReply => Some(HyparviewMessage::ForwardJoinReply),
            MessageTag::Neighbour => {
                if buf.remaining() < 1 {
                    return None;
                }
                Some(HyparviewMessage::Neighbour {
                    high_prio: buf.get_u8() != 0,
                })
            }
            MessageTag::NeighbourReply => {
                if buf.remaining() < 1 {
                    return None;
                }
                Some(HyparviewMessage::NeighbourReply {
                    accepted: buf.get_u8() != 0,
                })
            }
            MessageTag::Shuffle => {
                if buf.remaining() < 8 {
                    return None;
                }
                let id = buf.get_u32();
                let ttl = buf.get_u32();
                let peers = decode_peer_list(buf)?;
                Some(HyparviewMessage::Shuffle { id, ttl, peers })
            }
            MessageTag::ShuffleReply => {
                if buf.remaining() < 4 {
                    return None;
                }
                let id = buf.get_u32();
                let peers = decode_peer_list(buf)?;
                Some(HyparviewMessage::ShuffleReply { id, peers })
            }
            MessageTag::Disconnect => Some(HyparviewMessage::Disconnect),
            MessageTag::NeighbourMaintenance => Some(HyparviewMessage::NeighbourMaintenance),
        }
    }

    /// Decode a message from a byte slice.
    pub fn decode_from_slice(data: &[u8]) -> Option<Self> {
        let mut cursor = std::io::Cursor::new(data);
        Self::decode(&mut cursor)
    }

    /// Check if this is a Neighbour request.
    pub const fn is_neighbour(&self) -> bool {
        matches!(self, HyparviewMessage::Neighbour { .. })
    }

    /// Get the message tag.
    pub const fn tag(&self) -> MessageTag {
        match self {
            HyparviewMessage::Join => MessageTag::Join,
            HyparviewMessage::ForwardJoin { .. } => MessageTag::ForwardJoin,
            HyparviewMessage::ForwardJoinReply => MessageTag::ForwardJoinReply,
            HyparviewMessage::Neighbour { .. } => MessageTag::Neighbour,
            HyparviewMessage::NeighbourReply { .. } => MessageTag::NeighbourReply,
            HyparviewMessage::Shuffle { .. } => MessageTag::Shuffle,
            HyparviewMessage::ShuffleReply { .. } => MessageTag::ShuffleReply,
            HyparviewMessage::Disconnect => MessageTag::Disconnect,
            HyparviewMessage::NeighbourMaintenance => MessageTag::NeighbourMaintenance,
        }
    }
}
