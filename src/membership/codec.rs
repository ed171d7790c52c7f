//! Membership Wire Codec
//!
//! Explicit, host-independent encoding of `GossipMessage`. All integers are
//! written in network byte order.
//!
//! ```text
//! header (11 bytes)
//!   u8      kind         1 = JoinRequest, 2 = JoinReply, 3 = Gossip
//!   [u8; 4] sender host
//!   u16     sender port
//!   u32     entry count
//! entry (14 bytes, repeated `count` times)
//!   [u8; 4] host
//!   u16     port
//!   i64     heartbeat
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

use super::types::{GossipMessage, MessageKind, NodeId, WireEntry};
use crate::error::{DecodeError, EncodeError};

pub const HEADER_LEN: usize = 1 + NODE_ID_LEN + 4;
pub const ENTRY_LEN: usize = NODE_ID_LEN + 8;

/// Upper bound on entries per message, checked before allocating on decode.
pub const MAX_WIRE_ENTRIES: usize = 4096;

const NODE_ID_LEN: usize = 4 + 2;

/// Size in bytes of a message carrying `entries` members.
pub fn encoded_len(entries: usize) -> usize {
    HEADER_LEN + entries * ENTRY_LEN
}

pub fn encode(msg: &GossipMessage) -> Result<Bytes, EncodeError> {
    let members = msg.members();
    if members.len() > MAX_WIRE_ENTRIES {
        return Err(EncodeError::TooManyEntries(members.len()));
    }

    let mut buf = BytesMut::with_capacity(encoded_len(members.len()));
    buf.put_u8(msg.kind().tag());
    put_node_id(&mut buf, msg.sender());
    buf.put_u32(members.len() as u32);

    for entry in members {
        put_node_id(&mut buf, entry.id);
        buf.put_i64(entry.heartbeat);
    }

    Ok(buf.freeze())
}

pub fn decode(mut data: &[u8]) -> Result<GossipMessage, DecodeError> {
    ensure(data, HEADER_LEN)?;

    let tag = data.get_u8();
    let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;
    let sender = get_node_id(&mut data);
    let count = data.get_u32() as usize;

    if count > MAX_WIRE_ENTRIES {
        return Err(DecodeError::TooManyEntries(count));
    }
    ensure(data, count * ENTRY_LEN)?;

    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let id = get_node_id(&mut data);
        let heartbeat = data.get_i64();
        members.push(WireEntry::new(id, heartbeat));
    }

    if data.has_remaining() {
        return Err(DecodeError::TrailingBytes(data.remaining()));
    }

    Ok(GossipMessage::new(kind, sender, members))
}

fn ensure(data: &[u8], needed: usize) -> Result<(), DecodeError> {
    if data.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: data.remaining(),
        });
    }
    Ok(())
}

fn put_node_id(buf: &mut BytesMut, id: NodeId) {
    buf.put_slice(&id.host.octets());
    buf.put_u16(id.port);
}

// Callers check the length first; `Buf` getters panic on underflow.
fn get_node_id(data: &mut &[u8]) -> NodeId {
    let mut octets = [0u8; 4];
    data.copy_to_slice(&mut octets);
    let port = data.get_u16();
    NodeId::new(Ipv4Addr::from(octets), port)
}
