use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// Logical time, counted in protocol ticks.
pub type Tick = u64;

/// Heartbeat value marking an entry as suspected failed.
///
/// Any negative heartbeat is treated as suspect; this is the one we write.
pub const SUSPECT_HEARTBEAT: i64 = -1;

/// Identity of a node: the host and port it listens on.
///
/// Serialized as `"host:port"` in configuration files and the HTTP API.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl NodeId {
    pub const fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    /// Shorthand for test and simulation ids on the loopback interface.
    pub const fn localhost(port: u16) -> Self {
        Self::new(Ipv4Addr::LOCALHOST, port)
    }

    /// `0.0.0.0` or port 0 cannot be dialed back, so they never name a member.
    pub fn is_routable(&self) -> bool {
        !self.host.is_unspecified() && self.port != 0
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddrV4> for NodeId {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl TryFrom<SocketAddr> for NodeId {
    type Error = String;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => Err(format!("IPv6 address {} is not supported", v6)),
        }
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s
            .parse()
            .map_err(|e| format!("invalid node address '{}': {}", s, e))?;
        Ok(addr.into())
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// One row of a node's membership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipEntry {
    pub id: NodeId,
    pub heartbeat: i64,
    /// Local tick at which this entry last changed. Never sent on the wire.
    pub last_updated: Tick,
}

impl MembershipEntry {
    pub fn new(id: NodeId, heartbeat: i64, last_updated: Tick) -> Self {
        Self {
            id,
            heartbeat,
            last_updated,
        }
    }

    pub fn is_suspect(&self) -> bool {
        self.heartbeat < 0
    }

    pub fn wire(&self) -> WireEntry {
        WireEntry {
            id: self.id,
            heartbeat: self.heartbeat,
        }
    }
}

/// The part of an entry that travels between nodes.
///
/// The receiver stamps its own clock, so staleness is always judged locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntry {
    pub id: NodeId,
    pub heartbeat: i64,
}

impl WireEntry {
    pub fn new(id: NodeId, heartbeat: i64) -> Self {
        Self { id, heartbeat }
    }
}

/// Where a node is in the join handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JoinState {
    Uninitialized,
    /// Join request sent, waiting for the introducer (or any gossip) to reach us.
    Joining,
    /// Part of the group: gossips and runs failure detection.
    Member,
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinState::Uninitialized => write!(f, "UNINITIALIZED"),
            JoinState::Joining => write!(f, "JOINING"),
            JoinState::Member => write!(f, "MEMBER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    JoinRequest = 1,
    JoinReply = 2,
    Gossip = 3,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::JoinRequest),
            2 => Some(MessageKind::JoinReply),
            3 => Some(MessageKind::Gossip),
            _ => None,
        }
    }
}

/// The wire protocol between membership nodes.
///
/// - `JoinRequest`: new node -> introducer, carries only the joiner's own entry.
/// - `JoinReply`: introducer -> new node, carries the introducer's table.
/// - `Gossip`: periodic fan-out of the sender's table to random peers.
///
/// Every variant owns a value copy of the sender's table at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipMessage {
    JoinRequest {
        sender: NodeId,
        members: Vec<WireEntry>,
    },

    JoinReply {
        sender: NodeId,
        members: Vec<WireEntry>,
    },

    Gossip {
        sender: NodeId,
        members: Vec<WireEntry>,
    },
}

impl GossipMessage {
    pub fn new(kind: MessageKind, sender: NodeId, members: Vec<WireEntry>) -> Self {
        match kind {
            MessageKind::JoinRequest => GossipMessage::JoinRequest { sender, members },
            MessageKind::JoinReply => GossipMessage::JoinReply { sender, members },
            MessageKind::Gossip => GossipMessage::Gossip { sender, members },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            GossipMessage::JoinRequest { .. } => MessageKind::JoinRequest,
            GossipMessage::JoinReply { .. } => MessageKind::JoinReply,
            GossipMessage::Gossip { .. } => MessageKind::Gossip,
        }
    }

    pub fn sender(&self) -> NodeId {
        match self {
            GossipMessage::JoinRequest { sender, .. }
            | GossipMessage::JoinReply { sender, .. }
            | GossipMessage::Gossip { sender, .. } => *sender,
        }
    }

    pub fn members(&self) -> &[WireEntry] {
        match self {
            GossipMessage::JoinRequest { members, .. }
            | GossipMessage::JoinReply { members, .. }
            | GossipMessage::Gossip { members, .. } => members,
        }
    }
}
