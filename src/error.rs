//! Error Types
//!
//! Every failure in the membership layer is absorbed inside a tick, except for
//! `BootstrapError`, which is the only condition allowed to abort node startup.

use thiserror::Error;

use crate::membership::types::NodeId;

/// A payload that could not be turned into a `GossipMessage`.
///
/// The receiving node drops the message and keeps ticking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown message kind tag {0:#04x}")]
    UnknownKind(u8),

    #[error("truncated message: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{0} trailing bytes after last entry")]
    TrailingBytes(usize),

    #[error("entry count {0} exceeds wire limit")]
    TooManyEntries(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("table of {0} entries exceeds wire limit")]
    TooManyEntries(usize),
}

/// Failure to hand a payload to the network.
///
/// Gossip is fire-and-forget, so callers log and drop these.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("destination {0} is unreachable")]
    Unreachable(NodeId),

    #[error("transport is closed")]
    Closed,

    #[error("payload of {0} bytes exceeds datagram limit")]
    PayloadTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Node construction failed; the process should not start.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("{0} cannot be used as a local node identity")]
    InvalidLocalAddress(NodeId),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
