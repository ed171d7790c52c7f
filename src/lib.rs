//! Gossip Membership Library
//!
//! A group membership service for a set of cooperating nodes. Every node keeps
//! a table of the peers it believes are alive, spreads it by gossip and evicts
//! peers whose heartbeat stops advancing.
//!
//! ## Architecture Modules
//! - **`membership`**: The protocol itself. Join handshake, membership table and merge
//!   rules, two-stage failure detector, gossip peer selection and the binary wire codec.
//! - **`transport`**: Datagram delivery behind the `Transport` trait. `UdpTransport` for real
//!   deployments, `MemoryNetwork` for in-process clusters with message loss and crashes.
//! - **`runtime`**: Drives a node on a fixed tick period inside tokio and publishes its view.
//! - **`simulation`**: Deterministic multi-node harness on a shared logical clock.
//! - **`api`**: Read-only HTTP status endpoints (`/members`, `/health`).
//! - **`config`**: TOML configuration with defaults and validation.
//! - **`error`**: Error types shared across modules.

pub mod api;
pub mod config;
pub mod error;
pub mod membership;
pub mod runtime;
pub mod simulation;
pub mod transport;
