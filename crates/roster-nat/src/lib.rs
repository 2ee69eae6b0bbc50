//! # Roster NAT Traversal
//!
//! Keeps this node reachable from behind NAT: allocates a relay transport
//! address and learns the externally-mapped address via binding requests,
//! refreshing both on a fixed cadence. The relay/STUN wire protocol is an
//! external collaborator behind the [`RelayTransport`] trait.
//!
//! Failures never escalate; a persistently failing relay server simply
//! retries on every tick at the fixed interval.

#![warn(clippy::all)]

pub mod client;

pub use client::{NatClient, NatError, NatSnapshot, RelayTransport};
