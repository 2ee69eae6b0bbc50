//! # Roster Core
//!
//! Shared types for the Roster registry and discovery subsystem.
//!
//! This crate provides:
//! - Peer identities (Ed25519-derived, hex text codec)
//! - The public registration record and the internal DHT payload
//! - Signed record envelopes for DHT publication
//! - Namespace validation for records written into the shared DHT
//! - Content identifiers for provider announcements (BLAKE3)
//! - The substrate seams (`Host`, `Dht`) the registry is built against
//!
//! The transport substrate itself (encrypted connections, DHT RPC,
//! multicast discovery) is an external collaborator; this crate only
//! defines the traits it is consumed through, so that the registry can
//! be exercised against fakes in tests.

#![warn(clippy::all)]

pub mod config;
pub mod envelope;
pub mod identity;
pub mod namespace;
pub mod substrate;
pub mod types;

// Re-export commonly used types
pub use config::{RegistryConfig, RelayConfig, RunMode};
pub use envelope::{EnvelopeError, SignedEnvelope};
pub use identity::{Identity, IdentityError, PeerId};
pub use namespace::{member_cid, peers_cid, record_key, Cid, NamespaceValidator, ValidateError};
pub use substrate::{ConnEvent, Dht, Host, SubstrateError};
pub use types::{NodeAddr, PeerRecord, RegisterKind, Registration};
