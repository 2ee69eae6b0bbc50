//! # Roster Local Discovery
//!
//! Discovers peers advertising on the local network segment and keeps a
//! liveness-refreshed view of them. The multicast transport primitive is
//! an external collaborator behind the [`Beacon`] trait; this crate owns
//! the two-stage found/refreshed lifecycle and the refresh cadence.
//!
//! Discovered peers flow out through registered watch callbacks; connect
//! failures are non-fatal and only drop the entry until it is seen again.

#![warn(clippy::all)]

pub mod beacon;
pub mod service;

pub use beacon::{AdvertisedNode, Beacon};
pub use service::{DiscoveryError, DiscoveryOptions, LocalDiscovery};
