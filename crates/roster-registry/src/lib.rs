//! # Roster Registry
//!
//! The registry core: owns registration state, the periodic re-publish
//! loop, DHT-backed query, bootstrap coordination, and persistence side
//! effects. Satellite coordinators (local discovery, NAT traversal) and
//! the transport substrate are injected at construction; there is no
//! global instance.
//!
//! ## Background loops
//!
//! A running registry drives up to four independent loops: registration
//! refresh (one per registered identity), bootstrap refresh, the
//! local-discovery refresh cycle, and the NAT health check. None of them
//! block each other and none of their failures escalate beyond a log
//! line; the subsystem degrades to fewer known peers rather than halting
//! the node.

#![warn(clippy::all)]

pub mod bootstrap;
pub mod error;
pub mod notifier;
pub mod query;
pub mod registry;
pub mod store;

pub use error::{RegistryError, Result};
pub use notifier::ConnectionNotifier;
pub use query::{QueryOpts, REGISTER_TYPE_CONNECTED, REGISTER_TYPE_DHT};
pub use registry::{Registry, RegistryDeps};
pub use store::{ConnEventRow, RecordStore, RegisterRecord, SqliteStore, StoreError};
