//! Registry error types
//!
//! Configuration errors are fatal at `init` and propagate to the caller.
//! Transient network errors never leave the background loops; they are
//! logged and retried on the next tick. Data errors (malformed records,
//! bad identities) surface from the specific call that hit them.

use roster_core::{EnvelopeError, IdentityError, SubstrateError};
use std::borrow::Cow;
use thiserror::Error;

/// Errors produced by the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing or invalid configuration; fatal at `init`
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// A registration is missing required fields
    #[error("invalid registration: {0}")]
    InvalidRegistration(Cow<'static, str>),

    /// The transport/DHT substrate failed
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// The persistence collaborator failed
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// Identity handling failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A DHT record could not be decoded or verified
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Local discovery failed to start
    #[error("discovery error: {0}")]
    Discovery(String),

    /// `watch` subscriptions are not supported
    #[error("watch is not supported")]
    WatchNotSupported,
}

impl RegistryError {
    /// Whether this failure may succeed on a later attempt
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Substrate(e) => e.is_transient(),
            RegistryError::InvalidConfig(_)
            | RegistryError::InvalidRegistration(_)
            | RegistryError::Identity(_)
            | RegistryError::Envelope(_)
            | RegistryError::WatchNotSupported => false,
            RegistryError::Store(_) | RegistryError::Discovery(_) => true,
        }
    }

    /// Create a configuration error with static context
    #[must_use]
    pub const fn config(context: &'static str) -> Self {
        RegistryError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create a registration validation error with static context
    #[must_use]
    pub const fn registration(context: &'static str) -> Self {
        RegistryError::InvalidRegistration(Cow::Borrowed(context))
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_permanent() {
        assert!(!RegistryError::config("no key").is_transient());
        assert!(!RegistryError::registration("empty id").is_transient());
        assert!(!RegistryError::WatchNotSupported.is_transient());
    }

    #[test]
    fn test_substrate_transience_forwarded() {
        let transient = RegistryError::Substrate(SubstrateError::Timeout("put".into()));
        assert!(transient.is_transient());
        let permanent = RegistryError::Substrate(SubstrateError::Protocol("bad".into()));
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_display() {
        let err = RegistryError::config("identity key file not configured");
        assert!(err.to_string().contains("identity key file"));
        assert_eq!(
            RegistryError::WatchNotSupported.to_string(),
            "watch is not supported"
        );
    }
}
