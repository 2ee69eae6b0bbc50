//! Query options
//!
//! Three mutually exclusive modes plus the default list-all, evaluated in
//! priority order by [`Registry::query`](crate::Registry::query): `Me`
//! first, then `Id`, then `Name`/`All`.

/// Tag value for peers sourced from the DHT provider search
pub const REGISTER_TYPE_DHT: &str = "dht";
/// Tag value for peers sourced from the live connection table
pub const REGISTER_TYPE_CONNECTED: &str = "connected";

/// What to query for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOpts {
    /// This node's own synthesized registration; never touches the DHT
    Me,
    /// Resolve one specific peer by identity
    Id(String),
    /// List all known peers whose display name matches
    Name(String),
    /// List all known peers
    All,
}

impl QueryOpts {
    /// Query by identity
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        QueryOpts::Id(id.into())
    }

    /// Query by display name
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        QueryOpts::Name(name.into())
    }
}
