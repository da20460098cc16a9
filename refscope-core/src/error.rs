//! # Lookup Errors
//!
//! Errors raised when a name the user typed does not match anything. Each one carries the
//! alternatives that do exist so the message tells the user what to type instead.
//!
//! Transport and protocol errors live next to the layer that produces them
//! ([`crate::session`], [`crate::resolver`], [`crate::reflection::client`]).

/// A chain id has no entry in the chain registry.
///
/// The available chains are sorted on construction, so the message does not depend on the
/// iteration order of the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no chain {requested:?} found (available chains: {})", .available_chains.join(", "))]
pub struct ChainNotFoundError {
    pub requested: String,
    pub available_chains: Vec<String>,
}

impl ChainNotFoundError {
    pub fn new<I, S>(requested: impl Into<String>, available_chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut available_chains: Vec<String> =
            available_chains.into_iter().map(Into::into).collect();
        available_chains.sort();

        Self {
            requested: requested.into(),
            available_chains,
        }
    }
}

/// The server does not know the requested service.
///
/// `available_services` is the listing fetched right after the failed lookup, in server order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no service {requested:?} found (available services: {})", .available_services.join(", "))]
pub struct ServiceNotFoundError {
    pub requested: String,
    pub available_services: Vec<String>,
}

/// The service exists but has no method with the requested name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "no method {requested:?} found on service {service:?} (available methods: {})",
    .available_methods.join(", ")
)]
pub struct MethodNotFoundError {
    pub service: String,
    pub requested: String,
    pub available_methods: Vec<String>,
}

/// A qualified method name without any namespace separator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid method {0:?}: expected format namespace[.namespace...].method")]
pub struct InvalidMethodError(pub String);
