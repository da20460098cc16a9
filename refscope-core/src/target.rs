//! # Target Resolution
//!
//! Every inspection command needs exactly one server address. The user names it either directly
//! (`--address`) or through a chain id looked up in a [`ChainRegistry`].
//!
//! Resolution never touches the network, so usage mistakes are reported before any dial.
use crate::error::ChainNotFoundError;
use std::collections::{BTreeMap, HashMap};

/// Whether the connection uses TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Plaintext HTTP/2.
    Insecure,
    /// TLS with the platform's native root certificates.
    #[default]
    Secure,
}

impl TransportSecurity {
    pub fn from_insecure_flag(insecure: bool) -> Self {
        if insecure { Self::Insecure } else { Self::Secure }
    }

    pub(crate) fn scheme(self) -> &'static str {
        match self {
            Self::Insecure => "http",
            Self::Secure => "https",
        }
    }
}

/// A single resolved server to inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub security: TransportSecurity,
}

/// Lookup of chain ids to gRPC addresses.
///
/// The registry is an unordered mapping; callers that display ids sort them.
pub trait ChainRegistry {
    /// The configured gRPC address of `chain_id`, or `None` if the chain is unknown.
    ///
    /// A known chain may still have an empty address.
    fn grpc_address(&self, chain_id: &str) -> Option<String>;

    /// Every known chain id, in no particular order.
    fn chain_ids(&self) -> Vec<String>;
}

impl ChainRegistry for BTreeMap<String, String> {
    fn grpc_address(&self, chain_id: &str) -> Option<String> {
        self.get(chain_id).cloned()
    }

    fn chain_ids(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl ChainRegistry for HashMap<String, String> {
    fn grpc_address(&self, chain_id: &str) -> Option<String> {
        self.get(chain_id).cloned()
    }

    fn chain_ids(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("must provide exactly one of CHAIN_ID or --address flag")]
    Ambiguous,
    #[error(transparent)]
    ChainNotFound(#[from] ChainNotFoundError),
    #[error("no gRPC address set for chain {chain:?}")]
    MissingAddress { chain: String },
}

/// Resolves the user's chain id or explicit address into a [`Target`].
///
/// Exactly one of `chain_id` and `address` must be present; empty strings count as absent.
///
/// # Returns
///
/// * `Ok(Target)` - The address to dial, with the caller's transport security.
/// * `Err(TargetError::Ambiguous)` - Both or neither were given. The registry is not consulted.
/// * `Err(TargetError::ChainNotFound)` - The chain id is not in the registry.
/// * `Err(TargetError::MissingAddress)` - The chain exists but has no gRPC address.
pub fn resolve_target<R>(
    chain_id: Option<&str>,
    address: Option<&str>,
    security: TransportSecurity,
    registry: &R,
) -> Result<Target, TargetError>
where
    R: ChainRegistry + ?Sized,
{
    let chain_id = chain_id.filter(|id| !id.is_empty());
    let address = address.filter(|addr| !addr.is_empty());

    let address = match (chain_id, address) {
        (Some(_), Some(_)) | (None, None) => return Err(TargetError::Ambiguous),
        (None, Some(address)) => address.to_string(),
        (Some(chain), None) => {
            let address = registry
                .grpc_address(chain)
                .ok_or_else(|| ChainNotFoundError::new(chain, registry.chain_ids()))?;

            if address.is_empty() {
                return Err(TargetError::MissingAddress {
                    chain: chain.to_string(),
                });
            }

            tracing::debug!(chain, %address, "Resolved chain address");
            address
        }
    };

    Ok(Target { address, security })
}
