//! Top-level error type unifying module errors at the bootstrap and supervisor boundaries.

use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::rpc::RpcError;
use crate::store::StoreError;

/// Fatal error raised at process bootstrap: missing key, missing chain config,
/// unreachable store. Surfaced as a non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("chain {chain} has no start block: no configured start_block, no stored transaction, and no router creation hash")]
    NoStartBlock { chain: String },
    #[error("duplicate blockchain_id {0} across configured chains")]
    DuplicateBlockchainId(u32),
}
