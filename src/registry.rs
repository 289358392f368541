//! Contract Registry: the static, per-process catalogue of routing contracts,
//! loaded once from the durable store at startup.

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256, U256};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use crate::rpc::RpcPool;

/// One routing contract deployment: exactly one per `blockchain_id`.
#[derive(Debug, Clone)]
pub struct RoutingContract {
    pub chain_name: String,
    pub blockchain_id: u32,
    /// `0x`-hex for EVM, base58 for Solana.
    pub address: String,
    pub is_solana: bool,
    pub abi: JsonAbi,
    pub creation_tx_hash: Option<String>,
    /// Operator-supplied start block (spec.md §4.3 initialisation rule 1);
    /// takes priority over every other watermark-derivation rule.
    pub start_block: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no routing contract registered for blockchain_id {0}")]
    NotFoundById(u32),
    #[error("no routing contract registered for chain {0} address {1}")]
    NotFoundByAddress(String, String),
    #[error("duplicate blockchain_id {0}: a routing contract is already registered")]
    DuplicateBlockchainId(u32),
    #[error(transparent)]
    Rpc(#[from] crate::rpc::RpcError),
    #[error("contract call returned an unexpected shape for {0}")]
    UnexpectedOutputShape(&'static str),
}

/// A memoized, per-contract cache of infrequently-changing on-chain reads.
#[derive(Default)]
struct Memo {
    paused: Option<bool>,
    min_confirmation_blocks: Option<u64>,
}

/// In-memory catalogue of routing contracts, keyed three ways.
pub struct ContractRegistry {
    contracts: Vec<RoutingContract>,
    by_blockchain_id: HashMap<u32, usize>,
    by_chain_and_address: HashMap<(String, String), usize>,
    memo: Vec<RwLock<Memo>>,
}

impl ContractRegistry {
    /// Builds a registry from the configured contracts, failing fast on a
    /// duplicate `blockchain_id` (a data-integrity error, not retryable).
    pub fn new(contracts: Vec<RoutingContract>) -> Result<Self, RegistryError> {
        let mut by_blockchain_id = HashMap::new();
        let mut by_chain_and_address = HashMap::new();
        for (idx, contract) in contracts.iter().enumerate() {
            if by_blockchain_id
                .insert(contract.blockchain_id, idx)
                .is_some()
            {
                return Err(RegistryError::DuplicateBlockchainId(contract.blockchain_id));
            }
            by_chain_and_address.insert(
                (
                    contract.chain_name.clone(),
                    contract.address.to_lowercase(),
                ),
                idx,
            );
        }
        let memo = contracts.iter().map(|_| RwLock::new(Memo::default())).collect();
        Ok(Self {
            contracts,
            by_blockchain_id,
            by_chain_and_address,
            memo,
        })
    }

    pub fn by_blockchain_id(&self, blockchain_id: u32) -> Result<&RoutingContract, RegistryError> {
        self.by_blockchain_id
            .get(&blockchain_id)
            .map(|&idx| &self.contracts[idx])
            .ok_or(RegistryError::NotFoundById(blockchain_id))
    }

    pub fn by_chain_and_address(
        &self,
        chain_name: &str,
        address: &str,
    ) -> Result<&RoutingContract, RegistryError> {
        self.by_chain_and_address
            .get(&(chain_name.to_string(), address.to_lowercase()))
            .map(|&idx| &self.contracts[idx])
            .ok_or_else(|| {
                RegistryError::NotFoundByAddress(chain_name.to_string(), address.to_string())
            })
    }

    pub fn all(&self) -> &[RoutingContract] {
        &self.contracts
    }

    fn index_of(&self, blockchain_id: u32) -> Result<usize, RegistryError> {
        self.by_blockchain_id
            .get(&blockchain_id)
            .copied()
            .ok_or(RegistryError::NotFoundById(blockchain_id))
    }

    /// `processedTransactions(hash)`: 0 = not processed, 1 = processed, 2 = reverted.
    pub async fn processed_transactions(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        original_tx_hash: &str,
    ) -> Result<crate::abi::ProcessedState, RegistryError> {
        let contract = self.by_blockchain_id(blockchain_id)?;
        let hash = B256::from_str(original_tx_hash)
            .map_err(|_| RegistryError::UnexpectedOutputShape("processedTransactions"))?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "processedTransactions",
                &[DynSolValue::FixedBytes(hash, 32)],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::Uint(value, _)) => {
                let state: u8 = value.to::<u8>();
                Ok(state.into())
            }
            _ => Err(RegistryError::UnexpectedOutputShape("processedTransactions")),
        }
    }

    /// `paused()`, memoized after the first successful read.
    pub async fn paused(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
    ) -> Result<bool, RegistryError> {
        let idx = self.index_of(blockchain_id)?;
        if let Some(cached) = self.memo[idx].read().unwrap().paused {
            return Ok(cached);
        }
        let contract = &self.contracts[idx];
        let outputs = pool
            .contract_call(&contract.address, &contract.abi, "paused", &[])
            .await?;
        let value = match outputs.first() {
            Some(DynSolValue::Bool(b)) => *b,
            _ => return Err(RegistryError::UnexpectedOutputShape("paused")),
        };
        self.memo[idx].write().unwrap().paused = Some(value);
        Ok(value)
    }

    /// `minConfirmationBlocks()`, memoized after the first successful read.
    pub async fn min_confirmation_blocks(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        default_if_unset: u64,
    ) -> Result<u64, RegistryError> {
        let idx = self.index_of(blockchain_id)?;
        if let Some(cached) = self.memo[idx].read().unwrap().min_confirmation_blocks {
            return Ok(cached);
        }
        let contract = &self.contracts[idx];
        if contract.is_solana {
            // Solana routing contracts don't expose this EVM-style read.
            self.memo[idx].write().unwrap().min_confirmation_blocks = Some(default_if_unset);
            return Ok(default_if_unset);
        }
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "minConfirmationBlocks",
                &[],
            )
            .await?;
        let value = match outputs.first() {
            Some(DynSolValue::Uint(value, _)) => value.to::<u64>(),
            _ => return Err(RegistryError::UnexpectedOutputShape("minConfirmationBlocks")),
        };
        self.memo[idx].write().unwrap().min_confirmation_blocks = Some(value);
        Ok(value)
    }

    /// `existingOtherBlockchain(id)`.
    pub async fn existing_other_blockchain(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        other_blockchain_id: u32,
    ) -> Result<bool, RegistryError> {
        let contract = self.by_blockchain_id(blockchain_id)?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "existingOtherBlockchain",
                &[DynSolValue::Uint(U256::from(other_blockchain_id), 256)],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::Bool(b)) => Ok(*b),
            _ => Err(RegistryError::UnexpectedOutputShape("existingOtherBlockchain")),
        }
    }

    /// `blockchainCryptoFee(blockchainId)`.
    pub async fn blockchain_crypto_fee(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        other_blockchain_id: u32,
    ) -> Result<U256, RegistryError> {
        let contract = self.by_blockchain_id(blockchain_id)?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "blockchainCryptoFee",
                &[DynSolValue::Uint(U256::from(other_blockchain_id), 256)],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::Uint(value, _)) => Ok(*value),
            _ => Err(RegistryError::UnexpectedOutputShape("blockchainCryptoFee")),
        }
    }

    /// `blockchainRouter(blockchainId)`.
    pub async fn blockchain_router(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        other_blockchain_id: u32,
    ) -> Result<Address, RegistryError> {
        let contract = self.by_blockchain_id(blockchain_id)?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "blockchainRouter",
                &[DynSolValue::Uint(U256::from(other_blockchain_id), 256)],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::Address(addr)) => Ok(*addr),
            _ => Err(RegistryError::UnexpectedOutputShape("blockchainRouter")),
        }
    }

    /// `feeAmountOfBlockchain(blockchainId)`.
    pub async fn fee_amount_of_blockchain(
        &self,
        pool: &dyn RpcPool,
        blockchain_id: u32,
        other_blockchain_id: u32,
    ) -> Result<U256, RegistryError> {
        let contract = self.by_blockchain_id(blockchain_id)?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "feeAmountOfBlockchain",
                &[DynSolValue::Uint(U256::from(other_blockchain_id), 256)],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::Uint(value, _)) => Ok(*value),
            _ => Err(RegistryError::UnexpectedOutputShape("feeAmountOfBlockchain")),
        }
    }

    /// `getHashPacked(newAddress, transitTokenAmount, originalTxHash, sourceBlockchainId)`.
    pub async fn get_hash_packed(
        &self,
        pool: &dyn RpcPool,
        destination_blockchain_id: u32,
        new_address: Address,
        transit_token_amount: U256,
        original_tx_hash: B256,
        source_blockchain_id: u32,
    ) -> Result<B256, RegistryError> {
        let contract = self.by_blockchain_id(destination_blockchain_id)?;
        let outputs = pool
            .contract_call(
                &contract.address,
                &contract.abi,
                "getHashPacked",
                &[
                    DynSolValue::Address(new_address),
                    DynSolValue::Uint(transit_token_amount, 256),
                    DynSolValue::FixedBytes(original_tx_hash, 32),
                    DynSolValue::Uint(U256::from(source_blockchain_id), 256),
                ],
            )
            .await?;
        match outputs.first() {
            Some(DynSolValue::FixedBytes(word, 32)) => Ok(*word),
            _ => Err(RegistryError::UnexpectedOutputShape("getHashPacked")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contract(blockchain_id: u32) -> RoutingContract {
        RoutingContract {
            chain_name: format!("chain-{blockchain_id}"),
            blockchain_id,
            address: "0xb697fe3246eebac106015ed78cff7342ee823b6".to_string(),
            is_solana: false,
            abi: JsonAbi::new(),
            creation_tx_hash: None,
            start_block: None,
        }
    }

    #[test]
    fn duplicate_blockchain_id_is_rejected() {
        let result = ContractRegistry::new(vec![sample_contract(1), sample_contract(1)]);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateBlockchainId(1))
        ));
    }

    #[test]
    fn lookup_by_blockchain_id_and_address() {
        let registry = ContractRegistry::new(vec![sample_contract(1), sample_contract(2)]).unwrap();
        assert_eq!(registry.by_blockchain_id(2).unwrap().blockchain_id, 2);
        assert!(registry.by_blockchain_id(99).is_err());
        assert!(
            registry
                .by_chain_and_address("chain-1", "0xB697FE3246EEBAC106015ED78CFF7342EE823B6")
                .is_ok(),
            "address lookup should be case-insensitive"
        );
    }
}
