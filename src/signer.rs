//! Swap parameter reconstruction: decodes the source transaction's calldata,
//! rewrites addresses for the destination chain, normalises decimals,
//! computes the packed hash, and signs it.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use crate::hashing::{self, SigningError};
use crate::notifier::Notifier;
use crate::registry::{ContractRegistry, RegistryError, RoutingContract};
use crate::rpc::solana::{base58_to_pubkey_bytes, hex_to_base58};
use crate::rpc::{RpcError, RpcPool};
use crate::store::{NewTransaction, NewValidatorSwap, Store, StoreError};
use crate::value::{self, Value};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("event is missing required field at index {0}")]
    MissingField(usize),
    #[error("transit token amount normalised to zero; invalid swap")]
    ZeroAmount,
    #[error("unknown destination blockchain_id {0} referenced by event")]
    UnknownDestination(u32),
    #[error("source transaction {0} has no on-chain record (required to decode calldata)")]
    MissingSourceTransaction(String),
}

/// A decoded swap-initiation event, already positioned within its block by
/// the Scanner (`(block_number, log_index)` ordering). Only the event's own
/// two fixed-width arguments are carried here; the full positional calldata
/// table (idx 0,3,5,6,7,8,-1) — including `dst_blockchain_id` at idx 0 — is
/// reconstructed by the Signer from the source transaction's raw input, per
/// spec.md §4.4(a)-(b).
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub event_name: &'static str,
    pub transaction_hash: String,
    pub block_number: u64,
    /// Transit-token amount credited on the source chain.
    pub rbc_amount_in: U256,
    /// User-facing input amount (persisted, not part of the hashed payload).
    pub amount_spent: U256,
}

pub struct Signer {
    store: Arc<dyn Store>,
    registry: Arc<ContractRegistry>,
    signer: Arc<PrivateKeySigner>,
    notifier: Arc<Notifier>,
    six_decimal_chain_ids: Vec<u32>,
}

impl Signer {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ContractRegistry>,
        signer: Arc<PrivateKeySigner>,
        notifier: Arc<Notifier>,
        six_decimal_chain_ids: Vec<u32>,
    ) -> Self {
        Self {
            store,
            registry,
            signer,
            notifier,
            six_decimal_chain_ids,
        }
    }

    fn is_six_decimal(&self, blockchain_id: u32) -> bool {
        self.six_decimal_chain_ids.contains(&blockchain_id)
    }

    /// Handles one swap-initiation event end to end: steps (a)-(h) of the
    /// parameter-reconstruction contract.
    pub async fn handle_event(
        &self,
        pool: &dyn RpcPool,
        source: &RoutingContract,
        log: &DecodedLog,
    ) -> Result<(), SignerError> {
        // (a) source transaction materialisation + (b) calldata decoding.
        let (transaction, calldata) = self.materialize_transaction(pool, source, log).await?;

        // (b) dst_blockchain_id is calldata field 0, not part of the event
        // itself — the event carries only RBCAmountIn/amountSpent.
        let dst_blockchain_id = calldata
            .as_ref()
            .and_then(|v| v.field(0))
            .and_then(Value::as_u256)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(SignerError::MissingField(0))?;

        let destination = self
            .registry
            .by_blockchain_id(dst_blockchain_id)
            .map_err(|_| SignerError::UnknownDestination(dst_blockchain_id))?;

        // (h, part 1) idempotence: a previously-signed swap for this source tx is a no-op.
        if let Some(existing_swap) = self.store.find_swap_by_transaction(transaction.id).await? {
            if existing_swap.signature.is_some() {
                return Ok(());
            }
        }

        // (b)/(d) destination-wallet rewriting. Field 6 is the destination
        // wallet; Solana destinations are rewritten from hex to base58.
        let new_address_field = calldata
            .as_ref()
            .and_then(|v| v.field(6))
            .ok_or(SignerError::MissingField(6))?;
        let new_address_hex = new_address_field
            .as_hex_bytes()
            .ok_or(SignerError::MissingField(6))?;

        let new_address_for_hash = if destination.is_solana {
            // `getHashPacked` is never eth_call'd on the Solana path; the hash
            // is instead recomputed locally from the raw pubkey bytes below.
            Address::ZERO
        } else {
            Address::from_str(&new_address_hex).map_err(|_| SignerError::MissingField(6))?
        };

        let destination_display_address = if destination.is_solana {
            hex_to_base58(&new_address_hex)?
        } else {
            new_address_hex.clone()
        };

        // (d) Solana address rewriting: every element of `second_path` (field
        // 3) is rewritten from hex to base58 before persistence, alongside
        // the destination wallet above.
        if destination.is_solana {
            if let Some(rewritten) = rewrite_second_path(calldata.as_ref())? {
                self.store
                    .update_transaction_data(transaction.id, serde_json::to_value(&rewritten).unwrap_or(json!({})))
                    .await?;
            }
        }

        // (e) decimals normalisation on the event's transit-token amount.
        let normalised_amount = hashing::normalise_decimals(
            log.rbc_amount_in,
            self.is_six_decimal(source.blockchain_id),
            self.is_six_decimal(dst_blockchain_id),
        );
        if normalised_amount.is_zero() {
            return Err(SignerError::ZeroAmount);
        }

        let original_tx_hash = parse_tx_hash(&log.transaction_hash);

        // (f) packed hash.
        let packed_hash = if destination.is_solana {
            let pubkey = base58_to_pubkey_bytes(&destination_display_address)?;
            let amount_u64: u64 = normalised_amount.try_into().unwrap_or(u64::MAX);
            hashing::solana_packed_hash(
                &pubkey,
                amount_u64,
                original_tx_hash,
                source.blockchain_id as u64,
            )
        } else {
            match self
                .registry
                .get_hash_packed(
                    pool,
                    dst_blockchain_id,
                    new_address_for_hash,
                    normalised_amount,
                    original_tx_hash,
                    source.blockchain_id,
                )
                .await
            {
                Ok(hash) => hash,
                Err(err) if is_already_settled_revert(&err) => {
                    // spec.md §4.4: another validator already settled or
                    // cancelled this swap on the destination; leave the row
                    // untouched, no notification.
                    return Ok(());
                }
                Err(err) => {
                    self.notify_registry_error(log, &err).await;
                    return Err(err.into());
                }
            }
        };

        // (g) signing.
        let signature = hashing::sign_packed_hash(&self.signer, packed_hash).await?;

        let event_data = json!({
            "RBCAmountIn": log.rbc_amount_in.to_string(),
            "amountSpent": log.amount_spent.to_string(),
            "destinationAddress": destination_display_address,
            "eventName": log.event_name,
        });

        let swap = self
            .store
            .insert_swap(NewValidatorSwap {
                transaction_id: transaction.id,
                source_blockchain_id: source.blockchain_id,
                destination_blockchain_id: dst_blockchain_id,
                recipient_address: destination_display_address,
                amount: normalised_amount.to_string(),
                original_tx_hash: log.transaction_hash.clone(),
                event_data,
            })
            .await?;

        self.store
            .mark_signed(swap.id, &format!("{packed_hash:#x}"), &signature)
            .await?;

        Ok(())
    }

    /// Looks up (or fetches + persists) the source `Transaction`, returning
    /// its decoded calldata alongside it. Solana source chains never decode
    /// calldata (§4.4(a)), so `calldata` is `None` for them.
    async fn materialize_transaction(
        &self,
        pool: &dyn RpcPool,
        source: &RoutingContract,
        log: &DecodedLog,
    ) -> Result<(crate::store::Transaction, Option<Value>), SignerError> {
        if let Some(existing) = self
            .store
            .find_transaction(&source.chain_name, &log.transaction_hash)
            .await?
        {
            let calldata = if source.is_solana {
                None
            } else {
                serde_json::from_value::<Value>(existing.data.clone()).ok()
            };
            return Ok((existing, calldata));
        }

        let calldata = if source.is_solana {
            None
        } else {
            let raw_tx = pool
                .get_transaction(&log.transaction_hash)
                .await?
                .ok_or_else(|| SignerError::MissingSourceTransaction(log.transaction_hash.clone()))?;
            let input_hex = format!("0x{}", hex::encode(&raw_tx.input));
            let (_, args) = pool.decode_call_input(&source.abi, &input_hex)?;
            Some(value::from_dyn_sol_value(&DynSolValue::Tuple(args)))
        };

        let data = calldata
            .as_ref()
            .map(|v| serde_json::to_value(v).unwrap_or(json!({})))
            .unwrap_or(json!({}));

        let transaction = self
            .store
            .insert_transaction(NewTransaction {
                chain_name: source.chain_name.clone(),
                blockchain_id: source.blockchain_id,
                tx_hash: log.transaction_hash.clone(),
                block_number: log.block_number,
                data,
            })
            .await?;

        Ok((transaction, calldata))
    }

    async fn notify_registry_error(&self, log: &DecodedLog, err: &RegistryError) {
        self.notifier
            .notify(
                "SignerError",
                &[
                    ("event", log.event_name.to_string()),
                    ("tx_hash", log.transaction_hash.clone()),
                ],
                Some(&log.transaction_hash),
            )
            .await;
        tracing::warn!(tx_hash = %log.transaction_hash, error = %err, "signer error notified");
    }
}

/// `getHashPacked` reverts with `ContractTransactionAlreadyProcessed` /
/// `ContractTransactionAlreadyReverted` when another validator already
/// settled or cancelled this swap on the destination chain (spec.md §4.4);
/// both surface here as [`RegistryError::Rpc`] wrapping the revert reason
/// string rather than a typed variant, since the destination contract is the
/// only source of this information.
fn is_already_settled_revert(err: &RegistryError) -> bool {
    matches!(
        err,
        RegistryError::Rpc(RpcError::Decode(msg))
            if msg.contains("ContractTransactionAlreadyProcessed")
                || msg.contains("ContractTransactionAlreadyReverted")
    )
}

/// Rewrites every element of calldata field 3 (`second_path`) from hex to
/// base58, returning the updated calldata tree if anything changed.
/// spec.md §4.4(d): this accompanies the destination-wallet rewrite and
/// applies only when the destination chain is Solana.
fn rewrite_second_path(calldata: Option<&Value>) -> Result<Option<Value>, SignerError> {
    let Some(Value::Map(map)) = calldata else {
        return Ok(None);
    };
    let Some(Value::List(items)) = map.get("3") else {
        return Ok(None);
    };
    let mut changed = false;
    let mut rewritten = Vec::with_capacity(items.len());
    for item in items {
        if let Some(hex_str) = item.as_hex_bytes() {
            rewritten.push(Value::String(hex_to_base58(&hex_str)?));
            changed = true;
        } else {
            rewritten.push(item.clone());
        }
    }
    if !changed {
        return Ok(None);
    }
    let mut new_map = map.clone();
    new_map.insert("3".to_string(), Value::List(rewritten));
    Ok(Some(Value::Map(new_map)))
}

fn parse_tx_hash(hash: &str) -> B256 {
    B256::from_str(hash).unwrap_or_else(|_| {
        B256::from_str(&format!("0x{hash}")).unwrap_or(B256::ZERO)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HexBytes;
    use std::collections::BTreeMap;

    fn sample_calldata(address: &str) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "6".to_string(),
            Value::Bytes(HexBytes(hex::decode(address.trim_start_matches("0x")).unwrap())),
        );
        Value::Map(map)
    }

    #[test]
    fn calldata_field_zero_is_the_destination_blockchain_id() {
        let mut map = BTreeMap::new();
        map.insert("0".to_string(), Value::Int(U256::from(2u32)));
        let calldata = Value::Map(map);
        let dst_blockchain_id = calldata
            .field(0)
            .and_then(Value::as_u256)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap();
        assert_eq!(dst_blockchain_id, 2);
    }

    #[test]
    fn calldata_field_six_is_the_destination_wallet() {
        let calldata = sample_calldata("b697fe3246eebac106015ed78cff7342ee823b6");
        let hex_value = calldata.field(6).and_then(Value::as_hex_bytes).unwrap();
        assert_eq!(hex_value, "0xb697fe3246eebac106015ed78cff7342ee823b6");
    }

    #[test]
    fn already_settled_revert_reasons_are_recognised() {
        let processed = RegistryError::Rpc(RpcError::Decode(
            "execution reverted: ContractTransactionAlreadyProcessed".to_string(),
        ));
        let reverted = RegistryError::Rpc(RpcError::Decode(
            "execution reverted: ContractTransactionAlreadyReverted".to_string(),
        ));
        let other = RegistryError::Rpc(RpcError::Decode("execution reverted: Paused".to_string()));
        assert!(is_already_settled_revert(&processed));
        assert!(is_already_settled_revert(&reverted));
        assert!(!is_already_settled_revert(&other));
    }

    #[test]
    fn rewrite_second_path_converts_every_element_to_base58() {
        let mut map = BTreeMap::new();
        map.insert(
            "3".to_string(),
            Value::List(vec![
                Value::Bytes(HexBytes(
                    hex::decode("b697fe3246eebac106015ed78cff7342ee823b6").unwrap(),
                )),
                Value::Bytes(HexBytes(
                    hex::decode("1111111111111111111111111111111111111111").unwrap(),
                )),
            ]),
        );
        let calldata = Value::Map(map);
        let rewritten = rewrite_second_path(Some(&calldata)).unwrap().unwrap();
        let items = rewritten.field(3).and_then(Value::as_list).unwrap();
        assert_eq!(items.len(), 2);
        for item in items {
            assert!(matches!(item, Value::String(_)));
        }
    }

    #[test]
    fn rewrite_second_path_is_none_when_field_absent() {
        let calldata = sample_calldata("b697fe3246eebac106015ed78cff7342ee823b6");
        assert!(rewrite_second_path(Some(&calldata)).unwrap().is_none());
    }

    #[test]
    fn parse_tx_hash_accepts_hash_with_or_without_0x_prefix() {
        let hash = "b735a892bc6504976c8d1953d56fa5122546c9bbb3e8770d4083430363285999"
            .get(0..64)
            .unwrap();
        let with_prefix = parse_tx_hash(&format!("0x{hash}"));
        let without_prefix = parse_tx_hash(hash);
        assert_eq!(with_prefix, without_prefix);
    }
}
