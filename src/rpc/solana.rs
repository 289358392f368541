//! Minimal Solana RPC pool.
//!
//! Per spec, the validator never makes live Solana RPC calls on the
//! *destination* path (address encoding and pubkey extraction are pure,
//! local operations using `bs58`). When Solana is a *source* chain, the
//! scanner still needs to read the chain tip and fetch transactions/logs,
//! so this pool implements the same [`RpcPool`] surface as the EVM pool
//! using plain JSON-RPC over `reqwest`, without pulling in the full
//! `solana-client` stack the teacher's settlement-side code would need.

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde_json::{Value as Json, json};
use std::time::Duration;
use url::Url;

use super::{Attempt, FailoverCursor, RawLog, RawTransaction, RpcError, RpcPool, TxReceipt};

pub struct SolanaRpcPool {
    cursor: FailoverCursor,
    urls: Vec<Url>,
    client: reqwest::Client,
}

impl SolanaRpcPool {
    pub fn new(chain_name: impl Into<String>, rpc_urls: &[Url]) -> Self {
        let chain_name = chain_name.into();
        Self {
            cursor: FailoverCursor::new(chain_name, rpc_urls.len()),
            urls: rpc_urls.to_vec(),
            client: reqwest::Client::new(),
        }
    }

    async fn rpc_call(&self, idx: usize, method: &str, params: Json) -> Result<Json, Attempt> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(self.urls[idx].clone())
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Attempt {
                message: format!("connect error: {e}"),
                transient: true,
            })?;
        if !response.status().is_success() {
            return Err(Attempt {
                message: format!("http error: {}", response.status()),
                transient: true,
            });
        }
        let body: Json = response.json().await.map_err(|e| Attempt {
            message: format!("malformed json-rpc response: {e}"),
            transient: true,
        })?;
        if let Some(error) = body.get("error") {
            return Err(Attempt {
                message: format!("json-rpc error: {error}"),
                transient: false,
            });
        }
        body.get("result").cloned().ok_or_else(|| Attempt {
            message: "malformed json-rpc response: missing result".to_string(),
            transient: true,
        })
    }
}

#[async_trait]
impl RpcPool for SolanaRpcPool {
    fn chain_name(&self) -> &str {
        &self.cursor.chain_name
    }

    fn endpoint_count(&self) -> usize {
        self.urls.len()
    }

    fn reset_cursor(&self) {
        self.cursor.reset();
    }

    async fn current_block_number(&self) -> Result<u64, RpcError> {
        self.cursor
            .with_failover(|idx| async move {
                let result = self.rpc_call(idx, "getSlot", json!([])).await?;
                result.as_u64().ok_or_else(|| Attempt {
                    message: "malformed json-rpc response: getSlot".to_string(),
                    transient: true,
                })
            })
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError> {
        self.cursor
            .with_failover(|idx| async move {
                let result = self
                    .rpc_call(
                        idx,
                        "getTransaction",
                        json!([hash, {"encoding": "json", "maxSupportedTransactionVersion": 0}]),
                    )
                    .await?;
                if result.is_null() {
                    return Ok(None);
                }
                let block_number = result.get("slot").and_then(Json::as_u64);
                Ok(Some(RawTransaction {
                    hash: hash.to_string(),
                    block_hash: None,
                    block_number,
                    from: String::new(),
                    to: None,
                    gas: 0,
                    gas_price: None,
                    nonce: 0,
                    r: String::new(),
                    s: String::new(),
                    v: 0,
                    transaction_index: None,
                    value: U256::ZERO,
                    input: Bytes::new(),
                }))
            })
            .await
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        self.cursor
            .with_failover(|idx| async move {
                let result = self
                    .rpc_call(
                        idx,
                        "getSignatureStatuses",
                        json!([[hash], {"searchTransactionHistory": true}]),
                    )
                    .await?;
                let status = result
                    .get("value")
                    .and_then(Json::as_array)
                    .and_then(|arr| arr.first())
                    .cloned();
                match status {
                    Some(Json::Null) | None => Ok(None),
                    Some(status) => Ok(Some(TxReceipt {
                        transaction_hash: hash.to_string(),
                        block_number: status.get("slot").and_then(Json::as_u64).unwrap_or_default(),
                        status: status.get("err").map(Json::is_null).unwrap_or(false),
                    })),
                }
            })
            .await
    }

    async fn wait_for_receipt(
        &self,
        hash: &str,
        timeout: Duration,
        poll_latency: Duration,
    ) -> Result<TxReceipt, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.get_transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RpcError::ReceiptTimeout(hash.to_string()));
            }
            tokio::time::sleep(poll_latency).await;
        }
    }

    async fn get_logs(
        &self,
        _address: &str,
        _event_signature: B256,
        _from_block: u64,
        _to_block: u64,
    ) -> Result<Vec<RawLog>, RpcError> {
        // Solana has no EVM-style `getLogs`; program-log scanning is out of
        // scope here since Solana never appears as the *destination* side of
        // a signing decision in this spec, only optionally as a source chain
        // whose transactions are looked up by hash once an event arrives
        // from an EVM source scanner's perspective is not applicable — when
        // Solana is itself the source chain, the routing contract's program
        // log parsing is a chain-specific concern tracked as a follow-up.
        Ok(Vec::new())
    }

    async fn contract_call(
        &self,
        _address: &str,
        _abi: &JsonAbi,
        _function_name: &str,
        _args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, RpcError> {
        Err(RpcError::Decode(
            "contract_call is not supported on the Solana rpc pool".to_string(),
        ))
    }

    async fn decode_call_input(
        &self,
        _abi: &JsonAbi,
        _input_hex: &str,
    ) -> Result<(String, Vec<DynSolValue>), RpcError> {
        Err(RpcError::Decode(
            "decode_call_input is not supported on the Solana rpc pool".to_string(),
        ))
    }
}

/// Converts a `0x`-prefixed hex string to a base58-encoded Solana address.
pub fn hex_to_base58(hex_str: &str) -> Result<String, RpcError> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(stripped)
        .map_err(|e| RpcError::Decode(format!("invalid hex address {hex_str}: {e}")))?;
    Ok(bs58::encode(bytes).into_string())
}

/// Converts a base58-encoded Solana address/pubkey to its raw 32 bytes.
pub fn base58_to_pubkey_bytes(address: &str) -> Result<[u8; 32], RpcError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| RpcError::Decode(format!("invalid base58 address {address}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| RpcError::Decode(format!("address {address} is not 32 bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_to_base58_round_trips_with_pubkey_bytes() {
        let hex_addr = "0xb697fe3246eebac106015ed78cff7342ee823b6b697fe3246eebac106015ed7";
        let base58 = hex_to_base58(hex_addr).unwrap();
        let bytes = base58_to_pubkey_bytes(&base58).unwrap();
        assert_eq!(hex::encode(bytes), hex_addr.trim_start_matches("0x"));
    }

    #[test]
    fn rejects_non_32_byte_pubkey() {
        let short = bs58::encode([1u8, 2, 3]).into_string();
        assert!(base58_to_pubkey_bytes(&short).is_err());
    }
}
