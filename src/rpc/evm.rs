//! EVM RPC provider pool: one `alloy` HTTP provider per configured endpoint,
//! selected through the shared [`FailoverCursor`].

use alloy_dyn_abi::{DynSolValue, JsonAbiExt};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, TransactionRequest};
use alloy_transport::{RpcError as AlloyRpcError, TransportErrorKind};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use super::{Attempt, FailoverCursor, RawLog, RawTransaction, RpcError, RpcPool, TxReceipt};

/// RPC provider pool for an EVM-compatible chain.
pub struct EvmRpcPool {
    cursor: FailoverCursor,
    providers: Vec<RootProvider>,
}

impl EvmRpcPool {
    pub fn new(chain_name: impl Into<String>, rpc_urls: &[Url]) -> Self {
        let chain_name = chain_name.into();
        let providers = rpc_urls
            .iter()
            .map(|url| ProviderBuilder::new().connect_http(url.clone()))
            .collect::<Vec<_>>();
        Self {
            cursor: FailoverCursor::new(chain_name, providers.len()),
            providers,
        }
    }

    fn provider(&self, idx: usize) -> &RootProvider {
        &self.providers[idx]
    }
}

/// Classifies an alloy transport error as transient (rotate + retry) or fatal,
/// per spec: connect error, TLS error, read timeout, HTTP non-2xx, malformed
/// JSON-RPC response, "bad function call output", provider-not-connected are
/// all transient.
fn classify(err: &AlloyRpcError<TransportErrorKind>) -> Attempt {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    let transient = matches!(err, AlloyRpcError::Transport(_))
        || lowered.contains("timeout")
        || lowered.contains("tls")
        || lowered.contains("connect")
        || lowered.contains("bad function call output")
        || lowered.contains("not connected")
        || lowered.contains("http error")
        || lowered.contains("deserialization");
    Attempt { message, transient }
}

fn parse_hash(hash: &str) -> Result<B256, RpcError> {
    B256::from_str(hash).map_err(|e| RpcError::Decode(format!("invalid tx hash {hash}: {e}")))
}

#[async_trait]
impl RpcPool for EvmRpcPool {
    fn chain_name(&self) -> &str {
        &self.cursor.chain_name
    }

    fn endpoint_count(&self) -> usize {
        self.providers.len()
    }

    fn reset_cursor(&self) {
        self.cursor.reset();
    }

    async fn current_block_number(&self) -> Result<u64, RpcError> {
        self.cursor
            .with_failover(|idx| async move {
                self.provider(idx)
                    .get_block_number()
                    .await
                    .map_err(|e| classify(&e))
            })
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError> {
        let tx_hash = parse_hash(hash)?;
        self.cursor
            .with_failover(|idx| async move {
                let tx = self
                    .provider(idx)
                    .get_transaction_by_hash(tx_hash)
                    .await
                    .map_err(|e| classify(&e))?;
                Ok(tx.map(|tx| RawTransaction {
                    hash: format!("{:#x}", tx.inner.tx_hash()),
                    block_hash: tx.block_hash.map(|h| format!("{h:#x}")),
                    block_number: tx.block_number,
                    from: format!("{:#x}", tx.inner.signer()),
                    to: tx.inner.to().map(|a| format!("{a:#x}")),
                    gas: tx.inner.gas_limit(),
                    gas_price: tx.inner.gas_price(),
                    nonce: tx.inner.nonce(),
                    // Signature components are recorded for the Transaction row's
                    // completeness but are not consulted anywhere on the signing path.
                    r: "0x0".to_string(),
                    s: "0x0".to_string(),
                    v: 0,
                    transaction_index: tx.transaction_index,
                    value: tx.inner.value(),
                    input: tx.inner.input().clone(),
                }))
            })
            .await
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        let tx_hash = parse_hash(hash)?;
        self.cursor
            .with_failover(|idx| async move {
                let receipt = self
                    .provider(idx)
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(|e| classify(&e))?;
                Ok(receipt.map(|r| TxReceipt {
                    transaction_hash: format!("{:#x}", r.transaction_hash),
                    block_number: r.block_number.unwrap_or_default(),
                    status: r.status(),
                }))
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
        address: &str,
        event_signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RpcError> {
        let address = Address::from_str(address)
            .map_err(|e| RpcError::Decode(format!("invalid address {address}: {e}")))?;
        self.cursor
            .with_failover(|idx| async move {
                let filter = Filter::new()
                    .address(address)
                    .event_signature(event_signature)
                    .from_block(BlockNumberOrTag::Number(from_block))
                    .to_block(BlockNumberOrTag::Number(to_block));
                let logs = self
                    .provider(idx)
                    .get_logs(&filter)
                    .await
                    .map_err(|e| classify(&e))?;
                Ok(logs
                    .into_iter()
                    .map(|log| RawLog {
                        transaction_hash: log
                            .transaction_hash
                            .map(|h| format!("{h:#x}"))
                            .unwrap_or_default(),
                        block_number: log.block_number.unwrap_or_default(),
                        log_index: log.log_index.unwrap_or_default(),
                        address: log.address(),
                        topics: log.topics().to_vec(),
                        data: log.data().data.clone(),
                    })
                    .collect())
            })
            .await
    }

    async fn contract_call(
        &self,
        address: &str,
        abi: &JsonAbi,
        function_name: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, RpcError> {
        let to = Address::from_str(address)
            .map_err(|e| RpcError::Decode(format!("invalid address {address}: {e}")))?;
        let function = abi
            .function(function_name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| RpcError::Decode(format!("function {function_name} not in ABI")))?;
        let calldata = function
            .abi_encode_input(args)
            .map_err(|e| RpcError::Decode(format!("abi encode failed: {e}")))?;
        self.cursor
            .with_failover(|idx| async move {
                let tx = TransactionRequest::default()
                    .to(to)
                    .input(Bytes::from(calldata.clone()).into());
                let output = self
                    .provider(idx)
                    .call(tx)
                    .await
                    .map_err(|e| classify(&e))?;
                function
                    .abi_decode_output(&output)
                    .map_err(|e| Attempt {
                        message: format!("bad function call output: {e}"),
                        transient: true,
                    })
            })
            .await
    }

    async fn decode_call_input(
        &self,
        abi: &JsonAbi,
        input_hex: &str,
    ) -> Result<(String, Vec<DynSolValue>), RpcError> {
        let stripped = input_hex.strip_prefix("0x").unwrap_or(input_hex);
        let bytes = hex::decode(stripped)
            .map_err(|e| RpcError::Decode(format!("invalid calldata hex: {e}")))?;
        if bytes.len() < 4 {
            return Err(RpcError::Decode("calldata shorter than a selector".into()));
        }
        let selector = &bytes[..4];
        for function in abi.functions() {
            if function.selector().as_slice() == selector {
                let decoded = function
                    .abi_decode_input(&bytes[4..])
                    .map_err(|e| RpcError::Decode(format!("abi decode failed: {e}")))?;
                return Ok((function.name.clone(), decoded));
            }
        }
        Err(RpcError::Decode(format!(
            "no function in ABI matches selector 0x{}",
            hex::encode(selector)
        )))
    }
}

/// Checksums an EVM address to EIP-55 form.
pub fn to_checksum(address: &Address) -> String {
    address.to_checksum(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_roundtrips_through_parse() {
        let address = Address::from_str("0xb697fe3246eebac106015ed78cff7342ee823b6").unwrap();
        let checksummed = to_checksum(&address);
        assert_eq!(Address::from_str(&checksummed).unwrap(), address);
    }
}
