//! Per-chain RPC provider pool with cursor-based failover.
//!
//! Each chain owns an ordered, non-empty list of RPC endpoints and a rotating
//! cursor. Every call first tries the endpoint at the current cursor position;
//! on a transient failure the cursor advances and the call is retried against
//! the next endpoint. Exhausting the ring resets the cursor to zero and raises
//! a fatal, chain-scoped "network unavailable" error — from the outside, a
//! successful call through the pool is indistinguishable from a single
//! logical RPC call that took longer than usual; there are no partial side
//! effects (the pool buffers nothing).

pub mod evm;
pub mod solana;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use evm::EvmRpcPool;
pub use solana::SolanaRpcPool;

/// Errors surfaced by an [`RpcPool`].
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Every endpoint in the pool was tried and failed; the cursor has been
    /// reset to zero. The caller should treat this as a transient backoff
    /// trigger, not a shutdown signal.
    #[error("network unavailable for chain {chain}: {last_error}")]
    NetworkUnavailable { chain: String, last_error: String },
    /// A non-retryable protocol/decode error (e.g. a malformed ABI or a
    /// function not present on the contract).
    #[error("rpc decode error: {0}")]
    Decode(String),
    /// `wait_for_receipt` exceeded its deadline.
    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),
}

/// A single attempt's failure, classified as transient (worth rotating the
/// cursor and retrying) or not.
#[derive(Debug)]
pub struct Attempt {
    pub message: String,
    pub transient: bool,
}

/// Read operations a chain's RPC provider pool must support. Implemented once
/// per chain family (EVM, Solana) since the wire protocols differ, but the
/// failover/cursor discipline is identical and lives in [`with_failover`].
#[async_trait]
pub trait RpcPool: Send + Sync {
    fn chain_name(&self) -> &str;

    /// Number of configured endpoints.
    fn endpoint_count(&self) -> usize;

    /// Resets the cursor to the primary endpoint. Called by the scanner at
    /// the start of each loop iteration so the primary RPC is preferred.
    fn reset_cursor(&self);

    async fn current_block_number(&self) -> Result<u64, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError>;

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError>;

    async fn wait_for_receipt(
        &self,
        hash: &str,
        timeout: Duration,
        poll_latency: Duration,
    ) -> Result<TxReceipt, RpcError>;

    async fn get_logs(
        &self,
        address: &str,
        event_signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, RpcError>;

    /// Calls a read-only contract function and returns the decoded outputs.
    async fn contract_call(
        &self,
        address: &str,
        abi: &JsonAbi,
        function_name: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, RpcError>;

    /// Decodes a transaction's calldata against a contract's ABI.
    async fn decode_call_input(
        &self,
        abi: &JsonAbi,
        input_hex: &str,
    ) -> Result<(String, Vec<DynSolValue>), RpcError>;
}

/// A cursor shared by every `RpcPool` implementation: the common plumbing for
/// "try endpoint i, on failure advance, on exhaustion reset and raise fatal".
#[derive(Debug)]
pub struct FailoverCursor {
    pub chain_name: String,
    pub endpoint_count: usize,
    cursor: AtomicUsize,
}

impl FailoverCursor {
    pub fn new(chain_name: String, endpoint_count: usize) -> Self {
        assert!(endpoint_count > 0, "rpc pool must have at least one endpoint");
        Self {
            chain_name,
            endpoint_count,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.cursor.load(Ordering::SeqCst) % self.endpoint_count
    }

    fn advance(&self) {
        self.cursor.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs `op` against the endpoint at the current cursor; on a transient
    /// failure, advances the cursor and retries against the next endpoint.
    /// After `endpoint_count` consecutive transient failures, resets the
    /// cursor to zero and returns [`RpcError::NetworkUnavailable`].
    pub async fn with_failover<T, F, Fut>(&self, mut op: F) -> Result<T, RpcError>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, Attempt>>,
    {
        let mut last_error = String::from("no endpoints configured");
        for _ in 0..self.endpoint_count {
            let idx = self.current();
            match op(idx).await {
                Ok(value) => return Ok(value),
                Err(attempt) if attempt.transient => {
                    last_error = attempt.message;
                    self.advance();
                }
                Err(attempt) => {
                    return Err(RpcError::Decode(attempt.message));
                }
            }
        }
        self.reset();
        Err(RpcError::NetworkUnavailable {
            chain: self.chain_name.clone(),
            last_error,
        })
    }
}

/// A minimally normalised, chain-agnostic transaction view, with hashes and
/// addresses rendered as `0x`-prefixed hex.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub hash: String,
    pub block_hash: Option<String>,
    pub block_number: Option<u64>,
    pub from: String,
    pub to: Option<String>,
    pub gas: u64,
    pub gas_price: Option<u128>,
    pub nonce: u64,
    pub r: String,
    pub s: String,
    pub v: u64,
    pub transaction_index: Option<u64>,
    pub value: U256,
    pub input: Bytes,
}

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub status: bool,
}

#[derive(Debug, Clone)]
pub struct RawLog {
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failover_advances_cursor_on_transient_error_and_succeeds_on_next() {
        let cursor = FailoverCursor::new("test-chain".to_string(), 2);
        let result = cursor
            .with_failover(|idx| async move {
                if idx == 0 {
                    Err(Attempt {
                        message: "connect error".into(),
                        transient: true,
                    })
                } else {
                    Ok(idx)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 1);
        assert_eq!(cursor.current(), 1);
    }

    #[tokio::test]
    async fn failover_exhausts_ring_and_resets_cursor() {
        let cursor = FailoverCursor::new("test-chain".to_string(), 3);
        let result: Result<(), RpcError> = cursor
            .with_failover(|_idx| async move {
                Err::<(), Attempt>(Attempt {
                    message: "connect error".into(),
                    transient: true,
                })
            })
            .await;
        assert!(matches!(result, Err(RpcError::NetworkUnavailable { .. })));
        assert_eq!(cursor.current(), 0);
    }

    #[tokio::test]
    async fn non_transient_error_does_not_advance_cursor() {
        let cursor = FailoverCursor::new("test-chain".to_string(), 2);
        let result: Result<(), RpcError> = cursor
            .with_failover(|_idx| async move {
                Err::<(), Attempt>(Attempt {
                    message: "malformed contract decode".into(),
                    transient: false,
                })
            })
            .await;
        assert!(matches!(result, Err(RpcError::Decode(_))));
        assert_eq!(cursor.current(), 0);
    }
}
