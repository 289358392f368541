//! Per-chain block-range scan loop: the only component that advances a
//! chain's watermark and the only caller of the Signer for that chain.

use alloy_primitives::B256;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::abi::SUBSCRIBED_EVENTS;
use crate::error::ValidatorError;
use crate::registry::{ContractRegistry, RoutingContract};
use crate::rpc::RpcPool;
use crate::signer::{DecodedLog, Signer};
use crate::store::Store;

/// The decision a single main-loop iteration makes about how much of the
/// chain to scan and how long to sleep afterward. Exposed standalone so
/// §8 P6/S6 window arithmetic can be property-tested without a live pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Nothing newly confirmed yet; sleep `SLOW` and retry.
    Empty { sleep: Duration },
    /// A `[from, to]` inclusive range to scan, plus how long to sleep after.
    Range {
        from: u64,
        to: u64,
        sleep: Duration,
    },
}

/// Computes the next scan window from the chain tip and current watermark,
/// exactly per spec.md §4.3 steps 2-4.
pub fn compute_window(
    current_block: u64,
    last_processed_block: u64,
    min_confirmation_blocks: u64,
    block_range: u64,
    timeout_fast: Duration,
    timeout_slow: Duration,
) -> Window {
    let from = last_processed_block + 1;
    let tip = current_block.saturating_sub(min_confirmation_blocks);
    if tip < from {
        return Window::Empty { sleep: timeout_slow };
    }
    let span = tip - from;
    if span > block_range {
        Window::Range {
            from,
            to: from + block_range - 1,
            sleep: timeout_fast,
        }
    } else {
        Window::Range {
            from,
            to: tip,
            sleep: timeout_slow,
        }
    }
}

pub struct Scanner {
    chain_name: String,
    pool: Arc<dyn RpcPool>,
    registry: Arc<ContractRegistry>,
    signer: Arc<Signer>,
    store: Arc<dyn Store>,
    block_range: u64,
    default_min_confirmation_blocks: u64,
    timeout_fast: Duration,
    timeout_slow: Duration,
}

impl Scanner {
    pub fn new(
        chain_name: String,
        pool: Arc<dyn RpcPool>,
        registry: Arc<ContractRegistry>,
        signer: Arc<Signer>,
        store: Arc<dyn Store>,
        block_range: u64,
        default_min_confirmation_blocks: u64,
        timeout_fast: Duration,
        timeout_slow: Duration,
    ) -> Self {
        Self {
            chain_name,
            pool,
            registry,
            signer,
            store,
            block_range,
            default_min_confirmation_blocks,
            timeout_fast,
            timeout_slow,
        }
    }

    /// Determines `last_processed_block` by the three-rule initialization
    /// cascade (spec.md §4.3), failing if none applies.
    ///
    /// A persisted scan checkpoint is consulted first: it is not one of the
    /// spec's three rules, but it is what lets a supervisor-restarted scanner
    /// (§5, restarted in place after any uncaught error) resume from where it
    /// left off instead of re-running the cascade — and, critically, instead
    /// of re-applying rule 1 and rewinding all the way back to an operator's
    /// `start_block` on every crash. Once a checkpoint exists it always wins;
    /// the three-rule cascade below only ever runs once, on this chain's
    /// very first start.
    async fn initial_watermark(&self, contract: &RoutingContract) -> Result<u64, ValidatorError> {
        if let Some(checkpoint) = self.store.get_checkpoint(&self.chain_name).await? {
            return Ok(checkpoint);
        }
        if let Some(start_block) = contract.start_block {
            return Ok(start_block.saturating_sub(1));
        }
        if let Some(max_block) = self.store.max_transaction_block(&self.chain_name).await? {
            return Ok(max_block);
        }
        if let Some(tx_hash) = &contract.creation_tx_hash {
            if let Some(receipt) = self.pool.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt.block_number);
            }
        }
        Err(ValidatorError::NoStartBlock {
            chain: self.chain_name.clone(),
        })
    }

    /// Runs the scan loop until `shutdown` is cancelled. A single `Err`
    /// return is what the [`crate::supervisor`] restart wrapper watches for.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ValidatorError> {
        let contract = self
            .registry
            .all()
            .iter()
            .find(|c| c.chain_name == self.chain_name)
            .cloned()
            .ok_or_else(|| ValidatorError::NoStartBlock {
                chain: self.chain_name.clone(),
            })?;

        let mut last_processed_block = self.initial_watermark(&contract).await?;

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            self.pool.reset_cursor();
            let current_block = self.pool.current_block_number().await?;
            let min_confirmation_blocks = self
                .registry
                .min_confirmation_blocks(
                    self.pool.as_ref(),
                    contract.blockchain_id,
                    self.default_min_confirmation_blocks,
                )
                .await
                .unwrap_or(self.default_min_confirmation_blocks);

            let window = compute_window(
                current_block,
                last_processed_block,
                min_confirmation_blocks,
                self.block_range,
                self.timeout_fast,
                self.timeout_slow,
            );

            let (from, to, sleep) = match window {
                Window::Empty { sleep } => {
                    tokio::select! {
                        _ = tokio::time::sleep(sleep) => continue,
                        _ = shutdown.cancelled() => return Ok(()),
                    }
                }
                Window::Range { from, to, sleep } => (from, to, sleep),
            };

            let mut events = Vec::new();
            for event_name in SUBSCRIBED_EVENTS {
                let topic = event_topic(event_name);
                let logs = self
                    .pool
                    .get_logs(&contract.address, topic, from, to)
                    .await?;
                for log in logs {
                    events.push((event_name, log));
                }
            }
            events.sort_by_key(|(_, log)| (log.block_number, log.log_index));

            for (event_name, raw_log) in &events {
                let log = match decode_event_log(event_name, raw_log) {
                    Ok(log) => log,
                    Err(err) => {
                        tracing::warn!(
                            chain = %self.chain_name,
                            tx_hash = %raw_log.transaction_hash,
                            error = %err,
                            "failed to decode event, skipping"
                        );
                        continue;
                    }
                };

                if let Err(err) = self
                    .signer
                    .handle_event(self.pool.as_ref(), &contract, &log)
                    .await
                {
                    tracing::warn!(
                        chain = %self.chain_name,
                        tx_hash = %raw_log.transaction_hash,
                        error = %err,
                        "signer error on event, skipping (at-most-once delivery)"
                    );
                }
            }

            last_processed_block = to;
            self.store
                .set_checkpoint(&self.chain_name, last_processed_block)
                .await?;

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }
}

/// `keccak256(event_signature)` topic for a subscribed event name. Both
/// subscribed events share this two-`uint256`, non-indexed shape, per
/// spec.md §4.4(c).
fn event_topic(event_name: &str) -> B256 {
    alloy_primitives::keccak256(format!("{event_name}(uint256,uint256)").as_bytes())
}

fn decode_event_log(
    event_name: &'static str,
    raw_log: &crate::rpc::RawLog,
) -> Result<DecodedLog, String> {
    // Neither event argument is indexed, so both land in `data`; topics[0] is
    // the event signature hash and carries nothing else. `dst_blockchain_id`
    // is not part of this event at all — it's reconstructed by the Signer
    // from the source transaction's calldata (spec.md §4.4(b)).
    if raw_log.data.len() < 64 {
        return Err("event data shorter than 2 words".to_string());
    }
    let rbc_amount_in = alloy_primitives::U256::from_be_slice(&raw_log.data[0..32]);
    let amount_spent = alloy_primitives::U256::from_be_slice(&raw_log.data[32..64]);

    Ok(DecodedLog {
        event_name,
        transaction_hash: raw_log.transaction_hash.clone(),
        block_number: raw_log.block_number,
        rbc_amount_in,
        amount_spent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_topic_hashes_the_two_arg_non_indexed_signature() {
        let expected = alloy_primitives::keccak256(
            b"TransferTokensToOtherBlockchainUser(uint256,uint256)",
        );
        assert_eq!(event_topic("TransferTokensToOtherBlockchainUser"), expected);
    }

    #[test]
    fn decode_event_log_reads_both_words_from_data_only() {
        let raw_log = crate::rpc::RawLog {
            transaction_hash: "0xabc".to_string(),
            block_number: 10,
            log_index: 0,
            address: alloy_primitives::Address::ZERO,
            topics: vec![event_topic("TransferTokensToOtherBlockchainUser")],
            data: {
                let mut bytes = vec![0u8; 64];
                bytes[31] = 7;
                bytes[63] = 9;
                bytes.into()
            },
        };
        let log = decode_event_log("TransferTokensToOtherBlockchainUser", &raw_log).unwrap();
        assert_eq!(log.rbc_amount_in, alloy_primitives::U256::from(7u64));
        assert_eq!(log.amount_spent, alloy_primitives::U256::from(9u64));
    }

    #[test]
    fn window_catches_up_in_fast_timeout_ranges_when_far_behind() {
        let window = compute_window(10_000, 0, 12, 2_000, Duration::from_secs(1), Duration::from_secs(15));
        assert_eq!(
            window,
            Window::Range {
                from: 1,
                to: 2_000,
                sleep: Duration::from_secs(1)
            }
        );
    }

    /// spec.md §8 S6: `current=1_000_000`, `MIN_CONFIRMATION=20`,
    /// `BLOCK_RANGE=500`, `last_processed=999_000` must yield `to = 999_500`
    /// — an inclusive window of exactly `BLOCK_RANGE` blocks from `from`.
    #[test]
    fn window_matches_golden_scan_window_bounds_s6() {
        let window = compute_window(1_000_000, 999_000, 20, 500, Duration::from_secs(1), Duration::from_secs(15));
        assert_eq!(
            window,
            Window::Range {
                from: 999_001,
                to: 999_500,
                sleep: Duration::from_secs(1)
            }
        );

        let next = compute_window(999_520, 999_500, 20, 500, Duration::from_secs(1), Duration::from_secs(15));
        assert_eq!(next, Window::Empty { sleep: Duration::from_secs(15) });
    }

    #[test]
    fn window_is_empty_when_nothing_newly_confirmed() {
        let window = compute_window(100, 95, 12, 2_000, Duration::from_secs(1), Duration::from_secs(15));
        assert_eq!(window, Window::Empty { sleep: Duration::from_secs(15) });
    }

    #[test]
    fn window_covers_remaining_span_with_slow_timeout_when_caught_up() {
        let window = compute_window(1_000, 900, 12, 2_000, Duration::from_secs(1), Duration::from_secs(15));
        assert_eq!(
            window,
            Window::Range {
                from: 901,
                to: 988,
                sleep: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn last_processed_block_is_monotonic_across_consecutive_windows() {
        let mut last = 0u64;
        let mut watermarks = Vec::new();
        for current in [100u64, 250, 400, 400, 600] {
            match compute_window(current, last, 12, 2_000, Duration::from_secs(1), Duration::from_secs(15)) {
                Window::Range { to, .. } => {
                    last = to;
                    watermarks.push(last);
                }
                Window::Empty { .. } => watermarks.push(last),
            }
        }
        assert!(watermarks.windows(2).all(|w| w[1] >= w[0]));
    }
}
