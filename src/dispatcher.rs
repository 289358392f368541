//! Relayer Dispatcher: the periodic task that forwards collected signatures
//! to the external relayer and retires swaps the destination contract has
//! already settled.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::abi::ProcessedState;
use crate::notifier::Notifier;
use crate::registry::ContractRegistry;
use crate::rpc::RpcPool;
use crate::store::{Store, StoreError, SwapStatus, ValidatorSwap};

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct SignaturePayload<'a> {
    #[serde(rename = "validatorName")]
    validator_name: &'a str,
    signature: &'a str,
    #[serde(rename = "fromContractNum")]
    from_contract_num: u32,
    #[serde(rename = "fromTxHash")]
    from_tx_hash: &'a str,
    #[serde(rename = "eventName")]
    event_name: &'a str,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    registry: Arc<ContractRegistry>,
    pools: std::collections::HashMap<u32, Arc<dyn RpcPool>>,
    notifier: Arc<Notifier>,
    validator_name: String,
    relayer_url: Url,
    private_password: String,
    client: reqwest::Client,
    interval: Duration,
    /// `blockchain_id`s already flagged paused to the notifier, so a
    /// still-paused contract doesn't re-warn on every tick.
    warned_paused: Mutex<HashSet<u32>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ContractRegistry>,
        pools: std::collections::HashMap<u32, Arc<dyn RpcPool>>,
        notifier: Arc<Notifier>,
        validator_name: String,
        relayer_url: Url,
        private_password: String,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            pools,
            notifier,
            validator_name,
            relayer_url,
            private_password,
            client: reqwest::Client::new(),
            interval,
            warned_paused: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the dispatch loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DispatcherError> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
            self.process_tick().await?;
        }
    }

    /// Claims and processes exactly one dispatchable swap. Looping this
    /// until `claim_next_dispatchable` returns `None` drains everything
    /// currently eligible in a single tick.
    async fn process_tick(&self) -> Result<(), DispatcherError> {
        self.warn_on_paused_contracts().await;
        while let Some(swap) = self.store.claim_next_dispatchable().await? {
            self.process_swap(&swap).await;
        }
        Ok(())
    }

    /// `paused()` is an operator-visible warning only (spec.md §9 design
    /// note), never a signing or dispatch gate: a paused routing contract
    /// still accumulates signed swaps, it just can't release funds until an
    /// operator unpauses it.
    async fn warn_on_paused_contracts(&self) {
        for contract in self.registry.all() {
            if contract.is_solana {
                continue;
            }
            let Some(pool) = self.pools.get(&contract.blockchain_id) else {
                continue;
            };
            match self
                .registry
                .paused(pool.as_ref(), contract.blockchain_id)
                .await
            {
                Ok(true) => {
                    let mut warned = self.warned_paused.lock().await;
                    if warned.insert(contract.blockchain_id) {
                        drop(warned);
                        self.notifier
                            .notify(
                                "RoutingContractPaused",
                                &[
                                    ("chain", contract.chain_name.clone()),
                                    ("blockchain_id", contract.blockchain_id.to_string()),
                                ],
                                None,
                            )
                            .await;
                    }
                }
                Ok(false) | Err(_) => {}
            }
        }
    }

    async fn process_swap(&self, swap: &ValidatorSwap) {
        let destination_id = swap.destination_blockchain_id as u32;
        let Some(pool) = self.pools.get(&destination_id) else {
            tracing::warn!(swap_id = %swap.id, destination_id, "no rpc pool for destination chain");
            return;
        };

        let processed = self
            .registry
            .processed_transactions(pool.as_ref(), destination_id, &swap.original_tx_hash)
            .await;

        match processed {
            Ok(ProcessedState::Processed) | Ok(ProcessedState::Reverted) => {
                // Settled or cancelled by another validator: terminal without
                // ever POSTing to the relayer (spec.md §3 ownership: the
                // dispatcher writes SUCCESS on reconciliation, distinct from
                // the SIGNATURE_SEND a successful relayer POST produces below).
                if let Err(err) = self
                    .store
                    .mark_status(swap.id, SwapStatus::Success, None)
                    .await
                {
                    tracing::warn!(swap_id = %swap.id, error = %err, "failed to mark swap terminal");
                }
                return;
            }
            Ok(ProcessedState::NotProcessed) => {}
            Err(err) => {
                tracing::warn!(swap_id = %swap.id, error = %err, "processedTransactions read failed, leaving swap for next tick");
                return;
            }
        }

        let Some(signature) = &swap.signature else {
            return;
        };

        let event_name = swap
            .event_data
            .get("eventName")
            .and_then(|v| v.as_str())
            .unwrap_or("TransferTokensToOtherBlockchainUser");

        let payload = SignaturePayload {
            validator_name: &self.validator_name,
            signature,
            from_contract_num: swap.source_blockchain_id as u32,
            from_tx_hash: &swap.original_tx_hash,
            event_name,
        };

        let mut url = self.relayer_url.clone();
        url.set_path(&format!(
            "{}/api/trades/signatures/",
            url.path().trim_end_matches('/')
        ));
        url.query_pairs_mut().append_pair("password", &self.private_password);

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                if let Err(err) = self
                    .store
                    .mark_status(swap.id, SwapStatus::SignatureSend, None)
                    .await
                {
                    tracing::warn!(swap_id = %swap.id, error = %err, "failed to mark swap dispatched");
                }
            }
            Ok(response) => {
                tracing::warn!(swap_id = %swap.id, status = %response.status(), "relayer rejected signature, retrying next tick");
            }
            Err(err) => {
                tracing::warn!(swap_id = %swap.id, error = %err, "relayer post failed, retrying next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relayer_url_path_is_built_from_base() {
        let base = Url::parse("https://relayer.example.com").unwrap();
        let mut url = base.clone();
        url.set_path(&format!("{}/api/trades/signatures/", url.path().trim_end_matches('/')));
        url.query_pairs_mut().append_pair("password", "secret");
        assert_eq!(
            url.as_str(),
            "https://relayer.example.com/api/trades/signatures/?password=secret"
        );
    }
}
