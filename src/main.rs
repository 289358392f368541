use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crosschain_validator::config::{ChainFamily, Config};
use crosschain_validator::dispatcher::Dispatcher;
use crosschain_validator::error::ValidatorError;
use crosschain_validator::hashing;
use crosschain_validator::notifier::Notifier;
use crosschain_validator::registry::{ContractRegistry, RoutingContract};
use crosschain_validator::rpc::{EvmRpcPool, RpcPool, SolanaRpcPool};
use crosschain_validator::scanner::Scanner;
use crosschain_validator::signer::Signer;
use crosschain_validator::store::PgStore;
use crosschain_validator::supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    crosschain_validator::telemetry::init();

    let config = Config::load()?;
    tracing::info!(validator = %config.validator_name, chains = config.chains.len(), "starting validator");

    let store = Arc::new(PgStore::connect(&config.database_url.inner().0).await?);
    store.run_migrations().await?;

    let mut pools: HashMap<u32, Arc<dyn RpcPool>> = HashMap::new();
    let mut contracts = Vec::with_capacity(config.chains.len());
    for chain in &config.chains {
        let pool: Arc<dyn RpcPool> = match chain.family {
            ChainFamily::Evm => Arc::new(EvmRpcPool::new(chain.name.clone(), &chain.rpc_urls)),
            ChainFamily::Solana => Arc::new(SolanaRpcPool::new(chain.name.clone(), &chain.rpc_urls)),
        };
        pools.insert(chain.blockchain_id, pool);

        let abi = match &chain.abi_path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    ValidatorError::Config(crosschain_validator::config::ConfigError::FileRead(
                        path.clone(),
                        e,
                    ))
                })?;
                serde_json::from_str(&raw)?
            }
            None => alloy_json_abi::JsonAbi::new(),
        };

        contracts.push(RoutingContract {
            chain_name: chain.name.clone(),
            blockchain_id: chain.blockchain_id,
            address: chain.router_address.clone(),
            is_solana: chain.family == ChainFamily::Solana,
            abi,
            creation_tx_hash: chain.creation_tx_hash.clone(),
            start_block: chain.start_block,
        });
    }

    let registry = Arc::new(ContractRegistry::new(contracts)?);
    let notifier = Arc::new(Notifier::new(config.telegram_backend_url.clone()));
    let validator_signer = Arc::new(hashing::signer_from_key(config.validator_private_key.inner())?);

    let signer = Arc::new(Signer::new(
        store.clone(),
        registry.clone(),
        validator_signer,
        notifier.clone(),
        config.six_decimal_chain_ids.clone(),
    ));

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone())?;

    let mut handles = Vec::new();

    handles.push(tokio::spawn(notifier.clone().run(shutdown.clone())));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        registry.clone(),
        pools.clone(),
        notifier.clone(),
        config.validator_name.clone(),
        config.relayer_url.clone(),
        config.private_password.inner().0.clone(),
        Duration::from_secs(config.dispatcher_interval_secs),
    ));
    handles.push(tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            supervisor::supervise("dispatcher", shutdown, |token| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.run(token).await }
            })
            .await;
        }
    }));

    for chain in &config.chains {
        let pool = pools
            .get(&chain.blockchain_id)
            .expect("pool constructed above for every configured chain")
            .clone();
        let scanner = Arc::new(Scanner::new(
            chain.name.clone(),
            pool,
            registry.clone(),
            signer.clone(),
            store.clone(),
            config.block_range,
            config.default_min_confirmation_blocks,
            Duration::from_secs(config.scanner_timeout_fast_secs),
            Duration::from_secs(config.scanner_timeout_slow_secs),
        ));
        let chain_name = chain.name.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            supervisor::supervise(&chain_name, shutdown, |token| {
                let scanner = scanner.clone();
                async move { scanner.run(token).await }
            })
            .await;
        }));
    }

    shutdown.cancelled().await;
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("validator shut down cleanly");
    Ok(())
}

fn spawn_shutdown_listener(token: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => token.cancel(),
            _ = sigint.recv() => token.cancel(),
        }
    });
    Ok(())
}
