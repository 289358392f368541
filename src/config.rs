//! Configuration for the validator: CLI args, a JSON config file, and
//! environment variable fallback/override for secrets.

use alloy_primitives::B256;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// CLI arguments for the validator process.
#[derive(Parser, Debug)]
#[command(name = "crosschain-validator")]
#[command(about = "Cross-chain swap bridge validator")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"http://localhost:8545"`
/// - Simple env var: `"$VALIDATOR_PRIVATE_KEY"`
/// - Braced env var: `"${VALIDATOR_PRIVATE_KEY}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(inner.to_string())
        } else if let Some(var_name) = s.strip_prefix('$') {
            if !var_name.is_empty() && var_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(var_name.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;
        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// A validated secp256k1 private key (32 bytes) belonging to this validator instance.
#[derive(Clone, Copy, Debug)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.into()
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("invalid validator private key: {e}"))
    }
}

/// Chain family: determines which RPC pool and scanning strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

/// Configuration for a single chain's routing contract and RPC endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainEntry {
    /// Human-readable chain name, e.g. "binance-smart-chain".
    pub name: String,
    /// The globally unique small positive integer the routing-contract protocol uses.
    pub blockchain_id: u32,
    pub family: ChainFamily,
    /// Ordered, non-empty list of RPC endpoints for this chain.
    pub rpc_urls: Vec<Url>,
    /// Routing contract address: `0x`-hex for EVM, base58 for Solana.
    pub router_address: String,
    /// Path to the routing contract's ABI JSON (ignored for Solana chains).
    #[serde(default)]
    pub abi_path: Option<PathBuf>,
    /// Routing contract creation transaction hash, used as a start-block fallback.
    #[serde(default)]
    pub creation_tx_hash: Option<String>,
    /// Operator-supplied start block; takes priority over all other rules.
    #[serde(default)]
    pub start_block: Option<u64>,
}

fn default_block_range() -> u64 {
    2_000
}

fn default_min_confirmation_blocks() -> u64 {
    12
}

fn default_scanner_timeout_fast_secs() -> u64 {
    1
}

fn default_scanner_timeout_slow_secs() -> u64 {
    15
}

fn default_dispatcher_interval_secs() -> u64 {
    10
}

fn default_txn_timeout_secs() -> u64 {
    120
}

/// Top-level validator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// This validator's display name, sent in relayer signature submissions.
    pub validator_name: String,
    /// This validator's secp256k1 signing key (literal hex or `$ENV_VAR`).
    pub validator_private_key: LiteralOrEnv<EvmPrivateKey>,
    /// Base URL of the relayer signature-aggregation endpoint.
    pub relayer_url: Url,
    /// Shared-secret query parameter required by the relayer API.
    pub private_password: LiteralOrEnv<StringKey>,
    /// Webhook URL the notifier posts error summaries to.
    #[serde(default)]
    pub telegram_backend_url: Option<Url>,
    /// Max blocks fetched in a single `getLogs` call while catching up.
    #[serde(default = "default_block_range")]
    pub block_range: u64,
    /// Default reorg-margin fallback used when a chain doesn't expose its own.
    #[serde(default = "default_min_confirmation_blocks")]
    pub default_min_confirmation_blocks: u64,
    /// Tight-loop sleep while still catching up.
    #[serde(default = "default_scanner_timeout_fast_secs")]
    pub scanner_timeout_fast_secs: u64,
    /// Sleep when caught up to the confirmed tip.
    #[serde(default = "default_scanner_timeout_slow_secs")]
    pub scanner_timeout_slow_secs: u64,
    /// Relayer dispatcher poll interval.
    #[serde(default = "default_dispatcher_interval_secs")]
    pub dispatcher_interval_secs: u64,
    /// Bound on `wait_for_receipt` polling.
    #[serde(default = "default_txn_timeout_secs")]
    pub txn_timeout_secs: u64,
    /// `blockchain_id`s whose transit-token amount uses 6 decimals instead of 18.
    #[serde(default)]
    pub six_decimal_chain_ids: Vec<u32>,
    /// Postgres connection string for the durable store.
    pub database_url: LiteralOrEnv<StringKey>,
    /// The set of chains this instance scans.
    pub chains: Vec<ChainEntry>,
}

/// A plain string newtype so it can participate in `LiteralOrEnv<T: FromStr>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringKey(pub String);

impl FromStr for StringKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StringKey(s.to_string()))
    }
}

impl Config {
    pub fn six_decimal_chains(&self) -> &[u32] {
        &self.six_decimal_chain_ids
    }

    /// Returns `true` if the signer should sign as though `chain_id` uses 6 decimals.
    pub fn is_six_decimal_chain(&self, chain_id: u32) -> bool {
        self.six_decimal_chain_ids.contains(&chain_id)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("failed to resolve config path {0}: {1}")]
    Canonicalize(PathBuf, std::io::Error),
}

impl Config {
    /// Load configuration from CLI arguments and a JSON file.
    ///
    /// The config file path is determined by `--config <path>` (or the
    /// `CONFIG` env var), defaulting to `./config.json`. Values inside the
    /// file may reference environment variables via `LiteralOrEnv`.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::Canonicalize(cli_args.config.clone(), e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_or_env_accepts_literal_hex_key() {
        let json = "\"0xe7f76474dcedbd059dfa63c0bcf1ea2d93af0927d7363e6df8a726477d15fd06\"";
        let parsed: LiteralOrEnv<EvmPrivateKey> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.inner().as_bytes().len(), 32);
    }

    #[test]
    fn literal_or_env_resolves_braced_env_var() {
        // Safety: test-only, not run concurrently with other env mutation in this module.
        unsafe {
            std::env::set_var(
                "TEST_VALIDATOR_KEY",
                "0xe7f76474dcedbd059dfa63c0bcf1ea2d93af0927d7363e6df8a726477d15fd06",
            );
        }
        let json = "\"${TEST_VALIDATOR_KEY}\"";
        let parsed: LiteralOrEnv<EvmPrivateKey> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.inner().as_bytes()[0], 0xe7);
    }

    #[test]
    fn literal_or_env_missing_env_var_errors() {
        let json = "\"$TOTALLY_UNSET_VARIABLE_XYZ\"";
        let parsed: Result<LiteralOrEnv<EvmPrivateKey>, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn is_six_decimal_chain_checks_membership() {
        let config = sample_config();
        assert!(config.is_six_decimal_chain(5));
        assert!(!config.is_six_decimal_chain(1));
    }

    fn sample_config() -> Config {
        Config {
            validator_name: "test-validator".into(),
            validator_private_key: LiteralOrEnv(
                EvmPrivateKey::from_str(
                    "0xe7f76474dcedbd059dfa63c0bcf1ea2d93af0927d7363e6df8a726477d15fd06",
                )
                .unwrap(),
            ),
            relayer_url: Url::parse("https://relayer.example.com").unwrap(),
            private_password: LiteralOrEnv(StringKey("secret".into())),
            telegram_backend_url: None,
            block_range: 2_000,
            default_min_confirmation_blocks: 12,
            scanner_timeout_fast_secs: 1,
            scanner_timeout_slow_secs: 15,
            dispatcher_interval_secs: 10,
            txn_timeout_secs: 120,
            six_decimal_chain_ids: vec![5],
            database_url: LiteralOrEnv(StringKey("postgres://localhost/test".into())),
            chains: vec![],
        }
    }
}
