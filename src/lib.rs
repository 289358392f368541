//! Validator-side event scanner and signing pipeline for a cross-chain swap bridge.
//!
//! A validator watches a fixed set of routing contracts (one per supported
//! chain) for swap-initiation events, reconstructs the exact parameters the
//! destination contract will hash, signs that hash, and forwards the
//! signature to a relayer.
//!
//! # Modules
//!
//! - [`config`] — configuration loading (CLI, JSON file, env var fallback).
//! - [`error`] — top-level error type unifying module errors.
//! - [`rpc`] — per-chain RPC provider pool with cursor-based failover.
//! - [`registry`] — contract registry: `blockchain_id` → routing contract.
//! - [`abi`] — generated bindings for the routing contract.
//! - [`value`] — tagged-union representation of decoded ABI values.
//! - [`store`] — durable storage for `Transaction` and `ValidatorSwap`.
//! - [`scanner`] — per-chain block-range scan loop.
//! - [`signer`] — swap parameter reconstruction and signing.
//! - [`hashing`] — packed-hash computation and Ethereum personal-message signing.
//! - [`dispatcher`] — relayer dispatch loop.
//! - [`notifier`] — best-effort error notification webhook.
//! - [`telemetry`] — tracing initialization.
//! - [`supervisor`] — restart-on-error wrapper for long-lived workers.

pub mod abi;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hashing;
pub mod notifier;
pub mod registry;
pub mod rpc;
pub mod scanner;
pub mod signer;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod value;
