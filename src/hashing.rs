//! Packed-hash computation and Ethereum personal-message signing.
//!
//! The destination routing contract is the source of truth for the hash it
//! expects (`getHashPacked`, called over RPC — see [`crate::registry`]); the
//! one case where no such contract read exists is a Solana destination,
//! where the hash is reproduced locally using the same layout the on-chain
//! program verifies against.

use alloy_primitives::{B256, U256, keccak256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;

use crate::config::EvmPrivateKey;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid validator private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Sign(String),
}

/// Builds the `alloy-signer-local` signer for this process's validator key.
pub fn signer_from_key(key: &EvmPrivateKey) -> Result<PrivateKeySigner, SigningError> {
    PrivateKeySigner::from_bytes(&key.as_b256())
        .map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Computes the packed hash for a Solana destination locally:
/// `keccak256(pubkey(32) ∥ amount_u64_le(8) ∥ tx_hash(32) ∥ src_blockchain_id_u64_le(8))`.
pub fn solana_packed_hash(
    destination_pubkey: &[u8; 32],
    transit_token_amount: u64,
    original_tx_hash: B256,
    source_blockchain_id: u64,
) -> B256 {
    let mut preimage = Vec::with_capacity(32 + 8 + 32 + 8);
    preimage.extend_from_slice(destination_pubkey);
    preimage.extend_from_slice(&transit_token_amount.to_le_bytes());
    preimage.extend_from_slice(original_tx_hash.as_slice());
    preimage.extend_from_slice(&source_blockchain_id.to_le_bytes());
    keccak256(preimage)
}

/// Ethereum "personal message" hash: `keccak256("\x19Ethereum Signed Message:\n32" ∥ hash)`.
pub fn personal_message_hash(hash: B256) -> B256 {
    let mut preimage = Vec::with_capacity(26 + 32);
    preimage.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    preimage.extend_from_slice(hash.as_slice());
    keccak256(preimage)
}

/// Signs `hash` as a personal message, returning 65 raw bytes `r ∥ s ∥ v`
/// rendered as a lowercase hex string with no `0x` prefix.
pub async fn sign_packed_hash(
    signer: &PrivateKeySigner,
    hash: B256,
) -> Result<String, SigningError> {
    let digest = personal_message_hash(hash);
    let signature = signer
        .sign_hash(&digest)
        .await
        .map_err(|e| SigningError::Sign(e.to_string()))?;
    Ok(hex::encode(signature.as_bytes()))
}

/// `floor(x / 10^12)`, used when moving a transit-token amount from an
/// 18-decimal chain to a 6-decimal one.
pub fn scale_down_to_six_decimals(amount: U256) -> U256 {
    amount / U256::from(1_000_000_000_000u64)
}

/// `x * 10^12`, used when moving a transit-token amount from a 6-decimal
/// chain to an 18-decimal one.
pub fn scale_up_to_eighteen_decimals(amount: U256) -> U256 {
    amount * U256::from(1_000_000_000_000u64)
}

/// Applies the `SIX_DECIMAL_CHAINS` normalisation rule (spec.md §4.4(e)).
pub fn normalise_decimals(
    amount: U256,
    source_is_six_decimal: bool,
    destination_is_six_decimal: bool,
) -> U256 {
    if destination_is_six_decimal && !source_is_six_decimal {
        scale_down_to_six_decimals(amount)
    } else if source_is_six_decimal && !destination_is_six_decimal {
        scale_up_to_eighteen_decimals(amount)
    } else {
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn golden_vector_s1_evm_to_evm_sign() {
        let key = EvmPrivateKey::from_str(
            "0xe7f76474dcedbd059dfa63c0bcf1ea2d93af0927d7363e6df8a726477d15fd06",
        )
        .unwrap();
        let signer = signer_from_key(&key).unwrap();
        let packed_hash = B256::from_str(
            "0x4c752a5fbbf4987b78226a0310db6a46d6643b500c90da34e59e61bbbcd4150e",
        )
        .unwrap();
        let signature = sign_packed_hash(&signer, packed_hash).await.unwrap();
        assert_eq!(
            signature,
            "11e90d07562b9ed33d422306fbf8817cb733adb29a34187c5d5dcca973e643ea6b5453003f8274a38d57df463b6dc872169e446de374e9a020add6e5e35dbcff1b"
        );
    }

    #[test]
    fn decimals_round_trip_for_values_divisible_by_1e12() {
        let x = U256::from(31_000_000_000_000u64);
        let down_then_up = normalise_decimals(normalise_decimals(x, false, true), true, false);
        assert_eq!(down_then_up, x);
    }

    #[test]
    fn decimals_unchanged_when_neither_side_is_six_decimal() {
        let x = U256::from(31_682_537_311u64);
        assert_eq!(normalise_decimals(x, false, false), x);
    }

    #[test]
    fn solana_packed_hash_is_deterministic() {
        let pubkey = [0x11u8; 32];
        let tx_hash = B256::ZERO;
        let a = solana_packed_hash(&pubkey, 100, tx_hash, 7);
        let b = solana_packed_hash(&pubkey, 100, tx_hash, 7);
        assert_eq!(a, b);
    }
}
