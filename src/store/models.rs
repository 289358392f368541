//! Durable-store row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// A raw transaction observed on a source chain, keyed by its hash and the
/// chain that produced it. One row per `(chain_name, tx_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub chain_name: String,
    pub blockchain_id: i64,
    pub tx_hash: String,
    pub block_number: i64,
    /// Raw decoded calldata, shaped by [`crate::value::Value`].
    pub data: Json,
    pub created_at: DateTime<Utc>,
}

/// Ordered swap lifecycle, spec.md §3: `CREATED < WAITING_FOR_DATA <
/// SIGNATURE_CREATED < SIGNATURE_SEND < SUCCESS`. Stored as its integer
/// discriminant so ordering comparisons (`status >= SignatureCreated`) are
/// plain SQL.
///
/// `Created`/`WaitingForData` are never durably observed in this
/// implementation: the Signer only calls [`crate::store::Store::insert_swap`]
/// once it already holds a computed signature, so a row's first write is
/// always at `SignatureCreated`. Both variants are kept so the type names the
/// full state machine spec.md describes; see DESIGN.md's Open Question notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[repr(i32)]
pub enum SwapStatus {
    Created = 0,
    WaitingForData = 1,
    SignatureCreated = 2,
    SignatureSend = 3,
    Success = 4,
}

impl SwapStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Created),
            1 => Some(Self::WaitingForData),
            2 => Some(Self::SignatureCreated),
            3 => Some(Self::SignatureSend),
            4 => Some(Self::Success),
            _ => None,
        }
    }
}

/// A reconstructed swap awaiting (or past) signature and dispatch.
///
/// `transaction_id` is unique: a source transaction produces at most one
/// validator swap, enforced at the schema level.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ValidatorSwap {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub source_blockchain_id: i64,
    pub destination_blockchain_id: i64,
    pub recipient_address: String,
    pub amount: String,
    pub original_tx_hash: String,
    pub packed_hash: Option<String>,
    pub signature: Option<String>,
    /// Full reconstructed event payload, for audit and relayer dispatch.
    pub event_data: Json,
    pub status: i32,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValidatorSwap {
    pub fn status(&self) -> SwapStatus {
        SwapStatus::from_i32(self.status).unwrap_or(SwapStatus::Created)
    }
}
