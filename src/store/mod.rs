//! Durable storage: transactions, reconstructed swaps, and per-chain scan
//! checkpoints, backed by Postgres.

pub mod models;

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub use models::{SwapStatus, Transaction, ValidatorSwap};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("no validator swap with id {0}")]
    SwapNotFound(Uuid),
}

/// Persistence surface the Scanner, Signer and Relayer Dispatcher depend on.
/// A trait (rather than a bare `PgStore`) so tests can swap in an in-memory
/// fake without a live database.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, StoreError>;

    async fn find_transaction(
        &self,
        chain_name: &str,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Overwrites a transaction's decoded calldata. Used once, by the Signer,
    /// to persist the Solana address-rewriting of `second_path` (spec.md
    /// §4.4(d)) once the destination chain is known — which is after the
    /// transaction row has already been materialised.
    async fn update_transaction_data(&self, transaction_id: Uuid, data: Json) -> Result<(), StoreError>;

    async fn insert_swap(&self, swap: NewValidatorSwap) -> Result<ValidatorSwap, StoreError>;

    async fn find_swap_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ValidatorSwap>, StoreError>;

    async fn mark_signed(
        &self,
        swap_id: Uuid,
        packed_hash: &str,
        signature: &str,
    ) -> Result<(), StoreError>;

    async fn mark_status(
        &self,
        swap_id: Uuid,
        status: SwapStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Claims the next swap ready for relayer dispatch. spec.md §4.5 asks for
    /// a non-blocking `SELECT ... FOR UPDATE NOWAIT` held across the whole
    /// dispatch (reconciliation read + relayer POST + status write); holding
    /// a `sqlx` transaction open across an outbound HTTP call for the
    /// relayer POST would tie up a pool connection for the duration of a
    /// network round-trip, so this is expressed instead as a single atomic
    /// `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP LOCKED) ... RETURNING`
    /// that stamps a `claimed_at` lease in the same statement that selects
    /// the row: two dispatcher workers racing the same tick can never claim
    /// the same swap, and a worker that dies mid-dispatch simply leaves a
    /// stale lease that the next claim (past the 30s lease window) is free
    /// to retake — safe because the relayer POST is idempotent.
    /// Returns `Ok(None)` when nothing is eligible or unleased right now.
    async fn claim_next_dispatchable(&self) -> Result<Option<ValidatorSwap>, StoreError>;

    async fn get_checkpoint(&self, chain_name: &str) -> Result<Option<u64>, StoreError>;

    async fn set_checkpoint(&self, chain_name: &str, block_number: u64) -> Result<(), StoreError>;

    /// The highest `block_number` among transactions already stored for
    /// `chain_name`, used as the second rule in the scanner's start-block
    /// cascade (spec.md §4.3).
    async fn max_transaction_block(&self, chain_name: &str) -> Result<Option<u64>, StoreError>;
}

pub struct NewTransaction {
    pub chain_name: String,
    pub blockchain_id: u32,
    pub tx_hash: String,
    pub block_number: u64,
    pub data: Json,
}

pub struct NewValidatorSwap {
    pub transaction_id: Uuid,
    pub source_blockchain_id: u32,
    pub destination_blockchain_id: u32,
    pub recipient_address: String,
    pub amount: String,
    pub original_tx_hash: String,
    pub event_data: Json,
}

/// `sqlx`-backed implementation of [`Store`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, StoreError> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, chain_name, blockchain_id, tx_hash, block_number, data, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            ON CONFLICT (chain_name, tx_hash) DO UPDATE SET block_number = EXCLUDED.block_number
            RETURNING id, chain_name, blockchain_id, tx_hash, block_number, data, created_at
            "#,
        )
        .bind(&tx.chain_name)
        .bind(tx.blockchain_id as i64)
        .bind(&tx.tx_hash)
        .bind(tx.block_number as i64)
        .bind(&tx.data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_transaction(
        &self,
        chain_name: &str,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, Transaction>(
            "SELECT id, chain_name, blockchain_id, tx_hash, block_number, data, created_at
             FROM transactions WHERE chain_name = $1 AND tx_hash = $2",
        )
        .bind(chain_name)
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_transaction_data(&self, transaction_id: Uuid, data: Json) -> Result<(), StoreError> {
        sqlx::query("UPDATE transactions SET data = $2 WHERE id = $1")
            .bind(transaction_id)
            .bind(&data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_swap(&self, swap: NewValidatorSwap) -> Result<ValidatorSwap, StoreError> {
        let row = sqlx::query_as::<_, ValidatorSwap>(
            r#"
            INSERT INTO validator_swaps (
                id, transaction_id, source_blockchain_id, destination_blockchain_id,
                recipient_address, amount, original_tx_hash, packed_hash, signature,
                event_data, status, attempts, last_error, created_at, updated_at
            )
            VALUES (
                gen_random_uuid(), $1, $2, $3, $4, $5, $6, NULL, NULL, $7, 0, 0, NULL, now(), now()
            )
            ON CONFLICT (transaction_id) DO UPDATE SET updated_at = validator_swaps.updated_at
            RETURNING id, transaction_id, source_blockchain_id, destination_blockchain_id,
                      recipient_address, amount, original_tx_hash, packed_hash, signature,
                      event_data, status, attempts, last_error, created_at, updated_at
            "#,
        )
        .bind(swap.transaction_id)
        .bind(swap.source_blockchain_id as i64)
        .bind(swap.destination_blockchain_id as i64)
        .bind(&swap.recipient_address)
        .bind(&swap.amount)
        .bind(&swap.original_tx_hash)
        .bind(&swap.event_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_swap_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<ValidatorSwap>, StoreError> {
        let row = sqlx::query_as::<_, ValidatorSwap>(
            "SELECT id, transaction_id, source_blockchain_id, destination_blockchain_id,
                    recipient_address, amount, original_tx_hash, packed_hash, signature,
                    event_data, status, attempts, last_error, created_at, updated_at
             FROM validator_swaps WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_signed(
        &self,
        swap_id: Uuid,
        packed_hash: &str,
        signature: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE validator_swaps
             SET packed_hash = $2, signature = $3, status = $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(swap_id)
        .bind(packed_hash)
        .bind(signature)
        .bind(SwapStatus::SignatureCreated.as_i32())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_status(
        &self,
        swap_id: Uuid,
        status: SwapStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE validator_swaps
             SET status = $2, last_error = $3, attempts = attempts + 1, updated_at = now()
             WHERE id = $1",
        )
        .bind(swap_id)
        .bind(status.as_i32())
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_next_dispatchable(&self) -> Result<Option<ValidatorSwap>, StoreError> {
        let swap = sqlx::query_as::<_, ValidatorSwap>(
            "UPDATE validator_swaps
             SET claimed_at = now()
             WHERE id = (
                 SELECT id FROM validator_swaps
                 WHERE status = $1 AND (claimed_at IS NULL OR claimed_at < now() - INTERVAL '30 seconds')
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, transaction_id, source_blockchain_id, destination_blockchain_id,
                       recipient_address, amount, original_tx_hash, packed_hash, signature,
                       event_data, status, attempts, last_error, created_at, updated_at",
        )
        .bind(SwapStatus::SignatureCreated.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        Ok(swap)
    }

    async fn get_checkpoint(&self, chain_name: &str) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT last_block FROM scan_checkpoints WHERE chain_name = $1")
            .bind(chain_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("last_block") as u64))
    }

    async fn set_checkpoint(&self, chain_name: &str, block_number: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scan_checkpoints (chain_name, last_block, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (chain_name) DO UPDATE SET last_block = EXCLUDED.last_block, updated_at = now()",
        )
        .bind(chain_name)
        .bind(block_number as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn max_transaction_block(&self, chain_name: &str) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT max(block_number) AS m FROM transactions WHERE chain_name = $1")
            .bind(chain_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("m")?.map(|v| v as u64))
    }
}
