use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a payload is laid down on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStrategy {
    /// One remark transaction per chunk, submitted sequentially.
    RemarkChunks,
    /// All chunks wrapped in a single atomic multi-call transaction.
    Batch,
    /// Whole payload in one remark; only valid for small payloads.
    SingleMarker,
}

/// The anchored proof that a credential's ciphertext existed at a point in
/// chain history. Derived data: never mutated, re-derivable by re-scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReference {
    pub user_address: String,
    pub blob_hash: String,
    pub credential_hash: String,
    pub timestamp: DateTime<Utc>,
    pub block_hash: String,
    pub extrinsic_hash: String,
}

/// Terminal-or-pending state of a monitored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Pending,
    Finalized,
    Failed,
    Invalid,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxState::Pending)
    }
}

/// Ephemeral, in-memory status of one monitoring session. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub hash: String,
    pub status: TxState,
    pub block_hash: Option<String>,
    pub block_number: Option<u64>,
    pub events: Option<Vec<Value>>,
    pub error: Option<String>,
}

impl TransactionStatus {
    pub fn pending(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            status: TxState::Pending,
            block_hash: None,
            block_number: None,
            events: None,
            error: None,
        }
    }
}

/// Result of an anchor write: the data hash the payload is retrievable
/// under, plus every transaction hash that carried a piece of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub data_hash: String,
    pub tx_hashes: Vec<String>,
    pub block_hash: Option<String>,
    pub chunk_count: u32,
}

/// A "remarked" event pulled out of a block during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemarkEvent {
    pub block_number: u64,
    pub block_hash: String,
    pub extrinsic_hash: String,
    pub remark: String,
}
