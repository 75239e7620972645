use thiserror::Error;

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Error taxonomy for the storage engine.
///
/// `Validation` on write input and tier exhaustion on read are the only
/// failures surfaced hard to callers; everything else is degraded or
/// collected along the way (see the hybrid service and integrity verifier).
#[derive(Debug, Error)]
pub enum CredentialError {
    // Malformed, oversized or schema-violating input
    #[error("Validation Error: {0}")]
    Validation(String),

    // Envelope could not be produced or parsed
    #[error("Encryption Error: {0}")]
    Encryption(String),

    // Authentication tag mismatch, truncated envelope, hash mismatch
    #[error("Integrity Error: {0}")]
    Integrity(String),

    // Blob tier unreachable or rejected the operation
    #[error("Storage Error: {0}")]
    Storage(String),

    // RPC failure, nonce conflict, dispatch failure
    #[error("Chain Error: {0}")]
    Chain(String),

    // A deadline expired mid-operation (RPC round trip). The monitor's own
    // retry/wall-clock exhaustion is reported as a Failed status instead,
    // so its caller keeps the last observation.
    #[error("Timeout Error: {0}")]
    Timeout(String),

    #[error("Database Error: {0}")]
    Database(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Not Found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for CredentialError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => CredentialError::NotFound("row not found".to_string()),
            other => CredentialError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(error: serde_json::Error) -> Self {
        CredentialError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for CredentialError {
    fn from(error: reqwest::Error) -> Self {
        CredentialError::Storage(error.to_string())
    }
}
