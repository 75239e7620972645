use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which tiers hold a credential's ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Blob,
    Hybrid,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Local => "local",
            StorageType::Blob => "blob",
            StorageType::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(StorageType::Local),
            "blob" => Some(StorageType::Blob),
            "hybrid" => Some(StorageType::Hybrid),
            _ => None,
        }
    }

    /// Whether the blob tier is expected to hold the ciphertext.
    pub fn uses_blob(&self) -> bool {
        matches!(self, StorageType::Blob | StorageType::Hybrid)
    }
}

/// Lifecycle of an issued credential. `Expired` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Expired,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "expired" => Some(CredentialStatus::Expired),
            "revoked" => Some(CredentialStatus::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuanceStatus {
    Pending,
    Issued,
    Rejected,
    Expired,
}

impl IssuanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuanceStatus::Pending => "pending",
            IssuanceStatus::Issued => "issued",
            IssuanceStatus::Rejected => "rejected",
            IssuanceStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IssuanceStatus::Pending),
            "issued" => Some(IssuanceStatus::Issued),
            "rejected" => Some(IssuanceStatus::Rejected),
            "expired" => Some(IssuanceStatus::Expired),
            _ => None,
        }
    }
}

/// Template a credential is issued against. Immutable once referenced by an
/// issued credential, except for `is_active` (soft retirement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialType {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub schema_version: String,
    pub schema_definition: Value,
    pub issuer_pattern: Option<String>,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub validation_rules: Option<Value>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An issued credential. `credential_data` is the envelope string, or None
/// when the ciphertext lives only in the blob tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub user_address: String,
    pub credential_type_id: String,
    pub issuer_address: String,
    pub issuer_name: Option<String>,
    pub credential_data: Option<String>,
    pub credential_hash: String,
    pub proof_signature: Option<String>,
    pub status: CredentialStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<Value>,
    pub storage_type: StorageType,
    pub blob_hash: Option<String>,
    pub chain_block_ref: Option<String>,
    pub chain_extrinsic_ref: Option<String>,
}

/// Grants a third address read/verify access to one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialShare {
    pub id: String,
    pub credential_id: String,
    pub shared_with_address: String,
    pub shared_by_address: String,
    pub permissions: Vec<String>,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Immutable attestation record a verifier leaves against one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialVerification {
    pub id: String,
    pub credential_id: String,
    pub verifier_address: String,
    pub verification_type: String,
    pub verification_data: Option<Value>,
    pub status: String,
    pub verified_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Holder-initiated request for an issuer to issue a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceRequest {
    pub id: String,
    pub requester_address: String,
    pub issuer_address: String,
    pub credential_type_id: String,
    pub request_data: Value,
    pub status: IssuanceStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub issued_credential_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a revocation event, 1:1 with a credential's
/// transition to `revoked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRevocation {
    pub id: String,
    pub credential_id: String,
    pub revoked_by_address: String,
    pub reason: Option<String>,
    pub revoked_at: DateTime<Utc>,
}

// Request payloads, mapped 1:1 from the HTTP layer.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredentialTypeRequest {
    pub name: String,
    pub description: Option<String>,
    pub schema_version: String,
    pub schema_definition: Value,
    pub issuer_pattern: Option<String>,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
    pub validation_rules: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredentialRequest {
    pub credential_type_id: String,
    pub credential_data: Value,
    pub issuer_name: Option<String>,
    pub proof_signature: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
    #[serde(default = "default_storage_preference")]
    pub storage_preference: StorageType,
    #[serde(default)]
    pub store_on_chain: bool,
}

fn default_storage_preference() -> StorageType {
    StorageType::Local
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareCredentialRequest {
    pub credential_id: String,
    pub shared_with_address: String,
    pub permissions: Vec<String>,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCredentialRequest {
    pub credential_id: String,
    pub verification_type: String,
    pub verification_data: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssuanceRequest {
    pub issuer_address: String,
    pub credential_type_id: String,
    pub request_data: Value,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate counts reported by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total: i64,
    pub local: i64,
    pub blob: i64,
    pub hybrid: i64,
    pub chain_anchored: i64,
    pub with_blob_hash: i64,
}
