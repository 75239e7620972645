use crate::constant::MAX_CREDENTIAL_DATA_BYTES;
use crate::db::store::CredentialStore;
use crate::models::{
    CreateCredentialRequest, CreateCredentialTypeRequest, CreateIssuanceRequest, Credential,
    CredentialRevocation, CredentialShare, CredentialStatus, CredentialType,
    CredentialVerification, IssuanceRequest, IssuanceStatus, ShareCredentialRequest, StorageType,
    VerifyCredentialRequest,
};
use crate::utils::crypto::{hash_credential_data, EncryptionEnvelope};
use crate::utils::errors::{CredentialError, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Credential lifecycle over the local tier: issuance, sharing,
/// verification records, revocation, issuance requests and the expiry
/// sweep. Payloads are hashed over plaintext and encrypted before they ever
/// reach the store; callers never see ciphertext through this API except as
/// the opaque envelope column.
pub struct CredentialService {
    store: CredentialStore,
    envelope: Arc<EncryptionEnvelope>,
}

impl CredentialService {
    pub fn new(store: CredentialStore, envelope: Arc<EncryptionEnvelope>) -> Self {
        Self { store, envelope }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn envelope(&self) -> &Arc<EncryptionEnvelope> {
        &self.envelope
    }

    // Credential types

    pub async fn create_credential_type(
        &self,
        creator_address: &str,
        request: CreateCredentialTypeRequest,
    ) -> Result<CredentialType> {
        if request.name.trim().is_empty() {
            return Err(CredentialError::Validation("credential type name is empty".to_string()));
        }
        if !request.schema_definition.is_object() {
            return Err(CredentialError::Validation(
                "schema definition must be a JSON object".to_string(),
            ));
        }

        let now = Utc::now();
        let credential_type = CredentialType {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            schema_version: request.schema_version,
            schema_definition: request.schema_definition,
            issuer_pattern: request.issuer_pattern,
            required_fields: request.required_fields,
            optional_fields: request.optional_fields,
            validation_rules: request.validation_rules,
            is_active: true,
            created_by: creator_address.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_credential_type(&credential_type).await?;
        info!(name = %credential_type.name, id = %credential_type.id, "created credential type");
        Ok(credential_type)
    }

    pub async fn get_credential_type(&self, id: &str) -> Result<CredentialType> {
        self.store
            .get_credential_type(id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(format!("credential type {}", id)))
    }

    pub async fn list_credential_types(&self, active_only: bool) -> Result<Vec<CredentialType>> {
        self.store.list_credential_types(active_only).await
    }

    /// Soft-retire a type; issued credentials keep referencing it.
    pub async fn retire_credential_type(&self, id: &str) -> Result<()> {
        self.store.set_credential_type_active(id, false).await
    }

    // Issuance

    /// Check a create request against its credential type: issuer pattern,
    /// required fields, size bound and per-type validation rules.
    pub async fn validate_request(
        &self,
        issuer_address: &str,
        request: &CreateCredentialRequest,
    ) -> Result<CredentialType> {
        let credential_type = self.get_credential_type(&request.credential_type_id).await?;
        if !credential_type.is_active {
            return Err(CredentialError::Validation(format!(
                "credential type '{}' is retired",
                credential_type.name
            )));
        }

        if let Some(pattern) = &credential_type.issuer_pattern {
            if !issuer_matches(pattern, issuer_address) {
                return Err(CredentialError::Validation(format!(
                    "issuer {} does not match the type's issuer pattern",
                    issuer_address
                )));
            }
        }

        let data = request
            .credential_data
            .as_object()
            .ok_or_else(|| CredentialError::Validation("credential data must be a JSON object".to_string()))?;

        for field in &credential_type.required_fields {
            if !data.contains_key(field) {
                return Err(CredentialError::Validation(format!("missing required field '{}'", field)));
            }
        }

        let serialized = serde_json::to_string(&request.credential_data)?;
        if serialized.len() > MAX_CREDENTIAL_DATA_BYTES {
            return Err(CredentialError::Validation(format!(
                "credential data of {} bytes exceeds the {} byte limit",
                serialized.len(),
                MAX_CREDENTIAL_DATA_BYTES
            )));
        }

        if let Some(rules) = &credential_type.validation_rules {
            apply_validation_rules(rules, &serialized)?;
        }

        Ok(credential_type)
    }

    /// Hash the plaintext, then seal it. The hash always covers the
    /// canonical plaintext JSON, never the ciphertext.
    pub fn seal_payload(&self, data: &Value) -> Result<(String, String)> {
        let hash = hash_credential_data(data)?;
        let envelope = self.envelope.encrypt(data)?;
        Ok((hash, envelope))
    }

    /// Issue a credential into the local tier. Tiered writes go through the
    /// hybrid service, which reuses the validation and sealing above.
    pub async fn create_credential(
        &self,
        issuer_address: &str,
        user_address: &str,
        request: &CreateCredentialRequest,
    ) -> Result<Credential> {
        self.validate_request(issuer_address, request).await?;
        let (credential_hash, envelope) = self.seal_payload(&request.credential_data)?;

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            user_address: user_address.to_string(),
            credential_type_id: request.credential_type_id.clone(),
            issuer_address: issuer_address.to_string(),
            issuer_name: request.issuer_name.clone(),
            credential_data: Some(envelope),
            credential_hash,
            proof_signature: request.proof_signature.clone(),
            status: CredentialStatus::Active,
            issued_at: now,
            expires_at: request.expires_at,
            created_at: now,
            updated_at: now,
            metadata: request.metadata.clone(),
            storage_type: StorageType::Local,
            blob_hash: None,
            chain_block_ref: None,
            chain_extrinsic_ref: None,
        };

        self.store.insert_credential(&credential).await?;
        info!(
            credential = %credential.id,
            user = %user_address,
            issuer = %issuer_address,
            "issued credential"
        );
        Ok(credential)
    }

    pub async fn get_credential(&self, id: &str) -> Result<Credential> {
        self.store
            .get_credential(id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(format!("credential {}", id)))
    }

    pub async fn get_user_credentials(&self, user_address: &str) -> Result<Vec<Credential>> {
        self.store.get_user_credentials(user_address).await
    }

    pub async fn get_issuer_credentials(&self, issuer_address: &str) -> Result<Vec<Credential>> {
        self.store.get_issuer_credentials(issuer_address).await
    }

    /// Decrypt the locally held ciphertext. The single sanctioned
    /// decryption boundary for local-tier credentials; blob-backed ones go
    /// through the hybrid service's tiered read.
    pub async fn get_credential_data(&self, id: &str) -> Result<Value> {
        let credential = self.get_credential(id).await?;
        let envelope = credential.credential_data.ok_or_else(|| {
            CredentialError::Storage(format!("credential {} holds no local ciphertext", id))
        })?;
        self.envelope.decrypt(&envelope)
    }

    // Sharing

    pub async fn share_credential(
        &self,
        sharer_address: &str,
        request: ShareCredentialRequest,
    ) -> Result<CredentialShare> {
        let credential = self.get_credential(&request.credential_id).await?;
        if credential.user_address != sharer_address && credential.issuer_address != sharer_address {
            return Err(CredentialError::Validation(
                "only the holder or the issuer may share a credential".to_string(),
            ));
        }
        if credential.status != CredentialStatus::Active {
            return Err(CredentialError::Validation(format!(
                "cannot share a {} credential",
                credential.status.as_str()
            )));
        }

        let share = CredentialShare {
            id: Uuid::new_v4().to_string(),
            credential_id: request.credential_id,
            shared_with_address: request.shared_with_address,
            shared_by_address: sharer_address.to_string(),
            permissions: request.permissions,
            access_level: request.access_level,
            expires_at: request.expires_at,
            is_active: true,
            created_at: Utc::now(),
        };

        self.store.insert_share(&share).await?;
        info!(
            credential = %share.credential_id,
            grantee = %share.shared_with_address,
            "shared credential"
        );
        Ok(share)
    }

    /// Credentials shared with an address, paired with the grant that
    /// allows each.
    pub async fn get_shared_credentials(
        &self,
        grantee_address: &str,
    ) -> Result<Vec<(CredentialShare, Credential)>> {
        let shares = self.store.get_shares_for(grantee_address).await?;
        let mut out = Vec::with_capacity(shares.len());
        for share in shares {
            if let Some(credential) = self.store.get_credential(&share.credential_id).await? {
                out.push((share, credential));
            }
        }
        Ok(out)
    }

    pub async fn revoke_share(&self, requester_address: &str, share_id: &str) -> Result<()> {
        let share = self
            .store
            .get_share(share_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(format!("share {}", share_id)))?;
        if share.shared_by_address != requester_address {
            return Err(CredentialError::Validation(
                "only the sharer may revoke a share".to_string(),
            ));
        }
        self.store.deactivate_share(share_id).await
    }

    // Verification records

    /// Append an attestation record. The record's status reflects the
    /// credential's state at verification time; the trail itself is
    /// append-only.
    pub async fn verify_credential(
        &self,
        verifier_address: &str,
        request: VerifyCredentialRequest,
    ) -> Result<CredentialVerification> {
        let credential = self.get_credential(&request.credential_id).await?;

        let status = match credential.status {
            CredentialStatus::Active => {
                let expired = credential
                    .expires_at
                    .map(|at| at <= Utc::now())
                    .unwrap_or(false);
                if expired {
                    "failed"
                } else {
                    "confirmed"
                }
            }
            CredentialStatus::Expired | CredentialStatus::Revoked => "failed",
        };

        let verification = CredentialVerification {
            id: Uuid::new_v4().to_string(),
            credential_id: request.credential_id,
            verifier_address: verifier_address.to_string(),
            verification_type: request.verification_type,
            verification_data: request.verification_data,
            status: status.to_string(),
            verified_at: Utc::now(),
            notes: request.notes,
        };

        self.store.insert_verification(&verification).await?;
        Ok(verification)
    }

    pub async fn list_verifications(&self, credential_id: &str) -> Result<Vec<CredentialVerification>> {
        self.store.list_verifications(credential_id).await
    }

    // Revocation

    /// Revoke an active credential and leave the 1:1 revocation record.
    /// Terminal: a revoked or expired credential cannot transition again.
    pub async fn revoke_credential(
        &self,
        revoker_address: &str,
        credential_id: &str,
        reason: Option<String>,
    ) -> Result<CredentialRevocation> {
        let credential = self.get_credential(credential_id).await?;
        if credential.user_address != revoker_address && credential.issuer_address != revoker_address {
            return Err(CredentialError::Validation(
                "only the holder or the issuer may revoke a credential".to_string(),
            ));
        }
        if credential.status != CredentialStatus::Active {
            return Err(CredentialError::Validation(format!(
                "credential is already {}",
                credential.status.as_str()
            )));
        }

        let revocation = CredentialRevocation {
            id: Uuid::new_v4().to_string(),
            credential_id: credential_id.to_string(),
            revoked_by_address: revoker_address.to_string(),
            reason,
            revoked_at: Utc::now(),
        };
        self.store.revoke_credential(&revocation).await?;

        info!(credential = %credential_id, by = %revoker_address, "revoked credential");
        Ok(revocation)
    }

    // Issuance requests

    pub async fn create_issuance_request(
        &self,
        requester_address: &str,
        request: CreateIssuanceRequest,
    ) -> Result<IssuanceRequest> {
        let credential_type = self.get_credential_type(&request.credential_type_id).await?;
        if !credential_type.is_active {
            return Err(CredentialError::Validation(format!(
                "credential type '{}' is retired",
                credential_type.name
            )));
        }

        let issuance = IssuanceRequest {
            id: Uuid::new_v4().to_string(),
            requester_address: requester_address.to_string(),
            issuer_address: request.issuer_address,
            credential_type_id: request.credential_type_id,
            request_data: request.request_data,
            status: IssuanceStatus::Pending,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            issued_credential_id: None,
            expires_at: request.expires_at,
            created_at: Utc::now(),
        };

        self.store.insert_issuance_request(&issuance).await?;
        Ok(issuance)
    }

    pub async fn get_issuance_request(&self, id: &str) -> Result<IssuanceRequest> {
        self.store
            .get_issuance_request(id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(format!("issuance request {}", id)))
    }

    pub async fn list_issuance_requests(&self, issuer_address: &str) -> Result<Vec<IssuanceRequest>> {
        self.store.list_issuance_requests_for(issuer_address).await
    }

    /// Approve a pending request: issue the credential from the request's
    /// data and link it back. `pending → issued` is terminal.
    pub async fn approve_issuance_request(
        &self,
        issuer_address: &str,
        request_id: &str,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Credential> {
        let issuance = self.get_issuance_request(request_id).await?;
        if issuance.issuer_address != issuer_address {
            return Err(CredentialError::Validation(
                "request is addressed to a different issuer".to_string(),
            ));
        }
        if issuance.status != IssuanceStatus::Pending {
            return Err(CredentialError::Validation(format!(
                "issuance request is already {}",
                issuance.status.as_str()
            )));
        }

        let create = CreateCredentialRequest {
            credential_type_id: issuance.credential_type_id.clone(),
            credential_data: issuance.request_data.clone(),
            issuer_name: None,
            proof_signature: None,
            expires_at,
            metadata: None,
            storage_preference: StorageType::Local,
            store_on_chain: false,
        };
        self.validate_request(issuer_address, &create).await?;
        let (credential_hash, envelope) = self.seal_payload(&create.credential_data)?;

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            user_address: issuance.requester_address.clone(),
            credential_type_id: create.credential_type_id,
            issuer_address: issuer_address.to_string(),
            issuer_name: None,
            credential_data: Some(envelope),
            credential_hash,
            proof_signature: None,
            status: CredentialStatus::Active,
            issued_at: now,
            expires_at,
            created_at: now,
            updated_at: now,
            metadata: None,
            storage_type: StorageType::Local,
            blob_hash: None,
            chain_block_ref: None,
            chain_extrinsic_ref: None,
        };

        // The credential row and the request's issued state land together.
        self.store.insert_issued_credential(&credential, request_id).await?;
        info!(request = %request_id, credential = %credential.id, "approved issuance request");
        Ok(credential)
    }

    pub async fn reject_issuance_request(
        &self,
        issuer_address: &str,
        request_id: &str,
        reason: &str,
    ) -> Result<()> {
        let issuance = self.get_issuance_request(request_id).await?;
        if issuance.issuer_address != issuer_address {
            return Err(CredentialError::Validation(
                "request is addressed to a different issuer".to_string(),
            ));
        }
        if issuance.status != IssuanceStatus::Pending {
            return Err(CredentialError::Validation(format!(
                "issuance request is already {}",
                issuance.status.as_str()
            )));
        }
        self.store.mark_request_rejected(request_id, reason).await
    }

    // Expiry sweep

    /// Expire every overdue credential, share and issuance request.
    /// Idempotent: re-running against a swept store is a no-op.
    pub async fn cleanup_expired(&self) -> Result<(u64, u64, u64)> {
        let (credentials, shares, requests) = self.store.cleanup_expired().await?;
        if credentials + shares + requests > 0 {
            info!(credentials, shares, requests, "expiry sweep");
        }
        Ok((credentials, shares, requests))
    }
}

fn issuer_matches(pattern: &str, issuer: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => issuer.starts_with(prefix),
        None => issuer == pattern,
    }
}

/// Per-type rules: `{"max_data_bytes": n, "forbidden_patterns": [..]}`.
/// Unknown keys are ignored so types can carry schema-specific metadata.
fn apply_validation_rules(rules: &Value, serialized: &str) -> Result<()> {
    if let Some(max) = rules.get("max_data_bytes").and_then(Value::as_u64) {
        if serialized.len() as u64 > max {
            return Err(CredentialError::Validation(format!(
                "credential data exceeds the type's {} byte limit",
                max
            )));
        }
    }
    if let Some(patterns) = rules.get("forbidden_patterns").and_then(Value::as_array) {
        for pattern in patterns.iter().filter_map(Value::as_str) {
            if serialized.contains(pattern) {
                return Err(CredentialError::Validation(format!(
                    "credential data contains forbidden pattern '{}'",
                    pattern
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_pattern_matching() {
        assert!(issuer_matches("0xabc", "0xabc"));
        assert!(!issuer_matches("0xabc", "0xabd"));
        assert!(issuer_matches("0xab*", "0xabcdef"));
        assert!(!issuer_matches("0xab*", "0xcd"));
    }

    #[test]
    fn validation_rules_enforced() {
        let rules = serde_json::json!({
            "max_data_bytes": 10,
            "forbidden_patterns": ["<script"]
        });
        assert!(apply_validation_rules(&rules, "short").is_ok());
        assert!(apply_validation_rules(&rules, "this is far too long").is_err());

        let rules = serde_json::json!({"forbidden_patterns": ["<script"]});
        assert!(apply_validation_rules(&rules, "{\"x\":\"<script>\"}").is_err());
    }
}
