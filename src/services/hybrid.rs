use crate::chain::{ChainAnchorService, TransactionMonitor};
use crate::models::{
    ChainReference, CreateCredentialRequest, Credential, CredentialStatus, StorageStats,
    StorageType, TxState,
};
use crate::services::credential::CredentialService;
use crate::utils::errors::{CredentialError, Result};
use crate::utils::ipfs::BlobStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Coordinates the encryption envelope, the local store, the blob tier and
/// the chain anchor to realize one write or read per the caller's storage
/// preference.
///
/// Failure policy: the local write is the one thing that must succeed. A
/// blob failure degrades the credential to local-only; an anchoring failure
/// leaves it blob-backed but unanchored. Both degrade with a warning, never
/// an abort.
pub struct HybridStorageService {
    credentials: Arc<CredentialService>,
    blob_store: Arc<dyn BlobStore>,
    anchor: Option<Arc<ChainAnchorService>>,
    monitor: Option<Arc<TransactionMonitor>>,
}

impl HybridStorageService {
    pub fn new(
        credentials: Arc<CredentialService>,
        blob_store: Arc<dyn BlobStore>,
        anchor: Option<Arc<ChainAnchorService>>,
        monitor: Option<Arc<TransactionMonitor>>,
    ) -> Self {
        Self {
            credentials,
            blob_store,
            anchor,
            monitor,
        }
    }

    /// Issue a credential into the preferred tier. Always encrypts and
    /// hashes first; the plaintext never leaves this call.
    pub async fn create_credential(
        &self,
        issuer_address: &str,
        user_address: &str,
        request: &CreateCredentialRequest,
    ) -> Result<Credential> {
        self.credentials.validate_request(issuer_address, request).await?;
        let (credential_hash, envelope) = self.credentials.seal_payload(&request.credential_data)?;

        let (storage_type, blob_hash) = match request.storage_preference {
            StorageType::Local => (StorageType::Local, None),
            preference => match self.upload_blob(&envelope).await {
                Ok(hash) => (preference, Some(hash)),
                Err(e) => {
                    warn!(error = %e, "blob upload failed; degrading to local storage");
                    (StorageType::Local, None)
                }
            },
        };

        // Blob-only off-loads the ciphertext entirely; every other tier
        // keeps the local copy for redundancy.
        let local_data = match storage_type {
            StorageType::Blob => None,
            StorageType::Local | StorageType::Hybrid => Some(envelope),
        };

        let now = Utc::now();
        let mut credential = Credential {
            id: Uuid::new_v4().to_string(),
            user_address: user_address.to_string(),
            credential_type_id: request.credential_type_id.clone(),
            issuer_address: issuer_address.to_string(),
            issuer_name: request.issuer_name.clone(),
            credential_data: local_data,
            credential_hash,
            proof_signature: request.proof_signature.clone(),
            status: CredentialStatus::Active,
            issued_at: now,
            expires_at: request.expires_at,
            created_at: now,
            updated_at: now,
            metadata: request.metadata.clone(),
            storage_type,
            blob_hash,
            chain_block_ref: None,
            chain_extrinsic_ref: None,
        };

        self.credentials.store().insert_credential(&credential).await?;

        if request.store_on_chain {
            if let Some(extrinsic_ref) = self.try_anchor(&credential).await {
                credential.chain_extrinsic_ref = Some(extrinsic_ref.clone());
                self.credentials
                    .store()
                    .update_chain_refs(&credential.id, None, Some(&extrinsic_ref))
                    .await?;
            }
        }

        info!(
            credential = %credential.id,
            storage = credential.storage_type.as_str(),
            anchored = credential.chain_extrinsic_ref.is_some(),
            "stored credential"
        );
        Ok(credential)
    }

    async fn upload_blob(&self, envelope: &str) -> Result<String> {
        let hash = self.blob_store.upload(envelope.as_bytes()).await?;
        // The upload is what matters; a failed pin only risks GC later.
        if let Err(e) = self.blob_store.pin(&hash).await {
            warn!(blob = %hash, error = %e, "pin failed after upload");
        }
        Ok(hash)
    }

    /// Anchor the reference (hash pair, never the payload) and watch the
    /// transaction to finality in the background. Returns the extrinsic
    /// hash, or `None` if anchoring failed — anchoring is an enhancement,
    /// not a prerequisite.
    async fn try_anchor(&self, credential: &Credential) -> Option<String> {
        let anchor = match (&self.anchor, &credential.blob_hash) {
            (Some(anchor), Some(_)) => anchor,
            (None, _) => {
                warn!(credential = %credential.id, "chain anchoring requested but no chain is configured");
                return None;
            }
            (_, None) => {
                warn!(credential = %credential.id, "chain anchoring skipped: credential has no blob hash");
                return None;
            }
        };

        let reference = ChainReference {
            user_address: credential.user_address.clone(),
            blob_hash: credential.blob_hash.clone().unwrap_or_default(),
            credential_hash: credential.credential_hash.clone(),
            timestamp: Utc::now(),
            block_hash: String::new(),
            extrinsic_hash: String::new(),
        };

        match anchor.store_reference(&reference).await {
            Ok(receipt) => {
                let tx_hash = receipt.tx_hashes.first().cloned();
                if let Some(tx) = &tx_hash {
                    self.watch_anchor(credential.id.clone(), tx.clone());
                }
                tx_hash
            }
            Err(e) => {
                warn!(
                    credential = %credential.id,
                    error = %e,
                    "chain anchoring failed; credential stays blob-backed"
                );
                None
            }
        }
    }

    /// Fire-and-forget finality tracking: once the anchoring transaction
    /// finalizes, record the block it landed in.
    fn watch_anchor(&self, credential_id: String, tx_hash: String) {
        let monitor = match &self.monitor {
            Some(m) => m.clone(),
            None => return,
        };
        let store = self.credentials.store().clone();

        tokio::spawn(async move {
            match monitor.monitor(&tx_hash, |_| {}).await {
                Ok(status) if status.status == TxState::Finalized => {
                    if let Err(e) = store
                        .update_chain_refs(
                            &credential_id,
                            status.block_hash.as_deref(),
                            Some(&tx_hash),
                        )
                        .await
                    {
                        warn!(credential = %credential_id, error = %e, "failed to record anchor block");
                    }
                }
                Ok(status) => {
                    warn!(
                        credential = %credential_id,
                        tx = %tx_hash,
                        status = ?status.status,
                        "anchoring transaction did not finalize"
                    );
                }
                Err(e) => {
                    warn!(credential = %credential_id, tx = %tx_hash, error = %e, "anchor monitoring failed");
                }
            }
        });
    }

    /// Decrypt-on-read across tiers: blob first for blob-backed
    /// credentials, falling back to the local ciphertext when the blob
    /// fetch fails and a local copy exists. Only the exhaustion of every
    /// applicable tier surfaces as an error.
    pub async fn get_credential_data(&self, credential_id: &str) -> Result<Value> {
        let credential = self.credentials.get_credential(credential_id).await?;
        let envelope = self.credentials.envelope();

        if credential.storage_type.uses_blob() {
            if let Some(blob_hash) = &credential.blob_hash {
                match self.blob_store.fetch(blob_hash).await {
                    Ok(bytes) => {
                        let sealed = String::from_utf8(bytes).map_err(|_| {
                            CredentialError::Integrity(format!(
                                "blob {} is not a valid envelope",
                                blob_hash
                            ))
                        })?;
                        return envelope.decrypt(&sealed);
                    }
                    Err(e) => {
                        warn!(
                            credential = %credential_id,
                            blob = %blob_hash,
                            error = %e,
                            "blob fetch failed; trying local ciphertext"
                        );
                    }
                }
            }
        }

        match &credential.credential_data {
            Some(sealed) => envelope.decrypt(sealed),
            None => Err(CredentialError::Storage(format!(
                "all storage tiers exhausted for credential {}",
                credential_id
            ))),
        }
    }

    /// One-way migration local → hybrid: upload the existing ciphertext to
    /// the blob tier while keeping the local copy. Credentials already on a
    /// remote tier are rejected.
    pub async fn migrate_to_ipfs(&self, credential_id: &str) -> Result<Credential> {
        let credential = self.credentials.get_credential(credential_id).await?;
        if credential.storage_type != StorageType::Local {
            return Err(CredentialError::Validation(format!(
                "credential already uses {} storage",
                credential.storage_type.as_str()
            )));
        }
        let sealed = credential.credential_data.as_ref().ok_or_else(|| {
            CredentialError::Storage(format!("credential {} holds no local ciphertext", credential_id))
        })?;

        let blob_hash = self.upload_blob(sealed).await?;
        self.credentials
            .store()
            .update_storage_refs(
                credential_id,
                StorageType::Hybrid,
                Some(&blob_hash),
                credential.chain_block_ref.as_deref(),
                credential.chain_extrinsic_ref.as_deref(),
            )
            .await?;

        info!(credential = %credential_id, blob = %blob_hash, "migrated credential to hybrid storage");
        self.credentials.get_credential(credential_id).await
    }

    /// Re-anchor a blob-backed credential whose write-time anchoring was
    /// skipped or degraded.
    pub async fn anchor_existing(&self, credential_id: &str) -> Result<Credential> {
        let credential = self.credentials.get_credential(credential_id).await?;
        if credential.blob_hash.is_none() {
            return Err(CredentialError::Validation(
                "only blob-backed credentials can be anchored".to_string(),
            ));
        }
        if credential.chain_extrinsic_ref.is_some() {
            return Err(CredentialError::Validation(
                "credential is already anchored".to_string(),
            ));
        }

        match self.try_anchor(&credential).await {
            Some(extrinsic_ref) => {
                self.credentials
                    .store()
                    .update_chain_refs(&credential.id, None, Some(&extrinsic_ref))
                    .await?;
                self.credentials.get_credential(credential_id).await
            }
            None => Err(CredentialError::Chain(format!(
                "anchoring failed for credential {}",
                credential_id
            ))),
        }
    }

    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        self.credentials.store().storage_stats().await
    }
}
