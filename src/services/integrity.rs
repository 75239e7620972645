use crate::chain::ChainAnchorService;
use crate::models::Credential;
use crate::services::credential::CredentialService;
use crate::utils::crypto::hash_credential_data;
use crate::utils::ipfs::BlobStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Combined verdict of the cross-tier integrity check. A tier the
/// credential does not use is trivially valid; `valid` is the conjunction
/// of the applicable sub-checks.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub valid: bool,
    pub local_valid: bool,
    pub blob_valid: bool,
    pub chain_valid: bool,
    pub errors: Vec<String>,
}

/// Re-checks, independently of the write path, that what is retrievable
/// still matches what was issued: local decryptability and hash, blob
/// existence, anchored reference presence.
pub struct IntegrityVerifier {
    credentials: Arc<CredentialService>,
    blob_store: Arc<dyn BlobStore>,
    anchor: Option<Arc<ChainAnchorService>>,
}

impl IntegrityVerifier {
    pub fn new(
        credentials: Arc<CredentialService>,
        blob_store: Arc<dyn BlobStore>,
        anchor: Option<Arc<ChainAnchorService>>,
    ) -> Self {
        Self {
            credentials,
            blob_store,
            anchor,
        }
    }

    /// Verify one credential across every tier it uses. Each sub-check is
    /// best-effort and independent; failures become error entries, never
    /// panics or early returns — the report always comes back.
    pub async fn verify(&self, credential_id: &str) -> IntegrityReport {
        let credential = match self.credentials.get_credential(credential_id).await {
            Ok(c) => c,
            Err(e) => {
                return IntegrityReport {
                    valid: false,
                    local_valid: false,
                    blob_valid: false,
                    chain_valid: false,
                    errors: vec![format!("credential lookup failed: {}", e)],
                };
            }
        };

        let mut errors = Vec::new();

        let local_valid = self.check_local(&credential, &mut errors);
        let blob_valid = self.check_blob(&credential, &mut errors).await;
        let chain_valid = self.check_chain(&credential, &mut errors).await;

        let report = IntegrityReport {
            valid: local_valid && blob_valid && chain_valid,
            local_valid,
            blob_valid,
            chain_valid,
            errors,
        };
        debug!(
            credential = %credential_id,
            valid = report.valid,
            local = report.local_valid,
            blob = report.blob_valid,
            chain = report.chain_valid,
            "integrity check"
        );
        report
    }

    /// Local tier: the held ciphertext decrypts and its plaintext still
    /// hashes to the issuance-time hash.
    fn check_local(&self, credential: &Credential, errors: &mut Vec<String>) -> bool {
        let sealed = match &credential.credential_data {
            Some(s) => s,
            None => return true, // tier not used
        };

        let plaintext: Value = match self.credentials.envelope().decrypt(sealed) {
            Ok(v) => v,
            Err(e) => {
                errors.push(format!("local: {}", e));
                return false;
            }
        };

        match hash_credential_data(&plaintext) {
            Ok(hash) if hash == credential.credential_hash => true,
            Ok(hash) => {
                errors.push(format!(
                    "local: plaintext hash {} does not match issuance hash {}",
                    hash, credential.credential_hash
                ));
                false
            }
            Err(e) => {
                errors.push(format!("local: {}", e));
                false
            }
        }
    }

    /// Blob tier: the content hash still resolves in the store.
    async fn check_blob(&self, credential: &Credential, errors: &mut Vec<String>) -> bool {
        let blob_hash = match &credential.blob_hash {
            Some(h) => h,
            None => return true, // tier not used
        };

        match self.blob_store.exists(blob_hash).await {
            Ok(true) => true,
            Ok(false) => {
                errors.push(format!("blob: {} no longer exists in the blob store", blob_hash));
                false
            }
            Err(e) => {
                errors.push(format!("blob: {}", e));
                false
            }
        }
    }

    /// Chain tier: a reference with the matching hash pair is re-derivable
    /// by scanning the recent-block window. Subject to the window
    /// limitation: anchors older than the window come back as not found.
    async fn check_chain(&self, credential: &Credential, errors: &mut Vec<String>) -> bool {
        if credential.chain_extrinsic_ref.is_none() && credential.chain_block_ref.is_none() {
            return true; // tier not used
        }

        let anchor = match &self.anchor {
            Some(a) => a,
            None => {
                errors.push("chain: credential is anchored but no chain is configured".to_string());
                return false;
            }
        };
        let blob_hash = match &credential.blob_hash {
            Some(h) => h,
            None => {
                errors.push("chain: anchored credential has no blob hash to look up".to_string());
                return false;
            }
        };

        match anchor.find_reference(&credential.user_address, blob_hash).await {
            Ok(Some(reference)) => {
                if reference.credential_hash == credential.credential_hash {
                    true
                } else {
                    errors.push(format!(
                        "chain: anchored hash {} does not match issuance hash {}",
                        reference.credential_hash, credential.credential_hash
                    ));
                    false
                }
            }
            Ok(None) => {
                errors.push("chain: no reference found within the scan window".to_string());
                false
            }
            Err(e) => {
                errors.push(format!("chain: {}", e));
                false
            }
        }
    }
}
