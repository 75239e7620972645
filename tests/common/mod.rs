#![allow(dead_code)]

use async_trait::async_trait;
use credvault::models::{CreateCredentialRequest, CreateCredentialTypeRequest, RemarkEvent, StorageType};
use credvault::chain::ExtrinsicOutcome;
use credvault::{
    BlobStore, ChainAnchorService, ChainClient, CredentialError, CredentialService,
    CredentialStore, EncryptionEnvelope, HybridStorageService, IntegrityVerifier, Result,
    TransactionMonitor,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------- blob store

/// In-memory blob store with switchable failure modes.
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_uploads: AtomicBool,
    pub fail_fetches: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
        }
    }

    /// Drop a blob, simulating GC of unpinned content.
    pub fn wipe(&self, hash: &str) {
        self.blobs.lock().unwrap().remove(hash);
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(hash)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, ciphertext: &[u8]) -> Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CredentialError::Storage("blob store unavailable".to_string()));
        }
        let hash = format!("Qm{}", &credvault::utils::crypto::sha256_hex(ciphertext)[..40]);
        self.blobs.lock().unwrap().insert(hash.clone(), ciphertext.to_vec());
        Ok(hash)
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(CredentialError::Storage("blob store unavailable".to_string()));
        }
        self.blobs
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| CredentialError::Storage(format!("blob {} not found", hash)))
    }

    async fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(hash))
    }

    async fn pin(&self, _hash: &str) -> Result<()> {
        Ok(())
    }

    async fn unpin(&self, _hash: &str) -> Result<()> {
        Ok(())
    }
}

// -------------------------------------------------------------- chain client

struct MockBlock {
    hash: String,
    remarks: Vec<(String, String)>, // (extrinsic hash, remark)
    outcomes: Vec<ExtrinsicOutcome>,
}

struct MockChainState {
    blocks: Vec<MockBlock>,
    next_nonce: u64,
    mempool: Vec<(String, Vec<String>)>, // (extrinsic hash, remarks)
    invalid: HashSet<String>,
}

/// Replays canned blocks. Submissions land in a fresh block immediately
/// unless `auto_include` is off, in which case they sit in a mempool until
/// `include_pending` is called.
pub struct MockChainClient {
    account: String,
    state: Mutex<MockChainState>,
    pub auto_include: AtomicBool,
    pub fail_submissions: AtomicBool,
    pub fail_dispatch: AtomicBool,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            account: "0xfeedc0ffee00000000000000000000000000beef".to_string(),
            state: Mutex::new(MockChainState {
                // Genesis block so the scan window is never empty.
                blocks: vec![MockBlock {
                    hash: "0xgenesis".to_string(),
                    remarks: Vec::new(),
                    outcomes: Vec::new(),
                }],
                next_nonce: 0,
                mempool: Vec::new(),
                invalid: HashSet::new(),
            }),
            auto_include: AtomicBool::new(true),
            fail_submissions: AtomicBool::new(false),
            fail_dispatch: AtomicBool::new(false),
        }
    }

    pub fn mark_invalid(&self, tx_hash: &str) {
        self.state.lock().unwrap().invalid.insert(tx_hash.to_string());
    }

    /// Move everything in the mempool into one new block.
    pub fn include_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let pending: Vec<_> = state.mempool.drain(..).collect();
        if pending.is_empty() {
            return;
        }
        let number = state.blocks.len() as u64;
        let hash = format!("0xblock{:04}", number);
        let mut remarks = Vec::new();
        let mut outcomes = Vec::new();
        for (tx_hash, tx_remarks) in pending {
            for remark in tx_remarks {
                remarks.push((tx_hash.clone(), remark));
            }
            outcomes.push(ExtrinsicOutcome {
                tx_hash,
                block_number: number,
                block_hash: hash.clone(),
                success: true,
                dispatch_error: None,
                events: Vec::new(),
            });
        }
        state.blocks.push(MockBlock { hash, remarks, outcomes });
    }

    /// Append a block carrying one remark written by some other party —
    /// the ledger is public, anyone can post markers.
    pub fn push_remark(&self, remark: &str) {
        let mut state = self.state.lock().unwrap();
        let number = state.blocks.len() as u64;
        let hash = format!("0xblock{:04}", number);
        state.blocks.push(MockBlock {
            hash,
            remarks: vec![(format!("0xother{:04}", number), remark.to_string())],
            outcomes: Vec::new(),
        });
    }

    /// Append an empty block (chain progress without our transactions).
    pub fn advance(&self, blocks: u64) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..blocks {
            let number = state.blocks.len() as u64;
            state.blocks.push(MockBlock {
                hash: format!("0xblock{:04}", number),
                remarks: Vec::new(),
                outcomes: Vec::new(),
            });
        }
    }

    pub fn submitted_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.blocks.iter().map(|b| b.outcomes.len()).sum::<usize>() + state.mempool.len()
    }

    fn accept(&self, nonce: u64, remarks: Vec<String>) -> Result<String> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(CredentialError::Chain("node unreachable".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if nonce != state.next_nonce {
            return Err(CredentialError::Chain(format!(
                "nonce conflict: expected {}, got {}",
                state.next_nonce, nonce
            )));
        }
        state.next_nonce += 1;

        let tx_hash = format!(
            "0xtx{}",
            &credvault::utils::crypto::sha256_hex(format!("{}:{}", nonce, remarks.join("|")).as_bytes())[..16]
        );
        state.mempool.push((tx_hash.clone(), remarks));
        drop(state);

        if self.auto_include.load(Ordering::SeqCst) {
            if self.fail_dispatch.load(Ordering::SeqCst) {
                // Include with a failed outcome instead of success.
                let mut state = self.state.lock().unwrap();
                let pending: Vec<_> = state.mempool.drain(..).collect();
                let number = state.blocks.len() as u64;
                let hash = format!("0xblock{:04}", number);
                let outcomes = pending
                    .iter()
                    .map(|(tx, _)| ExtrinsicOutcome {
                        tx_hash: tx.clone(),
                        block_number: number,
                        block_hash: hash.clone(),
                        success: false,
                        dispatch_error: Some("BadOrigin".to_string()),
                        events: Vec::new(),
                    })
                    .collect();
                state.blocks.push(MockBlock {
                    hash,
                    remarks: Vec::new(),
                    outcomes,
                });
            } else {
                self.include_pending();
            }
        }

        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn signer_account(&self) -> &str {
        &self.account
    }

    async fn next_nonce(&self, _account: &str) -> Result<u64> {
        Ok(self.state.lock().unwrap().next_nonce)
    }

    async fn sign_and_send_remark(&self, nonce: u64, remark: &str) -> Result<String> {
        self.accept(nonce, vec![remark.to_string()])
    }

    async fn sign_and_send_batch(&self, nonce: u64, remarks: &[String]) -> Result<String> {
        self.accept(nonce, remarks.to_vec())
    }

    async fn latest_block(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().blocks.len() as u64 - 1)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocks
            .get(number as usize)
            .map(|b| b.hash.clone()))
    }

    async fn remark_events_at(&self, block_hash: &str) -> Result<Vec<RemarkEvent>> {
        let state = self.state.lock().unwrap();
        let (number, block) = match state
            .blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.hash == block_hash)
        {
            Some(found) => found,
            None => return Ok(Vec::new()),
        };
        Ok(block
            .remarks
            .iter()
            .map(|(tx_hash, remark)| RemarkEvent {
                block_number: number as u64,
                block_hash: block_hash.to_string(),
                extrinsic_hash: tx_hash.clone(),
                remark: remark.clone(),
            })
            .collect())
    }

    async fn extrinsic_outcomes_at(&self, block_hash: &str) -> Result<Vec<ExtrinsicOutcome>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocks
            .iter()
            .find(|b| b.hash == block_hash)
            .map(|b| b.outcomes.clone())
            .unwrap_or_default())
    }

    async fn is_known_invalid(&self, tx_hash: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().invalid.contains(tx_hash))
    }
}

// ------------------------------------------------------------------ fixtures

pub const ISSUER: &str = "0xaaaa00000000000000000000000000000000aaaa";
pub const HOLDER: &str = "0xbbbb00000000000000000000000000000000bbbb";
pub const VERIFIER: &str = "0xcccc00000000000000000000000000000000cccc";

pub struct TestContext {
    pub pool: SqlitePool,
    pub blob: Arc<MemoryBlobStore>,
    pub chain: Arc<MockChainClient>,
    pub credentials: Arc<CredentialService>,
    pub anchor: Arc<ChainAnchorService>,
    pub monitor: Arc<TransactionMonitor>,
    pub hybrid: HybridStorageService,
    pub verifier: IntegrityVerifier,
}

pub async fn setup() -> TestContext {
    // RUST_LOG=debug makes failing scenarios talk; try_init tolerates the
    // subscriber already being set by a sibling test.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let pool = credvault::init_pool("sqlite::memory:").await.unwrap();
    let store = CredentialStore::new(pool.clone());
    let envelope = Arc::new(EncryptionEnvelope::new(&[0x11; 32]));
    let credentials = Arc::new(CredentialService::new(store, envelope));

    let blob = Arc::new(MemoryBlobStore::new());
    let chain = Arc::new(MockChainClient::new());
    let anchor = Arc::new(ChainAnchorService::new(chain.clone(), 100));
    let monitor = Arc::new(TransactionMonitor::new(
        chain.clone(),
        100,
        Duration::from_millis(20),
        5,
        Duration::from_secs(2),
    ));

    let hybrid = HybridStorageService::new(
        credentials.clone(),
        blob.clone(),
        Some(anchor.clone()),
        Some(monitor.clone()),
    );
    let verifier = IntegrityVerifier::new(credentials.clone(), blob.clone(), Some(anchor.clone()));

    TestContext {
        pool,
        blob,
        chain,
        credentials,
        anchor,
        monitor,
        hybrid,
        verifier,
    }
}

/// A "UniversityDegree" type with `degree` and `institution` required.
pub async fn degree_type(ctx: &TestContext) -> String {
    let created = ctx
        .credentials
        .create_credential_type(
            ISSUER,
            CreateCredentialTypeRequest {
                name: "UniversityDegree".to_string(),
                description: Some("Academic degree credential".to_string()),
                schema_version: "1.0".to_string(),
                schema_definition: json!({"type": "object"}),
                issuer_pattern: None,
                required_fields: vec!["degree".to_string(), "institution".to_string()],
                optional_fields: vec!["gpa".to_string()],
                validation_rules: None,
            },
        )
        .await
        .unwrap();
    created.id
}

pub fn degree_request(type_id: &str, preference: StorageType, on_chain: bool) -> CreateCredentialRequest {
    CreateCredentialRequest {
        credential_type_id: type_id.to_string(),
        credential_data: json!({
            "degree": "BSc Computer Science",
            "institution": "Example University",
            "gpa": 3.8
        }),
        issuer_name: Some("Example University".to_string()),
        proof_signature: None,
        expires_at: None,
        metadata: None,
        storage_preference: preference,
        store_on_chain: on_chain,
    }
}
