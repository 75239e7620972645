//! Hybrid credential storage and integrity engine.
//!
//! Credentials live in up to three tiers — an encrypted relational store,
//! a content-addressed blob store and a public ledger carrying
//! tamper-evident references — behind one API that lets the caller pick a
//! tier, migrate between tiers and prove that what is retrievable still
//! matches what was issued.

pub mod chain;
pub mod config;
pub mod constant;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use chain::{ChainAnchorService, ChainClient, RpcChainClient, TransactionMonitor};
pub use config::settings::{load_config, Settings};
pub use db::sqlite::init_pool;
pub use db::store::CredentialStore;
pub use services::{CredentialService, HybridStorageService, IntegrityReport, IntegrityVerifier};
pub use utils::crypto::EncryptionEnvelope;
pub use utils::errors::{CredentialError, Result};
pub use utils::ipfs::{BlobStore, IpfsClient};
