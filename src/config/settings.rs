use crate::constant::{
    DEFAULT_SCAN_DEPTH, IPFS_API_URL, IPFS_GATEWAY_URL, MONITOR_MAX_RETRIES,
    MONITOR_POLL_INTERVAL_MS, MONITOR_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app_name: String,
    pub environment: Environment,
    pub database_url: String,
    /// 64 hex chars — the process-wide AES-256 envelope key, loaded once.
    pub encryption_key: String,
    pub ipfs_api_url: String,
    pub ipfs_gateway_url: String,
    pub chain_rpc_url: String,
    /// Hex-encoded secp256k1 key of the anchoring account.
    pub chain_signer_key: Option<String>,
    pub chain_enabled: bool,
    /// Recent blocks inspected when reassembling chunks or looking up a
    /// reference; anchors older than this window are unfindable by scan.
    pub chain_scan_depth: u64,
    pub monitor_poll_interval_ms: u64,
    pub monitor_max_retries: u32,
    pub monitor_timeout_secs: u64,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Settings {
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

// Load configuration from environment variables or .env file
pub fn load_config() -> anyhow::Result<Settings> {
    if Path::new(".env").exists() {
        dotenv::dotenv().ok();
    }

    let environment = match env::var("ENVIRONMENT")
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
        .as_str()
    {
        "production" => Environment::Production,
        "testing" => Environment::Testing,
        _ => Environment::Development,
    };

    let settings = Settings {
        app_name: env::var("APP_NAME").unwrap_or_else(|_| "CredVault".to_string()),
        environment,
        database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://credvault.db".to_string()),
        encryption_key: env::var("ENCRYPTION_KEY")
            .map_err(|_| anyhow::anyhow!("ENCRYPTION_KEY must be set (64 hex chars)"))?,
        ipfs_api_url: env::var("IPFS_API_URL").unwrap_or_else(|_| IPFS_API_URL.to_string()),
        ipfs_gateway_url: env::var("IPFS_GATEWAY_URL").unwrap_or_else(|_| IPFS_GATEWAY_URL.to_string()),
        chain_rpc_url: env::var("CHAIN_RPC_URL").unwrap_or_else(|_| "http://localhost:9933".to_string()),
        chain_signer_key: env::var("CHAIN_SIGNER_KEY").ok(),
        chain_enabled: env::var("CHAIN_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true),
        chain_scan_depth: env::var("CHAIN_SCAN_DEPTH")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SCAN_DEPTH),
        monitor_poll_interval_ms: env::var("MONITOR_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MONITOR_POLL_INTERVAL_MS),
        monitor_max_retries: env::var("MONITOR_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(MONITOR_MAX_RETRIES),
        monitor_timeout_secs: env::var("MONITOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MONITOR_TIMEOUT_SECS),
        log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    };

    if settings.encryption_key.len() != 64 {
        return Err(anyhow::anyhow!("ENCRYPTION_KEY must be exactly 64 hex chars"));
    }

    Ok(settings)
}
