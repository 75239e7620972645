use crate::models::RemarkEvent;
use crate::utils::crypto::{parse_signer_key, sign_remark, signer_address};
use crate::utils::errors::{CredentialError, Result};
use async_trait::async_trait;
use reqwest::Client;
use secp256k1::SecretKey;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Dispatch outcome of one extrinsic as observed in a block.
#[derive(Debug, Clone)]
pub struct ExtrinsicOutcome {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub success: bool,
    pub dispatch_error: Option<String>,
    pub events: Vec<Value>,
}

/// Narrow capability surface over the ledger. Everything the anchor service
/// and the transaction monitor need, and nothing else, so a test double can
/// replay canned blocks.
///
/// Writes from the signing account must be serialized by the caller: nonces
/// are fetched once and consumed in submission order.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the account this client signs with.
    fn signer_account(&self) -> &str;

    async fn next_nonce(&self, account: &str) -> Result<u64>;

    /// Sign and submit one remark transaction; returns the extrinsic hash.
    async fn sign_and_send_remark(&self, nonce: u64, remark: &str) -> Result<String>;

    /// Sign and submit all remarks as a single atomic multi-call; returns
    /// the extrinsic hash of the batch.
    async fn sign_and_send_batch(&self, nonce: u64, remarks: &[String]) -> Result<String>;

    async fn latest_block(&self) -> Result<u64>;

    async fn block_hash(&self, number: u64) -> Result<Option<String>>;

    /// "Remarked" events emitted in a block.
    async fn remark_events_at(&self, block_hash: &str) -> Result<Vec<RemarkEvent>>;

    /// Per-extrinsic dispatch outcomes in a block.
    async fn extrinsic_outcomes_at(&self, block_hash: &str) -> Result<Vec<ExtrinsicOutcome>>;

    /// Whether the node has provably rejected this transaction.
    async fn is_known_invalid(&self, tx_hash: &str) -> Result<bool>;
}

/// JSON-RPC implementation against a remark-capable ledger node.
pub struct RpcChainClient {
    client: Client,
    rpc_url: String,
    signer: SecretKey,
    account: String,
    request_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str, signer_key_hex: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CredentialError::Chain(format!("failed to create RPC client: {}", e)))?;

        let signer = parse_signer_key(signer_key_hex)?;
        let account = signer_address(&signer);

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            signer,
            account,
            request_id: AtomicU64::new(1),
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CredentialError::Timeout(format!("RPC {} timed out", method))
                } else {
                    CredentialError::Chain(format!("RPC {} failed: {}", method, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Chain(format!("RPC {} returned status {}", method, status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CredentialError::Chain(format!("RPC {} returned malformed JSON: {}", method, e)))?;

        if let Some(error) = payload.get("error") {
            return Err(CredentialError::Chain(format!("RPC {} rejected: {}", method, error)));
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Build, sign and hex-encode an extrinsic envelope around a call.
    fn build_extrinsic(&self, nonce: u64, call: Value) -> Result<String> {
        let unsigned = json!({
            "signer": self.account,
            "nonce": nonce,
            "call": call,
        });
        let payload = serde_json::to_vec(&unsigned)?;
        let signature = sign_remark(&payload, &self.signer)?;

        let extrinsic = json!({
            "signer": self.account,
            "nonce": nonce,
            "call": call,
            "signature": hex::encode(signature),
        });
        Ok(format!("0x{}", hex::encode(serde_json::to_vec(&extrinsic)?)))
    }

    async fn submit(&self, extrinsic: String) -> Result<String> {
        let result = self.rpc("author_submitExtrinsic", json!([extrinsic])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CredentialError::Chain("node returned no extrinsic hash".to_string()))
    }

    fn parse_block_number(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => {
                let s = s.trim_start_matches("0x");
                u64::from_str_radix(s, 16).ok()
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn signer_account(&self) -> &str {
        &self.account
    }

    async fn next_nonce(&self, account: &str) -> Result<u64> {
        let result = self.rpc("system_accountNextIndex", json!([account])).await?;
        result
            .as_u64()
            .ok_or_else(|| CredentialError::Chain("nonce query returned non-numeric value".to_string()))
    }

    async fn sign_and_send_remark(&self, nonce: u64, remark: &str) -> Result<String> {
        let call = json!({"remark": remark});
        let extrinsic = self.build_extrinsic(nonce, call)?;
        self.submit(extrinsic).await
    }

    async fn sign_and_send_batch(&self, nonce: u64, remarks: &[String]) -> Result<String> {
        let calls: Vec<Value> = remarks.iter().map(|r| json!({"remark": r})).collect();
        let extrinsic = self.build_extrinsic(nonce, json!({"batch_all": calls}))?;
        self.submit(extrinsic).await
    }

    async fn latest_block(&self) -> Result<u64> {
        let header = self.rpc("chain_getHeader", json!([])).await?;
        header
            .get("number")
            .and_then(Self::parse_block_number)
            .ok_or_else(|| CredentialError::Chain("header has no block number".to_string()))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>> {
        let result = self.rpc("chain_getBlockHash", json!([number])).await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn remark_events_at(&self, block_hash: &str) -> Result<Vec<RemarkEvent>> {
        let result = self.rpc("system_remarkedEvents", json!([block_hash])).await?;
        let raw = result.as_array().cloned().unwrap_or_default();

        let mut events = Vec::with_capacity(raw.len());
        for entry in raw {
            let remark = entry.get("remark").and_then(Value::as_str);
            let extrinsic_hash = entry.get("extrinsicHash").and_then(Value::as_str);
            let block_number = entry.get("blockNumber").and_then(Self::parse_block_number);
            if let (Some(remark), Some(extrinsic_hash)) = (remark, extrinsic_hash) {
                events.push(RemarkEvent {
                    block_number: block_number.unwrap_or_default(),
                    block_hash: block_hash.to_string(),
                    extrinsic_hash: extrinsic_hash.to_string(),
                    remark: remark.to_string(),
                });
            }
        }
        Ok(events)
    }

    async fn extrinsic_outcomes_at(&self, block_hash: &str) -> Result<Vec<ExtrinsicOutcome>> {
        let result = self.rpc("system_extrinsicOutcomes", json!([block_hash])).await?;
        let raw = result.as_array().cloned().unwrap_or_default();

        let mut outcomes = Vec::with_capacity(raw.len());
        for entry in raw {
            let tx_hash = match entry.get("extrinsicHash").and_then(Value::as_str) {
                Some(h) => h.to_string(),
                None => continue,
            };
            outcomes.push(ExtrinsicOutcome {
                tx_hash,
                block_number: entry
                    .get("blockNumber")
                    .and_then(Self::parse_block_number)
                    .unwrap_or_default(),
                block_hash: block_hash.to_string(),
                success: entry.get("success").and_then(Value::as_bool).unwrap_or(false),
                dispatch_error: entry
                    .get("dispatchError")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                events: entry
                    .get("events")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        Ok(outcomes)
    }

    async fn is_known_invalid(&self, tx_hash: &str) -> Result<bool> {
        let result = self.rpc("author_transactionValidity", json!([tx_hash])).await?;
        Ok(result.get("invalid").and_then(Value::as_bool).unwrap_or(false))
    }
}
