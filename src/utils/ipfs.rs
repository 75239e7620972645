use crate::utils::errors::{CredentialError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The blob tier, seen through the one seam the orchestrator, the verifier
/// and the tests share. Content hashes are produced by the store and treated
/// as opaque.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, ciphertext: &[u8]) -> Result<String>;
    async fn fetch(&self, hash: &str) -> Result<Vec<u8>>;
    async fn exists(&self, hash: &str) -> Result<bool>;
    async fn pin(&self, hash: &str) -> Result<()>;
    async fn unpin(&self, hash: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IpfsAddResponse {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Size")]
    pub size: String,
}

/// IPFS-backed blob gateway.
pub struct IpfsClient {
    client: Client,
    api_url: String,
    gateway_url: String,
}

impl IpfsClient {
    pub fn new(api_url: &str, gateway_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CredentialError::Storage(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn gateway_url_for(&self, hash: &str) -> String {
        format!("{}/{}", self.gateway_url, hash)
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CredentialError::Storage(format!(
                "IPFS {} failed with status {}: {}",
                what, status, error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl BlobStore for IpfsClient {
    async fn upload(&self, ciphertext: &[u8]) -> Result<String> {
        let form = Form::new().part("file", Part::bytes(ciphertext.to_vec()));

        let response = self
            .client
            .post(format!("{}/add", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to upload to IPFS: {}", e)))?;
        let response = Self::check_status(response, "add").await?;

        let ipfs_response: IpfsAddResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to parse IPFS response: {}", e)))?;

        Ok(ipfs_response.hash)
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.gateway_url_for(hash))
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to fetch from IPFS: {}", e)))?;
        let response = Self::check_status(response, "get").await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to read IPFS response: {}", e)))?;

        // An empty body for a known hash is a gateway fault, not content.
        if bytes.is_empty() {
            return Err(CredentialError::Storage(format!("IPFS returned empty data for {}", hash)));
        }

        Ok(bytes.to_vec())
    }

    async fn exists(&self, hash: &str) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/pin/ls?arg={}", self.api_url, hash))
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to query IPFS pins: {}", e)))?;

        if response.status().is_success() {
            return Ok(true);
        }

        // Unpinned content may still be resolvable through the gateway.
        let response = self
            .client
            .head(self.gateway_url_for(hash))
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to probe IPFS gateway: {}", e)))?;

        Ok(response.status().is_success())
    }

    async fn pin(&self, hash: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/pin/add?arg={}", self.api_url, hash))
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to pin in IPFS: {}", e)))?;
        Self::check_status(response, "pin").await?;
        Ok(())
    }

    async fn unpin(&self, hash: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/pin/rm?arg={}", self.api_url, hash))
            .send()
            .await
            .map_err(|e| CredentialError::Storage(format!("failed to unpin from IPFS: {}", e)))?;
        Self::check_status(response, "unpin").await?;
        Ok(())
    }
}
