use crate::chain::client::ChainClient;
use crate::constant::{
    COST_BATCH, COST_REMARK_CHUNK, COST_SINGLE_MARKER, KIND_CREDENTIAL_BATCH,
    KIND_CREDENTIAL_DATA, KIND_CREDENTIAL_PALLET, KIND_SECURE_BATCH, KIND_SECURE_CREDENTIAL,
    REMARK_CHUNK_SIZE, SINGLE_MARKER_MAX_SIZE,
};
use crate::models::{AnchorReceipt, AnchorStrategy, ChainReference};
use crate::utils::crypto::sha256_hex;
use crate::utils::errors::{CredentialError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One parsed ledger marker. The wire form is colon-delimited ASCII:
/// `KIND:userAddress:dataHash[:integrityHash]:chunkIndex:chunkCount:base64Chunk`
/// and must round-trip exactly — it is shared with other implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: String,
    pub user_address: String,
    pub data_hash: String,
    pub integrity_hash: Option<String>,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub payload: String,
}

impl Marker {
    pub fn format(&self) -> String {
        match &self.integrity_hash {
            Some(integrity) => format!(
                "{}:{}:{}:{}:{}:{}:{}",
                self.kind,
                self.user_address,
                self.data_hash,
                integrity,
                self.chunk_index,
                self.chunk_count,
                self.payload
            ),
            None => format!(
                "{}:{}:{}:{}:{}:{}",
                self.kind, self.user_address, self.data_hash, self.chunk_index, self.chunk_count, self.payload
            ),
        }
    }

    /// Parse a remark back into a marker. Returns `None` for remarks that
    /// are not ours — foreign remarks on a public ledger are expected, not
    /// an error.
    pub fn parse(remark: &str) -> Option<Marker> {
        let parts: Vec<&str> = remark.split(':').collect();
        let (kind, user, data_hash, integrity, index, count, payload) = match parts.len() {
            6 => (parts[0], parts[1], parts[2], None, parts[3], parts[4], parts[5]),
            7 => (parts[0], parts[1], parts[2], Some(parts[3]), parts[4], parts[5], parts[6]),
            _ => return None,
        };

        if !is_known_kind(kind) {
            return None;
        }

        let chunk_index = index.parse::<u32>().ok()?;
        let chunk_count = count.parse::<u32>().ok()?;
        if chunk_count == 0 || chunk_index >= chunk_count {
            return None;
        }

        Some(Marker {
            kind: kind.to_string(),
            user_address: user.to_string(),
            data_hash: data_hash.to_string(),
            integrity_hash: integrity.map(str::to_string),
            chunk_index,
            chunk_count,
            payload: payload.to_string(),
        })
    }
}

fn is_known_kind(kind: &str) -> bool {
    matches!(
        kind,
        KIND_CREDENTIAL_DATA
            | KIND_CREDENTIAL_BATCH
            | KIND_CREDENTIAL_PALLET
            | KIND_SECURE_CREDENTIAL
            | KIND_SECURE_BATCH
    )
}

/// Marker kind a payload write emits under each strategy.
/// `CREDENTIAL_PALLET` is accepted on read for cross-implementation
/// compatibility but never emitted.
fn kind_for(strategy: AnchorStrategy) -> &'static str {
    match strategy {
        AnchorStrategy::RemarkChunks => KIND_CREDENTIAL_DATA,
        AnchorStrategy::Batch => KIND_CREDENTIAL_BATCH,
        AnchorStrategy::SingleMarker => KIND_SECURE_CREDENTIAL,
    }
}

fn kind_matches(strategy: AnchorStrategy, kind: &str) -> bool {
    kind == kind_for(strategy) || kind == KIND_CREDENTIAL_PALLET
}

/// Split a payload into remark-sized chunks. Empty payloads still occupy
/// one (empty) chunk so a complete set is always detectable on re-scan.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![&data[0..0]];
    }
    data.chunks(chunk_size).collect()
}

pub fn chunk_count(len: usize, chunk_size: usize) -> u32 {
    if len == 0 {
        return 1;
    }
    ((len + chunk_size - 1) / chunk_size) as u32
}

/// Pure cost estimate for a write, in units of one plain remark.
pub fn estimate_cost(len: usize, strategy: AnchorStrategy) -> f64 {
    let chunks = chunk_count(len, REMARK_CHUNK_SIZE) as f64;
    match strategy {
        AnchorStrategy::RemarkChunks => chunks * COST_REMARK_CHUNK,
        AnchorStrategy::Batch => chunks * COST_BATCH,
        AnchorStrategy::SingleMarker => COST_SINGLE_MARKER,
    }
}

/// Writes credential payloads and references onto the ledger and gets them
/// back by scanning recent blocks — the ledger has no query-by-key, so a
/// bounded newest-first window scan is the index.
pub struct ChainAnchorService {
    client: Arc<dyn ChainClient>,
    scan_depth: u64,
    // Same-account writes are a correctness hazard when interleaved: nonce
    // acquisition and submission happen under this lock, chunks in order.
    submission_lock: tokio::sync::Mutex<()>,
}

impl ChainAnchorService {
    pub fn new(client: Arc<dyn ChainClient>, scan_depth: u64) -> Self {
        Self {
            client,
            scan_depth,
            submission_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client(&self) -> Arc<dyn ChainClient> {
        self.client.clone()
    }

    /// Write a payload under the given strategy. Returns the data hash the
    /// payload is retrievable under plus every transaction that carried a
    /// piece of it.
    pub async fn store(
        &self,
        user_address: &str,
        data: &[u8],
        strategy: AnchorStrategy,
    ) -> Result<AnchorReceipt> {
        if strategy == AnchorStrategy::SingleMarker && data.len() > SINGLE_MARKER_MAX_SIZE {
            return Err(CredentialError::Validation(format!(
                "payload of {} bytes exceeds the single-marker limit of {}",
                data.len(),
                SINGLE_MARKER_MAX_SIZE
            )));
        }

        let data_hash = sha256_hex(data);
        let chunks = split_chunks(data, REMARK_CHUNK_SIZE);
        let total = chunks.len() as u32;
        let kind = kind_for(strategy);

        let markers: Vec<String> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                Marker {
                    kind: kind.to_string(),
                    user_address: user_address.to_string(),
                    data_hash: data_hash.clone(),
                    integrity_hash: None,
                    chunk_index: i as u32,
                    chunk_count: total,
                    payload: BASE64.encode(chunk),
                }
                .format()
            })
            .collect();

        let guard = self.submission_lock.lock().await;
        let base_nonce = self.client.next_nonce(self.client.signer_account()).await?;

        let tx_hashes = match strategy {
            AnchorStrategy::Batch => {
                let hash = self.client.sign_and_send_batch(base_nonce, &markers).await?;
                vec![hash]
            }
            AnchorStrategy::RemarkChunks | AnchorStrategy::SingleMarker => {
                // Strictly sequential: fanning these out from one account
                // corrupts nonce ordering and gets transactions rejected.
                let mut hashes = Vec::with_capacity(markers.len());
                for (i, marker) in markers.iter().enumerate() {
                    let hash = self
                        .client
                        .sign_and_send_remark(base_nonce + i as u64, marker)
                        .await?;
                    debug!(chunk = i, tx = %hash, "submitted remark chunk");
                    hashes.push(hash);
                }
                hashes
            }
        };
        drop(guard);

        info!(
            user = %user_address,
            data_hash = %data_hash,
            chunks = total,
            strategy = ?strategy,
            "anchored payload on chain"
        );

        Ok(AnchorReceipt {
            data_hash,
            tx_hashes,
            block_hash: None,
            chunk_count: total,
        })
    }

    /// Anchor a credential reference (hash pair, not the payload).
    pub async fn store_reference(&self, reference: &ChainReference) -> Result<AnchorReceipt> {
        let payload = json!({ "timestamp": reference.timestamp });
        let marker = Marker {
            kind: KIND_SECURE_BATCH.to_string(),
            user_address: reference.user_address.clone(),
            data_hash: reference.blob_hash.clone(),
            integrity_hash: Some(reference.credential_hash.clone()),
            chunk_index: 0,
            chunk_count: 1,
            payload: BASE64.encode(serde_json::to_vec(&payload)?),
        }
        .format();

        let _guard = self.submission_lock.lock().await;
        let nonce = self.client.next_nonce(self.client.signer_account()).await?;
        let tx_hash = self.client.sign_and_send_remark(nonce, &marker).await?;

        info!(
            user = %reference.user_address,
            blob = %reference.blob_hash,
            tx = %tx_hash,
            "anchored credential reference"
        );

        Ok(AnchorReceipt {
            data_hash: reference.blob_hash.clone(),
            tx_hashes: vec![tx_hash],
            block_hash: None,
            chunk_count: 1,
        })
    }

    /// Reassemble a payload from the ledger by scanning the recent-block
    /// window newest-first. `None` means the window closed without a
    /// complete chunk set — a normal "not found", not an error. Payloads
    /// anchored before the window opened are unfindable by design; widening
    /// `scan_depth` is the only recourse.
    ///
    /// Anyone can write remarks, so matching markers are untrusted until
    /// the reassembled bytes hash back to `data_hash`. A completed set that
    /// hashes wrong is discarded and the scan continues into older blocks;
    /// malformed markers are skipped, never allowed to veto data that is
    /// present further back.
    pub async fn retrieve(
        &self,
        user_address: &str,
        data_hash: &str,
        strategy: AnchorStrategy,
    ) -> Result<Option<Vec<u8>>> {
        let mut chunks: HashMap<u32, Vec<u8>> = HashMap::new();
        let mut expected: Option<u32> = None;

        let latest = self.client.latest_block().await?;
        let from = latest.saturating_sub(self.scan_depth);

        for number in (from..=latest).rev() {
            let block_hash = match self.client.block_hash(number).await? {
                Some(h) => h,
                None => continue,
            };

            for event in self.client.remark_events_at(&block_hash).await? {
                let marker = match Marker::parse(&event.remark) {
                    Some(m) => m,
                    None => continue,
                };
                if !kind_matches(strategy, &marker.kind)
                    || marker.user_address != user_address
                    || marker.data_hash != data_hash
                {
                    continue;
                }

                match expected {
                    None => expected = Some(marker.chunk_count),
                    Some(count) if count != marker.chunk_count => {
                        warn!(
                            data_hash = %data_hash,
                            "conflicting chunk counts on chain; keeping first seen"
                        );
                        continue;
                    }
                    Some(_) => {}
                }

                let bytes = match BASE64.decode(&marker.payload) {
                    Ok(b) => b,
                    Err(_) => {
                        warn!(
                            data_hash = %data_hash,
                            chunk = marker.chunk_index,
                            "skipping marker with invalid base64"
                        );
                        continue;
                    }
                };
                chunks.entry(marker.chunk_index).or_insert(bytes);

                if let Some(count) = expected {
                    if chunks.len() as u32 == count {
                        let assembled = assemble(std::mem::take(&mut chunks), count);
                        if sha256_hex(&assembled) == data_hash {
                            return Ok(Some(assembled));
                        }
                        warn!(
                            data_hash = %data_hash,
                            "discarding chunk set that does not hash to the requested data hash"
                        );
                        expected = None;
                    }
                }
            }
        }

        debug!(
            user = %user_address,
            data_hash = %data_hash,
            window = self.scan_depth,
            found = chunks.len(),
            "scan window exhausted without a complete chunk set"
        );
        Ok(None)
    }

    /// Look up the anchored reference for a blob hash within the scan
    /// window. Subject to the same window limitation as `retrieve`.
    pub async fn find_reference(
        &self,
        user_address: &str,
        blob_hash: &str,
    ) -> Result<Option<ChainReference>> {
        let latest = self.client.latest_block().await?;
        let from = latest.saturating_sub(self.scan_depth);

        for number in (from..=latest).rev() {
            let block_hash = match self.client.block_hash(number).await? {
                Some(h) => h,
                None => continue,
            };

            for event in self.client.remark_events_at(&block_hash).await? {
                let marker = match Marker::parse(&event.remark) {
                    Some(m) => m,
                    None => continue,
                };
                if marker.kind != KIND_SECURE_BATCH
                    || marker.user_address != user_address
                    || marker.data_hash != blob_hash
                {
                    continue;
                }

                let credential_hash = match marker.integrity_hash {
                    Some(h) => h,
                    None => continue,
                };
                let timestamp = BASE64
                    .decode(&marker.payload)
                    .ok()
                    .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok())
                    .and_then(|v| {
                        v.get("timestamp")
                            .and_then(|t| serde_json::from_value::<DateTime<Utc>>(t.clone()).ok())
                    })
                    .unwrap_or_else(Utc::now);

                return Ok(Some(ChainReference {
                    user_address: marker.user_address,
                    blob_hash: marker.data_hash,
                    credential_hash,
                    timestamp,
                    block_hash: event.block_hash,
                    extrinsic_hash: event.extrinsic_hash,
                }));
            }
        }

        Ok(None)
    }
}

fn assemble(mut chunks: HashMap<u32, Vec<u8>>, count: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        if let Some(chunk) = chunks.remove(&i) {
            out.extend_from_slice(&chunk);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trips_without_integrity_hash() {
        let marker = Marker {
            kind: KIND_CREDENTIAL_DATA.to_string(),
            user_address: "0xabc".to_string(),
            data_hash: "deadbeef".to_string(),
            integrity_hash: None,
            chunk_index: 2,
            chunk_count: 4,
            payload: BASE64.encode(b"hello"),
        };
        let wire = marker.format();
        assert_eq!(Marker::parse(&wire), Some(marker));
    }

    #[test]
    fn marker_round_trips_with_integrity_hash() {
        let marker = Marker {
            kind: KIND_SECURE_BATCH.to_string(),
            user_address: "0xabc".to_string(),
            data_hash: "bafyhash".to_string(),
            integrity_hash: Some("cafebabe".to_string()),
            chunk_index: 0,
            chunk_count: 1,
            payload: BASE64.encode(b"{}"),
        };
        let wire = marker.format();
        assert_eq!(wire, format!("SECURE_BATCH:0xabc:bafyhash:cafebabe:0:1:{}", BASE64.encode(b"{}")));
        assert_eq!(Marker::parse(&wire), Some(marker));
    }

    #[test]
    fn marker_rejects_foreign_remarks() {
        assert_eq!(Marker::parse("hello world"), None);
        assert_eq!(Marker::parse("OTHER_KIND:a:b:0:1:cGF5bG9hZA=="), None);
        assert_eq!(Marker::parse("CREDENTIAL_DATA:a:b:5:2:cGF5bG9hZA=="), None); // index >= count
        assert_eq!(Marker::parse("CREDENTIAL_DATA:a:b:x:2:cGF5bG9hZA=="), None);
        assert_eq!(Marker::parse("CREDENTIAL_DATA:a:b:0:0:cGF5bG9hZA=="), None);
    }

    #[test]
    fn chunking_reassembles_exactly() {
        const S: usize = REMARK_CHUNK_SIZE;
        for n in [0usize, S - 1, S, S + 1, 10 * S] {
            let data: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            let chunks = split_chunks(&data, S);
            assert_eq!(chunks.len() as u32, chunk_count(n, S));

            let reassembled: Vec<u8> = chunks.concat();
            assert_eq!(reassembled, data, "length {}", n);
        }
    }

    #[test]
    fn chunk_counts() {
        const S: usize = REMARK_CHUNK_SIZE;
        assert_eq!(chunk_count(0, S), 1);
        assert_eq!(chunk_count(S - 1, S), 1);
        assert_eq!(chunk_count(S, S), 1);
        assert_eq!(chunk_count(S + 1, S), 2);
        assert_eq!(chunk_count(3500, 1000), 4);
    }

    #[test]
    fn cost_estimation() {
        assert_eq!(estimate_cost(3500, AnchorStrategy::RemarkChunks), 4.0);
        assert_eq!(estimate_cost(3500, AnchorStrategy::Batch), 4.0 * COST_BATCH);
        assert_eq!(estimate_cost(500, AnchorStrategy::SingleMarker), COST_SINGLE_MARKER);
        assert_eq!(estimate_cost(0, AnchorStrategy::RemarkChunks), 1.0);
    }

    #[test]
    fn pallet_kind_accepted_on_read() {
        assert!(kind_matches(AnchorStrategy::RemarkChunks, KIND_CREDENTIAL_PALLET));
        assert!(kind_matches(AnchorStrategy::RemarkChunks, KIND_CREDENTIAL_DATA));
        assert!(!kind_matches(AnchorStrategy::RemarkChunks, KIND_SECURE_BATCH));
    }
}
