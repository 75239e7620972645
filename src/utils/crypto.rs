use crate::constant::{ENVELOPE_IV_LEN, ENVELOPE_TAG_LEN};
use crate::utils::errors::{CredentialError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Authenticated encryption of credential payloads.
///
/// The envelope string is `base64(IV ‖ tag ‖ ciphertext)` with a 12-byte IV
/// and a 16-byte GCM tag. This layout is an at-rest contract shared with
/// other implementations and carries no version prefix; a future versioned
/// format must be distinguishable by a non-base64 lead byte.
pub struct EncryptionEnvelope {
    cipher: Aes256Gcm,
}

impl EncryptionEnvelope {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key.into());
        Self { cipher }
    }

    /// Build from the 64-hex-char key string loaded by the settings layer.
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|_| CredentialError::Encryption("encryption key is not valid hex".to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CredentialError::Encryption("encryption key must be 32 bytes".to_string()))?;
        Ok(Self::new(&key))
    }

    /// Seal raw bytes into an envelope string.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let payload = Payload {
            msg: plaintext,
            aad: b"".as_ref(),
        };

        // aes-gcm appends the tag to the ciphertext; the envelope layout
        // wants IV ‖ tag ‖ ciphertext, so split it back out.
        let sealed = self
            .cipher
            .encrypt(&nonce, payload)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;
        let split = sealed.len() - ENVELOPE_TAG_LEN;
        let (ciphertext, tag) = sealed.split_at(split);

        let mut out = Vec::with_capacity(ENVELOPE_IV_LEN + ENVELOPE_TAG_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);

        Ok(BASE64.encode(out))
    }

    /// Open an envelope string back into raw bytes.
    ///
    /// Fails closed: any truncated, forged or re-encoded envelope is an
    /// `Integrity` error, never partial data.
    pub fn open(&self, envelope: &str) -> Result<Vec<u8>> {
        let raw = BASE64
            .decode(envelope)
            .map_err(|_| CredentialError::Integrity("envelope is not valid base64".to_string()))?;

        if raw.len() < ENVELOPE_IV_LEN + ENVELOPE_TAG_LEN {
            return Err(CredentialError::Integrity("envelope too short".to_string()));
        }

        let (nonce, rest) = raw.split_at(ENVELOPE_IV_LEN);
        let (tag, ciphertext) = rest.split_at(ENVELOPE_TAG_LEN);

        let mut sealed = Vec::with_capacity(ciphertext.len() + ENVELOPE_TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let payload = Payload {
            msg: &sealed,
            aad: b"".as_ref(),
        };

        self.cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| CredentialError::Integrity("envelope authentication failed".to_string()))
    }

    /// Encrypt a JSON payload.
    pub fn encrypt(&self, plaintext: &serde_json::Value) -> Result<String> {
        let bytes = serde_json::to_vec(plaintext)?;
        self.seal(&bytes)
    }

    /// Decrypt an envelope back into a JSON payload.
    pub fn decrypt(&self, envelope: &str) -> Result<serde_json::Value> {
        let bytes = self.open(envelope)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CredentialError::Integrity(format!("decrypted payload is not JSON: {}", e)))
    }
}

/// SHA-256 hash (hex) of the canonical plaintext JSON. Computed once at
/// issuance and re-derived at every verification site; must be identical
/// regardless of which tier the plaintext was recovered from.
pub fn hash_credential_data(data: &serde_json::Value) -> Result<String> {
    let canonical = serde_json::to_string(data)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Sign remark bytes with the anchoring account's key (Keccak-256 digest,
/// compact ECDSA signature).
pub fn sign_remark(data: &[u8], private_key: &SecretKey) -> Result<Vec<u8>> {
    let secp = Secp256k1::new();

    let mut hasher = Keccak256::new();
    hasher.update(data);
    let hash = hasher.finalize();

    let message = Message::from_digest_slice(hash.as_slice())
        .map_err(|_| CredentialError::Chain("invalid message hash".to_string()))?;

    let signature = secp.sign_ecdsa(&message, private_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a remark signature.
pub fn verify_remark(data: &[u8], signature: &[u8], public_key: &PublicKey) -> Result<bool> {
    let secp = Secp256k1::new();

    let mut hasher = Keccak256::new();
    hasher.update(data);
    let hash = hasher.finalize();

    let message = Message::from_digest_slice(hash.as_slice())
        .map_err(|_| CredentialError::Chain("invalid message hash".to_string()))?;

    let sig = Signature::from_compact(signature)
        .map_err(|_| CredentialError::Chain("invalid signature format".to_string()))?;

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}

/// Derive the on-chain address for a signing key (Keccak-256 of the
/// uncompressed public key, last 20 bytes).
pub fn signer_address(private_key: &SecretKey) -> String {
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_secret_key(&secp, private_key);
    let public_key_bytes = public_key.serialize_uncompressed();

    let mut hasher = Keccak256::new();
    hasher.update(&public_key_bytes[1..]);
    let hash = hasher.finalize();

    format!("0x{}", hex::encode(&hash[12..32]))
}

/// Parse the anchoring account's private key from its hex form in config.
pub fn parse_signer_key(hex_key: &str) -> Result<SecretKey> {
    let bytes = hex::decode(hex_key.trim_start_matches("0x"))
        .map_err(|_| CredentialError::Chain("signer key is not valid hex".to_string()))?;
    SecretKey::from_slice(&bytes)
        .map_err(|_| CredentialError::Chain("signer key is not a valid secp256k1 key".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> EncryptionEnvelope {
        EncryptionEnvelope::new(&[7u8; 32])
    }

    #[test]
    fn round_trip_json() {
        let env = envelope();
        let payload = json!({"degree": "BSc", "field": "Physics", "year": 2024});
        let sealed = env.encrypt(&payload).unwrap();
        assert_eq!(env.decrypt(&sealed).unwrap(), payload);
    }

    #[test]
    fn round_trip_empty_and_large() {
        let env = envelope();
        for len in [0usize, 1, 4096] {
            let data = vec![0xabu8; len];
            let sealed = env.seal(&data).unwrap();
            assert_eq!(env.open(&sealed).unwrap(), data);
        }
    }

    #[test]
    fn tampered_envelope_fails_closed() {
        let env = envelope();
        let sealed = env.encrypt(&json!({"a": 1})).unwrap();

        let mut raw = base64::engine::general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let forged = base64::engine::general_purpose::STANDARD.encode(raw);

        match env.decrypt(&forged) {
            Err(CredentialError::Integrity(_)) => {}
            other => panic!("expected Integrity error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn truncated_envelope_fails_closed() {
        let env = envelope();
        assert!(matches!(
            env.open("AAAA"),
            Err(CredentialError::Integrity(_))
        ));
        assert!(matches!(env.open("!!!not-base64"), Err(CredentialError::Integrity(_))));
    }

    #[test]
    fn distinct_ivs_per_call() {
        let env = envelope();
        let payload = json!({"same": "payload"});
        let a = env.encrypt(&payload).unwrap();
        let b = env.encrypt(&payload).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let payload = json!({"degree": "MSc", "gpa": 3.9});
        let h1 = hash_credential_data(&payload).unwrap();
        let h2 = hash_credential_data(&payload).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn remark_signature_verifies() {
        let key = parse_signer_key(&hex::encode([0x42u8; 32])).unwrap();
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &key);

        let sig = sign_remark(b"CREDENTIAL_DATA:addr:hash:0:1:AAAA", &key).unwrap();
        assert!(verify_remark(b"CREDENTIAL_DATA:addr:hash:0:1:AAAA", &sig, &public).unwrap());
        assert!(!verify_remark(b"tampered", &sig, &public).unwrap());
    }

    #[test]
    fn signer_address_shape() {
        let key = parse_signer_key(&hex::encode([0x42u8; 32])).unwrap();
        let addr = signer_address(&key);
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }
}
