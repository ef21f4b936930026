//! At-rest encoding for persisted entries.
//!
//! Payloads (content, tags, context) are JSON, optionally sealed with AES-256-GCM under a
//! key derived from the configured secret. Sealed records are `nonce (12 bytes) ||
//! ciphertext+tag`; any bit flipped in either part makes [`Sealer::open`] fail instead of
//! returning altered content. Vectors are stored as little-endian `f32` bytes and checked
//! for length and finiteness on the way back in.

use std::collections::BTreeSet;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{MemoryError, Result};

const NONCE_LEN: usize = 12;

/// The caller-visible part of an entry, stored as one sealed blob per row.
#[derive(Debug, Serialize, Deserialize)]
pub struct Payload {
    pub content: Value,
    pub tags: BTreeSet<String>,
    pub context: Map<String, Value>,
}

/// Seals and opens persisted payloads.
pub enum Sealer {
    /// Payloads are stored as plain JSON.
    Plain,
    /// Payloads are encrypted and authenticated with AES-256-GCM.
    Aes256Gcm(Box<Aes256Gcm>),
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.codec_name())
    }
}

impl Sealer {
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => {
                let key = Self::derive_key(secret);
                Self::Aes256Gcm(Box::new(Aes256Gcm::new(&key)))
            }
            None => Self::Plain,
        }
    }

    /// Name recorded in `store_meta` so a plain store is never opened as sealed or vice versa.
    pub fn codec_name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Aes256Gcm(_) => "aes-256-gcm",
        }
    }

    /// SHA-256 of the secret. Not a password KDF; supply a high-entropy secret.
    fn derive_key(secret: &str) -> Key<Aes256Gcm> {
        let digest = Sha256::digest(secret.as_bytes());
        *Key::<Aes256Gcm>::from_slice(&digest)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Plain => Ok(plaintext.to_vec()),
            Self::Aes256Gcm(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|e| MemoryError::PersistenceFailure(format!("encryption failed: {e}")))?;
                let mut sealed = nonce.to_vec();
                sealed.extend_from_slice(&ciphertext);
                Ok(sealed)
            }
        }
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Plain => Ok(sealed.to_vec()),
            Self::Aes256Gcm(cipher) => {
                if sealed.len() < NONCE_LEN {
                    return Err(MemoryError::PersistenceFailure(
                        "sealed payload too short".into(),
                    ));
                }
                let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
                cipher
                    .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                    .map_err(|_| {
                        MemoryError::PersistenceFailure(
                            "payload failed authentication (wrong secret or tampered data)".into(),
                        )
                    })
            }
        }
    }

    pub fn encode_payload(&self, payload: &Payload) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| MemoryError::PersistenceFailure(format!("failed to encode payload: {e}")))?;
        self.seal(&json)
    }

    pub fn decode_payload(&self, sealed: &[u8]) -> Result<Payload> {
        let json = self.open(sealed)?;
        serde_json::from_slice(&json)
            .map_err(|e| MemoryError::PersistenceFailure(format!("corrupt payload: {e}")))
    }
}

/// Convert an f32 vector to little-endian bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector of exactly `dimension` finite values.
pub fn bytes_to_vector(bytes: &[u8], dimension: usize) -> Result<Vec<f32>> {
    if bytes.len() != dimension * 4 {
        return Err(MemoryError::PersistenceFailure(format!(
            "vector is {} bytes, expected {}",
            bytes.len(),
            dimension * 4
        )));
    }
    let vector: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(MemoryError::PersistenceFailure(
            "vector contains non-finite values".into(),
        ));
    }
    Ok(vector)
}
