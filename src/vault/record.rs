use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cipher::Sealed;

/// Stored form of a secret, serialized as JSON under `<prefix>:msg:<key>`.
///
/// The payload is sealed and the PIN is only kept as a digest; everything
/// else is plaintext metadata so admin listings never need to decrypt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// ChaCha20-Poly1305 ciphertext (base64)
    pub ciphertext: String,
    /// Per-record nonce (base64)
    pub nonce: String,
    /// Keyed BLAKE3 digest of the PIN (hex)
    pub pin_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_attempts: u32,
}

impl SecretRecord {
    pub fn new(
        sealed: &Sealed,
        pin_digest: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Self {
        Self {
            ciphertext: BASE64.encode(&sealed.ciphertext),
            nonce: BASE64.encode(sealed.nonce),
            pin_digest,
            created_at,
            expires_at,
            max_attempts,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Decoded `(nonce, ciphertext)`
    pub fn sealed_parts(&self) -> Result<(Vec<u8>, Vec<u8>), base64::DecodeError> {
        Ok((BASE64.decode(&self.nonce)?, BASE64.decode(&self.ciphertext)?))
    }
}

/// Metadata returned by admin endpoints. Never carries the PIN or payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretSummary {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_attempts: u32,
    /// `None` when the stored counter is unreadable
    pub attempts_remaining: Option<u32>,
}
