//! Payload encryption at rest and PIN digests.
//!
//! Both keys are derived from the configured server secret with BLAKE3's key
//! derivation mode, each under its own context string:
//!
//! - payloads are sealed with ChaCha20-Poly1305, the secret key as associated
//!   data so a record moved under another key fails to open
//! - PINs are stored as a keyed BLAKE3 digest over `key || pin`

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const PAYLOAD_CONTEXT: &str = "pinvault 2026-10 payload encryption key";
const PIN_CONTEXT: &str = "pinvault 2026-10 pin digest key";

pub const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid nonce length")]
    InvalidNonce,
}

/// Sealed payload
#[derive(Debug, Clone)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PayloadCipher {
    payload_key: [u8; 32],
    pin_key: [u8; 32],
}

impl PayloadCipher {
    pub fn new(server_secret: &str) -> Self {
        Self {
            payload_key: blake3::derive_key(PAYLOAD_CONTEXT, server_secret.as_bytes()),
            pin_key: blake3::derive_key(PIN_CONTEXT, server_secret.as_bytes()),
        }
    }

    pub fn seal(&self, key: &str, plaintext: &[u8]) -> Result<Sealed, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.payload_key)
            .map_err(|_| CipherError::EncryptionFailed)?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::EncryptionFailed)?;

        Ok(Sealed { nonce, ciphertext })
    }

    pub fn open(&self, key: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::InvalidNonce);
        }
        let cipher = ChaCha20Poly1305::new_from_slice(&self.payload_key)
            .map_err(|_| CipherError::DecryptionFailed)?;
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| CipherError::DecryptionFailed)
    }

    fn digest(&self, key: &str, pin: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.pin_key);
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(pin.as_bytes());
        hasher.finalize()
    }

    /// Hex digest of `pin` bound to `key`.
    pub fn pin_digest(&self, key: &str, pin: &str) -> String {
        self.digest(key, pin).to_hex().to_string()
    }

    /// Constant-time check of `pin` against a stored digest.
    pub fn verify_pin(&self, key: &str, pin: &str, stored_hex: &str) -> bool {
        let Ok(stored) = blake3::Hash::from_hex(stored_hex) else {
            return false;
        };
        // blake3::Hash equality is constant time
        self.digest(key, pin) == stored
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher").finish_non_exhaustive()
    }
}
