//! PIN and key generation.
//!
//! Every symbol is drawn independently and uniformly from the alphabet using
//! the operating system CSPRNG. PIN length times the attempt limit bounds the
//! odds of a brute-force reveal, so a weaker source is never acceptable here.

use rand::{rngs::OsRng, Rng};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a secret key in characters
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN length must be greater than zero")]
    ZeroLength,
}

/// Symbol set PINs are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinAlphabet {
    #[default]
    Numeric,
    Alphanumeric,
}

impl PinAlphabet {
    pub fn symbols(self) -> &'static [u8] {
        match self {
            Self::Numeric => DIGITS,
            Self::Alphanumeric => ALPHANUMERIC,
        }
    }
}

/// Stateless PIN generator bound to an alphabet.
#[derive(Debug, Clone, Copy)]
pub struct PinGenerator {
    alphabet: PinAlphabet,
}

impl PinGenerator {
    pub fn new(alphabet: PinAlphabet) -> Self {
        Self { alphabet }
    }

    pub fn alphabet(&self) -> PinAlphabet {
        self.alphabet
    }

    /// Generate a PIN of exactly `length` symbols.
    pub fn generate(&self, length: usize) -> Result<String, PinError> {
        if length == 0 {
            return Err(PinError::ZeroLength);
        }
        let symbols = self.alphabet.symbols();
        let pin = (0..length)
            .map(|_| symbols[OsRng.gen_range(0..symbols.len())] as char)
            .collect();
        Ok(pin)
    }
}

/// Generate an unguessable secret key (128 random bits, lowercase hex).
pub fn generate_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether `key` has the shape of a key produced by [`generate_key`].
pub fn is_well_formed_key(key: &str) -> bool {
    key.len() == KEY_LEN && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
