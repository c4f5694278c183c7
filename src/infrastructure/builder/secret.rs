//! Process-scoped signing secret
//!
//! Generated once at startup from the OS RNG, held only in memory and
//! zeroed when dropped. It cannot be cloned, serialized or printed, so
//! checkpoints sealed by one process can never be opened by another.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::DomainError;

type HmacSha256 = Hmac<Sha256>;

/// Length of the secret in bytes
pub const SECRET_LEN: usize = 32;

/// In-memory key material that is wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret {
    bytes: [u8; SECRET_LEN],
}

impl SigningSecret {
    /// Generate a fresh secret from the operating system RNG
    pub fn generate() -> Result<Self, DomainError> {
        let mut secret = Self {
            bytes: [0u8; SECRET_LEN],
        };
        OsRng
            .try_fill_bytes(&mut secret.bytes)
            .map_err(|e| DomainError::internal(format!("Failed to generate signing secret: {}", e)))?;

        Ok(secret)
    }

    /// Derive an independent sub-key bound to `label`
    pub fn derive(&self, label: &[u8]) -> SigningSecret {
        let mut mac =
            HmacSha256::new_from_slice(&self.bytes).expect("HMAC can take key of any size");
        mac.update(label);

        let mut derived = Self {
            bytes: [0u8; SECRET_LEN],
        };
        derived.bytes.copy_from_slice(&mac.finalize().into_bytes());

        derived
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self { bytes }
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}
