//! Checkpoint sealing
//!
//! Snapshots are sealed with AES-256-GCM. The associated data binds the
//! session id, checkpoint id and content hash, so moving a snapshot between
//! checkpoints or editing any stored field makes `open` fail. When the cipher
//! cannot be used, the snapshot falls back to HMAC-signed plaintext, which
//! is still tamper-evident.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::secret::SigningSecret;
use crate::domain::builder::{
    BuilderError, Checkpoint, CheckpointId, SessionId, SnapshotEnvelope, WorkflowNode,
};

type HmacSha256 = Hmac<Sha256>;

const SEAL_KEY_LABEL: &[u8] = b"workflow-builder/checkpoint-seal";
const SIGN_KEY_LABEL: &[u8] = b"workflow-builder/checkpoint-sign";

/// Output of sealing a node list
#[derive(Debug, Clone)]
pub struct SealedSnapshot {
    pub nodes_hash: String,
    pub envelope: SnapshotEnvelope,
}

/// Seals and opens checkpoint snapshots with the process signing secret
pub struct CheckpointSealer {
    cipher: Option<LessSafeKey>,
    signing_key: SigningSecret,
    rng: SystemRandom,
}

impl std::fmt::Debug for CheckpointSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointSealer")
            .field("cipher_available", &self.cipher.is_some())
            .finish()
    }
}

impl CheckpointSealer {
    /// Create a sealer; takes ownership of the secret for the sealer's lifetime
    pub fn new(secret: SigningSecret) -> Self {
        let seal_key = secret.derive(SEAL_KEY_LABEL);
        let cipher = match UnboundKey::new(&AES_256_GCM, seal_key.expose()) {
            Ok(key) => Some(LessSafeKey::new(key)),
            Err(_) => {
                warn!("AES-256-GCM unavailable; checkpoints will be signed but not encrypted");
                None
            }
        };

        Self {
            cipher,
            signing_key: secret.derive(SIGN_KEY_LABEL),
            rng: SystemRandom::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn without_cipher(secret: SigningSecret) -> Self {
        Self {
            cipher: None,
            signing_key: secret.derive(SIGN_KEY_LABEL),
            rng: SystemRandom::new(),
        }
    }

    /// Seal a node list. Falls back to a degraded envelope rather than failing.
    pub fn seal(
        &self,
        session_id: &SessionId,
        checkpoint_id: CheckpointId,
        nodes: &[WorkflowNode],
    ) -> Result<SealedSnapshot, BuilderError> {
        let plaintext = serde_json::to_vec(nodes)
            .map_err(|e| BuilderError::internal(format!("Failed to serialize nodes: {}", e)))?;
        let nodes_hash = content_hash(&plaintext);
        let aad = associated_data(session_id, checkpoint_id, &nodes_hash);

        let envelope = match self.try_encrypt(&aad, &plaintext) {
            Some(envelope) => envelope,
            None => {
                warn!(
                    session_id = %session_id,
                    checkpoint_id = checkpoint_id,
                    "Checkpoint encryption unavailable, storing signed snapshot"
                );
                self.sign(&aad, &plaintext)
            }
        };

        Ok(SealedSnapshot {
            nodes_hash,
            envelope,
        })
    }

    /// Verify a checkpoint and recover its node list
    pub fn open(
        &self,
        session_id: &SessionId,
        checkpoint: &Checkpoint,
    ) -> Result<Vec<WorkflowNode>, BuilderError> {
        let aad = associated_data(session_id, checkpoint.id(), checkpoint.nodes_hash());

        let plaintext = match checkpoint.envelope() {
            SnapshotEnvelope::Sealed { nonce, ciphertext } => {
                self.decrypt(&aad, nonce, ciphertext)?
            }
            SnapshotEnvelope::Degraded { payload, signature } => {
                self.verify_signed(&aad, payload, signature)?
            }
        };

        if content_hash(&plaintext) != checkpoint.nodes_hash() {
            return Err(BuilderError::integrity(format!(
                "Checkpoint {} content hash mismatch",
                checkpoint.id()
            )));
        }

        serde_json::from_slice(&plaintext).map_err(|e| {
            BuilderError::integrity(format!(
                "Checkpoint {} snapshot is unreadable: {}",
                checkpoint.id(),
                e
            ))
        })
    }

    fn try_encrypt(&self, aad: &str, plaintext: &[u8]) -> Option<SnapshotEnvelope> {
        let cipher = self.cipher.as_ref()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).ok()?;

        let mut in_out = plaintext.to_vec();
        cipher
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad.as_bytes()),
                &mut in_out,
            )
            .ok()?;

        Some(SnapshotEnvelope::Sealed {
            nonce: STANDARD.encode(nonce_bytes),
            ciphertext: STANDARD.encode(in_out),
        })
    }

    fn decrypt(&self, aad: &str, nonce: &str, ciphertext: &str) -> Result<Vec<u8>, BuilderError> {
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BuilderError::integrity("Sealed checkpoint cannot be opened without a cipher")
        })?;

        let nonce_bytes: [u8; NONCE_LEN] = STANDARD
            .decode(nonce)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| BuilderError::integrity("Checkpoint nonce is malformed"))?;

        let mut in_out = STANDARD
            .decode(ciphertext)
            .map_err(|_| BuilderError::integrity("Checkpoint ciphertext is malformed"))?;

        let plaintext = cipher
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| BuilderError::integrity("Checkpoint authentication failed"))?;

        Ok(plaintext.to_vec())
    }

    fn sign(&self, aad: &str, plaintext: &[u8]) -> SnapshotEnvelope {
        let payload = STANDARD.encode(plaintext);

        SnapshotEnvelope::Degraded {
            signature: hex::encode(self.mac(aad, &payload).finalize().into_bytes()),
            payload,
        }
    }

    fn verify_signed(
        &self,
        aad: &str,
        payload: &str,
        signature: &str,
    ) -> Result<Vec<u8>, BuilderError> {
        let expected = hex::decode(signature)
            .map_err(|_| BuilderError::integrity("Checkpoint signature is malformed"))?;

        self.mac(aad, payload)
            .verify_slice(&expected)
            .map_err(|_| BuilderError::integrity("Checkpoint signature mismatch"))?;

        STANDARD
            .decode(payload)
            .map_err(|_| BuilderError::integrity("Checkpoint payload is malformed"))
    }

    fn mac(&self, aad: &str, payload: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.expose())
            .expect("HMAC can take key of any size");
        mac.update(aad.as_bytes());
        mac.update(&[0u8]);
        mac.update(payload.as_bytes());
        mac
    }
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn associated_data(session_id: &SessionId, checkpoint_id: CheckpointId, nodes_hash: &str) -> String {
    format!("{}:{}:{}", session_id, checkpoint_id, nodes_hash)
}
