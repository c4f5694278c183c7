//! Checkpoint entity - an integrity-protected snapshot of a session's node list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::BuilderError;

/// Maximum length for checkpoint labels
pub const MAX_LABEL_LENGTH: usize = 100;

/// Label of the checkpoint every session starts with
pub const BASELINE_LABEL: &str = "baseline";

/// Sequential checkpoint identifier, unique within a session
pub type CheckpointId = u64;

/// How a snapshot is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    /// Authenticated encryption
    Sealed,
    /// Signed plaintext, produced when encryption was unavailable
    Degraded,
}

impl Protection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sealed => "sealed",
            Self::Degraded => "degraded",
        }
    }
}

/// Stored form of a snapshotted node list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protection", rename_all = "snake_case")]
pub enum SnapshotEnvelope {
    Sealed {
        /// Base64 nonce
        nonce: String,
        /// Base64 ciphertext with appended authentication tag
        ciphertext: String,
    },
    Degraded {
        /// Base64 serialized node list
        payload: String,
        /// Hex HMAC-SHA256 over associated data and payload
        signature: String,
    },
}

impl SnapshotEnvelope {
    pub fn protection(&self) -> Protection {
        match self {
            Self::Sealed { .. } => Protection::Sealed,
            Self::Degraded { .. } => Protection::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.protection() == Protection::Degraded
    }
}

/// A snapshot of a session's working node list
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    id: CheckpointId,
    label: String,
    created_at: DateTime<Utc>,
    node_count: usize,
    nodes_hash: String,
    envelope: SnapshotEnvelope,
}

impl Checkpoint {
    pub fn new(
        id: CheckpointId,
        label: impl Into<String>,
        created_at: DateTime<Utc>,
        node_count: usize,
        nodes_hash: impl Into<String>,
        envelope: SnapshotEnvelope,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            created_at,
            node_count,
            nodes_hash: nodes_hash.into(),
            envelope,
        }
    }

    pub fn id(&self) -> CheckpointId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Hex SHA-256 of the serialized node list
    pub fn nodes_hash(&self) -> &str {
        &self.nodes_hash
    }

    pub fn envelope(&self) -> &SnapshotEnvelope {
        &self.envelope
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            id: self.id,
            label: self.label.clone(),
            created_at: self.created_at,
            node_count: self.node_count,
            protection: self.envelope.protection(),
        }
    }

    #[cfg(test)]
    pub(crate) fn envelope_mut(&mut self) -> &mut SnapshotEnvelope {
        &mut self.envelope
    }

    #[cfg(test)]
    pub(crate) fn set_nodes_hash(&mut self, hash: impl Into<String>) {
        self.nodes_hash = hash.into();
    }
}

/// Checkpoint metadata safe to return to callers (no snapshot contents)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub id: CheckpointId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub protection: Protection,
}

/// Validate a caller-supplied checkpoint label
pub fn validate_checkpoint_label(label: &str) -> Result<(), BuilderError> {
    if label.trim().is_empty() {
        return Err(BuilderError::validation("Checkpoint label cannot be empty"));
    }

    if label.chars().count() > MAX_LABEL_LENGTH {
        return Err(BuilderError::validation(format!(
            "Checkpoint label exceeds maximum length of {} characters",
            MAX_LABEL_LENGTH
        )));
    }

    Ok(())
}
