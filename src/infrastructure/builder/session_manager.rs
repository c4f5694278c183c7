//! Session manager - lifecycle, lookup, rate limiting and checkpoint stack

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::registry::{SessionHandle, SessionRegistry};
use super::rollback_manager::RollbackManager;
use crate::domain::builder::{
    BuilderError, BuilderSession, CheckpointId, CheckpointSummary, SessionId, SessionLimits,
    SessionState, BASELINE_LABEL,
};
use crate::infrastructure::observability::{
    record_checkpoint, record_rate_limited, record_session_created, record_session_ended,
};

/// Result of creating a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointOutcome {
    pub checkpoint: CheckpointSummary,
    /// True when the snapshot is signed but not encrypted
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<CheckpointId>,
}

/// Owns session lifecycle on top of an injected registry
#[derive(Debug)]
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    rollback: Arc<RollbackManager>,
    limits: SessionLimits,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rollback: Arc<RollbackManager>,
        limits: SessionLimits,
    ) -> Self {
        Self {
            registry,
            rollback,
            limits,
        }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create a session with an empty node list and a baseline checkpoint
    pub async fn create_session(&self, workflow_id: &str) -> Result<SessionHandle, BuilderError> {
        let mut session =
            BuilderSession::new(SessionId::generate(), workflow_id, &self.limits, Utc::now());

        session.record_audit(
            "session_created",
            json!({
                "workflow_id": workflow_id,
                "expires_at": session.expires_at(),
            }),
        );
        self.create_checkpoint(&mut session, BASELINE_LABEL)?;

        let handle = SessionHandle::new(session);
        self.registry.insert(handle.clone()).await;
        record_session_created();

        info!(
            session_id = %handle.id(),
            workflow_id = %workflow_id,
            expires_at = %handle.expires_at(),
            "Builder session created"
        );

        Ok(handle)
    }

    /// Look up a live session. Never mutates state or extends expiry.
    pub async fn validate_session(&self, session_id: &str) -> Option<SessionHandle> {
        let handle = self.registry.get(&SessionId::from(session_id)).await?;

        if handle.is_expired_at(Utc::now()) {
            debug!(session_id = %session_id, "Session expired");
            return None;
        }

        Some(handle)
    }

    /// Like [`validate_session`](Self::validate_session) but returns a typed error
    pub async fn require_session(&self, session_id: &str) -> Result<SessionHandle, BuilderError> {
        self.validate_session(session_id)
            .await
            .ok_or_else(|| BuilderError::session_unavailable(session_id))
    }

    /// Count an operation against the session's fixed-window cap.
    ///
    /// Returns false once the cap is exceeded; callers must abort on false.
    pub fn check_rate_limit(&self, session: &mut BuilderSession) -> bool {
        if session.check_rate_limit_at(Utc::now()) {
            return true;
        }

        let limit = session.security().rate_limits().operations_per_window();
        warn!(session_id = %session.id(), limit = limit, "Session rate limit exceeded");
        session.record_audit("rate_limit_exceeded", json!({ "limit": limit }));
        record_rate_limited();

        false
    }

    /// Snapshot the current nodes onto the session's checkpoint stack
    pub fn create_checkpoint(
        &self,
        session: &mut BuilderSession,
        label: &str,
    ) -> Result<CheckpointOutcome, BuilderError> {
        let checkpoint = self.rollback.build_checkpoint(session, label)?;
        let summary = checkpoint.summary();
        let degraded = checkpoint.envelope().is_degraded();

        let evicted = session.push_checkpoint(checkpoint).map(|c| c.id());

        session.record_audit(
            "checkpoint_created",
            json!({
                "checkpoint_id": summary.id,
                "label": summary.label,
                "node_count": summary.node_count,
                "degraded": degraded,
                "evicted": evicted,
            }),
        );
        record_checkpoint(summary.protection.as_str());

        if degraded {
            warn!(
                session_id = %session.id(),
                checkpoint_id = summary.id,
                "Checkpoint stored with degraded protection"
            );
        }

        debug!(
            session_id = %session.id(),
            checkpoint_id = summary.id,
            evicted = ?evicted,
            "Checkpoint created"
        );

        Ok(CheckpointOutcome {
            checkpoint: summary,
            degraded,
            evicted,
        })
    }

    /// Destroy a session immediately. Returns false if it did not exist.
    pub async fn cleanup_session(&self, session_id: &str) -> bool {
        self.destroy_session(session_id, "cleanup").await
    }

    pub(crate) async fn destroy_session(&self, session_id: &str, reason: &'static str) -> bool {
        let removed = self.registry.remove(&SessionId::from(session_id)).await;

        if removed {
            record_session_ended(reason);
            info!(session_id = %session_id, reason = reason, "Builder session destroyed");
        }

        removed
    }

    /// Lifecycle state of an issued session id
    pub async fn state_of(&self, session_id: &str) -> Option<SessionState> {
        let id = SessionId::from(session_id);

        if let Some(state) = self.registry.tombstone(&id).await {
            return Some(state);
        }

        let handle = self.registry.get(&id).await?;

        if handle.is_expired_at(Utc::now()) {
            Some(SessionState::Expired)
        } else {
            Some(SessionState::Active)
        }
    }
}
