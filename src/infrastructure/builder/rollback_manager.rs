//! Rollback manager - checkpoint creation protocol, verification and restore

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::sealer::CheckpointSealer;
use crate::domain::builder::{
    BuilderError, BuilderSession, Checkpoint, CheckpointId, WorkflowNode, WorkflowOrchestrator,
};
use crate::infrastructure::observability::record_rollback;

/// Result of a successful rollback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackOutcome {
    pub checkpoint_id: CheckpointId,
    pub label: String,
    pub node_count: usize,
    pub discarded_checkpoints: usize,
}

/// Builds, verifies and restores integrity-protected checkpoints
#[derive(Debug)]
pub struct RollbackManager {
    sealer: Arc<CheckpointSealer>,
}

impl RollbackManager {
    pub fn new(sealer: Arc<CheckpointSealer>) -> Self {
        Self { sealer }
    }

    /// Snapshot the session's current nodes into a new checkpoint.
    ///
    /// Allocates the next checkpoint id but does not push it; the session
    /// manager owns the stack and its eviction policy.
    pub fn build_checkpoint(
        &self,
        session: &mut BuilderSession,
        label: &str,
    ) -> Result<Checkpoint, BuilderError> {
        let id = session.allocate_checkpoint_id();
        let sealed = self
            .sealer
            .seal(session.id(), id, session.current_nodes())?;

        Ok(Checkpoint::new(
            id,
            label,
            Utc::now(),
            session.current_nodes().len(),
            sealed.nodes_hash,
            sealed.envelope,
        ))
    }

    /// Verify a checkpoint and recover its node list without touching the session
    pub fn verify_checkpoint(
        &self,
        session: &BuilderSession,
        checkpoint_id: CheckpointId,
    ) -> Result<Vec<WorkflowNode>, BuilderError> {
        let checkpoint = session.checkpoint(checkpoint_id).ok_or_else(|| {
            BuilderError::validation(format!("Checkpoint {} not found", checkpoint_id))
        })?;

        self.sealer.open(session.id(), checkpoint)
    }

    /// Restore the session to `checkpoint_id`.
    ///
    /// The remote workflow is updated first; the working nodes and the
    /// checkpoint stack change only after it accepts the restored list.
    pub async fn rollback_to_checkpoint(
        &self,
        session: &mut BuilderSession,
        checkpoint_id: CheckpointId,
        orchestrator: &dyn WorkflowOrchestrator,
    ) -> Result<RollbackOutcome, BuilderError> {
        let restored = match self.verify_checkpoint(session, checkpoint_id) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(
                    session_id = %session.id(),
                    checkpoint_id = checkpoint_id,
                    error = %e,
                    "Rollback rejected"
                );
                session.record_audit(
                    "rollback_failed",
                    json!({ "checkpoint_id": checkpoint_id, "reason": e.code() }),
                );
                record_rollback("rejected");
                return Err(e);
            }
        };

        let update = orchestrator
            .update_workflow(session.workflow_id().to_string(), restored.clone())
            .await;

        let failure = match update {
            Ok(Some(_)) => None,
            Ok(None) => Some(BuilderError::external("Remote workflow update was rejected")),
            Err(e) => Some(BuilderError::from(e)),
        };

        if let Some(e) = failure {
            warn!(
                session_id = %session.id(),
                checkpoint_id = checkpoint_id,
                error = %e,
                "Rollback aborted, remote update failed"
            );
            session.record_audit(
                "rollback_failed",
                json!({ "checkpoint_id": checkpoint_id, "reason": e.code() }),
            );
            record_rollback("failed");
            return Err(e);
        }

        let node_count = restored.len();
        session.replace_nodes(restored);
        let discarded_checkpoints = session.discard_checkpoints_after(checkpoint_id);
        let label = session
            .checkpoint(checkpoint_id)
            .map(|c| c.label().to_string())
            .unwrap_or_default();

        session.record_audit(
            "rollback",
            json!({
                "checkpoint_id": checkpoint_id,
                "node_count": node_count,
                "discarded_checkpoints": discarded_checkpoints,
            }),
        );
        record_rollback("success");

        info!(
            session_id = %session.id(),
            checkpoint_id = checkpoint_id,
            node_count = node_count,
            discarded_checkpoints = discarded_checkpoints,
            "Rolled back to checkpoint"
        );

        Ok(RollbackOutcome {
            checkpoint_id,
            label,
            node_count,
            discarded_checkpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::{
        sanitize_node, MockWorkflowOrchestrator, NodeTypeAllowlist, SessionId, SessionLimits,
        SnapshotEnvelope, UpdateAck,
    };
    use crate::domain::DomainError;
    use crate::infrastructure::builder::secret::SigningSecret;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn manager() -> RollbackManager {
        RollbackManager::new(Arc::new(CheckpointSealer::new(
            SigningSecret::generate().unwrap(),
        )))
    }

    fn node(node_type: &str) -> WorkflowNode {
        sanitize_node(&json!({ "type": node_type }), &NodeTypeAllowlist::default()).unwrap()
    }

    fn ack(nodes: usize) -> Option<UpdateAck> {
        Some(UpdateAck {
            workflow_id: "wf-1".to_string(),
            node_count: nodes,
            updated_at: None,
        })
    }

    /// Session with baseline (empty), cp1 (1 node), cp2 (2 nodes) and 3 working nodes
    fn populated_session(manager: &RollbackManager) -> BuilderSession {
        let mut session = BuilderSession::new(
            SessionId::generate(),
            "wf-1",
            &SessionLimits::default(),
            Utc::now(),
        );

        let baseline = manager.build_checkpoint(&mut session, "baseline").unwrap();
        session.push_checkpoint(baseline);

        session.push_node(node("httpRequest"));
        let cp1 = manager.build_checkpoint(&mut session, "cp1").unwrap();
        session.push_checkpoint(cp1);

        session.push_node(node("set"));
        let cp2 = manager.build_checkpoint(&mut session, "cp2").unwrap();
        session.push_checkpoint(cp2);

        session.push_node(node("noOp"));
        session
    }

    #[tokio::test]
    async fn test_rollback_restores_nodes_and_discards_later_checkpoints() {
        let manager = manager();
        let mut session = populated_session(&manager);
        let expected: Vec<WorkflowNode> = session.current_nodes()[..1].to_vec();

        let mut orchestrator = MockWorkflowOrchestrator::new();
        let sent = expected.clone();
        orchestrator
            .expect_update_workflow()
            .withf(move |id, nodes| id == "wf-1" && *nodes == sent)
            .times(1)
            .returning(|_, nodes| Ok(ack(nodes.len())));

        let outcome = manager
            .rollback_to_checkpoint(&mut session, 1, &orchestrator)
            .await
            .unwrap();

        assert_eq!(outcome.node_count, 1);
        assert_eq!(outcome.discarded_checkpoints, 1);
        assert_eq!(outcome.label, "cp1");
        assert_eq!(session.current_nodes(), expected.as_slice());
        assert_eq!(session.checkpoints().len(), 2);
        assert!(session.checkpoint(2).is_none());
        assert_eq!(session.audit_log().last().unwrap().operation, "rollback");
    }

    #[tokio::test]
    async fn test_rollback_to_baseline_empties_workflow() {
        let manager = manager();
        let mut session = populated_session(&manager);

        let mut orchestrator = MockWorkflowOrchestrator::new();
        orchestrator
            .expect_update_workflow()
            .withf(|_, nodes| nodes.is_empty())
            .returning(|_, _| Ok(ack(0)));

        let outcome = manager
            .rollback_to_checkpoint(&mut session, 0, &orchestrator)
            .await
            .unwrap();

        assert_eq!(outcome.discarded_checkpoints, 2);
        assert!(session.current_nodes().is_empty());
        assert_eq!(session.checkpoints().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_rejected_without_remote_call() {
        let manager = manager();
        let mut session = populated_session(&manager);
        let before_nodes = session.current_nodes().to_vec();

        let mut orchestrator = MockWorkflowOrchestrator::new();
        orchestrator.expect_update_workflow().times(0);

        let err = manager
            .rollback_to_checkpoint(&mut session, 99, &orchestrator)
            .await
            .unwrap_err();

        assert!(matches!(err, BuilderError::Validation(_)));
        assert_eq!(session.current_nodes(), before_nodes.as_slice());
        assert_eq!(session.checkpoints().len(), 3);
    }

    #[tokio::test]
    async fn test_tampered_checkpoint_is_rejected_without_mutation() {
        let manager = manager();
        let mut session = populated_session(&manager);
        let before_nodes = session.current_nodes().to_vec();

        if let SnapshotEnvelope::Sealed { ciphertext, .. } =
            session.checkpoints_mut()[1].envelope_mut()
        {
            let mut raw = STANDARD.decode(&*ciphertext).unwrap();
            let last = raw.len() - 1;
            raw[last] ^= 0xff;
            *ciphertext = STANDARD.encode(raw);
        }

        let mut orchestrator = MockWorkflowOrchestrator::new();
        orchestrator.expect_update_workflow().times(0);

        let err = manager
            .rollback_to_checkpoint(&mut session, 1, &orchestrator)
            .await
            .unwrap_err();

        assert!(matches!(err, BuilderError::Integrity(_)));
        assert_eq!(session.current_nodes(), before_nodes.as_slice());
        assert_eq!(session.checkpoints().len(), 3);

        // The session survives; other checkpoints still restore
        orchestrator.checkpoint();
        orchestrator
            .expect_update_workflow()
            .returning(|_, nodes| Ok(ack(nodes.len())));
        assert!(manager
            .rollback_to_checkpoint(&mut session, 2, &orchestrator)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_state_untouched() {
        let manager = manager();
        let mut session = populated_session(&manager);
        let before_nodes = session.current_nodes().to_vec();
        let before_checkpoints = session.checkpoints().to_vec();

        let mut orchestrator = MockWorkflowOrchestrator::new();
        orchestrator
            .expect_update_workflow()
            .returning(|_, _| Err(DomainError::provider("n8n", "timeout")));

        let err = manager
            .rollback_to_checkpoint(&mut session, 1, &orchestrator)
            .await
            .unwrap_err();

        assert!(matches!(err, BuilderError::External(_)));
        assert_eq!(session.current_nodes(), before_nodes.as_slice());
        assert_eq!(session.checkpoints(), before_checkpoints.as_slice());
        assert_eq!(session.audit_log().last().unwrap().operation, "rollback_failed");
    }

    #[tokio::test]
    async fn test_remote_decline_leaves_state_untouched() {
        let manager = manager();
        let mut session = populated_session(&manager);
        let before_nodes = session.current_nodes().to_vec();

        let mut orchestrator = MockWorkflowOrchestrator::new();
        orchestrator
            .expect_update_workflow()
            .returning(|_, _| Ok(None));

        assert!(manager
            .rollback_to_checkpoint(&mut session, 0, &orchestrator)
            .await
            .is_err());
        assert_eq!(session.current_nodes(), before_nodes.as_slice());
        assert_eq!(session.checkpoints().len(), 3);
    }
}
