//! Builder service - dispatches named actions onto the session, node and
//! rollback managers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::MutexGuard;
use tracing::{info, warn};

use crate::domain::builder::{
    linear_connections, validate_checkpoint_label, validate_workflow_id, BuilderError,
    BuilderSession, CheckpointId, CheckpointSummary, ConnectionReport, Permission,
    ValidationRun, WorkflowNode, WorkflowOrchestrator,
};
use crate::infrastructure::builder::{
    AddNodeOutcome, CheckpointOutcome, NodeManager, NodeTestResult, RollbackManager,
    RollbackOutcome, SessionHandle, SessionManager,
};

/// One request against the builder, tagged by `action`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BuilderAction {
    CreateSession { workflow_id: String },
    AddNode { session_id: String, node: Value },
    TestWorkflow { session_id: String },
    CreateCheckpoint { session_id: String, label: String },
    Rollback { session_id: String, checkpoint_id: CheckpointId },
    GetSuggestions { session_id: String },
    ValidateConnections { session_id: String },
    PreviewWorkflow { session_id: String },
    CompleteWorkflow { session_id: String },
    EndSession { session_id: String },
}

impl BuilderAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "create_session",
            Self::AddNode { .. } => "add_node",
            Self::TestWorkflow { .. } => "test_workflow",
            Self::CreateCheckpoint { .. } => "create_checkpoint",
            Self::Rollback { .. } => "rollback",
            Self::GetSuggestions { .. } => "get_suggestions",
            Self::ValidateConnections { .. } => "validate_connections",
            Self::PreviewWorkflow { .. } => "preview_workflow",
            Self::CompleteWorkflow { .. } => "complete_workflow",
            Self::EndSession { .. } => "end_session",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub workflow_id: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
    pub checkpoints: Vec<CheckpointSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_type: Option<String>,
    pub node_types: Vec<String>,
}

/// Read-only view of a session's working state
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPreview {
    pub session_id: String,
    pub workflow_id: String,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Value,
    pub checkpoints: Vec<CheckpointSummary>,
    pub validation_history: Vec<ValidationRun>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub session_id: String,
    pub workflow_id: String,
    pub node_count: usize,
    pub connections: ConnectionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    pub session_id: String,
}

/// Success payload of a [`BuilderAction`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionResult {
    CreateSession(SessionCreated),
    AddNode(AddNodeOutcome),
    TestWorkflow(NodeTestResult),
    CreateCheckpoint(CheckpointOutcome),
    Rollback(RollbackOutcome),
    GetSuggestions(Suggestions),
    ValidateConnections(ConnectionReport),
    PreviewWorkflow(WorkflowPreview),
    CompleteWorkflow(CompletionSummary),
    EndSession(SessionEnded),
}

/// Entry point for the builder action surface
pub struct BuilderService {
    sessions: Arc<SessionManager>,
    nodes: Arc<NodeManager>,
    rollback: Arc<RollbackManager>,
    orchestrator: Arc<dyn WorkflowOrchestrator>,
}

impl std::fmt::Debug for BuilderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderService")
            .field("sessions", &self.sessions)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl BuilderService {
    pub fn new(
        sessions: Arc<SessionManager>,
        nodes: Arc<NodeManager>,
        rollback: Arc<RollbackManager>,
        orchestrator: Arc<dyn WorkflowOrchestrator>,
    ) -> Self {
        Self {
            sessions,
            nodes,
            rollback,
            orchestrator,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run one action to completion
    pub async fn execute(&self, action: BuilderAction) -> Result<ActionResult, BuilderError> {
        let name = action.name();
        let result = self.dispatch(action).await;

        if let Err(e) = &result {
            warn!(action = name, code = e.code(), error = %e, "Builder action failed");
        }

        result
    }

    async fn dispatch(&self, action: BuilderAction) -> Result<ActionResult, BuilderError> {
        match action {
            BuilderAction::CreateSession { workflow_id } => self
                .create_session(&workflow_id)
                .await
                .map(ActionResult::CreateSession),
            BuilderAction::AddNode { session_id, node } => self
                .add_node(&session_id, &node)
                .await
                .map(ActionResult::AddNode),
            BuilderAction::TestWorkflow { session_id } => self
                .test_workflow(&session_id)
                .await
                .map(ActionResult::TestWorkflow),
            BuilderAction::CreateCheckpoint { session_id, label } => self
                .create_checkpoint(&session_id, &label)
                .await
                .map(ActionResult::CreateCheckpoint),
            BuilderAction::Rollback {
                session_id,
                checkpoint_id,
            } => self
                .rollback(&session_id, checkpoint_id)
                .await
                .map(ActionResult::Rollback),
            BuilderAction::GetSuggestions { session_id } => self
                .get_suggestions(&session_id)
                .await
                .map(ActionResult::GetSuggestions),
            BuilderAction::ValidateConnections { session_id } => self
                .validate_connections(&session_id)
                .await
                .map(ActionResult::ValidateConnections),
            BuilderAction::PreviewWorkflow { session_id } => self
                .preview_workflow(&session_id)
                .await
                .map(ActionResult::PreviewWorkflow),
            BuilderAction::CompleteWorkflow { session_id } => self
                .complete_workflow(&session_id)
                .await
                .map(ActionResult::CompleteWorkflow),
            BuilderAction::EndSession { session_id } => self
                .end_session(&session_id)
                .await
                .map(ActionResult::EndSession),
        }
    }

    pub async fn create_session(&self, workflow_id: &str) -> Result<SessionCreated, BuilderError> {
        validate_workflow_id(workflow_id)?;

        let handle = self.sessions.create_session(workflow_id).await?;
        let session = handle.lock().await;

        Ok(SessionCreated {
            session_id: session.id().to_string(),
            workflow_id: session.workflow_id().to_string(),
            expires_at: session.expires_at(),
            permissions: session.security().permissions().iter().copied().collect(),
            checkpoints: session.checkpoints().iter().map(|c| c.summary()).collect(),
        })
    }

    pub async fn add_node(
        &self,
        session_id: &str,
        node: &Value,
    ) -> Result<AddNodeOutcome, BuilderError> {
        let node = self.nodes.sanitize_node(node)?;

        let handle = self.sessions.require_session(session_id).await?;
        let mut session = self.authorize(&handle, Permission::AddNode).await?;

        self.nodes
            .append_node(&mut session, node, self.orchestrator.as_ref())
            .await
    }

    pub async fn test_workflow(&self, session_id: &str) -> Result<NodeTestResult, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;
        let mut session = self.authorize(&handle, Permission::TestNode).await?;

        self.nodes
            .test_workflow(&mut session, self.orchestrator.as_ref())
            .await
    }

    pub async fn create_checkpoint(
        &self,
        session_id: &str,
        label: &str,
    ) -> Result<CheckpointOutcome, BuilderError> {
        validate_checkpoint_label(label)?;

        let handle = self.sessions.require_session(session_id).await?;
        let mut session = self.authorize(&handle, Permission::Checkpoint).await?;

        self.sessions.create_checkpoint(&mut session, label)
    }

    pub async fn rollback(
        &self,
        session_id: &str,
        checkpoint_id: CheckpointId,
    ) -> Result<RollbackOutcome, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;
        let mut session = self.authorize(&handle, Permission::Rollback).await?;

        self.rollback
            .rollback_to_checkpoint(&mut session, checkpoint_id, self.orchestrator.as_ref())
            .await
    }

    pub async fn get_suggestions(&self, session_id: &str) -> Result<Suggestions, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;
        let mut session = handle.lock().await;
        self.enforce_rate_limit(&mut session)?;

        let after_type = session
            .current_nodes()
            .last()
            .map(|n| n.node_type().to_string());

        let node_types = self
            .orchestrator
            .get_compatible_nodes(session.workflow_id().to_string(), after_type.clone())
            .await?
            .into_iter()
            .filter(|t| self.nodes.validate_node_type(t))
            .collect();

        Ok(Suggestions {
            after_type,
            node_types,
        })
    }

    pub async fn validate_connections(
        &self,
        session_id: &str,
    ) -> Result<ConnectionReport, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;
        let mut session = handle.lock().await;
        self.enforce_rate_limit(&mut session)?;

        let report = self
            .orchestrator
            .validate_workflow_connections(session.workflow_id().to_string())
            .await?;

        session.record_audit(
            "connections_validated",
            json!({ "valid": report.valid, "errors": report.errors.len() }),
        );

        Ok(report)
    }

    pub async fn preview_workflow(&self, session_id: &str) -> Result<WorkflowPreview, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;
        let session = handle.lock().await;

        Ok(WorkflowPreview {
            session_id: session.id().to_string(),
            workflow_id: session.workflow_id().to_string(),
            nodes: session.current_nodes().to_vec(),
            connections: linear_connections(session.current_nodes()),
            checkpoints: session.checkpoints().iter().map(|c| c.summary()).collect(),
            validation_history: session.validation_history().to_vec(),
            expires_at: session.expires_at(),
        })
    }

    /// Validate the remote workflow and close the session if it is sound
    pub async fn complete_workflow(
        &self,
        session_id: &str,
    ) -> Result<CompletionSummary, BuilderError> {
        let handle = self.sessions.require_session(session_id).await?;

        let summary = {
            let mut session = handle.lock().await;
            self.enforce_rate_limit(&mut session)?;

            let report = self
                .orchestrator
                .validate_workflow_connections(session.workflow_id().to_string())
                .await?;

            if !report.valid {
                session.record_audit(
                    "completion_rejected",
                    json!({ "errors": report.errors }),
                );
                return Err(BuilderError::validation(format!(
                    "Workflow is not valid: {}",
                    report.errors.join("; ")
                )));
            }

            session.record_audit("workflow_completed", json!({ "node_count": report.node_count }));

            CompletionSummary {
                session_id: session.id().to_string(),
                workflow_id: session.workflow_id().to_string(),
                node_count: session.current_nodes().len(),
                connections: report,
            }
        };

        self.sessions.destroy_session(session_id, "completed").await;
        info!(session_id = %session_id, "Workflow completed");

        Ok(summary)
    }

    pub async fn end_session(&self, session_id: &str) -> Result<SessionEnded, BuilderError> {
        if !self.sessions.cleanup_session(session_id).await {
            return Err(BuilderError::session_unavailable(session_id));
        }

        Ok(SessionEnded {
            session_id: session_id.to_string(),
        })
    }

    /// Drop every live session
    pub async fn shutdown(&self) -> usize {
        let dropped = self.sessions.registry().shutdown().await;
        info!(sessions = dropped, "Builder sessions released");
        dropped
    }

    /// Lock the session, then check permission and the rate limit
    async fn authorize<'a>(
        &self,
        handle: &'a SessionHandle,
        permission: Permission,
    ) -> Result<MutexGuard<'a, BuilderSession>, BuilderError> {
        let mut session = handle.lock().await;

        if !session.has_permission(permission) {
            session.record_audit(
                "permission_denied",
                json!({ "permission": permission.as_str() }),
            );
            return Err(BuilderError::permission_denied(format!(
                "Session lacks the '{}' permission",
                permission.as_str()
            )));
        }

        self.enforce_rate_limit(&mut session)?;

        Ok(session)
    }

    fn enforce_rate_limit(&self, session: &mut BuilderSession) -> Result<(), BuilderError> {
        if self.sessions.check_rate_limit(session) {
            Ok(())
        } else {
            Err(BuilderError::rate_limit(
                session.security().rate_limits().operations_per_window(),
            ))
        }
    }
}
