//! Node manager - sanitizes proposals, grows the working node list, runs tests

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::builder::{
    sanitize_node, sanitize_output, BuilderError, BuilderSession, NodeTypeAllowlist,
    ValidationRun, WorkflowNode, WorkflowOrchestrator, DEFAULT_MAX_OUTPUT_LENGTH,
};
use crate::infrastructure::observability::record_node_add;

/// Result of a successful add-node call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddNodeOutcome {
    pub node: WorkflowNode,
    pub node_count: usize,
}

/// Result of executing the workflow up to its last node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeTestResult {
    pub node_index: usize,
    pub node_type: String,
    pub status: String,
    pub message: String,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// Applies the allowlist and keeps the working node list in step with the
/// remote workflow
#[derive(Debug, Clone)]
pub struct NodeManager {
    allowlist: Arc<NodeTypeAllowlist>,
    max_output_length: usize,
}

impl NodeManager {
    pub fn new(allowlist: Arc<NodeTypeAllowlist>, max_output_length: usize) -> Self {
        Self {
            allowlist,
            max_output_length,
        }
    }

    pub fn allowlist(&self) -> &NodeTypeAllowlist {
        &self.allowlist
    }

    pub fn validate_node_type(&self, node_type: &str) -> bool {
        self.allowlist.contains(node_type)
    }

    /// Sanitize an untrusted proposal. Touches no session state.
    pub fn sanitize_node(&self, raw: &Value) -> Result<WorkflowNode, BuilderError> {
        sanitize_node(raw, &self.allowlist).inspect_err(|e| {
            warn!(error = %e, "Rejected node proposal");
            record_node_add("rejected");
        })
    }

    /// Sanitize a raw proposal and append it, see [`NodeManager::append_node`]
    pub async fn add_node_to_workflow(
        &self,
        session: &mut BuilderSession,
        raw_node: &Value,
        orchestrator: &dyn WorkflowOrchestrator,
    ) -> Result<AddNodeOutcome, BuilderError> {
        let node = self.sanitize_node(raw_node)?;
        self.append_node(session, node, orchestrator).await
    }

    /// Append an already sanitized node and push the full list to the
    /// orchestrator.
    ///
    /// The append is reverted if the orchestrator fails or declines, so the
    /// working list never diverges from the remote workflow.
    pub async fn append_node(
        &self,
        session: &mut BuilderSession,
        mut node: WorkflowNode,
        orchestrator: &dyn WorkflowOrchestrator,
    ) -> Result<AddNodeOutcome, BuilderError> {
        if session.is_at_node_capacity() {
            let max_nodes = session.security().rate_limits().max_nodes();
            warn!(
                session_id = %session.id(),
                node_type = %node.node_type(),
                max_nodes = max_nodes,
                "Node capacity reached"
            );
            session.record_audit(
                "node_add_failed",
                json!({
                    "node_type": node.node_type(),
                    "reason": "capacity",
                    "max_nodes": max_nodes,
                }),
            );
            record_node_add("capacity");
            return Err(BuilderError::capacity(format!(
                "Session already holds the maximum of {} nodes",
                max_nodes
            )));
        }

        node.dedupe_name(session.current_nodes().iter().map(|n| n.name()));

        session.push_node(node.clone());
        let update = orchestrator
            .update_workflow(
                session.workflow_id().to_string(),
                session.current_nodes().to_vec(),
            )
            .await;

        let failure = match update {
            Ok(Some(_)) => None,
            Ok(None) => Some(BuilderError::external("Remote workflow update was rejected")),
            Err(e) => Some(BuilderError::from(e)),
        };

        if let Some(e) = failure {
            session.pop_node();
            warn!(
                session_id = %session.id(),
                node_type = %node.node_type(),
                error = %e,
                "Node add reverted, remote update failed"
            );
            session.record_audit(
                "node_add_failed",
                json!({
                    "node_type": node.node_type(),
                    "reason": e.code(),
                }),
            );
            record_node_add("failed");
            return Err(e);
        }

        let node_count = session.current_nodes().len();
        session.record_audit(
            "node_added",
            json!({
                "node_id": node.id(),
                "node_type": node.node_type(),
                "node_count": node_count,
            }),
        );
        record_node_add("success");

        info!(
            session_id = %session.id(),
            workflow_id = %session.workflow_id(),
            node_type = %node.node_type(),
            node_count = node_count,
            "Node added"
        );

        Ok(AddNodeOutcome { node, node_count })
    }

    /// Execute the workflow through its most recently added node
    pub async fn test_workflow(
        &self,
        session: &mut BuilderSession,
        orchestrator: &dyn WorkflowOrchestrator,
    ) -> Result<NodeTestResult, BuilderError> {
        let (node_index, node_type, node_name) = match session.current_nodes().last() {
            Some(node) => (
                session.current_nodes().len() - 1,
                node.node_type().to_string(),
                node.name().to_string(),
            ),
            None => return Err(BuilderError::validation("Session has no nodes to test")),
        };

        let execution = orchestrator
            .execute_workflow(session.workflow_id().to_string(), node_name.clone())
            .await;

        let report = match execution {
            Ok(report) => report,
            Err(e) => {
                let e = BuilderError::from(e);
                warn!(
                    session_id = %session.id(),
                    node_type = %node_type,
                    error = %e,
                    "Workflow test failed"
                );
                session.record_validation(ValidationRun {
                    node_index,
                    node_type,
                    status: "error".to_string(),
                    execution_id: None,
                    tested_at: Utc::now(),
                });
                session.record_audit("test_failed", json!({ "reason": e.code() }));
                return Err(e);
            }
        };

        let message = if report.is_success() {
            format!("Node '{}' executed successfully", node_name)
        } else {
            format!("Node '{}' finished with status '{}'", node_name, report.status)
        };

        session.record_validation(ValidationRun {
            node_index,
            node_type: node_type.clone(),
            status: report.status.clone(),
            execution_id: report.execution_id.clone(),
            tested_at: Utc::now(),
        });
        session.record_audit(
            "workflow_tested",
            json!({
                "node_index": node_index,
                "status": report.status,
                "execution_id": report.execution_id,
            }),
        );

        debug!(
            session_id = %session.id(),
            node_index = node_index,
            status = %report.status,
            "Workflow tested"
        );

        Ok(NodeTestResult {
            node_index,
            node_type,
            status: report.status,
            message,
            output: sanitize_output(&report.data, self.max_output_length),
            execution_id: report.execution_id,
        })
    }
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::new(
            Arc::new(NodeTypeAllowlist::default()),
            DEFAULT_MAX_OUTPUT_LENGTH,
        )
    }
}
