//! In-memory workflow orchestrator for development and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::domain::builder::{
    linear_connections, ConnectionReport, ExecutionReport, NodeTypeAllowlist, UpdateAck,
    WorkflowNode, WorkflowOrchestrator,
};
use crate::domain::DomainError;

/// Injected failure for the next calls to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum FailureMode {
    /// Updates and executions fail with a provider error
    Error(String),
    /// Updates are declined (`Ok(None)`)
    Decline,
}

/// Workflows kept in a map; unknown workflows are empty until their first update
#[derive(Debug)]
pub struct InMemoryWorkflowOrchestrator {
    workflows: Arc<RwLock<HashMap<String, Vec<WorkflowNode>>>>,
    allowlist: Arc<NodeTypeAllowlist>,
    failure: RwLock<Option<FailureMode>>,
    executions: AtomicU64,
    updates: AtomicU64,
}

impl InMemoryWorkflowOrchestrator {
    pub fn new(allowlist: Arc<NodeTypeAllowlist>) -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            allowlist,
            failure: RwLock::new(None),
            executions: AtomicU64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    /// Make subsequent calls fail until [`clear_failure`](Self::clear_failure)
    pub async fn fail_with(&self, mode: FailureMode) {
        *self.failure.write().await = Some(mode);
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// Nodes currently stored for a workflow
    pub async fn nodes(&self, workflow_id: &str) -> Option<Vec<WorkflowNode>> {
        let workflows = self.workflows.read().await;
        workflows.get(workflow_id).cloned()
    }

    /// Number of accepted updates
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    async fn injected_error(&self) -> Option<DomainError> {
        match &*self.failure.read().await {
            Some(FailureMode::Error(message)) => {
                Some(DomainError::provider("in_memory", message.clone()))
            }
            _ => None,
        }
    }
}

impl Default for InMemoryWorkflowOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(NodeTypeAllowlist::default()))
    }
}

#[async_trait]
impl WorkflowOrchestrator for InMemoryWorkflowOrchestrator {
    async fn update_workflow(
        &self,
        workflow_id: String,
        nodes: Vec<WorkflowNode>,
    ) -> Result<Option<UpdateAck>, DomainError> {
        if let Some(e) = self.injected_error().await {
            return Err(e);
        }
        if *self.failure.read().await == Some(FailureMode::Decline) {
            return Ok(None);
        }

        let node_count = nodes.len();
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow_id.clone(), nodes);
        self.updates.fetch_add(1, Ordering::Relaxed);

        Ok(Some(UpdateAck {
            workflow_id,
            node_count,
            updated_at: Some(Utc::now()),
        }))
    }

    async fn execute_workflow(
        &self,
        workflow_id: String,
        node_name: String,
    ) -> Result<ExecutionReport, DomainError> {
        if let Some(e) = self.injected_error().await {
            return Err(e);
        }

        let workflows = self.workflows.read().await;
        let nodes = workflows
            .get(&workflow_id)
            .ok_or_else(|| DomainError::not_found(format!("Workflow '{}' not found", workflow_id)))?;
        let node = nodes
            .iter()
            .find(|n| n.name() == node_name)
            .ok_or_else(|| DomainError::not_found(format!("Node '{}' not found", node_name)))?;

        let started_at = Utc::now();
        let execution = self.executions.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(ExecutionReport {
            status: "success".to_string(),
            data: json!({
                "node": node.name(),
                "type": node.node_type(),
                "parameters": Value::Object(node.parameters().clone()),
            }),
            execution_id: Some(format!("exec-{}", execution)),
            started_at: Some(started_at),
            stopped_at: Some(Utc::now()),
        })
    }

    async fn validate_workflow_connections(
        &self,
        workflow_id: String,
    ) -> Result<ConnectionReport, DomainError> {
        let workflows = self.workflows.read().await;
        let nodes = workflows
            .get(&workflow_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let documents = nodes
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::internal(format!("Failed to serialize nodes: {}", e)))?;

        Ok(ConnectionReport::analyze(&documents, &linear_connections(nodes)))
    }

    async fn get_compatible_nodes(
        &self,
        _workflow_id: String,
        after_type: Option<String>,
    ) -> Result<Vec<String>, DomainError> {
        Ok(self.allowlist.compatible_after(after_type.as_deref()))
    }
}
