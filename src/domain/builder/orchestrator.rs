//! Workflow orchestrator trait - the remote service that owns workflow truth

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::node::{is_trigger_type, WorkflowNode};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Acknowledgement of a successful remote update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAck {
    pub workflow_id: String,
    pub node_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of a remote execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Result of checking a remote workflow's connection graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub node_count: usize,
}

impl ConnectionReport {
    /// Check a workflow document's node list against its connection map.
    ///
    /// Errors: no nodes, connections from or to unknown nodes, nodes with no
    /// connection at all. Warnings: no trigger at the start of the workflow.
    pub fn analyze(nodes: &[Value], connections: &Value) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let names: Vec<&str> = nodes
            .iter()
            .filter_map(|n| n.get("name").and_then(Value::as_str))
            .collect();
        let known: HashSet<&str> = names.iter().copied().collect();

        if names.is_empty() {
            errors.push("Workflow has no nodes".to_string());
        }

        let mut linked: HashSet<&str> = HashSet::new();
        if let Some(map) = connections.as_object() {
            for (source, outputs) in map {
                if !known.contains(source.as_str()) {
                    errors.push(format!("Connection source '{}' is not a node", source));
                    continue;
                }

                for target in connection_targets(outputs) {
                    if known.contains(target) {
                        linked.insert(source.as_str());
                        linked.insert(target);
                    } else {
                        errors.push(format!(
                            "Node '{}' connects to unknown node '{}'",
                            source, target
                        ));
                    }
                }
            }
        }

        if names.len() > 1 {
            for name in &names {
                if !linked.contains(name) {
                    errors.push(format!("Node '{}' is not connected", name));
                }
            }
        }

        let starts_with_trigger = nodes
            .first()
            .and_then(|n| n.get("type").and_then(Value::as_str))
            .map(|t| is_trigger_type(t.rsplit('.').next().unwrap_or(t)))
            .unwrap_or(false);
        if !names.is_empty() && !starts_with_trigger {
            warnings.push("Workflow does not start with a trigger node".to_string());
        }

        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            node_count: names.len(),
        }
    }
}

/// Target node names of one source's `{"main": [[{"node": ..}]]}` entry
fn connection_targets(outputs: &Value) -> Vec<&str> {
    outputs
        .as_object()
        .into_iter()
        .flat_map(|kinds| kinds.values())
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|c| c.get("node").and_then(Value::as_str))
        .collect()
}

/// Client for the remote workflow-orchestration service.
///
/// Every call is a single success/failure boundary; retries and timeouts
/// belong to the implementation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowOrchestrator: Send + Sync {
    /// Replace the remote workflow's nodes. `Ok(None)` means the service
    /// declined the update.
    async fn update_workflow(
        &self,
        workflow_id: String,
        nodes: Vec<WorkflowNode>,
    ) -> Result<Option<UpdateAck>, DomainError>;

    /// Execute the workflow up to and including `node_name`
    async fn execute_workflow(
        &self,
        workflow_id: String,
        node_name: String,
    ) -> Result<ExecutionReport, DomainError>;

    /// Check the remote workflow's connection graph
    async fn validate_workflow_connections(
        &self,
        workflow_id: String,
    ) -> Result<ConnectionReport, DomainError>;

    /// Node types that can follow `after_type` (or start an empty workflow)
    async fn get_compatible_nodes(
        &self,
        workflow_id: String,
        after_type: Option<String>,
    ) -> Result<Vec<String>, DomainError>;
}
