//! n8n-style REST client for the remote workflow orchestrator

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::builder::{
    linear_connections, ConnectionReport, ExecutionReport, NodeTypeAllowlist, UpdateAck,
    WorkflowNode, WorkflowOrchestrator,
};
use crate::domain::DomainError;

const PROVIDER: &str = "n8n";
const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Connection settings for [`HttpWorkflowOrchestrator`]
#[derive(Debug, Clone)]
pub struct HttpOrchestratorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Workflow orchestrator backed by an n8n-compatible REST API
#[derive(Debug, Clone)]
pub struct HttpWorkflowOrchestrator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    allowlist: Arc<NodeTypeAllowlist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    finished: Option<bool>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    execution_id: Option<Value>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stopped_at: Option<DateTime<Utc>>,
}

impl ExecutionResponse {
    fn into_report(self) -> ExecutionReport {
        let status = match (self.status, self.finished) {
            (Some(status), _) => status,
            (None, Some(true)) => "success".to_string(),
            (None, _) => "unknown".to_string(),
        };

        let execution_id = self
            .execution_id
            .or(self.id)
            .and_then(|id| match id {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        ExecutionReport {
            status,
            data: self.data,
            execution_id,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
        }
    }
}

impl HttpWorkflowOrchestrator {
    pub fn new(
        config: HttpOrchestratorConfig,
        allowlist: Arc<NodeTypeAllowlist>,
    ) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            allowlist,
        })
    }

    fn workflow_url(&self, workflow_id: &str) -> String {
        format!("{}/workflows/{}", self.base_url, workflow_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DomainError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| DomainError::provider(PROVIDER, format!("Request failed: {}", e)))
    }

    async fn read_json(response: Response) -> Result<Value, DomainError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(DomainError::provider(
                PROVIDER,
                format!("HTTP {}: {}", status, error_body),
            ));
        }

        response.json().await.map_err(|e| {
            DomainError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })
    }

    /// Fetch the workflow document; `None` when the workflow does not exist
    async fn fetch_workflow(&self, workflow_id: &str) -> Result<Option<Value>, DomainError> {
        let response = self
            .send(self.client.get(self.workflow_url(workflow_id)))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::read_json(response).await.map(Some)
    }
}

#[async_trait]
impl WorkflowOrchestrator for HttpWorkflowOrchestrator {
    async fn update_workflow(
        &self,
        workflow_id: String,
        nodes: Vec<WorkflowNode>,
    ) -> Result<Option<UpdateAck>, DomainError> {
        let Some(current) = self.fetch_workflow(&workflow_id).await? else {
            debug!(workflow_id = %workflow_id, "Remote workflow not found");
            return Ok(None);
        };

        let body = json!({
            "name": current.get("name").cloned().unwrap_or_else(|| json!(workflow_id)),
            "settings": current.get("settings").cloned().unwrap_or_else(|| json!({})),
            "nodes": nodes,
            "connections": linear_connections(&nodes),
        });

        let response = self
            .send(self.client.put(self.workflow_url(&workflow_id)).json(&body))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let updated = Self::read_json(response).await?;
        let updated_at = updated
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        debug!(workflow_id = %workflow_id, node_count = nodes.len(), "Remote workflow updated");

        Ok(Some(UpdateAck {
            workflow_id,
            node_count: nodes.len(),
            updated_at,
        }))
    }

    async fn execute_workflow(
        &self,
        workflow_id: String,
        node_name: String,
    ) -> Result<ExecutionReport, DomainError> {
        let url = format!("{}/execute", self.workflow_url(&workflow_id));
        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "destinationNode": node_name })),
            )
            .await?;

        let body = Self::read_json(response).await?;
        let parsed: ExecutionResponse = serde_json::from_value(body).map_err(|e| {
            DomainError::provider(PROVIDER, format!("Unexpected execution response: {}", e))
        })?;

        Ok(parsed.into_report())
    }

    async fn validate_workflow_connections(
        &self,
        workflow_id: String,
    ) -> Result<ConnectionReport, DomainError> {
        let workflow = self
            .fetch_workflow(&workflow_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Workflow '{}' not found", workflow_id)))?;

        let nodes = workflow
            .get("nodes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let connections = workflow.get("connections").cloned().unwrap_or_else(|| json!({}));

        Ok(ConnectionReport::analyze(nodes, &connections))
    }

    async fn get_compatible_nodes(
        &self,
        _workflow_id: String,
        after_type: Option<String>,
    ) -> Result<Vec<String>, DomainError> {
        Ok(self.allowlist.compatible_after(after_type.as_deref()))
    }
}
