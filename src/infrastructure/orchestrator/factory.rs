//! Orchestrator factory for runtime selection

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{OrchestratorConfig, OrchestratorKind};
use crate::domain::builder::{NodeTypeAllowlist, WorkflowOrchestrator};
use crate::domain::DomainError;

use super::http_client::{HttpOrchestratorConfig, HttpWorkflowOrchestrator};
use super::in_memory::InMemoryWorkflowOrchestrator;

/// Build the configured orchestrator client
pub fn create_orchestrator(
    config: &OrchestratorConfig,
    allowlist: Arc<NodeTypeAllowlist>,
) -> Result<Arc<dyn WorkflowOrchestrator>, DomainError> {
    match config.kind {
        OrchestratorKind::InMemory => {
            info!("Using in-memory workflow orchestrator");
            Ok(Arc::new(InMemoryWorkflowOrchestrator::new(allowlist)))
        }
        OrchestratorKind::Http => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                DomainError::configuration("Base URL is required for the http orchestrator")
            })?;

            info!(base_url = %base_url, "Using HTTP workflow orchestrator");

            let client = HttpWorkflowOrchestrator::new(
                HttpOrchestratorConfig {
                    base_url,
                    api_key: config.api_key.clone(),
                    timeout: Duration::from_secs(config.timeout_secs),
                },
                allowlist,
            )?;
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_requires_base_url() {
        let config = OrchestratorConfig {
            kind: OrchestratorKind::Http,
            ..Default::default()
        };

        let result = create_orchestrator(&config, Arc::new(NodeTypeAllowlist::default()));
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_in_memory_by_default() {
        let result = create_orchestrator(
            &OrchestratorConfig::default(),
            Arc::new(NodeTypeAllowlist::default()),
        );
        assert!(result.is_ok());
    }
}
