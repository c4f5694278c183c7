//! Workflow orchestrator clients

mod factory;
mod http_client;
mod in_memory;

pub use factory::create_orchestrator;
pub use http_client::{HttpOrchestratorConfig, HttpWorkflowOrchestrator};
pub use in_memory::{FailureMode, InMemoryWorkflowOrchestrator};
