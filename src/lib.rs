//! Workflow Builder
//!
//! Session-scoped, interactive construction of remote workflows:
//! - Node proposals sanitized against an administrator allowlist
//! - Every change mirrored to the remote orchestrator, reverted on failure
//! - Encrypted, tamper-evident checkpoints with rollback
//! - Per-session rate limits, capacity caps and an append-only audit log

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use tracing::info;

use api::state::AppState;
use domain::builder::NodeTypeAllowlist;
use domain::DomainError;
use infrastructure::builder::{
    CheckpointSealer, NodeManager, RollbackManager, SessionManager, SessionRegistry,
    SigningSecret,
};
use infrastructure::orchestrator::create_orchestrator;
use infrastructure::services::BuilderService;

/// Create the application state from configuration.
///
/// Generates the process-scoped checkpoint secret; checkpoints sealed by
/// this process cannot be opened by another.
pub fn create_app_state(config: &AppConfig) -> Result<AppState, DomainError> {
    let builder_config = &config.builder;

    let allowlist = Arc::new(NodeTypeAllowlist::new(
        builder_config
            .allowed_node_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty()),
    ));
    info!(node_types = allowlist.len(), "Node type allowlist loaded");

    let orchestrator = create_orchestrator(&config.orchestrator, allowlist.clone())?;

    let sealer = CheckpointSealer::new(SigningSecret::generate()?);
    let rollback = Arc::new(RollbackManager::new(Arc::new(sealer)));
    let sessions = Arc::new(SessionManager::new(
        Arc::new(SessionRegistry::new()),
        rollback.clone(),
        builder_config.session_limits(),
    ));
    let nodes = Arc::new(NodeManager::new(allowlist, builder_config.max_output_length));

    let builder = BuilderService::new(sessions, nodes, rollback, orchestrator);

    Ok(AppState::new(Arc::new(builder)))
}
