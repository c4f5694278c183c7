//! Workflow builder domain module
//!
//! A builder session lets a caller grow a remote workflow one node at a time:
//! - Nodes are sanitized against an administrator allowlist before use
//! - Every change is pushed to the remote orchestrator; local state never
//!   diverges from it
//! - Checkpoints snapshot the node list under authenticated encryption and
//!   can be rolled back to (no redo)

mod checkpoint;
mod error;
mod node;
mod orchestrator;
mod output;
mod session;

pub use checkpoint::{
    validate_checkpoint_label, Checkpoint, CheckpointId, CheckpointSummary, Protection,
    SnapshotEnvelope, BASELINE_LABEL, MAX_LABEL_LENGTH,
};
pub use error::BuilderError;
pub use node::{
    is_trigger_type, linear_connections, sanitize_node, NodePosition, NodeTypeAllowlist,
    WorkflowNode, DEFAULT_NODE_TYPES, DEFAULT_POSITION, MAX_NODE_NAME_LENGTH,
};
#[cfg(test)]
pub use orchestrator::MockWorkflowOrchestrator;
pub use orchestrator::{ConnectionReport, ExecutionReport, UpdateAck, WorkflowOrchestrator};
pub use output::{is_sensitive_key, sanitize_output, DEFAULT_MAX_OUTPUT_LENGTH};
pub use session::{
    validate_workflow_id, AuditEntry, BuilderSession, Permission, RateLimitCounters,
    SecurityContext, SessionId, SessionLimits, SessionState, ValidationRun, DEFAULT_PERMISSIONS,
    MAX_WORKFLOW_ID_LENGTH,
};
