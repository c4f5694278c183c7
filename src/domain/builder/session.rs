//! Builder session entity and its security context

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointId};
use super::error::BuilderError;
use super::node::WorkflowNode;

/// Maximum length for remote workflow IDs
pub const MAX_WORKFLOW_ID_LENGTH: usize = 64;

static WORKFLOW_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

/// Validate a remote workflow ID
pub fn validate_workflow_id(id: &str) -> Result<(), BuilderError> {
    if id.is_empty() {
        return Err(BuilderError::validation("Workflow ID cannot be empty"));
    }

    if id.len() > MAX_WORKFLOW_ID_LENGTH {
        return Err(BuilderError::validation(format!(
            "Workflow ID exceeds maximum length of {} characters",
            MAX_WORKFLOW_ID_LENGTH
        )));
    }

    if !WORKFLOW_ID_PATTERN.is_match(id) {
        return Err(BuilderError::validation(format!(
            "Invalid workflow ID '{}': must be alphanumeric with hyphens or underscores",
            id
        )));
    }

    Ok(())
}

/// Collision-resistant session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a new random session ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations a session may perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AddNode,
    TestNode,
    Checkpoint,
    Rollback,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddNode => "add_node",
            Self::TestNode => "test_node",
            Self::Checkpoint => "checkpoint",
            Self::Rollback => "rollback",
        }
    }
}

/// Permission set granted to every new session
pub const DEFAULT_PERMISSIONS: [Permission; 4] = [
    Permission::AddNode,
    Permission::TestNode,
    Permission::Checkpoint,
    Permission::Rollback,
];

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    Destroyed,
}

/// Limits applied to each new session
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_nodes: usize,
    pub max_checkpoints: usize,
    pub operations_per_window: u32,
    pub window: Duration,
    pub ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_nodes: 50,
            max_checkpoints: 10,
            operations_per_window: 60,
            window: Duration::seconds(60),
            ttl: Duration::hours(1),
        }
    }
}

/// Rate-limit and capacity counters.
///
/// The operation counter uses a fixed window: it resets when `now` crosses
/// the next multiple of `window` measured from the session's creation.
#[derive(Debug, Clone)]
pub struct RateLimitCounters {
    max_nodes: usize,
    max_checkpoints: usize,
    operations_per_window: u32,
    current_operations: u32,
    window: Duration,
    window_started_at: DateTime<Utc>,
}

impl RateLimitCounters {
    fn new(limits: &SessionLimits, now: DateTime<Utc>) -> Self {
        Self {
            max_nodes: limits.max_nodes,
            max_checkpoints: limits.max_checkpoints,
            operations_per_window: limits.operations_per_window,
            current_operations: 0,
            window: limits.window,
            window_started_at: now,
        }
    }

    /// Count one operation and report whether the session is still under its cap
    pub fn check_at(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = now - self.window_started_at;

        if elapsed >= self.window && self.window > Duration::zero() {
            let windows_passed = elapsed.num_milliseconds() / self.window.num_milliseconds();
            self.window_started_at += Duration::milliseconds(
                windows_passed * self.window.num_milliseconds(),
            );
            self.current_operations = 0;
        }

        self.current_operations = self.current_operations.saturating_add(1);
        self.current_operations <= self.operations_per_window
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn max_checkpoints(&self) -> usize {
        self.max_checkpoints
    }

    pub fn operations_per_window(&self) -> u32 {
        self.operations_per_window
    }

    pub fn current_operations(&self) -> u32 {
        self.current_operations
    }

    pub fn window_started_at(&self) -> DateTime<Utc> {
        self.window_started_at
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub detail: Value,
}

/// Permissions, limits, lifetime and audit trail of a session
#[derive(Debug, Clone)]
pub struct SecurityContext {
    permissions: BTreeSet<Permission>,
    rate_limits: RateLimitCounters,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    audit_log: Vec<AuditEntry>,
}

impl SecurityContext {
    fn new(limits: &SessionLimits, now: DateTime<Utc>) -> Self {
        Self {
            permissions: DEFAULT_PERMISSIONS.into_iter().collect(),
            rate_limits: RateLimitCounters::new(limits, now),
            created_at: now,
            expires_at: now + limits.ttl,
            audit_log: Vec::new(),
        }
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn rate_limits(&self) -> &RateLimitCounters {
        &self.rate_limits
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }
}

/// Record of one test execution against the session's workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRun {
    pub node_index: usize,
    pub node_type: String,
    pub status: String,
    pub execution_id: Option<String>,
    pub tested_at: DateTime<Utc>,
}

/// A bounded, time-limited unit of interactive workflow construction
#[derive(Debug, Clone)]
pub struct BuilderSession {
    id: SessionId,
    workflow_id: String,
    current_nodes: Vec<WorkflowNode>,
    checkpoints: Vec<Checkpoint>,
    validation_history: Vec<ValidationRun>,
    security: SecurityContext,
    next_checkpoint_id: CheckpointId,
}

impl BuilderSession {
    /// Create an empty session. The caller adds the baseline checkpoint.
    pub fn new(
        id: SessionId,
        workflow_id: impl Into<String>,
        limits: &SessionLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workflow_id: workflow_id.into(),
            current_nodes: Vec::new(),
            checkpoints: Vec::new(),
            validation_history: Vec::new(),
            security: SecurityContext::new(limits, now),
            next_checkpoint_id: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn current_nodes(&self) -> &[WorkflowNode] {
        &self.current_nodes
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn validation_history(&self) -> &[ValidationRun] {
        &self.validation_history
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        self.security.audit_log()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.security.expires_at
    }

    /// A session is usable while `now <= expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.security.expires_at
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.security.has_permission(permission)
    }

    pub fn is_at_node_capacity(&self) -> bool {
        self.current_nodes.len() >= self.security.rate_limits.max_nodes
    }

    /// Count an operation against the fixed-window cap
    pub fn check_rate_limit_at(&mut self, now: DateTime<Utc>) -> bool {
        self.security.rate_limits.check_at(now)
    }

    /// Append to the audit log; existing entries are never touched
    pub fn record_audit(&mut self, operation: impl Into<String>, detail: Value) {
        self.security.audit_log.push(AuditEntry {
            operation: operation.into(),
            timestamp: Utc::now(),
            detail,
        });
    }

    pub(crate) fn push_node(&mut self, node: WorkflowNode) {
        self.current_nodes.push(node);
    }

    pub(crate) fn pop_node(&mut self) -> Option<WorkflowNode> {
        self.current_nodes.pop()
    }

    pub(crate) fn replace_nodes(&mut self, nodes: Vec<WorkflowNode>) {
        self.current_nodes = nodes;
    }

    pub(crate) fn allocate_checkpoint_id(&mut self) -> CheckpointId {
        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        id
    }

    /// Push a checkpoint, evicting the oldest non-baseline one when over capacity
    pub(crate) fn push_checkpoint(&mut self, checkpoint: Checkpoint) -> Option<Checkpoint> {
        self.checkpoints.push(checkpoint);

        if self.checkpoints.len() > self.security.rate_limits.max_checkpoints
            && self.checkpoints.len() > 1
        {
            return Some(self.checkpoints.remove(1));
        }

        None
    }

    pub fn checkpoint(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id() == id)
    }

    /// Drop every checkpoint created after `id`, returning how many were discarded
    pub(crate) fn discard_checkpoints_after(&mut self, id: CheckpointId) -> usize {
        match self.checkpoints.iter().position(|c| c.id() == id) {
            Some(index) => {
                let discarded = self.checkpoints.len() - index - 1;
                self.checkpoints.truncate(index + 1);
                discarded
            }
            None => 0,
        }
    }

    pub(crate) fn record_validation(&mut self, run: ValidationRun) {
        self.validation_history.push(run);
    }

    #[cfg(test)]
    pub(crate) fn checkpoints_mut(&mut self) -> &mut Vec<Checkpoint> {
        &mut self.checkpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::checkpoint::SnapshotEnvelope;
    use serde_json::json;

    fn limits() -> SessionLimits {
        SessionLimits {
            max_nodes: 3,
            max_checkpoints: 3,
            operations_per_window: 5,
            window: Duration::seconds(60),
            ttl: Duration::minutes(30),
        }
    }

    fn checkpoint(id: CheckpointId) -> Checkpoint {
        Checkpoint::new(
            id,
            format!("cp{}", id),
            Utc::now(),
            0,
            "hash",
            SnapshotEnvelope::Sealed {
                nonce: String::new(),
                ciphertext: String::new(),
            },
        )
    }

    #[test]
    fn test_validate_workflow_id() {
        assert!(validate_workflow_id("wf-1").is_ok());
        assert!(validate_workflow_id("AbC_123").is_ok());
        assert!(validate_workflow_id("").is_err());
        assert!(validate_workflow_id("-wf").is_err());
        assert!(validate_workflow_id("wf/../admin").is_err());
        assert!(validate_workflow_id(&"a".repeat(MAX_WORKFLOW_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_new_session_defaults() {
        let now = Utc::now();
        let session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), now);

        assert_eq!(session.workflow_id(), "wf-1");
        assert!(session.current_nodes().is_empty());
        assert_eq!(session.security().permissions().len(), 4);
        assert!(session.has_permission(Permission::Rollback));
        assert_eq!(session.expires_at(), now + Duration::minutes(30));
        assert_eq!(session.security().created_at(), now);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), now);
        let expires_at = session.expires_at();

        assert!(!session.is_expired_at(expires_at));
        assert!(session.is_expired_at(expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_rate_limit_fixed_window() {
        let start = Utc::now();
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), start);

        for _ in 0..5 {
            assert!(session.check_rate_limit_at(start + Duration::seconds(10)));
        }
        assert!(!session.check_rate_limit_at(start + Duration::seconds(59)));
        assert!(!session.check_rate_limit_at(start + Duration::seconds(59)));

        // Next window starts on the boundary, not relative to the last call
        assert!(session.check_rate_limit_at(start + Duration::seconds(60)));
        assert_eq!(
            session.security().rate_limits().window_started_at(),
            start + Duration::seconds(60)
        );
    }

    #[test]
    fn test_rate_limit_window_skips_idle_periods() {
        let start = Utc::now();
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), start);

        session.check_rate_limit_at(start);
        assert!(session.check_rate_limit_at(start + Duration::seconds(185)));
        assert_eq!(
            session.security().rate_limits().window_started_at(),
            start + Duration::seconds(180)
        );
        assert_eq!(session.security().rate_limits().current_operations(), 1);
    }

    #[test]
    fn test_audit_log_append_only() {
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), Utc::now());

        session.record_audit("first", json!({}));
        let first = session.audit_log()[0].clone();
        session.record_audit("second", json!({ "n": 2 }));

        assert_eq!(session.audit_log().len(), 2);
        assert_eq!(session.audit_log()[0], first);
        assert_eq!(session.audit_log()[1].operation, "second");
    }

    #[test]
    fn test_checkpoint_eviction_keeps_baseline() {
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), Utc::now());

        for id in 0..3 {
            assert!(session.push_checkpoint(checkpoint(id)).is_none());
        }

        let evicted = session.push_checkpoint(checkpoint(3)).unwrap();
        assert_eq!(evicted.id(), 1);

        let ids: Vec<_> = session.checkpoints().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn test_discard_checkpoints_after() {
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), Utc::now());
        for id in 0..3 {
            session.push_checkpoint(checkpoint(id));
        }

        assert_eq!(session.discard_checkpoints_after(0), 2);
        assert_eq!(session.checkpoints().len(), 1);
        assert_eq!(session.discard_checkpoints_after(42), 0);
    }

    #[test]
    fn test_checkpoint_ids_are_sequential() {
        let mut session = BuilderSession::new(SessionId::generate(), "wf-1", &limits(), Utc::now());
        assert_eq!(session.allocate_checkpoint_id(), 0);
        assert_eq!(session.allocate_checkpoint_id(), 1);
        assert_eq!(session.allocate_checkpoint_id(), 2);
    }
}
