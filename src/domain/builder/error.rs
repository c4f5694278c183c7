//! Builder error types

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while building a workflow interactively
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuilderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded: {limit} operations per window")]
    RateLimit { limit: u32 },

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Checkpoint integrity violation: {0}")]
    Integrity(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BuilderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn rate_limit(limit: u32) -> Self {
        Self::RateLimit { limit }
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity(message.into())
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Session not found or expired
    pub fn session_unavailable(session_id: &str) -> Self {
        Self::Session(format!("Session '{}' not found or expired", session_id))
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable code, used in audit entries and API errors
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Capacity(_) => "capacity_error",
            Self::Session(_) => "session_error",
            Self::Integrity(_) => "integrity_error",
            Self::External(_) => "external_error",
            Self::PermissionDenied(_) => "permission_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<DomainError> for BuilderError {
    fn from(err: DomainError) -> Self {
        Self::External(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuilderError::validation("Node type 'x' is not allowed");
        assert_eq!(err.to_string(), "Validation error: Node type 'x' is not allowed");

        let err = BuilderError::rate_limit(60);
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: 60 operations per window"
        );

        let err = BuilderError::session_unavailable("abc");
        assert_eq!(
            err.to_string(),
            "Session error: Session 'abc' not found or expired"
        );
    }

    #[test]
    fn test_domain_error_wraps_as_external() {
        let err: BuilderError = DomainError::provider("n8n", "connection refused").into();
        assert_eq!(err.code(), "external_error");
        assert!(err.to_string().contains("connection refused"));
    }
}
