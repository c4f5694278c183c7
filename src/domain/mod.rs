//! Domain layer - builder entities, errors and the orchestrator seam

pub mod builder;
pub mod error;

pub use error::DomainError;
