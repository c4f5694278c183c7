//! Infrastructure layer - session state, orchestrator clients and observability

pub mod builder;
pub mod logging;
pub mod observability;
pub mod orchestrator;
pub mod services;
