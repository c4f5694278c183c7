//! Infrastructure services

mod builder_service;

pub use builder_service::{
    ActionResult, BuilderAction, BuilderService, CompletionSummary, SessionCreated, SessionEnded,
    Suggestions, WorkflowPreview,
};
