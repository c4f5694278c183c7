//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::services::BuilderService;

/// Shared state handed to every handler
#[derive(Clone, Debug)]
pub struct AppState {
    pub builder: Arc<BuilderService>,
}

impl AppState {
    pub fn new(builder: Arc<BuilderService>) -> Self {
        Self { builder }
    }
}
