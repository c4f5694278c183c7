//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, BuilderConfig, LogFormat, LoggingConfig, OrchestratorConfig, OrchestratorKind,
    ServerConfig,
};
