use chrono::Duration;
use serde::Deserialize;

use crate::domain::builder::{SessionLimits, DEFAULT_MAX_OUTPUT_LENGTH, DEFAULT_NODE_TYPES};
use crate::domain::DomainError;
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub builder: BuilderConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Per-session limits and the node-type allowlist
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub session_ttl_secs: i64,
    pub max_nodes_per_session: usize,
    pub max_checkpoints: usize,
    pub operations_per_minute: u32,
    pub rate_limit_window_secs: i64,
    pub max_output_length: usize,
    pub allowed_node_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorKind {
    Http,
    #[default]
    InMemory,
}

/// Remote workflow orchestrator connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub kind: OrchestratorKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
            max_nodes_per_session: 50,
            max_checkpoints: 10,
            operations_per_minute: 60,
            rate_limit_window_secs: 60,
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
            allowed_node_types: DEFAULT_NODE_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            kind: OrchestratorKind::default(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl BuilderConfig {
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_nodes: self.max_nodes_per_session,
            max_checkpoints: self.max_checkpoints,
            operations_per_window: self.operations_per_minute,
            window: Duration::seconds(self.rate_limit_window_secs),
            ttl: Duration::seconds(self.session_ttl_secs),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("builder.allowed_node_types")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject limits the builder cannot operate with
    pub fn validate(&self) -> Result<(), DomainError> {
        let builder = &self.builder;

        if builder.session_ttl_secs <= 0 {
            return Err(DomainError::configuration("builder.session_ttl_secs must be positive"));
        }
        if builder.max_nodes_per_session == 0 {
            return Err(DomainError::configuration(
                "builder.max_nodes_per_session must be positive",
            ));
        }
        // Baseline plus at least one user checkpoint
        if builder.max_checkpoints < 2 {
            return Err(DomainError::configuration(
                "builder.max_checkpoints must be at least 2",
            ));
        }
        if builder.operations_per_minute == 0 {
            return Err(DomainError::configuration(
                "builder.operations_per_minute must be positive",
            ));
        }
        if builder.rate_limit_window_secs <= 0 {
            return Err(DomainError::configuration(
                "builder.rate_limit_window_secs must be positive",
            ));
        }
        if builder.max_output_length == 0 {
            return Err(DomainError::configuration(
                "builder.max_output_length must be positive",
            ));
        }
        if builder.allowed_node_types.iter().all(|t| t.trim().is_empty()) {
            return Err(DomainError::configuration(
                "builder.allowed_node_types cannot be empty",
            ));
        }

        if self.orchestrator.kind == OrchestratorKind::Http {
            let base_url = self.orchestrator.base_url.as_deref().unwrap_or_default();
            if base_url.trim().is_empty() {
                return Err(DomainError::configuration(
                    "orchestrator.base_url is required for the http orchestrator",
                ));
            }
        }
        if self.orchestrator.timeout_secs == 0 {
            return Err(DomainError::configuration(
                "orchestrator.timeout_secs must be positive",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.builder.max_nodes_per_session, 50);
        assert_eq!(config.builder.max_checkpoints, 10);
        assert_eq!(config.orchestrator.kind, OrchestratorKind::InMemory);
        assert_eq!(config.builder.allowed_node_types.len(), DEFAULT_NODE_TYPES.len());
    }

    #[test]
    fn test_session_limits_from_config() {
        let limits = BuilderConfig::default().session_limits();

        assert_eq!(limits.max_nodes, 50);
        assert_eq!(limits.operations_per_window, 60);
        assert_eq!(limits.window, Duration::seconds(60));
        assert_eq!(limits.ttl, Duration::hours(1));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"builder": {"max_nodes_per_session": 5}, "orchestrator": {"kind": "http", "base_url": "http://n8n:5678/api/v1"}}"#,
        )
        .unwrap();

        assert_eq!(config.builder.max_nodes_per_session, 5);
        assert_eq!(config.builder.max_checkpoints, 10);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.orchestrator.kind, OrchestratorKind::Http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = AppConfig::default();
        config.builder.max_checkpoints = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.builder.allowed_node_types.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.builder.operations_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_base_url_for_http() {
        let mut config = AppConfig::default();
        config.orchestrator.kind = OrchestratorKind::Http;
        assert!(config.validate().is_err());

        config.orchestrator.base_url = Some("http://localhost:5678/api/v1".to_string());
        assert!(config.validate().is_ok());
    }
}
