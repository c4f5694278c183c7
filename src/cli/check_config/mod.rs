//! Check-config command - validates configuration without starting the server

use crate::config::{AppConfig, OrchestratorKind};

pub fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    config.validate()?;

    println!("{}", summarize(&config));
    Ok(())
}

fn summarize(config: &AppConfig) -> String {
    let builder = &config.builder;
    let orchestrator = match config.orchestrator.kind {
        OrchestratorKind::Http => format!(
            "http ({})",
            config.orchestrator.base_url.as_deref().unwrap_or_default()
        ),
        OrchestratorKind::InMemory => "in_memory".to_string(),
    };

    let mut lines = vec![
        "Configuration OK".to_string(),
        format!("  listen:              {}:{}", config.server.host, config.server.port),
        format!("  orchestrator:        {}", orchestrator),
        format!("  session ttl:         {}s", builder.session_ttl_secs),
        format!("  max nodes:           {}", builder.max_nodes_per_session),
        format!("  max checkpoints:     {}", builder.max_checkpoints),
        format!(
            "  rate limit:          {} ops / {}s",
            builder.operations_per_minute, builder.rate_limit_window_secs
        ),
        format!("  max output length:   {}", builder.max_output_length),
        format!("  allowed node types:  {}", builder.allowed_node_types.len()),
    ];

    if config.orchestrator.api_key.is_some() {
        lines.push("  api key:             [set]".to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_hides_api_key() {
        let mut config = AppConfig::default();
        config.orchestrator.api_key = Some("super-secret".to_string());

        let summary = summarize(&config);
        assert!(summary.starts_with("Configuration OK"));
        assert!(summary.contains("in_memory"));
        assert!(summary.contains("[set]"));
        assert!(!summary.contains("super-secret"));
    }
}
