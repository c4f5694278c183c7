//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    create_metrics_router, init_metrics, record_checkpoint, record_http_request, record_node_add,
    record_rate_limited, record_rollback, record_session_created, record_session_ended,
    PrometheusMetrics,
};
