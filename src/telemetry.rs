//! Health aggregation and logging setup.
//!
//! Provides component-level health tracking with a worst-of aggregation, a
//! small pipeline counter snapshot, and tracing-subscriber initialization
//! driven by [`LoggingConfig`](crate::config::LoggingConfig).

use crate::config::LoggingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overall health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component/system is healthy
    Healthy,
    /// Component/system is degraded but functional
    Degraded,
    /// Component/system is unhealthy
    Unhealthy,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Per-component health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentHealth {
    /// Component name
    pub component: String,
    /// Current status
    pub status: HealthStatus,
    /// Snapshot timestamp
    pub checked_at: DateTime<Utc>,
    /// Optional diagnostic message
    pub message: Option<String>,
}

impl ComponentHealth {
    /// Create a snapshot for `component` taken now.
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            checked_at: Utc::now(),
            message: None,
        }
    }

    /// Attach a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Compute worst-of aggregation across component statuses.
#[must_use]
pub fn aggregate_worst_of<I: IntoIterator<Item = HealthStatus>>(statuses: I) -> HealthStatus {
    let mut has_healthy = false;
    let mut has_degraded = false;
    let mut has_unhealthy = false;

    for status in statuses {
        match status {
            HealthStatus::Unhealthy => has_unhealthy = true,
            HealthStatus::Degraded => has_degraded = true,
            HealthStatus::Healthy => has_healthy = true,
            HealthStatus::Unknown => {}
        }
    }

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else if has_healthy {
        HealthStatus::Healthy
    } else {
        // No components or all unknown
        HealthStatus::Unknown
    }
}

/// Pipeline counter snapshot surfaced by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    /// Counters supplied by the external sniffer/detector layer, unmodified
    pub counters: HashMap<String, u64>,
    /// Time the counters were last replaced
    pub updated_at: Option<DateTime<Utc>>,
}

/// Initialize the global tracing subscriber from logging configuration.
///
/// Falls back to the configured level when `RUST_LOG` is unset. Safe to call
/// once per process; subsequent calls return an error from the subscriber
/// registry and are ignored here.
pub fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_of_aggregation() {
        assert_eq!(aggregate_worst_of([]), HealthStatus::Unknown);
        assert_eq!(
            aggregate_worst_of([HealthStatus::Healthy]),
            HealthStatus::Healthy
        );
        assert_eq!(
            aggregate_worst_of([HealthStatus::Healthy, HealthStatus::Degraded]),
            HealthStatus::Degraded
        );
        assert_eq!(
            aggregate_worst_of([
                HealthStatus::Healthy,
                HealthStatus::Degraded,
                HealthStatus::Unhealthy,
            ]),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            aggregate_worst_of([HealthStatus::Unknown, HealthStatus::Healthy]),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn component_health_builder() {
        let health = ComponentHealth::new("queue", HealthStatus::Degraded)
            .with_message("coordinator lagging");
        assert_eq!(health.component, "queue");
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.message.as_deref(), Some("coordinator lagging"));
    }

    #[test]
    fn health_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
