use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{audit::AuditStore, secrets::SecretStore},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    queue::DeliveryQueue,
};

pub struct HealthChecker {
    audit_store: Arc<dyn AuditStore>,
    secret_store: Arc<dyn SecretStore>,
    queue: DeliveryQueue,
    queue_backlog_threshold: usize,
}

impl HealthChecker {
    pub fn new(
        audit_store: Arc<dyn AuditStore>,
        secret_store: Arc<dyn SecretStore>,
        queue: DeliveryQueue,
        queue_backlog_threshold: usize,
    ) -> Self {
        Self {
            audit_store,
            secret_store,
            queue,
            queue_backlog_threshold,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let audit_health = self.check_audit_store().await;
        checks.insert("audit_store".to_string(), audit_health);

        let secret_health = self.check_secret_store().await;
        checks.insert("secret_store".to_string(), secret_health);

        let pending = self.queue.len().await;
        checks.insert(
            "delivery_queue".to_string(),
            ServiceHealth::queue(pending, self.queue_backlog_threshold),
        );

        let overall_status = determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_audit_store(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.audit_store.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Audit store health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Audit store health check failed");
                ServiceHealth::unhealthy(format!("Health check failed: {}", e))
            }
        }
    }

    async fn check_secret_store(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.secret_store.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Secret store health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Secret store health check failed");
                ServiceHealth::unhealthy(format!("Health check failed: {}", e))
            }
        }
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
