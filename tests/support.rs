use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use webhook_service::{
    clients::{audit::InMemoryAuditStore, secrets::StaticSecretStore},
    models::{audit::AuditRecord, notification::WebhookPayload, retry::RetryPolicy},
    worker::{DeliveryWorker, WorkerConfig},
};
use wiremock::{MockServer, Request};

pub const SECRET: &str = "whsec_test_secret";

pub fn worker_config(request_timeout: Duration) -> WorkerConfig {
    WorkerConfig {
        tick_interval: Duration::from_millis(50),
        request_timeout,
        retry_policy: RetryPolicy::default(),
        ..WorkerConfig::default()
    }
}

pub fn secrets_for(consumers: &[&str]) -> StaticSecretStore {
    consumers
        .iter()
        .fold(StaticSecretStore::new(), |store, consumer| {
            store.with_secret(*consumer, SECRET)
        })
}

pub fn build_worker(
    config: WorkerConfig,
    audit: &InMemoryAuditStore,
    secrets: StaticSecretStore,
) -> Result<DeliveryWorker> {
    DeliveryWorker::new(config, Arc::new(audit.clone()), Arc::new(secrets))
}

pub fn message_sent(message_id: i64) -> WebhookPayload {
    WebhookPayload::new("message.sent")
        .with_message_id(message_id)
        .with_status("sent")
}

pub async fn requests(server: &MockServer) -> Result<Vec<Request>> {
    server
        .received_requests()
        .await
        .ok_or_else(|| anyhow!("Request recording is disabled"))
}

pub async fn only_record(audit: &InMemoryAuditStore) -> Result<AuditRecord> {
    let mut records = audit.records().await;
    match records.len() {
        1 => Ok(records.remove(0)),
        n => Err(anyhow!("Expected exactly one audit record, found {}", n)),
    }
}

pub async fn record_for_consumer(
    audit: &InMemoryAuditStore,
    consumer_id: &str,
) -> Result<AuditRecord> {
    audit
        .records()
        .await
        .into_iter()
        .find(|record| record.consumer_id == consumer_id)
        .ok_or_else(|| anyhow!("No audit record for {}", consumer_id))
}

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}
