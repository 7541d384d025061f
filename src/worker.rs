//! Scheduling loop for outbound webhook delivery.
//!
//! ```text
//! worker.tick_at(now)
//!   ├─ processing guard (overlapping scans are no-ops)
//!   ├─ queue.due_items(now)
//!   └─ for each due notification, concurrently:
//!        ├─ audit: create (first attempt) or update → pending
//!        ├─ secret lookup + sign exact body bytes
//!        ├─ POST with timeout
//!        └─ outcome
//!             ├─ 2xx      → audit sent,     queue.remove,     Delivered
//!             ├─ give up  → audit failed,   queue.remove,     Failed
//!             └─ else     → audit retrying, queue.reschedule, RetryScheduled
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value as JsonValue;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{
        audit::AuditStore,
        secrets::SecretStore,
        signer,
        webhook::{WebhookClient, WebhookRequest, WebhookResponse},
    },
    error::{DeliveryError, EnqueueError},
    models::{
        audit::{AuditUpdate, CreateAuditRecord},
        events::LifecycleEvent,
        notification::{Notification, WebhookPayload},
        retry::RetryPolicy,
        status::DeliveryStatus,
        validation::validate_endpoint_url,
    },
    queue::DeliveryQueue,
};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_response_body_bytes: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            user_agent: format!("webhook-service/{}", env!("CARGO_PKG_VERSION")),
            max_response_body_bytes: 2048,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// What a single scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub skipped: bool,
    pub attempted: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Delivered,
    Retrying,
    Failed,
}

/// Delivers queued notifications on a fixed timer.
///
/// Cloning is cheap and every clone drives the same queue and processing
/// guard.
#[derive(Clone)]
pub struct DeliveryWorker {
    queue: DeliveryQueue,
    client: Arc<WebhookClient>,
    retry_policy: RetryPolicy,
    tick_interval: Duration,
    audit_store: Arc<dyn AuditStore>,
    secret_store: Arc<dyn SecretStore>,
    observer: Option<mpsc::Sender<LifecycleEvent>>,
    processing: Arc<AtomicBool>,
}

impl DeliveryWorker {
    pub fn new(
        config: WorkerConfig,
        audit_store: Arc<dyn AuditStore>,
        secret_store: Arc<dyn SecretStore>,
    ) -> Result<Self, Error> {
        let client = WebhookClient::new(
            config.request_timeout,
            &config.user_agent,
            config.max_response_body_bytes,
        )?;

        Ok(Self {
            queue: DeliveryQueue::new(),
            client: Arc::new(client),
            retry_policy: config.retry_policy,
            tick_interval: config.tick_interval,
            audit_store,
            secret_store,
            observer: None,
            processing: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Publish lifecycle events to `observer`. Events are dropped, not
    /// buffered, when the channel is full.
    pub fn with_observer(mut self, observer: mpsc::Sender<LifecycleEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Validate the endpoint and queue a notification for immediate delivery.
    ///
    /// A rejected endpoint never reaches the queue or the audit store.
    pub async fn enqueue(
        &self,
        consumer_id: &str,
        endpoint_url: &str,
        payload: WebhookPayload,
    ) -> Result<Uuid, EnqueueError> {
        if consumer_id.trim().is_empty() {
            warn!(endpoint_url, "Rejected notification without consumer id");
            return Err(EnqueueError::MissingConsumer);
        }

        let url = validate_endpoint_url(endpoint_url).map_err(|e| {
            warn!(
                consumer_id,
                endpoint_url,
                error = %e,
                "Rejected notification with invalid endpoint"
            );
            EnqueueError::InvalidEndpoint {
                url: endpoint_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let notification = Notification::new(consumer_id, url, payload, Utc::now());
        let id = notification.id();

        info!(
            notification_id = %id,
            consumer_id,
            event = notification.event_type(),
            "Notification queued for delivery"
        );

        self.queue.enqueue(notification).await;

        Ok(id)
    }

    /// Spawn the timer loop. The first scan runs immediately.
    pub fn start(&self) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let worker = self.clone();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            worker.run(token).await;
        });

        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            max_attempts = self.retry_policy.max_attempts(),
            backoff = ?self.retry_policy.backoff_table(),
            "Delivery worker started"
        );

        WorkerHandle { shutdown, task }
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Delivery worker stopped");
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one scan as if the current time were `now`.
    ///
    /// Returns once every due attempt has finished, so a single slow endpoint
    /// holds back the next scan for up to the request timeout.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous delivery scan still running, skipping tick");
            return TickReport::skipped();
        }
        let _guard = ProcessingGuard(&self.processing);

        let due = self.queue.due_items(now).await;
        if due.is_empty() {
            return TickReport::default();
        }

        debug!(count = due.len(), "Dispatching due notifications");

        let outcomes = join_all(
            due.into_iter()
                .map(|notification| self.attempt(notification, now)),
        )
        .await;

        let mut report = TickReport {
            attempted: outcomes.len(),
            ..TickReport::default()
        };

        for outcome in outcomes {
            match outcome {
                AttemptOutcome::Delivered => report.delivered += 1,
                AttemptOutcome::Retrying => report.retrying += 1,
                AttemptOutcome::Failed => report.failed += 1,
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            retrying = report.retrying,
            failed = report.failed,
            "Delivery scan finished"
        );

        report
    }

    async fn attempt(&self, mut notification: Notification, now: DateTime<Utc>) -> AttemptOutcome {
        let started = Instant::now();
        let attempt_number = notification.attempt() + 1;

        debug!(
            notification_id = %notification.id(),
            attempt = attempt_number,
            url = %notification.endpoint_url(),
            "Attempting webhook delivery"
        );

        self.open_audit(&mut notification, attempt_number, now).await;

        let result = self.send(&notification).await;
        let finished_at = offset(now, started.elapsed());

        match result {
            Ok(response) => self.complete_delivered(notification, response).await,
            Err(error) => self.complete_failed(notification, error, finished_at).await,
        }
    }

    async fn open_audit(
        &self,
        notification: &mut Notification,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) {
        match notification.audit_record_id() {
            None => {
                let payload =
                    serde_json::to_value(notification.payload()).unwrap_or(JsonValue::Null);
                let record = CreateAuditRecord::new(
                    notification.consumer_id().to_string(),
                    notification.event_type().to_string(),
                    payload,
                    DeliveryStatus::Pending,
                )
                .with_attempt(attempt_number, now);

                match self.audit_store.create(record).await {
                    Ok(id) => notification.attach_audit_record(id),
                    Err(e) => warn!(
                        notification_id = %notification.id(),
                        error = %e,
                        "Failed to create audit record"
                    ),
                }
            }
            Some(id) => {
                let update = AuditUpdate::new(DeliveryStatus::Pending, attempt_number)
                    .with_last_attempt(now);
                self.write_audit(id, update).await;
            }
        }
    }

    async fn send(&self, notification: &Notification) -> Result<WebhookResponse, DeliveryError> {
        let secret = self
            .secret_store
            .secret_for(notification.consumer_id())
            .await
            .map_err(|e| DeliveryError::SecretStore(e.to_string()))?
            .ok_or_else(|| DeliveryError::MissingSecret(notification.consumer_id().to_string()))?;

        let body = serde_json::to_vec(notification.payload())?;
        let signature = signer::sign(&body, &secret);

        self.client
            .send(WebhookRequest {
                url: notification.endpoint_url(),
                body,
                signature,
                event_type: notification.event_type(),
                sent_at: Utc::now(),
            })
            .await
    }

    async fn complete_delivered(
        &self,
        mut notification: Notification,
        response: WebhookResponse,
    ) -> AttemptOutcome {
        let attempts = notification.record_attempt();

        if let Some(id) = notification.audit_record_id() {
            let update = AuditUpdate::outcome(DeliveryStatus::Sent, attempts)
                .with_response(response.status, Some(response.body));
            self.write_audit(id, update).await;
        }

        self.queue.remove(notification.id()).await;

        info!(
            notification_id = %notification.id(),
            consumer_id = %notification.consumer_id(),
            attempt = attempts,
            status_code = response.status,
            request_id = %response.request_id,
            "Webhook delivered successfully"
        );

        self.publish(LifecycleEvent::Delivered {
            notification_id: notification.id(),
            consumer_id: notification.consumer_id().to_string(),
            attempt: attempts,
            status_code: response.status,
        });

        AttemptOutcome::Delivered
    }

    async fn complete_failed(
        &self,
        mut notification: Notification,
        error: DeliveryError,
        finished_at: DateTime<Utc>,
    ) -> AttemptOutcome {
        let attempts = notification.record_attempt();
        let message = error.to_string();

        if self.retry_policy.should_give_up(attempts) {
            if let Some(id) = notification.audit_record_id() {
                let update = with_failure_detail(
                    AuditUpdate::outcome(DeliveryStatus::Failed, attempts),
                    &error,
                );
                self.write_audit(id, update).await;
            }

            self.queue.remove(notification.id()).await;

            error!(
                notification_id = %notification.id(),
                consumer_id = %notification.consumer_id(),
                attempts,
                queued_for_ms = (finished_at - notification.enqueued_at()).num_milliseconds(),
                error = %message,
                "Webhook delivery failed after exhausting all attempts"
            );

            self.publish(LifecycleEvent::Failed {
                notification_id: notification.id(),
                consumer_id: notification.consumer_id().to_string(),
                attempts,
                error: message,
            });

            return AttemptOutcome::Failed;
        }

        let delay = self.retry_policy.delay_for(attempts);
        let next_attempt_at = offset(finished_at, delay);
        notification.defer_until(next_attempt_at);

        if let Some(id) = notification.audit_record_id() {
            let update = with_failure_detail(
                AuditUpdate::outcome(DeliveryStatus::Retrying, attempts),
                &error,
            )
            .with_next_retry(next_attempt_at);
            self.write_audit(id, update).await;
        }

        self.queue.reschedule(&notification, next_attempt_at).await;

        warn!(
            notification_id = %notification.id(),
            consumer_id = %notification.consumer_id(),
            attempt = attempts,
            max_attempts = self.retry_policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "Webhook delivery failed, retry scheduled"
        );

        self.publish(LifecycleEvent::RetryScheduled {
            notification_id: notification.id(),
            consumer_id: notification.consumer_id().to_string(),
            attempt: attempts,
            next_attempt_at,
            error: message,
        });

        AttemptOutcome::Retrying
    }

    async fn write_audit(&self, id: Uuid, update: AuditUpdate) {
        let status = update.status;
        if let Err(e) = self.audit_store.update(id, update).await {
            warn!(
                audit_record_id = %id,
                status = %status,
                error = %e,
                "Failed to update audit record"
            );
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Some(observer) = &self.observer {
            if let Err(e) = observer.try_send(event) {
                debug!(error = %e, "Lifecycle event dropped");
            }
        }
    }
}

/// Running timer loop returned by [`DeliveryWorker::start`].
pub struct WorkerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the timer and wait for the scan in flight, if any, to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();

        if let Err(e) = self.task.await {
            error!(error = %e, "Delivery worker task ended abnormally");
        }
    }
}

struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn with_failure_detail(update: AuditUpdate, error: &DeliveryError) -> AuditUpdate {
    let update = update.with_error(error.to_string());

    match error.status_code() {
        Some(status) => update.with_response(status, error.response_body().map(str::to_string)),
        None => update,
    }
}

fn offset(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_adds_duration() {
        let now = Utc::now();
        assert_eq!(
            offset(now, Duration::from_millis(1500)),
            now + chrono::Duration::milliseconds(1500)
        );
    }

    #[test]
    fn test_offset_saturates() {
        let now = Utc::now();
        assert_eq!(offset(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_failure_detail_keeps_response_for_status_errors() {
        let error = DeliveryError::Status {
            status: 503,
            body: "maintenance".to_string(),
        };
        let update =
            with_failure_detail(AuditUpdate::outcome(DeliveryStatus::Retrying, 1), &error);

        assert_eq!(update.response_status, Some(503));
        assert_eq!(update.response_body.as_deref(), Some("maintenance"));
        assert!(update.error_message.unwrap().contains("503"));
    }

    #[test]
    fn test_failure_detail_for_transport_errors() {
        let error = DeliveryError::Timeout(Duration::from_secs(10));
        let update =
            with_failure_detail(AuditUpdate::outcome(DeliveryStatus::Failed, 3), &error);

        assert_eq!(update.response_status, None);
        assert_eq!(
            update.error_message.as_deref(),
            Some("Request timed out after 10000ms")
        );
    }
}
