use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Numeric(i64),
    Text(String),
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        MessageId::Numeric(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Text(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        MessageId::Text(id)
    }
}

/// Document POSTed to the consumer endpoint.
///
/// Known top-level fields are typed; anything else travels in `extra` and is
/// flattened into the same JSON object. `extra` is ordered so that identical
/// payloads always serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl WebhookPayload {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            message_id: None,
            status: None,
            timestamp: Utc::now(),
            error: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<MessageId>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A queued webhook delivery.
///
/// `attempt` and `next_eligible_at` are only ever moved forward, through
/// [`Notification::record_attempt`] and [`Notification::defer_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    id: Uuid,
    consumer_id: String,
    endpoint_url: Url,
    payload: WebhookPayload,
    attempt: u32,
    next_eligible_at: DateTime<Utc>,
    audit_record_id: Option<Uuid>,
    enqueued_at: DateTime<Utc>,
}

impl Notification {
    /// Build a notification that is due immediately.
    ///
    /// The URL is expected to have passed endpoint validation already.
    pub fn new(
        consumer_id: impl Into<String>,
        endpoint_url: Url,
        payload: WebhookPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            consumer_id: consumer_id.into(),
            endpoint_url,
            payload,
            attempt: 0,
            next_eligible_at: now,
            audit_record_id: None,
            enqueued_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint_url
    }

    pub fn payload(&self) -> &WebhookPayload {
        &self.payload
    }

    pub fn event_type(&self) -> &str {
        &self.payload.event
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_eligible_at(&self) -> DateTime<Utc> {
        self.next_eligible_at
    }

    pub fn audit_record_id(&self) -> Option<Uuid> {
        self.audit_record_id
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_eligible_at <= now
    }

    /// Count one finished delivery attempt and return the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Push the next eligible time forward. Earlier times are ignored.
    pub fn defer_until(&mut self, next_eligible_at: DateTime<Utc>) {
        if next_eligible_at > self.next_eligible_at {
            self.next_eligible_at = next_eligible_at;
        }
    }

    pub fn attach_audit_record(&mut self, audit_record_id: Uuid) {
        if self.audit_record_id.is_none() {
            self.audit_record_id = Some(audit_record_id);
        }
    }
}
