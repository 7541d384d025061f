use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::status::DeliveryStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub consumer_id: String,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_create(id: Uuid, create: CreateAuditRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            consumer_id: create.consumer_id,
            event_type: create.event_type,
            payload: create.payload,
            status: create.status,
            attempt_count: create.attempt_count,
            last_attempt_at: create.last_attempt_at,
            next_retry_at: create.next_retry_at,
            response_status: None,
            response_body: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update in place. `next_retry_at` is always overwritten.
    ///
    /// An outcome update replaces the response and error fields wholesale,
    /// so a terminal record only describes its last attempt. Any other
    /// update keeps previous values where it leaves a field empty.
    pub fn apply(&mut self, update: AuditUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.attempt_count = update.attempt_count;
        self.next_retry_at = update.next_retry_at;

        if let Some(last_attempt_at) = update.last_attempt_at {
            self.last_attempt_at = Some(last_attempt_at);
        }

        if update.replaces_outcome {
            self.response_status = update.response_status;
            self.response_body = update.response_body;
            self.error_message = update.error_message;
        } else {
            if let Some(response_status) = update.response_status {
                self.response_status = Some(response_status);
            }
            if let Some(response_body) = update.response_body {
                self.response_body = Some(response_body);
            }
            if let Some(error_message) = update.error_message {
                self.error_message = Some(error_message);
            }
        }

        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAuditRecord {
    pub consumer_id: String,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl CreateAuditRecord {
    pub fn new(
        consumer_id: String,
        event_type: String,
        payload: JsonValue,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            consumer_id,
            event_type,
            payload,
            status,
            attempt_count: 0,
            last_attempt_at: None,
            next_retry_at: None,
        }
    }

    pub fn with_attempt(mut self, attempt_count: u32, attempted_at: DateTime<Utc>) -> Self {
        self.attempt_count = attempt_count;
        self.last_attempt_at = Some(attempted_at);
        self
    }

}

#[derive(Debug, Clone, Serialize)]
pub struct AuditUpdate {
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    /// Response and error fields are the full result of an attempt; empty
    /// ones clear what an earlier attempt recorded.
    pub replaces_outcome: bool,
}

impl AuditUpdate {
    pub fn new(status: DeliveryStatus, attempt_count: u32) -> Self {
        Self {
            status,
            attempt_count,
            last_attempt_at: None,
            next_retry_at: None,
            response_status: None,
            response_body: None,
            error_message: None,
            replaces_outcome: false,
        }
    }

    /// Update carrying the result of a finished attempt.
    pub fn outcome(status: DeliveryStatus, attempt_count: u32) -> Self {
        Self {
            replaces_outcome: true,
            ..Self::new(status, attempt_count)
        }
    }

    pub fn with_last_attempt(mut self, attempted_at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(attempted_at);
        self
    }

    pub fn with_next_retry(mut self, next_retry_at: DateTime<Utc>) -> Self {
        self.next_retry_at = Some(next_retry_at);
        self
    }

    pub fn with_response(mut self, status: u16, body: Option<String>) -> Self {
        self.response_status = Some(status);
        self.response_body = body;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn retrying_record(now: DateTime<Utc>) -> AuditRecord {
        let mut record = AuditRecord::from_create(
            Uuid::new_v4(),
            CreateAuditRecord::new(
                "consumer_1".to_string(),
                "message.sent".to_string(),
                json!({"event": "message.sent"}),
                DeliveryStatus::Pending,
            )
            .with_attempt(1, now),
            now,
        );

        record.apply(
            AuditUpdate::outcome(DeliveryStatus::Retrying, 1)
                .with_response(503, Some("maintenance".to_string()))
                .with_error("Endpoint responded with HTTP 503: maintenance".to_string())
                .with_next_retry(now),
            now,
        );
        record
    }

    #[test]
    fn test_pending_update_keeps_previous_outcome() {
        let now = Utc::now();
        let mut record = retrying_record(now);

        record.apply(
            AuditUpdate::new(DeliveryStatus::Pending, 2).with_last_attempt(now),
            now,
        );

        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.response_status, Some(503));
        assert!(record.error_message.is_some());
        assert!(record.next_retry_at.is_none());
    }

    #[test]
    fn test_success_clears_earlier_error() {
        let now = Utc::now();
        let mut record = retrying_record(now);

        record.apply(
            AuditUpdate::outcome(DeliveryStatus::Sent, 2).with_response(200, Some("ok".to_string())),
            now,
        );

        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.response_status, Some(200));
        assert_eq!(record.response_body.as_deref(), Some("ok"));
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_transport_failure_clears_earlier_response() {
        let now = Utc::now();
        let mut record = retrying_record(now);

        record.apply(
            AuditUpdate::outcome(DeliveryStatus::Failed, 2)
                .with_error("Request timed out after 10000ms".to_string()),
            now,
        );

        assert_eq!(record.status, DeliveryStatus::Failed);
        assert!(record.response_status.is_none());
        assert!(record.response_body.is_none());
        assert_eq!(
            record.error_message.as_deref(),
            Some("Request timed out after 10000ms")
        );
    }
}
