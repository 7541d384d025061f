use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of a delivery attempt, published to the worker's observer channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Delivered {
        notification_id: Uuid,
        consumer_id: String,
        attempt: u32,
        status_code: u16,
    },
    RetryScheduled {
        notification_id: Uuid,
        consumer_id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        notification_id: Uuid,
        consumer_id: String,
        attempts: u32,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn notification_id(&self) -> Uuid {
        match self {
            LifecycleEvent::Delivered {
                notification_id, ..
            }
            | LifecycleEvent::RetryScheduled {
                notification_id, ..
            }
            | LifecycleEvent::Failed {
                notification_id, ..
            } => *notification_id,
        }
    }
}
