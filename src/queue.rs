use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::notification::Notification;

/// In-memory set of notifications waiting for their next delivery attempt.
///
/// Items leave only through [`DeliveryQueue::remove`]; a failed attempt puts
/// the updated item back with [`DeliveryQueue::reschedule`]. Nothing here
/// survives a process restart.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    pending: Arc<RwLock<HashMap<Uuid, Notification>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, notification: Notification) {
        debug!(
            notification_id = %notification.id(),
            consumer_id = %notification.consumer_id(),
            event = notification.event_type(),
            "Enqueuing notification"
        );

        self.pending
            .write()
            .await
            .insert(notification.id(), notification);
    }

    /// Snapshot of every notification whose `next_eligible_at <= now`.
    /// No ordering is promised between items.
    pub async fn due_items(&self, now: DateTime<Utc>) -> Vec<Notification> {
        self.pending
            .read()
            .await
            .values()
            .filter(|notification| notification.is_due(now))
            .cloned()
            .collect()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Notification> {
        let removed = self.pending.write().await.remove(&id);

        if removed.is_some() {
            debug!(notification_id = %id, "Removed notification from queue");
        }

        removed
    }

    /// Store the latest state of `notification` and hold it back until
    /// `next_eligible_at`.
    ///
    /// Returns `false` if the notification is no longer queued. The stored
    /// attempt count and eligibility time never move backwards, even if a
    /// stale copy is passed in.
    pub async fn reschedule(
        &self,
        notification: &Notification,
        next_eligible_at: DateTime<Utc>,
    ) -> bool {
        let mut pending = self.pending.write().await;

        let Some(current) = pending.get_mut(&notification.id()) else {
            return false;
        };

        let mut updated = notification.clone();
        updated.defer_until(current.next_eligible_at());
        updated.defer_until(next_eligible_at);

        if updated.attempt() < current.attempt() {
            debug!(
                notification_id = %notification.id(),
                "Ignoring stale reschedule"
            );
            return false;
        }

        debug!(
            notification_id = %updated.id(),
            attempt = updated.attempt(),
            next_eligible_at = %updated.next_eligible_at(),
            "Rescheduled notification"
        );

        *current = updated;
        true
    }

    pub async fn get(&self, id: Uuid) -> Option<Notification> {
        self.pending.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use url::Url;

    use super::*;
    use crate::models::notification::WebhookPayload;

    fn notification(consumer_id: &str, now: DateTime<Utc>) -> Notification {
        Notification::new(
            consumer_id,
            Url::parse("https://ok.example/hook").unwrap(),
            WebhookPayload::new("message.sent"),
            now,
        )
    }

    #[tokio::test]
    async fn test_due_items_respects_eligibility() {
        let queue = DeliveryQueue::new();
        let now = Utc::now();

        let due = notification("a", now);
        let mut later = notification("b", now);
        later.defer_until(now + Duration::seconds(10));

        queue.enqueue(due.clone()).await;
        queue.enqueue(later.clone()).await;

        let items = queue.due_items(now).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), due.id());

        assert_eq!(queue.due_items(now + Duration::seconds(10)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let queue = DeliveryQueue::new();
        let item = notification("a", Utc::now());
        queue.enqueue(item.clone()).await;

        assert!(queue.remove(item.id()).await.is_some());
        assert!(queue.remove(item.id()).await.is_none());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_reschedule_updates_state() {
        let queue = DeliveryQueue::new();
        let now = Utc::now();
        let mut item = notification("a", now);
        queue.enqueue(item.clone()).await;

        item.record_attempt();
        assert!(queue.reschedule(&item, now + Duration::seconds(1)).await);

        let stored = queue.get(item.id()).await.unwrap();
        assert_eq!(stored.attempt(), 1);
        assert_eq!(stored.next_eligible_at(), now + Duration::seconds(1));
        assert!(queue.due_items(now).await.is_empty());
    }

    #[tokio::test]
    async fn test_reschedule_never_moves_backwards() {
        let queue = DeliveryQueue::new();
        let now = Utc::now();
        let mut item = notification("a", now);
        let original = item.clone();
        queue.enqueue(item.clone()).await;

        item.record_attempt();
        queue.reschedule(&item, now + Duration::seconds(5)).await;
        queue.reschedule(&item, now + Duration::seconds(1)).await;

        let stored = queue.get(item.id()).await.unwrap();
        assert_eq!(stored.next_eligible_at(), now + Duration::seconds(5));

        assert!(!queue.reschedule(&original, now + Duration::seconds(30)).await);
        assert_eq!(queue.get(item.id()).await.unwrap().attempt(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_of_removed_item_is_ignored() {
        let queue = DeliveryQueue::new();
        let item = notification("a", Utc::now());

        assert!(!queue.reschedule(&item, Utc::now()).await);
        assert!(queue.is_empty().await);
    }
}
