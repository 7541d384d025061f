use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::audit::{AuditRecord, AuditUpdate, CreateAuditRecord};

/// Durable lifecycle record of every notification that reached the network.
///
/// Implementations must refuse to update a record that is already `sent`
/// or `failed`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create(&self, record: CreateAuditRecord) -> Result<Uuid, Error>;

    async fn update(&self, id: Uuid, update: AuditUpdate) -> Result<(), Error>;

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Audit store kept in process memory. Used in tests and when no database
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<HashMap<Uuid, AuditRecord>>>,
    updates: Arc<RwLock<Vec<(Uuid, AuditUpdate)>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<AuditRecord> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every accepted update for `id`, oldest first.
    pub async fn updates_for(&self, id: Uuid) -> Vec<AuditUpdate> {
        self.updates
            .read()
            .await
            .iter()
            .filter(|(record_id, _)| *record_id == id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create(&self, record: CreateAuditRecord) -> Result<Uuid, Error> {
        let id = Uuid::new_v4();
        let record = AuditRecord::from_create(id, record, Utc::now());

        debug!(audit_record_id = %id, status = %record.status, "Audit record created");

        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn update(&self, id: Uuid, update: AuditUpdate) -> Result<(), Error> {
        let mut records = self.records.write().await;

        let record = records
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Audit record {} not found", id))?;

        if record.status.is_terminal() {
            return Err(anyhow!(
                "Audit record {} is already {} and cannot be updated",
                id,
                record.status
            ));
        }

        record.apply(update.clone(), Utc::now());
        self.updates.write().await.push((id, update));

        debug!(audit_record_id = %id, status = %record.status, "Audit record updated");

        Ok(())
    }
}
