use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::audit::AuditStore,
    models::{
        audit::{AuditRecord, AuditUpdate, CreateAuditRecord},
        status::DeliveryStatus,
    },
};

const MIGRATION: &str = include_str!("../../migrations/001_create_webhook_deliveries.sql");

pub struct PostgresAuditStore {
    client: Client,
}

impl PostgresAuditStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        self.client
            .batch_execute(MIGRATION)
            .await
            .map_err(|e| anyhow!("Failed to run audit migration: {}", e))?;

        debug!("Audit schema is up to date");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AuditRecord>, Error> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT id, consumer_id, event_type, payload, status, attempt_count,
                       last_attempt_at, next_retry_at, response_status, response_body,
                       error_message, created_at, updated_at
                FROM webhook_deliveries
                WHERE id = $1
                "#,
                &[&id],
            )
            .await
            .map_err(|e| anyhow!("Failed to read audit record: {}", e))?;

        row.map(|row| record_from_row(&row)).transpose()
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn create(&self, record: CreateAuditRecord) -> Result<Uuid, Error> {
        let id = Uuid::new_v4();
        let status_str = record.status.to_string();
        let attempt_count = record.attempt_count as i32;

        self.client
            .execute(
                r#"
                INSERT INTO webhook_deliveries (
                    id,
                    consumer_id,
                    event_type,
                    payload,
                    status,
                    attempt_count,
                    last_attempt_at,
                    next_retry_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &id,
                    &record.consumer_id,
                    &record.event_type,
                    &record.payload,
                    &status_str,
                    &attempt_count,
                    &record.last_attempt_at,
                    &record.next_retry_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    consumer_id = %record.consumer_id,
                    "Failed to write audit record to database"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        debug!(audit_record_id = %id, status = %status_str, "Audit record created");

        Ok(id)
    }

    async fn update(&self, id: Uuid, update: AuditUpdate) -> Result<(), Error> {
        let status_str = update.status.to_string();
        let attempt_count = update.attempt_count as i32;
        let response_status = update.response_status.map(i32::from);

        let updated = self
            .client
            .execute(
                r#"
                UPDATE webhook_deliveries
                SET status = $2,
                    attempt_count = $3,
                    last_attempt_at = COALESCE($4, last_attempt_at),
                    next_retry_at = $5,
                    response_status = CASE WHEN $9::BOOLEAN THEN $6::INTEGER ELSE COALESCE($6, response_status) END,
                    response_body = CASE WHEN $9::BOOLEAN THEN $7::TEXT ELSE COALESCE($7, response_body) END,
                    error_message = CASE WHEN $9::BOOLEAN THEN $8::TEXT ELSE COALESCE($8, error_message) END,
                    updated_at = NOW()
                WHERE id = $1 AND status NOT IN ('sent', 'failed')
                "#,
                &[
                    &id,
                    &status_str,
                    &attempt_count,
                    &update.last_attempt_at,
                    &update.next_retry_at,
                    &response_status,
                    &update.response_body,
                    &update.error_message,
                    &update.replaces_outcome,
                ],
            )
            .await
            .map_err(|e| anyhow!("Database update failed: {}", e))?;

        if updated == 0 {
            return Err(anyhow!(
                "Audit record {} is missing or already terminal",
                id
            ));
        }

        debug!(audit_record_id = %id, status = %status_str, "Audit record updated");

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

fn record_from_row(row: &Row) -> Result<AuditRecord, Error> {
    let status: String = row.try_get("status")?;
    let attempt_count: i32 = row.try_get("attempt_count")?;
    let response_status: Option<i32> = row.try_get("response_status")?;
    let payload: JsonValue = row.try_get("payload")?;
    let last_attempt_at: Option<DateTime<Utc>> = row.try_get("last_attempt_at")?;
    let next_retry_at: Option<DateTime<Utc>> = row.try_get("next_retry_at")?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        consumer_id: row.try_get("consumer_id")?,
        event_type: row.try_get("event_type")?,
        payload,
        status: status.parse::<DeliveryStatus>()?,
        attempt_count: u32::try_from(attempt_count)?,
        last_attempt_at,
        next_retry_at,
        response_status: response_status.map(u16::try_from).transpose()?,
        response_body: row.try_get("response_body")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
