use std::sync::Arc;

use anyhow::{Error, Result};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webhook_service::{
    api::{AppState, run_api_server},
    clients::{
        audit::AuditStore, database::PostgresAuditStore, health::HealthChecker,
        redis::RedisSecretStore, secrets::SecretStore,
    },
    config::Config,
    models::events::LifecycleEvent,
    utils::init_tracing,
    worker::DeliveryWorker,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing()?;

    let audit_store = PostgresAuditStore::connect(&config.database_url).await?;
    audit_store.migrate().await?;
    let audit_store: Arc<dyn AuditStore> = Arc::new(audit_store);

    let secret_store: Arc<dyn SecretStore> =
        Arc::new(RedisSecretStore::connect(&config.redis_url).await?);

    let (observer_tx, mut observer_rx) =
        mpsc::channel::<LifecycleEvent>(config.observer_channel_capacity);

    let worker = DeliveryWorker::new(
        config.worker_config()?,
        Arc::clone(&audit_store),
        Arc::clone(&secret_store),
    )?
    .with_observer(observer_tx);

    tokio::spawn(async move {
        while let Some(event) = observer_rx.recv().await {
            debug!(?event, "Lifecycle event");
        }
    });

    let health_checker = HealthChecker::new(
        audit_store,
        secret_store,
        worker.queue().clone(),
        config.queue_backlog_threshold,
    );

    let state = Arc::new(AppState {
        worker: worker.clone(),
        health_checker,
    });

    let handle = worker.start();

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let listener = TcpListener::bind(("0.0.0.0", config.server_port)).await?;
    let server = tokio::spawn(run_api_server(listener, state, server_shutdown));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    handle.stop().await;

    let pending = worker.queue().len().await;
    if pending > 0 {
        info!(pending, "Exiting with undelivered notifications in memory");
    }

    server.await??;

    Ok(())
}
