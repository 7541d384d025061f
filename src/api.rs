use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    models::{health::HealthStatus, notification::WebhookPayload, response::ApiResponse},
    worker::DeliveryWorker,
};

pub struct AppState {
    pub worker: DeliveryWorker,
    pub health_checker: HealthChecker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub consumer_id: String,
    pub endpoint_url: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueAccepted {
    pub notification_id: Uuid,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/notifications", post(enqueue_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "API server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn enqueue_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnqueueRequest>,
) -> (StatusCode, Json<ApiResponse<EnqueueAccepted>>) {
    match state
        .worker
        .enqueue(&request.consumer_id, &request.endpoint_url, request.payload)
        .await
    {
        Ok(notification_id) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                EnqueueAccepted { notification_id },
                "Notification queued for delivery".to_string(),
            )),
        ),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error(
                e.to_string(),
                "Notification rejected".to_string(),
            )),
        ),
    }
}
