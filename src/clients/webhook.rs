use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, header::CONTENT_TYPE};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::{
    clients::signer::{EVENT_HEADER, REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    error::DeliveryError,
};

/// One signed POST, ready to go out.
#[derive(Debug, Clone)]
pub struct WebhookRequest<'a> {
    pub url: &'a Url,
    pub body: Vec<u8>,
    pub signature: String,
    pub event_type: &'a str,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
    pub request_id: Uuid,
}

pub struct WebhookClient {
    http_client: Client,
    timeout: Duration,
    max_response_body_bytes: usize,
}

impl WebhookClient {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        max_response_body_bytes: usize,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow!("Failed to build webhook HTTP client: {}", e))?;

        info!(
            timeout_ms = timeout.as_millis() as u64,
            user_agent, "Webhook client initialized"
        );

        Ok(Self {
            http_client,
            timeout,
            max_response_body_bytes,
        })
    }

    /// Send one attempt. Only a 2xx response is `Ok`; everything else,
    /// including a timeout, comes back as a [`DeliveryError`].
    pub async fn send(&self, request: WebhookRequest<'_>) -> Result<WebhookResponse, DeliveryError> {
        let request_id = Uuid::new_v4();

        debug!(
            url = %request.url,
            request_id = %request_id,
            event = request.event_type,
            "Sending webhook"
        );

        let response = self
            .http_client
            .post(request.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &request.signature)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .header(EVENT_HEADER, request.event_type)
            .header(TIMESTAMP_HEADER, request.sent_at.timestamp().to_string())
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = self.read_body(response).await?;

        if status.is_success() {
            Ok(WebhookResponse {
                status: status.as_u16(),
                body,
                request_id,
            })
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Read at most `max_response_body_bytes` of the body; the rest is never
    /// buffered.
    async fn read_body(&self, mut response: Response) -> Result<String, DeliveryError> {
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            let remaining = self.max_response_body_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(truncate_body(
            String::from_utf8_lossy(&body).into_owned(),
            self.max_response_body_bytes,
        ))
    }

    fn classify(&self, error: reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Transport(error.to_string())
        }
    }
}

/// Cut a response body down to at most `max_bytes`, respecting char boundaries.
pub fn truncate_body(mut body: String, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body;
    }

    let mut cut = max_bytes;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}
