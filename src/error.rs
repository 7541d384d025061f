use std::time::Duration;

use thiserror::Error as ThisError;

/// Raised synchronously by `enqueue`; the notification never enters the queue.
#[derive(ThisError, Debug)]
pub enum EnqueueError {
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Consumer id cannot be empty")]
    MissingConsumer,
}

/// Why a single delivery attempt did not succeed.
///
/// Every variant counts as a failed attempt; the distinction only shapes the
/// recorded error message.
#[derive(ThisError, Debug)]
pub enum DeliveryError {
    #[error("Endpoint responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("No webhook secret configured for consumer '{0}'")]
    MissingSecret(String),

    #[error("Secret lookup failed: {0}")]
    SecretStore(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn response_body(&self) -> Option<&str> {
        match self {
            DeliveryError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
