use std::collections::HashMap;

use anyhow::{Error, Result};
use async_trait::async_trait;

/// Read side of the key-management store that owns per-consumer webhook secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` means the consumer exists nowhere in the store.
    async fn secret_for(&self, consumer_id: &str) -> Result<Option<String>, Error>;

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, consumer_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(consumer_id.into(), secret.into());
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn secret_for(&self, consumer_id: &str) -> Result<Option<String>, Error> {
        Ok(self.secrets.get(consumer_id).cloned())
    }
}
