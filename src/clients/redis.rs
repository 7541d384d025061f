use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::clients::secrets::SecretStore;

/// Secrets stored as plain strings under `webhook_secret:{consumer_id}`.
pub struct RedisSecretStore {
    connection: MultiplexedConnection,
}

impl RedisSecretStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client =
            Client::open(redis_url).map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis client"))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    pub fn secret_key(consumer_id: &str) -> String {
        format!("webhook_secret:{}", consumer_id)
    }
}

#[async_trait]
impl SecretStore for RedisSecretStore {
    async fn secret_for(&self, consumer_id: &str) -> Result<Option<String>, Error> {
        let key = Self::secret_key(consumer_id);
        let mut connection = self.connection.clone();

        let secret: Option<String> = connection
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read webhook secret: {}", e))?;

        debug!(consumer_id, found = secret.is_some(), "Webhook secret lookup");

        Ok(secret)
    }

    async fn health_check(&self) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        connection
            .ping::<String>()
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_layout() {
        assert_eq!(
            RedisSecretStore::secret_key("consumer_42"),
            "webhook_secret:consumer_42"
        );
    }
}
