use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    models::retry::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy},
    worker::WorkerConfig,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,

    #[serde(default = "default_observer_channel_capacity")]
    pub observer_channel_capacity: usize,
    #[serde(default = "default_queue_backlog_threshold")]
    pub queue_backlog_threshold: usize,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.tick_interval_ms == 0 {
            return Err(anyhow!("TICK_INTERVAL_MS must be greater than zero"));
        }

        if self.request_timeout_ms == 0 {
            return Err(anyhow!("REQUEST_TIMEOUT_MS must be greater than zero"));
        }

        if self.observer_channel_capacity == 0 {
            return Err(anyhow!("OBSERVER_CHANNEL_CAPACITY must be greater than zero"));
        }

        self.retry_policy()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, Error> {
        RetryPolicy::from_millis(self.max_retry_attempts, &self.retry_backoff_ms)
    }

    pub fn worker_config(&self) -> Result<WorkerConfig, Error> {
        Ok(WorkerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            user_agent: self.user_agent.clone(),
            max_response_body_bytes: self.max_response_body_bytes,
            retry_policy: self.retry_policy()?,
        })
    }
}

fn default_server_port() -> u16 {
    8080
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_backoff_ms() -> Vec<u64> {
    DEFAULT_BACKOFF_MS.to_vec()
}

fn default_user_agent() -> String {
    format!("webhook-service/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_response_body_bytes() -> usize {
    2048
}

fn default_observer_channel_capacity() -> usize {
    256
}

fn default_queue_backlog_threshold() -> usize {
    10_000
}
