//! Outbound webhook delivery.
//!
//! Callers hand a payload to [`worker::DeliveryWorker::enqueue`]; the worker
//! signs it, POSTs it to the consumer endpoint on its own timer, retries on a
//! bounded backoff table and records every attempt in an
//! [`clients::audit::AuditStore`].

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod utils;
pub mod worker;
