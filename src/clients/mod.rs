pub mod audit;
pub mod database;
pub mod health;
pub mod redis;
pub mod secrets;
pub mod signer;
pub mod webhook;
