//! Alert Ingest: bank debit alerts from an inbox into a transactions table.

pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scheduler;
pub mod store;
