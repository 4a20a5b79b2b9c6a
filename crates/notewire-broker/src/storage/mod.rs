//! SQLite storage for the Notewire broker.
//!
//! Persistence for API key pairs, webhook events, and delivery logs.

mod db;
mod models;
mod queries_events;
mod queries_keys;
mod queries_logs;

#[cfg(test)]
mod tests;

pub use db::Database;
pub use models::*;
