//! Notewire core library
//!
//! Shared plumbing for the Notewire webhook broker:
//! - configuration loading from the environment
//! - SQLite pool helpers and the shared `DatabaseError`
//! - tracing/logging initialization

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
