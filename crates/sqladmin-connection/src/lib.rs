//! SQL Admin Connection - lifecycle of the single server session
//!
//! This crate owns the one logical connection a core instance works with:
//! opening it, reopening it once when it has gone stale, and tearing it down.

mod error;
mod manager;

pub use error::ConnectionError;
pub use manager::{ConnectRequest, ConnectionManager, ConnectionSnapshot, ConnectionState};
