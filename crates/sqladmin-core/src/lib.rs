//! SQL Admin Core - shared abstractions for the SQL Server admin client
//!
//! This crate provides the fundamental traits and types that the other
//! sqladmin crates depend on. It defines:
//!
//! - `Connection` - Trait for a live database session
//! - `ConnectionFactory` - Trait for opening sessions from a target description
//! - `CoreSettings` - User-tunable settings and per-user paths
//! - Common types like `Value`, `Row`, `ColumnMeta` and `QueryResult`

mod connection;
mod error;
pub mod settings;
mod types;

pub use connection::*;
pub use error::*;
pub use settings::CoreSettings;
pub use types::*;
