//! SQL Server driver for the SQL Server admin client
//!
//! This crate provides the tiberius-backed session (`MssqlConnection`) and the
//! factory that opens it (`MssqlConnector`), including parsing of the server
//! address forms users type into the connect dialog.

mod address;
mod connection;
mod connector;

#[cfg(test)]
mod address_tests;
#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod connector_tests;

pub use address::ServerAddress;
pub use connection::{MssqlConnection, MssqlConnectionError};
pub use connector::{MssqlConnector, LIST_DATABASES_SQL};
