//! Error types for sqladmin

use thiserror::Error;

/// Core error type for sqladmin operations
#[derive(Error, Debug)]
pub enum SqlAdminError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SqlAdminError {
    /// Whether the error was reported by the server or the driver while a
    /// statement was running, as opposed to a local fault.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            SqlAdminError::Connection(_)
                | SqlAdminError::Query(_)
                | SqlAdminError::Driver(_)
                | SqlAdminError::Timeout(_)
        )
    }
}

/// Result type alias for sqladmin operations
pub type Result<T> = std::result::Result<T, SqlAdminError>;
