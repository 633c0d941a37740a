//! Query execution errors

use sqladmin_connection::ConnectionError;
use sqladmin_core::SqlAdminError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, QueryError>;

/// Why a query was refused before reaching the server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("syntax error: {}", .0.join("; "))]
    SyntaxInvalid(Vec<String>),

    #[error("query contains blocked phrase '{0}'")]
    Denylisted(String),

    /// The parser itself failed on the input
    #[error("query could not be validated: {0}")]
    ValidationFailed(String),
}

/// Outcome of a failed execution attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not connected to a server")]
    NotConnected,

    #[error("query is empty")]
    EmptyQuery,

    #[error("invalid query: {0}")]
    InvalidQuery(Rejection),

    /// Reported by the server or driver while running, including timeouts
    #[error("server error: {0}")]
    ServerError(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl QueryError {
    /// Whether the attempt belongs in the history log
    pub fn is_recorded(&self) -> bool {
        !matches!(self, QueryError::NotConnected | QueryError::EmptyQuery)
    }
}

impl From<Rejection> for QueryError {
    fn from(rejection: Rejection) -> Self {
        QueryError::InvalidQuery(rejection)
    }
}

impl From<SqlAdminError> for QueryError {
    fn from(err: SqlAdminError) -> Self {
        if let SqlAdminError::Timeout(message) = err {
            return QueryError::ServerError(message);
        }
        if err.is_server_side() {
            QueryError::ServerError(err.to_string())
        } else {
            QueryError::Unexpected(err.to_string())
        }
    }
}

impl From<ConnectionError> for QueryError {
    fn from(err: ConnectionError) -> Self {
        match err {
            // A failed reopen releases the session, leaving nothing usable
            ConnectionError::NotConnected | ConnectionError::ReopenFailed { .. } => {
                QueryError::NotConnected
            }
            ConnectionError::ConnectFailed { .. } => QueryError::Unexpected(err.to_string()),
            ConnectionError::Server(source) => source.into(),
        }
    }
}

/// Failures reading or writing a JSON-backed store (history, templates)
///
/// Logged and never surfaced to callers of execute.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HistoryError = PersistenceError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
