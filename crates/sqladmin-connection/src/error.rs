//! Connection lifecycle errors

use sqladmin_core::SqlAdminError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    /// No connection was ever established, or it was disconnected
    #[error("not connected to a server")]
    NotConnected,

    #[error("failed to connect to {server}: {source}")]
    ConnectFailed {
        server: String,
        #[source]
        source: SqlAdminError,
    },

    /// The held session was closed and the single reopen attempt failed
    #[error("connection to {server} was lost and could not be reopened: {source}")]
    ReopenFailed {
        server: String,
        #[source]
        source: SqlAdminError,
    },

    /// A catalog query issued by the manager itself failed
    #[error("server request failed: {0}")]
    Server(#[source] SqlAdminError),
}
