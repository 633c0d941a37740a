//! Connection manager for the single active session

use serde::{Deserialize, Serialize};
use sqladmin_core::{
    AuthMode, Connection, ConnectionFactory, ConnectionTarget, CoreSettings, Value,
    quote_identifier,
};
use sqladmin_driver_mssql::{LIST_DATABASES_SQL, MssqlConnector};
use std::sync::Arc;

use crate::ConnectionError;

#[cfg(test)]
mod tests;

/// A request to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub server: String,
    /// Initial database, `None` for the login's default database
    pub database: Option<String>,
    pub auth: AuthMode,
}

impl ConnectRequest {
    pub fn new(server: impl Into<String>, auth: AuthMode) -> Self {
        Self {
            server: server.into(),
            database: None,
            auth,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Immutable view of the connection state, safe to hand to other tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub server: Option<String>,
    pub database: Option<String>,
}

impl ConnectionSnapshot {
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            server: None,
            database: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// The open session together with what is needed to reopen it
struct Session {
    target: ConnectionTarget,
    connection: Arc<dyn Connection>,
    current_database: Option<String>,
}

/// Owns the single logical connection of a core instance
///
/// Methods take `&mut self`; the owner serialises access, so no statement
/// ever runs concurrently on the session.
pub struct ConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
    application_name: String,
    trust_server_certificate: bool,
    session: Option<Session>,
}

impl ConnectionManager {
    /// Create a manager that opens sessions through `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>, settings: &CoreSettings) -> Self {
        Self {
            factory,
            application_name: settings.application_name.clone(),
            trust_server_certificate: settings.trust_server_certificate,
            session: None,
        }
    }

    /// Create a manager for SQL Server
    pub fn for_sql_server(settings: &CoreSettings) -> Self {
        Self::new(
            Arc::new(MssqlConnector::new(settings.default_port)),
            settings,
        )
    }

    /// Open a session, closing any existing one first
    ///
    /// On failure the manager is left disconnected.
    #[tracing::instrument(skip(self, request), fields(server = %request.server, database = ?request.database))]
    pub async fn connect(&mut self, request: ConnectRequest) -> Result<(), ConnectionError> {
        self.disconnect().await;

        let target = ConnectionTarget {
            server: request.server,
            database: request.database,
            auth: request.auth,
            application_name: self.application_name.clone(),
            trust_server_certificate: self.trust_server_certificate,
        };

        match self.factory.connect(&target).await {
            Ok(connection) => {
                tracing::info!(driver = connection.driver_name(), "connection established");
                self.session = Some(Session {
                    current_database: target.database.clone(),
                    target,
                    connection,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to connect");
                Err(ConnectionError::ConnectFailed {
                    server: target.server,
                    source: e,
                })
            }
        }
    }

    /// Return the open session, reopening it once if it has been closed
    ///
    /// A failed reopen releases the session, so the next call reports
    /// `NotConnected`.
    pub async fn ensure_open(&mut self) -> Result<Arc<dyn Connection>, ConnectionError> {
        let session = self.session.as_mut().ok_or(ConnectionError::NotConnected)?;

        if !session.connection.is_closed() {
            return Ok(session.connection.clone());
        }

        // Reopen against the sticky database, not the one first connected to
        let mut target = session.target.clone();
        target.database = session.current_database.clone();
        tracing::warn!(
            server = %target.server,
            database = ?target.database,
            "connection closed, reopening"
        );

        match self.factory.connect(&target).await {
            Ok(connection) => {
                tracing::info!(server = %target.server, "connection reopened");
                session.connection = connection.clone();
                Ok(connection)
            }
            Err(e) => {
                tracing::error!(server = %target.server, error = %e, "failed to reopen connection");
                self.session = None;
                Err(ConnectionError::ReopenFailed {
                    server: target.server,
                    source: e,
                })
            }
        }
    }

    /// Close and release the session. A no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.connection.close().await {
            tracing::warn!(server = %session.target.server, error = %e, "error while closing connection");
        }
        tracing::info!(server = %session.target.server, "disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        match &self.session {
            Some(session) => ConnectionSnapshot {
                state: ConnectionState::Connected,
                server: Some(session.target.server.clone()),
                database: session.current_database.clone(),
            },
            None => ConnectionSnapshot::disconnected(),
        }
    }

    /// The sticky database context, if any
    pub fn current_database(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.current_database.as_deref())
    }

    /// Remember `database` as the sticky context after a successful switch
    pub fn set_current_database(&mut self, database: impl Into<String>) {
        if let Some(session) = self.session.as_mut() {
            session.current_database = Some(database.into());
        }
    }

    /// Statement that switches the session to `database`
    pub fn use_statement(database: &str) -> String {
        format!("USE {}", quote_identifier(database))
    }

    /// User databases on the server, in name order
    #[tracing::instrument(skip(self))]
    pub async fn list_databases(&mut self) -> Result<Vec<String>, ConnectionError> {
        let connection = self.ensure_open().await?;
        let result = connection
            .query(LIST_DATABASES_SQL)
            .await
            .map_err(ConnectionError::Server)?;

        let names: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| match row.get(0) {
                Some(Value::String(name)) => Some(name.clone()),
                _ => None,
            })
            .collect();

        tracing::debug!(count = names.len(), "listed databases");
        Ok(names)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
