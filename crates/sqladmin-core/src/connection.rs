//! Connection traits and connection targets

use crate::{QueryResult, Result, StatementResult};
use async_trait::async_trait;
use std::sync::Arc;

/// How a session authenticates against the server
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Operating-system (Windows/Kerberos) identity of the current user
    Integrated,
    /// SQL Server login
    SqlLogin { user: String, password: String },
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Integrated => f.write_str("Integrated"),
            AuthMode::SqlLogin { user, .. } => f
                .debug_struct("SqlLogin")
                .field("user", user)
                .field("password", &"[hidden]")
                .finish(),
        }
    }
}

/// Everything needed to open (and later reopen) one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Server address as typed by the user (`host`, `host,port`, `host\instance`)
    pub server: String,
    /// Initial database, `None` for the login's default database
    pub database: Option<String>,
    pub auth: AuthMode,
    /// Application identity reported to the server
    pub application_name: String,
    pub trust_server_certificate: bool,
}

impl ConnectionTarget {
    pub fn new(server: impl Into<String>, auth: AuthMode) -> Self {
        Self {
            server: server.into(),
            database: None,
            auth,
            application_name: crate::settings::DEFAULT_APPLICATION_NAME.to_string(),
            trust_server_certificate: true,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }
}

/// A live database session
///
/// A session is not safe for concurrent statements; callers serialize access.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g. "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a batch and materialise its first result set
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Execute a statement that does not return rows
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Close the session. Closing an already closed session is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the session has been closed, locally or by the server
    fn is_closed(&self) -> bool;
}

/// Factory for opening sessions
///
/// The connection manager reopens stale sessions through the same factory
/// that created them.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new session against the target
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn Connection>> {
        (**self).connect(target).await
    }
}

/// Quote an identifier with SQL Server brackets, doubling any closing bracket
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
