//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sqladmin_connection::{ConnectRequest, ConnectionManager};
use sqladmin_core::{
    AuthMode, ColumnMeta, Connection, ConnectionFactory, ConnectionTarget, CoreSettings,
    QueryResult, Result, Row, SqlAdminError, StatementResult, Value,
};
use sqladmin_query::{HistoryStore, QueryExecutionCore, QueryExecutor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Mock session for exercising the core without a server.
///
/// Responses are chosen by SQL pattern: if a statement contains the pattern
/// (case-insensitively) the registered result or failure is used. Every
/// statement, query or execute, lands in the shared log.
#[derive(Clone)]
pub struct MockConnection {
    pub query_responses: Vec<(String, QueryResult)>,
    pub failures: Vec<(String, String)>,
    pub affected_rows: u64,
    pub latency: Duration,
    pub closed: Arc<AtomicBool>,
    pub query_log: Arc<Mutex<Vec<String>>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            query_responses: vec![],
            failures: vec![],
            affected_rows: 1,
            latency: Duration::from_millis(5),
            closed: Arc::new(AtomicBool::new(false)),
            query_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a response for statements containing the given SQL pattern.
    pub fn with_query_response(mut self, sql_contains: impl Into<String>, result: QueryResult) -> Self {
        self.query_responses.push((sql_contains.into(), result));
        self
    }

    /// Fail statements containing the pattern with a server message.
    pub fn with_failure_on(mut self, sql_contains: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.push((sql_contains.into(), message.into()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }

    pub fn query_log(&self) -> Vec<String> {
        self.query_log.lock().clone()
    }

    /// Simulate the server dropping the session
    pub fn drop_session(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn respond(&self, sql: &str) -> Result<Option<QueryResult>> {
        self.query_log.lock().push(sql.to_string());
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlAdminError::Connection("connection is closed".into()));
        }

        tokio::time::sleep(self.latency).await;

        let lowered = sql.to_lowercase();
        if let Some((_, message)) = self
            .failures
            .iter()
            .find(|(pattern, _)| lowered.contains(&pattern.to_lowercase()))
        {
            return Err(SqlAdminError::Query(message.clone()));
        }

        Ok(self
            .query_responses
            .iter()
            .find(|(pattern, _)| lowered.contains(&pattern.to_lowercase()))
            .map(|(_, result)| result.clone()))
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        Ok(self.respond(sql).await?.unwrap_or_else(QueryResult::empty))
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        self.respond(sql).await?;
        Ok(StatementResult {
            affected_rows: self.affected_rows,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Opens sessions cloned from a template; all of them share one query log
pub struct MockFactory {
    template: MockConnection,
    refuse: AtomicBool,
    pub targets: Mutex<Vec<ConnectionTarget>>,
    pub opened: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub fn new(template: MockConnection) -> Arc<Self> {
        Arc::new(Self {
            template,
            refuse: AtomicBool::new(false),
            targets: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Make every following connect attempt fail
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn last_connection(&self) -> Arc<MockConnection> {
        self.opened.lock().last().cloned().expect("no connection opened")
    }

    pub fn connect_count(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn query_log(&self) -> Vec<String> {
        self.template.query_log()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn Connection>> {
        self.targets.lock().push(target.clone());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SqlAdminError::Connection(format!(
                "could not reach {}",
                target.server
            )));
        }
        let connection = Arc::new(MockConnection {
            closed: Arc::new(AtomicBool::new(false)),
            ..self.template.clone()
        });
        self.opened.lock().push(connection.clone());
        Ok(connection)
    }
}

/// One-column, one-row result holding `1`
pub fn select_one() -> QueryResult {
    QueryResult::from_parts(
        vec![ColumnMeta::new("", "Int4", 0)],
        vec![Row::new(vec![Value::Int32(1)])],
    )
}

pub fn single_string(column: &str, value: &str) -> QueryResult {
    QueryResult::from_parts(
        vec![ColumnMeta::new(column, "NVarchar", 0)],
        vec![Row::new(vec![Value::String(value.to_string())])],
    )
}

pub fn connect_request() -> ConnectRequest {
    ConnectRequest::new(
        "db01",
        AuthMode::SqlLogin {
            user: "admin".into(),
            password: "secret".into(),
        },
    )
    .with_database("sales")
}

pub fn core_with(factory: Arc<MockFactory>, history: HistoryStore) -> QueryExecutionCore {
    core_with_timeout(factory, history, Duration::from_secs(300))
}

pub fn core_with_timeout(
    factory: Arc<MockFactory>,
    history: HistoryStore,
    timeout: Duration,
) -> QueryExecutionCore {
    let connections = ConnectionManager::new(factory, &CoreSettings::default());
    QueryExecutionCore::new(connections, QueryExecutor::new(timeout), history)
}

/// A core already connected to `db01` / `sales`
pub async fn connected_core(factory: Arc<MockFactory>, history: HistoryStore) -> QueryExecutionCore {
    let mut core = core_with(factory, history);
    core.connect(connect_request()).await.expect("connect");
    core
}
