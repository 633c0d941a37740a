//! The execution core: validate, execute, record

use sqladmin_connection::{ConnectRequest, ConnectionError, ConnectionManager, ConnectionSnapshot};
use sqladmin_core::{CoreSettings, QueryResult, SqlAdminError, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{Failed, Run};
use crate::{
    CoreResult, HistoryEntry, HistoryStore, QueryError, QueryExecutor, QueryOutcome, QueryTemplate,
    TemplateStore, sql_preview,
};

/// A fully materialised table: column names and typed rows in server order
pub type TableResult = QueryResult;

/// One query to run, optionally against a specific database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub query: String,
    pub database: Option<String>,
}

impl ExecutionRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// A successful execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub result: Arc<TableResult>,
    /// Wall-clock time of the run, including any context switch
    pub duration: Duration,
    /// Database the session is in after the run
    pub effective_database: Option<String>,
}

/// Composes connection, validation, execution and history
///
/// One instance owns one session. Methods take `&mut self`, so at most one
/// execution is in flight; share it through [`crate::CoreHandle`].
pub struct QueryExecutionCore {
    connections: ConnectionManager,
    executor: QueryExecutor,
    history: HistoryStore,
    templates: TemplateStore,
    last_result: Option<Arc<TableResult>>,
}

impl QueryExecutionCore {
    pub fn new(connections: ConnectionManager, executor: QueryExecutor, history: HistoryStore) -> Self {
        Self {
            connections,
            executor,
            history,
            templates: TemplateStore::in_memory(),
            last_result: None,
        }
    }

    /// Replace the default in-memory template store
    pub fn with_templates(mut self, templates: TemplateStore) -> Self {
        self.templates = templates;
        self
    }

    /// Build a SQL Server core from settings, loading history and templates
    /// from the per-user files
    pub async fn from_settings(settings: &CoreSettings) -> Result<Self, SqlAdminError> {
        let history_path = settings.history_file()?;
        let history = HistoryStore::open(history_path, settings.history_cap).await;
        let templates = TemplateStore::open(settings.templates_file()?).await;
        Ok(Self::new(
            ConnectionManager::for_sql_server(settings),
            QueryExecutor::new(settings.query_timeout()),
            history,
        )
        .with_templates(templates))
    }

    pub async fn connect(&mut self, request: ConnectRequest) -> Result<(), ConnectionError> {
        self.last_result = None;
        self.connections.connect(request).await
    }

    pub async fn disconnect(&mut self) {
        self.last_result = None;
        self.connections.disconnect().await;
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.connections.snapshot()
    }

    /// Execute a query and record the attempt in history
    ///
    /// `NotConnected` and `EmptyQuery` return before anything is recorded.
    /// Every other attempt, rejected or run, produces exactly one entry.
    pub async fn execute(&mut self, request: ExecutionRequest) -> CoreResult<ExecutionOutcome> {
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let database = request.database.as_deref();
        let run = self
            .executor
            .run(&mut self.connections, &request.query, database)
            .await;

        match run {
            Ok(Run { result, duration }) => {
                let outcome = QueryOutcome::succeeded(result.rows.len() as u64, duration);
                let effective_database = self.connections.current_database().map(String::from);
                self.record(&request.query, effective_database.as_deref(), &outcome)
                    .await;

                let result = Arc::new(result);
                self.last_result = Some(result.clone());
                Ok(ExecutionOutcome {
                    result,
                    duration,
                    effective_database,
                })
            }
            Err(Failed { error, duration }) => {
                if error.is_recorded() {
                    let outcome = QueryOutcome::failed(error.to_string(), duration);
                    let recorded_database = database
                        .map(String::from)
                        .or_else(|| self.connections.current_database().map(String::from));
                    self.record(&request.query, recorded_database.as_deref(), &outcome)
                        .await;
                } else {
                    tracing::debug!(
                        sql_preview = %sql_preview(&request.query),
                        error = %error,
                        "execution refused before reaching the server"
                    );
                }
                Err(error)
            }
        }
    }

    /// Execute a statement that returns no rows; not recorded in history
    pub async fn execute_non_query(&mut self, request: ExecutionRequest) -> CoreResult<u64> {
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        self.executor
            .run_non_query(
                &mut self.connections,
                &request.query,
                request.database.as_deref(),
            )
            .await
    }

    /// First column of the first row, `Value::Null` when there are no rows;
    /// not recorded in history
    pub async fn execute_scalar(&mut self, request: ExecutionRequest) -> CoreResult<Value> {
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        self.executor
            .run_scalar(
                &mut self.connections,
                &request.query,
                request.database.as_deref(),
            )
            .await
    }

    /// Estimated plan for a query as showplan XML, without running it
    pub async fn query_plan(&mut self, request: ExecutionRequest) -> CoreResult<String> {
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        self.executor
            .run_plan(
                &mut self.connections,
                &request.query,
                request.database.as_deref(),
            )
            .await
    }

    pub async fn list_databases(&mut self) -> CoreResult<Vec<String>> {
        Ok(self.connections.list_databases().await?)
    }

    /// History entries, newest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries().cloned().collect()
    }

    pub fn search_history(&self, text: &str) -> Vec<HistoryEntry> {
        self.history.search(text).cloned().collect()
    }

    pub async fn clear_history(&mut self) {
        self.history.clear().await;
    }

    pub fn templates(&self) -> Vec<QueryTemplate> {
        self.templates.templates().to_vec()
    }

    pub async fn save_template(&mut self, template: QueryTemplate) {
        self.templates.save_template(template).await;
    }

    pub async fn remove_template(&mut self, name: &str) -> bool {
        self.templates.remove(name).await
    }

    /// Table returned by the most recent successful execution
    pub fn last_result(&self) -> Option<Arc<TableResult>> {
        self.last_result.clone()
    }

    pub fn current_database(&self) -> Option<&str> {
        self.connections.current_database()
    }

    /// Close the session; history is already on disk
    pub async fn shutdown(&mut self) {
        self.disconnect().await;
        tracing::debug!("execution core shut down");
    }

    async fn record(&mut self, query: &str, database: Option<&str>, outcome: &QueryOutcome) {
        let entry = HistoryEntry::from_outcome(query, database, outcome);
        self.history.append(entry).await;
    }
}

impl std::fmt::Debug for QueryExecutionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutionCore")
            .field("connections", &self.connections)
            .field("history", &self.history)
            .field("templates", &self.templates)
            .finish()
    }
}
