//! Query execution against the managed session

use sqladmin_connection::ConnectionManager;
use sqladmin_core::{Connection, QueryResult, SqlAdminError, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::{QueryError, QueryValidator, ValidatedQuery, sql_preview};

/// Result of one execution attempt, produced once and never changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub success: bool,
    /// Rows in the returned table, for successful attempts
    pub row_count: Option<u64>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn succeeded(row_count: u64, duration: Duration) -> Self {
        Self {
            success: true,
            row_count: Some(row_count),
            duration,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            row_count: None,
            duration,
            error: Some(error.into()),
        }
    }
}

/// A successful run: the table and how long it took
#[derive(Debug)]
pub(crate) struct Run {
    pub result: QueryResult,
    pub duration: Duration,
}

/// Failure of a run, with the time spent before it failed
#[derive(Debug)]
pub(crate) struct Failed {
    pub error: QueryError,
    pub duration: Duration,
}

impl From<QueryError> for Failed {
    fn from(error: QueryError) -> Self {
        Self {
            error,
            duration: Duration::ZERO,
        }
    }
}

const CURRENT_DATABASE_SQL: &str = "SELECT DB_NAME()";
const SHOWPLAN_ON_SQL: &str = "SET SHOWPLAN_XML ON";
const SHOWPLAN_OFF_SQL: &str = "SET SHOWPLAN_XML OFF";

/// Runs validated queries with a bounded duration
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    validator: QueryValidator,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            validator: QueryValidator::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn validator(&self) -> &QueryValidator {
        &self.validator
    }

    /// Run a query and materialise its first result set
    ///
    /// Validation happens before any context switch, so a rejected query
    /// leaves the session untouched.
    #[tracing::instrument(skip(self, connections, sql), fields(sql_preview = %sql_preview(sql)))]
    pub(crate) async fn run(
        &self,
        connections: &mut ConnectionManager,
        sql: &str,
        database: Option<&str>,
    ) -> Result<Run, Failed> {
        let connection = connections.ensure_open().await.map_err(QueryError::from)?;
        let validated = self.validator.validate(sql).map_err(QueryError::from)?;

        let start = Instant::now();
        let outcome = self
            .switch_and_run(connections, connection, sql, database, &validated)
            .await;
        let duration = start.elapsed();

        match outcome {
            Ok(result) => {
                tracing::info!(
                    rows = result.rows.len(),
                    duration_ms = duration.as_millis() as u64,
                    "query executed successfully"
                );
                Ok(Run { result, duration })
            }
            Err(error) => {
                tracing::error!(
                    error = %error,
                    duration_ms = duration.as_millis() as u64,
                    "query execution failed"
                );
                Err(Failed { error, duration })
            }
        }
    }

    async fn switch_and_run(
        &self,
        connections: &mut ConnectionManager,
        connection: Arc<dyn Connection>,
        sql: &str,
        database: Option<&str>,
        validated: &ValidatedQuery,
    ) -> Result<QueryResult, QueryError> {
        self.switch_database(connections, &connection, database)
            .await?;

        let result = self.bounded(&connection, connection.query(sql)).await;
        self.follow_batch_database(connections, &connection, validated)
            .await;

        Ok(result?)
    }

    /// Run a statement that returns no rows, reporting the affected row count
    #[tracing::instrument(skip(self, connections, sql), fields(sql_preview = %sql_preview(sql)))]
    pub(crate) async fn run_non_query(
        &self,
        connections: &mut ConnectionManager,
        sql: &str,
        database: Option<&str>,
    ) -> Result<u64, QueryError> {
        let (connection, validated) = self.prepare(connections, sql, database).await?;

        let result = self.bounded(&connection, connection.execute(sql)).await;
        self.follow_batch_database(connections, &connection, &validated)
            .await;
        let result = result.inspect_err(|e| tracing::error!(error = %e, "statement execution failed"))?;

        tracing::info!(
            affected_rows = result.affected_rows,
            "statement executed successfully"
        );
        Ok(result.affected_rows)
    }

    /// Run a query and return the first column of its first row
    ///
    /// An empty result yields `Value::Null`.
    #[tracing::instrument(skip(self, connections, sql), fields(sql_preview = %sql_preview(sql)))]
    pub(crate) async fn run_scalar(
        &self,
        connections: &mut ConnectionManager,
        sql: &str,
        database: Option<&str>,
    ) -> Result<Value, QueryError> {
        let (connection, validated) = self.prepare(connections, sql, database).await?;

        let result = self.bounded(&connection, connection.query(sql)).await;
        self.follow_batch_database(connections, &connection, &validated)
            .await;
        let result = result.inspect_err(|e| tracing::error!(error = %e, "scalar query failed"))?;

        let value = result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_iter().next())
            .unwrap_or(Value::Null);
        tracing::debug!(is_null = value.is_null(), "scalar query executed");
        Ok(value)
    }

    /// Estimated execution plan of a query, as showplan XML
    ///
    /// The query is compiled, not run. Plan output is switched off again
    /// whether or not the server produced a plan, unless the session was lost.
    #[tracing::instrument(skip(self, connections, sql), fields(sql_preview = %sql_preview(sql)))]
    pub(crate) async fn run_plan(
        &self,
        connections: &mut ConnectionManager,
        sql: &str,
        database: Option<&str>,
    ) -> Result<String, QueryError> {
        let (connection, _) = self.prepare(connections, sql, database).await?;

        self.bounded(&connection, connection.execute(SHOWPLAN_ON_SQL))
            .await?;
        let result = self.bounded(&connection, connection.query(sql)).await;

        if !connection.is_closed()
            && let Err(e) = self
                .bounded(&connection, connection.execute(SHOWPLAN_OFF_SQL))
                .await
        {
            tracing::warn!(error = %e, "failed to switch plan output off");
        }

        let result = result.inspect_err(|e| tracing::error!(error = %e, "failed to get execution plan"))?;
        match result.rows.first().and_then(|row| row.get(0)) {
            Some(Value::String(plan)) => {
                tracing::debug!(plan_len = plan.len(), "execution plan retrieved");
                Ok(plan.clone())
            }
            _ => Err(QueryError::Unexpected(
                "server returned no execution plan".to_string(),
            )),
        }
    }

    /// Open the session, validate, and move into `database`
    async fn prepare(
        &self,
        connections: &mut ConnectionManager,
        sql: &str,
        database: Option<&str>,
    ) -> Result<(Arc<dyn Connection>, ValidatedQuery), QueryError> {
        let connection = connections.ensure_open().await?;
        let validated = self.validator.validate(sql)?;
        self.switch_database(connections, &connection, database)
            .await?;
        Ok((connection, validated))
    }

    /// Switch the session to `database` when it differs from the sticky context
    async fn switch_database(
        &self,
        connections: &mut ConnectionManager,
        connection: &Arc<dyn Connection>,
        database: Option<&str>,
    ) -> Result<(), QueryError> {
        let Some(target) = database.filter(|db| !db.trim().is_empty()) else {
            return Ok(());
        };

        let already_there = connections
            .current_database()
            .is_some_and(|current| current.eq_ignore_ascii_case(target));
        if already_there {
            return Ok(());
        }

        let statement = ConnectionManager::use_statement(target);
        self.bounded(connection, connection.execute(&statement))
            .await
            .inspect_err(|e| tracing::error!(database = target, error = %e, "failed to switch database"))?;

        tracing::debug!(database = target, "switched database");
        connections.set_current_database(target);
        Ok(())
    }

    /// Re-read the session database after a batch that contains `USE`
    ///
    /// Runs whether or not the batch succeeded: a `USE` ahead of a failing
    /// statement has still moved the session. Skipped once the session is
    /// closed, since a reopen lands in the remembered database anyway.
    async fn follow_batch_database(
        &self,
        connections: &mut ConnectionManager,
        connection: &Arc<dyn Connection>,
        validated: &ValidatedQuery,
    ) {
        if !validated.changes_database || connection.is_closed() {
            return;
        }

        match self
            .bounded(connection, connection.query(CURRENT_DATABASE_SQL))
            .await
        {
            Ok(result) => {
                if let Some(Value::String(name)) = result.rows.first().and_then(|r| r.get(0)) {
                    tracing::debug!(database = %name, "session database changed by batch");
                    connections.set_current_database(name.clone());
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not read current database"),
        }
    }

    /// Apply the client-side timeout to a driver call
    ///
    /// A timed-out session is closed, since the server may still be sending
    /// results for it; the manager reopens it on next use.
    async fn bounded<T>(
        &self,
        connection: &Arc<dyn Connection>,
        call: impl Future<Output = sqladmin_core::Result<T>>,
    ) -> sqladmin_core::Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "query timed out");
                if let Err(e) = connection.close().await {
                    tracing::warn!(error = %e, "failed to close timed out connection");
                }
                Err(SqlAdminError::Timeout(format!(
                    "query timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}
