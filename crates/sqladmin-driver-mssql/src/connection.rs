//! SQL Server session implementation using tiberius

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use sqladmin_core::{
    ColumnMeta, Connection, QueryResult, Result, Row, SqlAdminError, StatementResult, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::{Client, ColumnData, Config, QueryItem, Row as TiberiusRow, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for SqlAdminError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::InvalidAddress(msg) => SqlAdminError::Configuration(msg),
            MssqlConnectionError::Tiberius(e) => driver_error(e),
            MssqlConnectionError::ConnectionClosed => {
                SqlAdminError::Connection("connection is closed".to_string())
            }
            other => SqlAdminError::Connection(other.to_string()),
        }
    }
}

/// Map a tiberius error to the core error, keeping server messages as query errors
fn driver_error(err: tiberius::error::Error) -> SqlAdminError {
    match err {
        tiberius::error::Error::Server(token) => SqlAdminError::Query(token.message().to_string()),
        tiberius::error::Error::Io { .. } => SqlAdminError::Connection(err.to_string()),
        other => SqlAdminError::Driver(other.to_string()),
    }
}

/// SQL Server session using tiberius
pub struct MssqlConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
    closed: AtomicBool,
    server: String,
    database: Option<String>,
}

impl MssqlConnection {
    /// Open a session from a prepared tiberius config
    ///
    /// When `named_instance` is set the port is resolved through the SQL
    /// Browser service instead of dialing the configured port directly.
    #[tracing::instrument(skip(config))]
    pub async fn open(
        config: Config,
        server: &str,
        database: Option<&str>,
        named_instance: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to SQL Server");

        let client = match Self::handshake(config.clone(), named_instance).await {
            Ok(client) => client,
            // Azure SQL gateways answer the first login with a redirect
            Err(MssqlConnectionError::Tiberius(tiberius::error::Error::Routing {
                host,
                port,
            })) => {
                tracing::debug!(host = %host, port, "following server redirect");
                let mut redirected = config;
                redirected.host(&host);
                redirected.port(port);
                Self::handshake(redirected, false).await?
            }
            Err(e) => return Err(e),
        };

        tracing::debug!("successfully connected to SQL Server");

        Ok(Self {
            client: Mutex::new(client),
            closed: AtomicBool::new(false),
            server: server.to_string(),
            database: database.map(String::from),
        })
    }

    async fn handshake(
        config: Config,
        named_instance: bool,
    ) -> std::result::Result<Client<Compat<TcpStream>>, MssqlConnectionError> {
        let tcp = if named_instance {
            TcpStream::connect_named(&config)
                .await
                .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?
        } else {
            TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?
        };

        tcp.set_nodelay(true)?;

        match Client::connect(config, tcp.compat_write()).await {
            Ok(client) => Ok(client),
            Err(e @ tiberius::error::Error::Routing { .. }) => Err(e.into()),
            Err(tiberius::error::Error::Server(token)) if token.code() == 18456 => Err(
                MssqlConnectionError::AuthenticationFailed(token.message().to_string()),
            ),
            Err(e) => Err(MssqlConnectionError::ConnectionFailed(e.to_string())),
        }
    }

    /// Database the session was opened against
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }

    /// Record a transport failure so the manager reopens on next use
    fn note_failure(&self, err: &tiberius::error::Error) {
        if matches!(err, tiberius::error::Error::Io { .. }) {
            tracing::warn!(server = %self.server, error = %err, "connection lost");
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();

        let mut client = self.client.lock().await;

        match client.execute(sql, &[]).await {
            Ok(exec_result) => {
                let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
                tracing::debug!(
                    affected_rows,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "execute completed"
                );

                Ok(StatementResult { affected_rows })
            }
            Err(e) => {
                tracing::error!(error = %e, "execute failed");
                self.note_failure(&e);
                Err(driver_error(e))
            }
        }
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();

        let mut client = self.client.lock().await;

        let mut stream = match client.query(sql, &[]).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                self.note_failure(&e);
                return Err(driver_error(e));
            }
        };

        // Later result sets are drained so the session stays usable, but only
        // the first one is materialised.
        let mut columns: Vec<ColumnMeta> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        loop {
            let item = match stream.try_next().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "query failed while reading results");
                    self.note_failure(&e);
                    return Err(driver_error(e));
                }
            };

            match item {
                QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                    columns = meta
                        .columns()
                        .iter()
                        .enumerate()
                        .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                        .collect();
                }
                QueryItem::Row(row) if row.result_index() == 0 => {
                    rows.push(Row::new(tiberius_row_to_values(row)?));
                }
                _ => {}
            }
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            duration_ms = execution_time_ms,
            "query completed"
        );

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // The TCP stream is released with the client when the session drops
        tracing::debug!(server = %self.server, "SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta::new(col.name(), format!("{:?}", col.column_type()), ordinal)
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

fn epoch(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
        MssqlConnectionError::TypeConversion(format!("no calendar date for year {}", year)).into()
    })
}

fn days_after(year: i32, days: i64) -> Result<NaiveDate> {
    epoch(year)?
        .checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| {
            MssqlConnectionError::TypeConversion(format!("date out of range: {} days", days)).into()
        })
}

/// Time of day from a count of `10^-scale` second increments since midnight
pub(crate) fn time_from_increments(increments: u64, scale: u8) -> NaiveTime {
    let nanos = increments.saturating_mul(10u64.pow(9u32.saturating_sub(scale as u32)));
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
    .unwrap_or_default()
}

/// Convert tiberius ColumnData to a Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    match col_data {
        ColumnData::Bit(None) => Ok(Value::Null),
        ColumnData::Bit(Some(v)) => Ok(Value::Bool(v)),
        ColumnData::U8(None) => Ok(Value::Null),
        ColumnData::U8(Some(v)) => Ok(Value::Int16(v as i16)),
        ColumnData::I16(None) => Ok(Value::Null),
        ColumnData::I16(Some(v)) => Ok(Value::Int16(v)),
        ColumnData::I32(None) => Ok(Value::Null),
        ColumnData::I32(Some(v)) => Ok(Value::Int32(v)),
        ColumnData::I64(None) => Ok(Value::Null),
        ColumnData::I64(Some(v)) => Ok(Value::Int64(v)),
        ColumnData::F32(None) => Ok(Value::Null),
        ColumnData::F32(Some(v)) => Ok(Value::Float32(v)),
        ColumnData::F64(None) => Ok(Value::Null),
        ColumnData::F64(Some(v)) => Ok(Value::Float64(v)),
        ColumnData::String(None) => Ok(Value::Null),
        ColumnData::String(Some(v)) => Ok(Value::String(v.into_owned())),
        ColumnData::Guid(None) => Ok(Value::Null),
        ColumnData::Guid(Some(v)) => Ok(Value::Uuid(v)),
        ColumnData::Binary(None) => Ok(Value::Null),
        ColumnData::Binary(Some(v)) => Ok(Value::Bytes(v.into_owned())),
        ColumnData::Numeric(None) => Ok(Value::Null),
        ColumnData::Numeric(Some(v)) => Ok(Value::Decimal(v.to_string())),
        ColumnData::DateTime(None) => Ok(Value::Null),
        ColumnData::DateTime(Some(v)) => {
            // seconds_fragments are 1/300 of a second
            let fragments = v.seconds_fragments() as u64;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (fragments / 300) as u32,
                ((fragments % 300) * 10_000_000 / 3) as u32,
            )
            .unwrap_or_default();
            let date = days_after(1900, v.days() as i64)?;
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::SmallDateTime(None) => Ok(Value::Null),
        ColumnData::SmallDateTime(Some(v)) => {
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (v.seconds_fragments() as u32) * 60,
                0,
            )
            .unwrap_or_default();
            let date = days_after(1900, v.days() as i64)?;
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTime2(None) => Ok(Value::Null),
        ColumnData::DateTime2(Some(v)) => {
            let date = days_after(1, v.date().days() as i64)?;
            let time = time_from_increments(v.time().increments(), v.time().scale());
            Ok(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTimeOffset(None) => Ok(Value::Null),
        ColumnData::DateTimeOffset(Some(v)) => {
            // The datetime2 part of a datetimeoffset is stored in UTC
            let dt2 = v.datetime2();
            let date = days_after(1, dt2.date().days() as i64)?;
            let time = time_from_increments(dt2.time().increments(), dt2.time().scale());
            Ok(Value::DateTimeUtc(NaiveDateTime::new(date, time).and_utc()))
        }
        ColumnData::Date(None) => Ok(Value::Null),
        ColumnData::Date(Some(v)) => Ok(Value::Date(days_after(1, v.days() as i64)?)),
        ColumnData::Time(None) => Ok(Value::Null),
        ColumnData::Time(Some(v)) => {
            Ok(Value::Time(time_from_increments(v.increments(), v.scale())))
        }
        ColumnData::Xml(None) => Ok(Value::Null),
        ColumnData::Xml(Some(v)) => Ok(Value::String(v.into_owned().into_string())),
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
