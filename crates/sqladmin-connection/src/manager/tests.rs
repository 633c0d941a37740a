//! Tests for the connection manager

use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sqladmin_core::{ColumnMeta, QueryResult, Result, Row, SqlAdminError, StatementResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct StubConnection {
    closed: AtomicBool,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Connection for StubConnection {
    fn driver_name(&self) -> &str {
        "stub"
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.queries.lock().push(sql.to_string());
        Ok(QueryResult::from_parts(
            vec![ColumnMeta::new("name", "NVarchar", 0)],
            vec![
                Row::new(vec![Value::String("inventory".into())]),
                Row::new(vec![Value::String("sales".into())]),
            ],
        ))
    }

    async fn execute(&self, _sql: &str) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out stub sessions and records every target it was asked to open
#[derive(Default)]
struct StubFactory {
    targets: Mutex<Vec<ConnectionTarget>>,
    opened: Mutex<Vec<Arc<StubConnection>>>,
    fail_after: Option<usize>,
    calls: AtomicUsize,
}

impl StubFactory {
    fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Default::default()
        }
    }

    fn last_opened(&self) -> Arc<StubConnection> {
        self.opened.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl ConnectionFactory for StubFactory {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn Connection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push(target.clone());
        if self.fail_after.is_some_and(|n| call >= n) {
            return Err(SqlAdminError::Connection("server unreachable".into()));
        }
        let connection = Arc::new(StubConnection::default());
        self.opened.lock().push(connection.clone());
        Ok(connection)
    }
}

fn manager_with(factory: Arc<StubFactory>) -> ConnectionManager {
    ConnectionManager::new(factory, &CoreSettings::default())
}

fn request() -> ConnectRequest {
    ConnectRequest::new(
        "db01",
        AuthMode::SqlLogin {
            user: "admin".into(),
            password: "secret".into(),
        },
    )
    .with_database("sales")
}

#[tokio::test]
async fn test_ensure_open_without_connect_is_not_connected() {
    let mut manager = manager_with(Arc::new(StubFactory::default()));
    let err = manager.ensure_open().await.err().unwrap();
    assert!(matches!(err, ConnectionError::NotConnected));
}

#[tokio::test]
async fn test_connect_then_disconnect_then_ensure_open() {
    let factory = Arc::new(StubFactory::default());
    let mut manager = manager_with(factory.clone());

    manager.connect(request()).await.unwrap();
    assert!(manager.snapshot().is_connected());

    manager.disconnect().await;
    assert!(factory.last_opened().is_closed());

    let err = manager.ensure_open().await.err().unwrap();
    assert!(matches!(err, ConnectionError::NotConnected));
    assert_eq!(manager.snapshot(), ConnectionSnapshot::disconnected());
}

#[tokio::test]
async fn test_disconnect_when_disconnected_is_noop() {
    let mut manager = manager_with(Arc::new(StubFactory::default()));
    manager.disconnect().await;
    manager.disconnect().await;
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_connect_applies_application_identity() {
    let factory = Arc::new(StubFactory::default());
    let settings = CoreSettings {
        application_name: "Ops Console".into(),
        trust_server_certificate: false,
        ..Default::default()
    };
    let mut manager = ConnectionManager::new(factory.clone(), &settings);

    manager.connect(request()).await.unwrap();

    let targets = factory.targets.lock();
    assert_eq!(targets[0].application_name, "Ops Console");
    assert!(!targets[0].trust_server_certificate);
    assert_eq!(targets[0].database.as_deref(), Some("sales"));
}

#[tokio::test]
async fn test_reconnect_closes_previous_session() {
    let factory = Arc::new(StubFactory::default());
    let mut manager = manager_with(factory.clone());

    manager.connect(request()).await.unwrap();
    let first = factory.last_opened();
    manager
        .connect(ConnectRequest::new("db02", AuthMode::Integrated))
        .await
        .unwrap();

    assert!(first.is_closed());
    assert_eq!(manager.snapshot().server.as_deref(), Some("db02"));
    assert_eq!(manager.current_database(), None);
}

#[tokio::test]
async fn test_failed_connect_leaves_disconnected() {
    let factory = Arc::new(StubFactory::failing_after(1));
    let mut manager = manager_with(factory.clone());

    manager.connect(request()).await.unwrap();
    let err = manager.connect(request()).await.unwrap_err();

    assert!(matches!(err, ConnectionError::ConnectFailed { .. }));
    assert!(!manager.is_connected());
    assert!(factory.opened.lock()[0].is_closed());
}

#[tokio::test]
async fn test_closed_session_is_reopened_once_with_sticky_database() {
    let factory = Arc::new(StubFactory::default());
    let mut manager = manager_with(factory.clone());

    manager.connect(request()).await.unwrap();
    manager.set_current_database("inventory");
    factory.last_opened().closed.store(true, Ordering::SeqCst);

    let connection = manager.ensure_open().await.unwrap();
    assert!(!connection.is_closed());

    let targets = factory.targets.lock();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[1].database.as_deref(), Some("inventory"));
}

#[tokio::test]
async fn test_failed_reopen_releases_session() {
    let factory = Arc::new(StubFactory::failing_after(1));
    let mut manager = manager_with(factory.clone());

    manager.connect(request()).await.unwrap();
    factory.last_opened().closed.store(true, Ordering::SeqCst);

    let err = manager.ensure_open().await.err().unwrap();
    assert!(matches!(err, ConnectionError::ReopenFailed { .. }));
    assert_eq!(factory.calls.load(Ordering::SeqCst), 2);

    let err = manager.ensure_open().await.err().unwrap();
    assert!(matches!(err, ConnectionError::NotConnected));
}

#[tokio::test]
async fn test_list_databases_reads_first_column() {
    let factory = Arc::new(StubFactory::default());
    let mut manager = manager_with(factory.clone());
    manager.connect(request()).await.unwrap();

    let names = manager.list_databases().await.unwrap();
    assert_eq!(names, vec!["inventory".to_string(), "sales".to_string()]);
    assert_eq!(
        factory.last_opened().queries.lock().as_slice(),
        &[LIST_DATABASES_SQL.to_string()]
    );
}

#[test]
fn test_use_statement_quotes_name() {
    assert_eq!(ConnectionManager::use_statement("sales"), "USE [sales]");
    assert_eq!(ConnectionManager::use_statement("a]b"), "USE [a]]b]");
}

#[test]
fn test_snapshot_serializes() {
    let snapshot = ConnectionSnapshot {
        state: ConnectionState::Connected,
        server: Some("db01".into()),
        database: Some("sales".into()),
    };
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"connected\""));
}
