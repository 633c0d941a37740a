//! Request-queue front for the execution core
//!
//! The core runs on a single worker task. Callers hold cheap, cloneable
//! handles that enqueue requests and await replies, and read the connection
//! state from a snapshot the worker republishes after every request. Nothing
//! outside the worker ever touches the session.

use sqladmin_connection::{ConnectRequest, ConnectionError, ConnectionSnapshot};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use sqladmin_core::Value;
use tokio::task::JoinHandle;

use crate::{
    ExecutionOutcome, ExecutionRequest, HistoryEntry, QueryError, QueryExecutionCore,
    QueryTemplate,
};

const QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The worker has stopped and no longer accepts requests
    #[error("execution core has shut down")]
    Closed,
}

enum Request {
    Connect {
        request: ConnectRequest,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Execute {
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<ExecutionOutcome, QueryError>>,
    },
    ExecuteNonQuery {
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<u64, QueryError>>,
    },
    ExecuteScalar {
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<Value, QueryError>>,
    },
    QueryPlan {
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<String, QueryError>>,
    },
    History {
        search: Option<String>,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    ClearHistory {
        reply: oneshot::Sender<()>,
    },
    ListDatabases {
        reply: oneshot::Sender<Result<Vec<String>, QueryError>>,
    },
    Templates {
        reply: oneshot::Sender<Vec<QueryTemplate>>,
    },
    SaveTemplate {
        template: QueryTemplate,
        reply: oneshot::Sender<()>,
    },
    RemoveTemplate {
        name: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to an execution core running on its own task
///
/// Dropping every handle stops the worker, which closes the session.
#[derive(Clone)]
pub struct CoreHandle {
    requests: mpsc::Sender<Request>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
}

impl CoreHandle {
    /// Move the core onto a worker task
    pub fn spawn(core: QueryExecutionCore) -> (Self, JoinHandle<()>) {
        let (requests, queue) = mpsc::channel(QUEUE_DEPTH);
        let (publisher, snapshot) = watch::channel(core.snapshot());
        let worker = tokio::spawn(run_worker(core, queue, publisher));
        (Self { requests, snapshot }, worker)
    }

    /// Latest published connection state
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified whenever the connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    pub async fn connect(&self, request: ConnectRequest) -> Result<(), HandleError> {
        Ok(self
            .call(|reply| Request::Connect { request, reply })
            .await??)
    }

    pub async fn disconnect(&self) -> Result<(), HandleError> {
        self.call(|reply| Request::Disconnect { reply }).await
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, HandleError> {
        Ok(self
            .call(|reply| Request::Execute { request, reply })
            .await??)
    }

    pub async fn execute_non_query(&self, request: ExecutionRequest) -> Result<u64, HandleError> {
        Ok(self
            .call(|reply| Request::ExecuteNonQuery { request, reply })
            .await??)
    }

    pub async fn execute_scalar(&self, request: ExecutionRequest) -> Result<Value, HandleError> {
        Ok(self
            .call(|reply| Request::ExecuteScalar { request, reply })
            .await??)
    }

    /// Showplan XML for a query, which is compiled but not run
    pub async fn query_plan(&self, request: ExecutionRequest) -> Result<String, HandleError> {
        Ok(self
            .call(|reply| Request::QueryPlan { request, reply })
            .await??)
    }

    /// History newest first, optionally filtered by query text
    pub async fn history(&self, search: Option<String>) -> Result<Vec<HistoryEntry>, HandleError> {
        self.call(|reply| Request::History { search, reply }).await
    }

    pub async fn clear_history(&self) -> Result<(), HandleError> {
        self.call(|reply| Request::ClearHistory { reply }).await
    }

    pub async fn list_databases(&self) -> Result<Vec<String>, HandleError> {
        Ok(self.call(|reply| Request::ListDatabases { reply }).await??)
    }

    pub async fn templates(&self) -> Result<Vec<QueryTemplate>, HandleError> {
        self.call(|reply| Request::Templates { reply }).await
    }

    pub async fn save_template(&self, template: QueryTemplate) -> Result<(), HandleError> {
        self.call(|reply| Request::SaveTemplate { template, reply })
            .await
    }

    /// Returns whether a template with that name existed
    pub async fn remove_template(&self, name: impl Into<String>) -> Result<bool, HandleError> {
        let name = name.into();
        self.call(|reply| Request::RemoveTemplate { name, reply })
            .await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, HandleError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| HandleError::Closed)?;
        response.await.map_err(|_| HandleError::Closed)
    }
}

impl std::fmt::Debug for CoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreHandle")
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}

async fn run_worker(
    mut core: QueryExecutionCore,
    mut queue: mpsc::Receiver<Request>,
    publisher: watch::Sender<ConnectionSnapshot>,
) {
    tracing::debug!("execution core worker started");

    // The snapshot is published before replying, so a caller that awaited a
    // reply always observes the state it produced. Reply send failures mean
    // the caller stopped waiting; the work is done either way.
    while let Some(request) = queue.recv().await {
        match request {
            Request::Connect { request, reply } => {
                let result = core.connect(request).await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::Disconnect { reply } => {
                core.disconnect().await;
                publish(&core, &publisher);
                let _ = reply.send(());
            }
            Request::Execute { request, reply } => {
                let result = core.execute(request).await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::ExecuteNonQuery { request, reply } => {
                let result = core.execute_non_query(request).await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::ExecuteScalar { request, reply } => {
                let result = core.execute_scalar(request).await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::QueryPlan { request, reply } => {
                let result = core.query_plan(request).await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::History { search, reply } => {
                let entries = match search {
                    Some(text) => core.search_history(&text),
                    None => core.history(),
                };
                let _ = reply.send(entries);
            }
            Request::ClearHistory { reply } => {
                core.clear_history().await;
                let _ = reply.send(());
            }
            Request::ListDatabases { reply } => {
                let result = core.list_databases().await;
                publish(&core, &publisher);
                let _ = reply.send(result);
            }
            Request::Templates { reply } => {
                let _ = reply.send(core.templates());
            }
            Request::SaveTemplate { template, reply } => {
                core.save_template(template).await;
                let _ = reply.send(());
            }
            Request::RemoveTemplate { name, reply } => {
                let removed = core.remove_template(&name).await;
                let _ = reply.send(removed);
            }
        }
    }

    core.shutdown().await;
    tracing::debug!("execution core worker stopped");
}

fn publish(core: &QueryExecutionCore, publisher: &watch::Sender<ConnectionSnapshot>) {
    publisher.send_if_modified(|current| {
        let latest = core.snapshot();
        if *current == latest {
            return false;
        }
        *current = latest;
        true
    });
}
