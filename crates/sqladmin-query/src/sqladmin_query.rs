//! SQL Admin Query - validation, execution and history
//!
//! This crate provides the query execution core: the validator that screens
//! query text before it reaches the server, the executor that runs it with a
//! bounded duration, the persisted history log and saved query templates,
//! and the request-queue handle that front ends talk to.

mod error;
mod execution_core;
pub mod export;
mod executor;
mod handle;
mod history;
mod json_file;
mod templates;
mod validator;

#[cfg(test)]
mod export_tests;
#[cfg(test)]
mod history_tests;
#[cfg(test)]
mod templates_tests;
#[cfg(test)]
mod validator_tests;

pub use error::{CoreResult, ExportError, HistoryError, PersistenceError, QueryError, Rejection};
pub use execution_core::{ExecutionOutcome, ExecutionRequest, QueryExecutionCore, TableResult};
pub use executor::{QueryExecutor, QueryOutcome};
pub use export::{CsvExporter, ResultExporter};
pub use handle::{CoreHandle, HandleError};
pub use history::{HistoryEntry, HistoryStore};
pub use templates::{QueryTemplate, TemplateStore, default_templates};
pub use validator::{DENYLIST, QueryValidator, ValidatedQuery};

/// Shorten query text for log fields
pub(crate) fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}
