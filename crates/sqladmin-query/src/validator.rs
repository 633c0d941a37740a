//! Query validation against the T-SQL grammar and a denylist

use sqlparser::ast::Statement;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;

use crate::Rejection;
use crate::sql_preview;

/// Phrases never executed unattended, matched against normalised query text
pub const DENYLIST: &[&str] = &[
    "drop database",
    "drop login",
    "drop user",
    "xp_cmdshell",
    "sp_configure",
];

/// What validation learned about an accepted query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub statement_count: usize,
    /// The batch contains a `USE` statement and may move the session
    pub changes_database: bool,
}

/// Screens query text before it reaches the server
///
/// Validation is a pure function of the text: no I/O and no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValidator;

impl QueryValidator {
    pub fn new() -> Self {
        Self
    }

    /// Accept or reject a query
    ///
    /// The denylist is checked first, so a blocked phrase is reported as such
    /// even when the statement is outside the parser's grammar.
    pub fn validate(&self, sql: &str) -> Result<ValidatedQuery, Rejection> {
        if let Some(phrase) = Self::denylisted_phrase(sql) {
            tracing::warn!(
                sql_preview = %sql_preview(sql),
                phrase,
                "query rejected: denylisted phrase"
            );
            return Err(Rejection::Denylisted(phrase.to_string()));
        }

        let statements = Self::parse(sql).inspect_err(|rejection| {
            tracing::warn!(
                sql_preview = %sql_preview(sql),
                reason = %rejection,
                "query rejected"
            );
        })?;

        let changes_database = statements
            .iter()
            .any(|stmt| matches!(stmt, Statement::Use { .. }));

        tracing::trace!(statements = statements.len(), "query accepted");
        Ok(ValidatedQuery {
            statement_count: statements.len(),
            changes_database,
        })
    }

    /// First denylisted phrase contained in the query, if any
    pub fn denylisted_phrase(sql: &str) -> Option<&'static str> {
        let normalized = normalize(sql);
        DENYLIST
            .iter()
            .copied()
            .find(|phrase| normalized.contains(phrase))
    }

    fn parse(sql: &str) -> Result<Vec<Statement>, Rejection> {
        let dialect = MsSqlDialect {};
        let parsed = std::panic::catch_unwind(|| Parser::parse_sql(&dialect, sql));

        match parsed {
            Ok(Ok(statements)) if statements.is_empty() => {
                Err(Rejection::SyntaxInvalid(vec!["no statements found".to_string()]))
            }
            Ok(Ok(statements)) => Ok(statements),
            Ok(Err(e)) => Err(Rejection::SyntaxInvalid(vec![e.to_string()])),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "parser failed".to_string());
                tracing::error!(detail = %detail, "SQL parser panicked");
                Err(Rejection::ValidationFailed(detail))
            }
        }
    }
}

/// Lowercase and collapse every whitespace run to a single space
pub(crate) fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
