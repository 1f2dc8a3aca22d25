//! Error taxonomy for the validation engine.
//!
//! Every fallible operation returns [`GuardResult`]. The variants map onto the
//! three failure classes of the engine plus the caller-side block decision:
//!
//! - [`GuardError::Parse`] - SQL could not be turned into an AST
//! - [`GuardError::Configuration`] - invalid checker or engine parameters,
//!   raised while wiring the engine rather than per call
//! - [`GuardError::Checker`] - a checker failed during orchestration
//! - [`GuardError::Blocked`] - a [`ViolationStrategy`] refused the statement
//!
//! [`GuardError`] converts into [`AppError`] for applications that report
//! errors through `masterror`.
//!
//! [`ViolationStrategy`]: crate::strategy::ViolationStrategy

pub use masterror::{AppError, AppResult};
use thiserror::Error;

use crate::rules::RiskLevel;

/// Maximum number of characters of SQL quoted in error messages.
pub const SQL_SNIPPET_MAX_LENGTH: usize = 100;

/// Result alias used throughout the crate.
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors produced by the validation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GuardError {
    /// SQL text could not be parsed.
    #[error("Failed to parse SQL: {snippet} - Reason: {reason}")]
    Parse {
        /// First [`SQL_SNIPPET_MAX_LENGTH`] characters of the statement
        snippet:  String,
        /// Message reported by the parser
        reason:   String,
        /// Position of the failure when the parser reported one
        position: Option<SqlPosition>
    },
    /// Invalid configuration detected at construction time.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// A checker raised an error while inspecting a statement.
    #[error("Checker {checker} failed: {reason}")]
    Checker {
        checker: &'static str,
        reason:  String
    },
    /// The statement was refused by the caller's violation strategy.
    #[error("SQL blocked with risk level {risk_level}: {message}")]
    Blocked {
        risk_level:   RiskLevel,
        statement_id: Option<String>,
        message:      String
    }
}

impl GuardError {
    /// Returns true for [`GuardError::Parse`].
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Line and column reported by the SQL parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlPosition {
    pub line:   usize,
    pub column: usize
}

/// Create parse error for `sql`, quoting a truncated snippet
pub fn parse_error(sql: &str, reason: impl Into<String>) -> GuardError {
    let reason = reason.into();
    GuardError::Parse {
        snippet: sql_snippet(sql),
        position: extract_position(&reason),
        reason
    }
}

/// Create configuration error
pub fn config_error(message: impl Into<String>) -> GuardError {
    GuardError::Configuration(message.into())
}

/// Create checker failure
pub fn checker_error(checker: &'static str, reason: impl Into<String>) -> GuardError {
    GuardError::Checker {
        checker,
        reason: reason.into()
    }
}

/// Truncate SQL to [`SQL_SNIPPET_MAX_LENGTH`] characters for logs and errors.
pub fn sql_snippet(sql: &str) -> String {
    match sql.char_indices().nth(SQL_SNIPPET_MAX_LENGTH) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string()
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match &err {
            GuardError::Parse {
                position: Some(pos),
                ..
            } => AppError::bad_request(format!(
                "Query parse error at line {}, column {}:\n  {}",
                pos.line, pos.column, err
            )),
            GuardError::Parse { .. } => {
                AppError::bad_request(format!("Query parse error:\n  {}", err))
            }
            GuardError::Configuration(_) | GuardError::Blocked { .. } => {
                AppError::bad_request(err.to_string())
            }
            GuardError::Checker { .. } => AppError::internal(err.to_string())
        }
    }
}

fn extract_position(message: &str) -> Option<SqlPosition> {
    // sqlparser format: "... at Line: X, Column: Y" (older releases omit the
    // colon after Column)
    let line_marker = "Line: ";
    let line_start = message.find(line_marker)? + line_marker.len();
    let rest = &message[line_start..];
    let line_end = rest.find(|c: char| !c.is_ascii_digit())?;
    let line = rest[..line_end].parse().ok()?;

    let rest = &rest[line_end..];
    let col_marker = "Column";
    let col_start = rest.find(col_marker)? + col_marker.len();
    let rest = rest[col_start..].trim_start_matches([':', ' ']);
    let col_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let column = rest[..col_end].parse().ok()?;

    Some(SqlPosition {
        line,
        column
    })
}
