//! SQL-to-AST facade.
//!
//! Wraps [`sqlparser`] with two error policies and a shared statement cache:
//!
//! - [`ParseMode::FailFast`] turns unparseable SQL into
//!   [`GuardError::Parse`](crate::error::GuardError::Parse)
//! - [`ParseMode::Lenient`] logs the failure and yields `None`
//!
//! The extraction helpers in [`extract`] are pure functions over a parsed
//! [`Statement`](sqlparser::ast::Statement) and never fail.
//!
//! ```
//! use sql_guard::parser::{ParseMode, SqlDialect, SqlParserFacade, extract_table_name};
//!
//! let facade = SqlParserFacade::new(ParseMode::FailFast, 100, SqlDialect::MySql);
//! let ast = facade.parse_cached("SELECT * FROM `users` WHERE id = 1").unwrap().unwrap();
//! assert_eq!(extract_table_name(&ast).as_deref(), Some("users"));
//!
//! let again = facade.parse_cached("  select * from `users` where id = 1 ").unwrap().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&ast, &again));
//! assert_eq!(facade.cache_statistics().hits, 1);
//! ```

pub mod extract;

use std::sync::Arc;

pub use extract::{
    extract_all_tables, extract_fields, extract_functions, extract_limit, extract_offset,
    extract_table_name, extract_where, has_order_by, has_pagination_clause, plain_select,
    strip_delimiters
};
use serde::Deserialize;
use sqlparser::{
    dialect::{Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect},
    parser::Parser
};
use tracing::{debug, warn};

use crate::{
    cache::{CacheStats, DEFAULT_CACHE_SIZE, StatementCache},
    context::Ast,
    error::{GuardError, GuardResult, parse_error, sql_snippet}
};

/// SQL dialect for parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SqlDialect {
    #[default]
    Generic,
    MySql,
    PostgreSql,
    SQLite,
    MsSql
}

impl SqlDialect {
    /// Convert to sqlparser dialect for parsing
    pub fn into_parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::MySql => Box::new(MySqlDialect {}),
            Self::PostgreSql => Box::new(PostgreSqlDialect {}),
            Self::SQLite => Box::new(SQLiteDialect {}),
            Self::MsSql => Box::new(MsSqlDialect {})
        }
    }
}

/// Policy applied to SQL that fails to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Propagate the parse error to the caller
    #[default]
    FailFast,
    /// Log the parse error and continue without an AST
    Lenient
}

/// Parser front end with statement cache.
pub struct SqlParserFacade {
    mode:    ParseMode,
    dialect: SqlDialect,
    cache:   StatementCache
}

impl Default for SqlParserFacade {
    fn default() -> Self {
        Self::new(ParseMode::FailFast, DEFAULT_CACHE_SIZE, SqlDialect::Generic)
    }
}

impl SqlParserFacade {
    pub fn new(mode: ParseMode, cache_size: usize, dialect: SqlDialect) -> Self {
        Self {
            mode,
            dialect,
            cache: StatementCache::new(cache_size)
        }
    }

    pub fn fail_fast() -> Self {
        Self::default()
    }

    pub fn lenient() -> Self {
        Self::new(ParseMode::Lenient, DEFAULT_CACHE_SIZE, SqlDialect::Generic)
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    pub fn is_lenient(&self) -> bool {
        self.mode == ParseMode::Lenient
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Parse `sql`, applying the configured [`ParseMode`] on failure.
    ///
    /// Returns `Ok(None)` only in lenient mode.
    pub fn parse(&self, sql: &str) -> GuardResult<Option<Ast>> {
        self.apply_mode(sql, self.try_parse(sql))
    }

    /// Parse `sql` regardless of mode.
    ///
    /// When the text holds several statements the first one is returned.
    pub fn try_parse(&self, sql: &str) -> GuardResult<Ast> {
        if sql.trim().is_empty() {
            return Err(parse_error(sql, "SQL cannot be empty or whitespace-only"));
        }
        let dialect = self.dialect.into_parser_dialect();
        let statements =
            Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| parse_error(sql, e.to_string()))?;
        if statements.len() > 1 {
            debug!(
                count = statements.len(),
                sql = %sql_snippet(sql),
                "multiple statements parsed, validating the first"
            );
        }
        statements
            .into_iter()
            .next()
            .map(Arc::new)
            .ok_or_else(|| parse_error(sql, "no SQL statement found"))
    }

    /// Parse through the statement cache.
    ///
    /// The key is the trimmed, lowercased SQL; identical keys share one
    /// [`Ast`] instance.
    pub fn parse_cached(&self, sql: &str) -> GuardResult<Option<Ast>> {
        let parsed = self.cache.get_or_try_insert(sql, || {
            debug!(sql = %sql_snippet(sql), "statement cache miss");
            self.try_parse(sql)
        });
        self.apply_mode(sql, parsed)
    }

    pub fn cache_statistics(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn apply_mode(&self, sql: &str, parsed: GuardResult<Ast>) -> GuardResult<Option<Ast>> {
        match (parsed, self.mode) {
            (Ok(ast), _) => Ok(Some(ast)),
            (Err(err), ParseMode::FailFast) => Err(err),
            (Err(err @ GuardError::Parse { .. }), ParseMode::Lenient) => {
                warn!(sql = %sql_snippet(sql), error = %err, "parse failed in lenient mode");
                Ok(None)
            }
            (Err(err), ParseMode::Lenient) => Err(err)
        }
    }
}
