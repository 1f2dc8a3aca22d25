//! Immutable per-call execution context.
//!
//! An interceptor builds one [`ExecutionContext`] per intercepted statement
//! and hands it to the validator. Parsing never mutates a context: a parsed
//! variant is a new value produced by [`ExecutionContext::with_statement`].
//!
//! ```
//! use sql_guard::context::{ExecutionContext, RowBounds, SqlCommandType};
//!
//! let ctx = ExecutionContext::builder("SELECT * FROM users WHERE id = ?", SqlCommandType::Select)
//!     .statement_id("UserMapper.selectById")
//!     .row_bounds(RowBounds::new(0, 20))
//!     .build()
//!     .unwrap();
//!
//! assert!(ctx.statement().is_none());
//! assert_eq!(ctx.statement_id(), Some("UserMapper.selectById"));
//! ```

use std::{fmt, sync::Arc};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;

use crate::error::{GuardResult, config_error};

/// Parsed statement shared between the AST cache and contexts.
pub type Ast = Arc<Statement>;

/// Bound parameters, in binding order.
pub type Params = IndexMap<CompactString, serde_json::Value>;

/// SQL command kind of the intercepted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum SqlCommandType {
    Select,
    Update,
    Delete,
    Insert,
    Unknown
}

impl SqlCommandType {
    /// Infer the command kind from the leading keyword of raw SQL.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" => Self::Select,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "INSERT" | "REPLACE" => Self::Insert,
            _ => Self::Unknown
        }
    }

    /// Command kind of a parsed statement.
    pub fn from_statement(statement: &Statement) -> Self {
        match statement {
            Statement::Query(_) => Self::Select,
            Statement::Update(_) => Self::Update,
            Statement::Delete(_) => Self::Delete,
            Statement::Insert(_) => Self::Insert,
            _ => Self::Unknown
        }
    }
}

impl fmt::Display for SqlCommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Insert => write!(f, "INSERT"),
            Self::Unknown => write!(f, "UNKNOWN")
        }
    }
}

/// Layer the statement was intercepted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionLayer {
    /// ORM / mapper plugin
    Orm,
    /// Driver or connection-pool proxy
    Jdbc,
    #[default]
    Unknown
}

/// Offset/limit pair supplied out of band by the data-access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: u64,
    pub limit:  u64
}

impl RowBounds {
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit
        }
    }
}

/// Everything known about one intercepted statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    sql:                Arc<str>,
    command_type:       SqlCommandType,
    statement:          Option<Ast>,
    execution_layer:    ExecutionLayer,
    statement_id:       Option<CompactString>,
    params:             Option<Arc<Params>>,
    datasource:         Option<CompactString>,
    row_bounds:         Option<RowBounds>,
    has_page_parameter: bool
}

impl ExecutionContext {
    pub fn builder(sql: impl Into<String>, command_type: SqlCommandType) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            sql: sql.into(),
            command_type,
            statement: None,
            execution_layer: ExecutionLayer::default(),
            statement_id: None,
            params: None,
            datasource: None,
            row_bounds: None,
            has_page_parameter: false
        }
    }

    /// Shorthand for a context whose command kind is inferred from the SQL.
    pub fn from_sql(sql: impl Into<String>) -> GuardResult<Self> {
        let sql = sql.into();
        let command_type = SqlCommandType::from_sql(&sql);
        Self::builder(sql, command_type).build()
    }

    /// New context carrying `statement`; `self` is left untouched.
    pub fn with_statement(&self, statement: Ast) -> Self {
        Self {
            statement: Some(statement),
            ..self.clone()
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    pub fn statement(&self) -> Option<&Statement> {
        self.statement.as_deref()
    }

    pub fn ast(&self) -> Option<&Ast> {
        self.statement.as_ref()
    }

    pub fn execution_layer(&self) -> ExecutionLayer {
        self.execution_layer
    }

    pub fn statement_id(&self) -> Option<&str> {
        self.statement_id.as_deref()
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_deref()
    }

    pub fn datasource(&self) -> Option<&str> {
        self.datasource.as_deref()
    }

    pub fn row_bounds(&self) -> Option<RowBounds> {
        self.row_bounds
    }

    /// True when a pagination object travels with the bound parameters.
    pub fn has_page_parameter(&self) -> bool {
        self.has_page_parameter
    }

    /// Label used in log lines.
    pub(crate) fn log_label(&self) -> &str {
        self.statement_id().unwrap_or("<anonymous>")
    }
}

/// Builder for [`ExecutionContext`].
#[derive(Debug, Clone)]
pub struct ExecutionContextBuilder {
    sql:                String,
    command_type:       SqlCommandType,
    statement:          Option<Ast>,
    execution_layer:    ExecutionLayer,
    statement_id:       Option<CompactString>,
    params:             Option<Params>,
    datasource:         Option<CompactString>,
    row_bounds:         Option<RowBounds>,
    has_page_parameter: bool
}

impl ExecutionContextBuilder {
    pub fn statement(mut self, statement: Ast) -> Self {
        self.statement = Some(statement);
        self
    }

    pub fn execution_layer(mut self, layer: ExecutionLayer) -> Self {
        self.execution_layer = layer;
        self
    }

    pub fn statement_id(mut self, id: impl Into<CompactString>) -> Self {
        self.statement_id = Some(id.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(Params::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn datasource(mut self, datasource: impl Into<CompactString>) -> Self {
        self.datasource = Some(datasource.into());
        self
    }

    pub fn row_bounds(mut self, row_bounds: RowBounds) -> Self {
        self.row_bounds = Some(row_bounds);
        self
    }

    pub fn page_parameter(mut self, present: bool) -> Self {
        self.has_page_parameter = present;
        self
    }

    /// Finish the context; empty or whitespace-only SQL is rejected.
    pub fn build(self) -> GuardResult<ExecutionContext> {
        if self.sql.trim().is_empty() {
            return Err(config_error("sql cannot be empty or whitespace-only"));
        }
        Ok(ExecutionContext {
            sql:                self.sql.into(),
            command_type:       self.command_type,
            statement:          self.statement,
            execution_layer:    self.execution_layer,
            statement_id:       self.statement_id,
            params:             self.params.map(Arc::new),
            datasource:         self.datasource,
            row_bounds:         self.row_bounds,
            has_page_parameter: self.has_page_parameter
        })
    }
}
