//! Statement-shape and injection checkers (`SEC001`-`SEC008`).

use std::fmt;

use compact_str::CompactString;
use regex::{Regex, RegexBuilder};
use sqlparser::ast::{Query, SetExpr, SetOperator, SetQuantifier, Statement};

use super::{
    CheckerCategory, CheckerInfo, RiskLevel, RuleChecker, ValidationResult,
    support::{canonical_name, matches_field_pattern}
};
use crate::{
    config::{
        DangerousFunctionConfig, DdlOperationConfig, DeniedTableConfig, IntoOutfileConfig,
        MultiStatementConfig, ReadOnlyTableConfig, SetOperationConfig, SqlCommentConfig
    },
    context::{ExecutionContext, SqlCommandType},
    error::{GuardResult, config_error},
    parser::{extract_all_tables, extract_functions, extract_table_name}
};

const DDL_OPERATIONS: &[&str] = &["CREATE", "ALTER", "DROP", "TRUNCATE"];

const SET_OPERATIONS: &[&str] = &[
    "UNION",
    "UNION_ALL",
    "INTERSECT",
    "INTERSECT_ALL",
    "EXCEPT",
    "EXCEPT_ALL",
    "MINUS",
    "MINUS_ALL"
];

const PREVIEW_LEN: usize = 50;

/// Several statements in one call (`SELECT ...; DROP TABLE ...`).
pub struct MultiStatementChecker {
    enabled:    bool,
    risk_level: RiskLevel
}

impl MultiStatementChecker {
    pub fn new(config: &MultiStatementConfig) -> Self {
        Self {
            enabled:    config.enabled,
            risk_level: config.risk_level
        }
    }
}

impl RuleChecker for MultiStatementChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC001",
            name:     "Multiple statements",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if has_multiple_statements(ctx.sql()) {
            result.add_violation(
                self.risk_level,
                "SQL contains multiple statements, a common injection vector",
                "Remove the extra statements or make sure user input is escaped"
            );
        }
        Ok(())
    }
}

/// True when a `;` outside quotes and comments is followed by anything other
/// than whitespace, further semicolons or comments.
pub fn has_multiple_statements(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b';' => return !is_trailing(bytes, i + 1),
            _ => i += 1
        }
    }
    false
}

/// Index past the closing quote; a doubled quote is an escaped one.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

fn is_trailing(bytes: &[u8], mut i: usize) -> bool {
    while i < bytes.len() {
        match bytes[i] {
            b';' => i += 1,
            b if b.is_ascii_whitespace() => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            _ => return false
        }
    }
    true
}

/// References to protected tables anywhere in the statement.
pub struct DeniedTableChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    patterns:   Vec<Regex>
}

impl DeniedTableChecker {
    /// Compile the table patterns; `*` matches one or more characters other
    /// than `_`, so `sys_*` denies `sys_user` but not `sys_user_role`.
    pub fn new(config: &DeniedTableConfig) -> GuardResult<Self> {
        let patterns = config
            .tables
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(compile_table_pattern)
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            patterns
        })
    }

    pub fn is_denied(&self, table: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(table))
    }
}

fn compile_table_pattern(pattern: &str) -> GuardResult<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^_]+");
    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
        .map_err(|e| config_error(format!("Invalid denied table pattern '{}': {}", pattern, e)))
}

impl RuleChecker for DeniedTableChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC002",
            name:     "Denied table access",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if self.patterns.is_empty() {
            return Ok(());
        }
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        let denied: Vec<CompactString> = extract_all_tables(statement)
            .into_iter()
            .filter(|t| self.is_denied(t))
            .collect();
        if !denied.is_empty() {
            let names: Vec<&str> = denied.iter().map(CompactString::as_str).collect();
            result.add_violation(
                self.risk_level,
                format!("Access to denied tables [{}]", names.join(", ")),
                "Remove access to denied tables or request access permission"
            );
        }
        Ok(())
    }
}

/// CREATE, ALTER, DROP and TRUNCATE issued through the application.
pub struct DdlOperationChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    allowed:    Vec<&'static str>
}

impl DdlOperationChecker {
    pub fn new(config: &DdlOperationConfig) -> GuardResult<Self> {
        let allowed = config
            .allowed_operations
            .iter()
            .filter(|op| !op.trim().is_empty())
            .map(|op| canonical_name(op, DDL_OPERATIONS, "DDL operation"))
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            allowed
        })
    }
}

/// Operation family and display label of a schema-changing statement.
pub fn ddl_operation(statement: &Statement) -> Option<(&'static str, String)> {
    let (operation, label) = match statement {
        Statement::CreateTable(_) => ("CREATE", "CREATE TABLE".to_string()),
        Statement::CreateIndex(_) => ("CREATE", "CREATE INDEX".to_string()),
        Statement::CreateView(_) => ("CREATE", "CREATE VIEW".to_string()),
        Statement::CreateSchema {
            ..
        } => ("CREATE", "CREATE SCHEMA".to_string()),
        Statement::CreateDatabase {
            ..
        } => ("CREATE", "CREATE DATABASE".to_string()),
        Statement::AlterTable(_) => ("ALTER", "ALTER TABLE".to_string()),
        Statement::AlterIndex {
            ..
        } => ("ALTER", "ALTER INDEX".to_string()),
        Statement::AlterView {
            ..
        } => ("ALTER", "ALTER VIEW".to_string()),
        Statement::RenameTable(_) => ("ALTER", "RENAME TABLE".to_string()),
        Statement::Drop {
            object_type, ..
        } => ("DROP", format!("DROP {}", object_type)),
        Statement::Truncate(_) => ("TRUNCATE", "TRUNCATE TABLE".to_string()),
        _ => return None
    };
    Some((operation, label))
}

impl RuleChecker for DdlOperationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC003",
            name:     "DDL operation",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some((operation, label)) = ctx.statement().and_then(ddl_operation) else {
            return Ok(());
        };
        if !self.allowed.contains(&operation) {
            result.add_violation(
                self.risk_level,
                format!("DDL operation {} executed at runtime", label),
                "Apply schema changes through a migration tool instead of application SQL"
            );
        }
        Ok(())
    }
}

/// Calls to functions that read files, run commands or stall the server.
pub struct DangerousFunctionChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    denied:     Vec<CompactString>
}

impl DangerousFunctionChecker {
    pub fn new(config: &DangerousFunctionConfig) -> Self {
        Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            denied:     config
                .denied_functions
                .iter()
                .map(|f| f.trim().to_lowercase().into())
                .filter(|f: &CompactString| !f.is_empty())
                .collect()
        }
    }
}

impl RuleChecker for DangerousFunctionChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC004",
            name:     "Dangerous function",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        for function in extract_functions(statement) {
            if self.denied.contains(&function) {
                result.add_violation(
                    self.risk_level,
                    format!("Dangerous function {}() called", function),
                    format!("Remove {}() from the statement", function)
                );
            }
        }
        Ok(())
    }
}

/// INSERT, UPDATE and DELETE against tables that must stay unchanged.
pub struct ReadOnlyTableChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    tables:     Vec<CompactString>
}

impl ReadOnlyTableChecker {
    pub fn new(config: &ReadOnlyTableConfig) -> Self {
        Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            tables:     config
                .tables
                .iter()
                .map(|t| CompactString::from(t.trim()))
                .filter(|t| !t.is_empty())
                .collect()
        }
    }

    /// Exact case-insensitive match, or prefix match for `name*` patterns.
    pub fn is_read_only(&self, table: &str) -> bool {
        self.tables.iter().any(|p| matches_field_pattern(table, p))
    }
}

impl RuleChecker for ReadOnlyTableChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC005",
            name:     "Read-only table write",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if self.tables.is_empty() {
            return Ok(());
        }
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        let command = SqlCommandType::from_statement(statement);
        if !matches!(
            command,
            SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete
        ) {
            return Ok(());
        }
        if let Some(table) = extract_table_name(statement).filter(|t| self.is_read_only(t)) {
            result.add_violation(
                self.risk_level,
                format!("Write operation {} on read-only table: {}", command, table),
                format!(
                    "Read-only tables cannot be modified. Remove the {} or target a different table",
                    command
                )
            );
        }
        Ok(())
    }
}

/// UNION, INTERSECT, EXCEPT and MINUS, the usual shape of UNION injection.
pub struct SetOperationChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    allowed:    Vec<&'static str>
}

impl SetOperationChecker {
    pub fn new(config: &SetOperationConfig) -> GuardResult<Self> {
        let allowed = config
            .allowed_operations
            .iter()
            .filter(|op| !op.trim().is_empty())
            .map(|op| canonical_name(op, SET_OPERATIONS, "set operation"))
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            allowed
        })
    }
}

/// Names of every set operation in a query (`UNION_ALL`, `EXCEPT`, ...),
/// one entry per occurrence, CTEs included.
pub fn set_operations(query: &Query) -> Vec<&'static str> {
    let mut operations = Vec::new();
    collect_set_operations(query, &mut operations);
    operations
}

fn collect_set_operations(query: &Query, operations: &mut Vec<&'static str>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_set_operations(&cte.query, operations);
        }
    }
    collect_set_expr_operations(&query.body, operations);
}

fn collect_set_expr_operations(set_expr: &SetExpr, operations: &mut Vec<&'static str>) {
    match set_expr {
        SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right
        } => {
            collect_set_expr_operations(left, operations);
            operations.push(set_operation_name(*op, *set_quantifier));
            collect_set_expr_operations(right, operations);
        }
        SetExpr::Query(query) => collect_set_operations(query, operations),
        _ => {}
    }
}

fn set_operation_name(op: SetOperator, quantifier: SetQuantifier) -> &'static str {
    let all = matches!(quantifier, SetQuantifier::All | SetQuantifier::AllByName);
    match (op, all) {
        (SetOperator::Union, false) => "UNION",
        (SetOperator::Union, true) => "UNION_ALL",
        (SetOperator::Intersect, false) => "INTERSECT",
        (SetOperator::Intersect, true) => "INTERSECT_ALL",
        (SetOperator::Except, false) => "EXCEPT",
        (SetOperator::Except, true) => "EXCEPT_ALL",
        (SetOperator::Minus, false) => "MINUS",
        (SetOperator::Minus, true) => "MINUS_ALL"
    }
}

impl RuleChecker for SetOperationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC006",
            name:     "Set operation",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(Statement::Query(query)) = ctx.statement() else {
            return Ok(());
        };
        for operation in set_operations(query) {
            if !self.allowed.contains(&operation) {
                result.add_violation(
                    self.risk_level,
                    format!("Set operation {} detected", operation.replace('_', " ")),
                    format!(
                        "Remove the set operation or add {} to allowed_operations",
                        operation
                    )
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `-- ...`
    Line,
    /// `/* ... */`
    Block,
    /// `/*+ ... */` optimizer hint
    Hint,
    /// MySQL `# ...`
    Hash
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line => write!(f, "line"),
            Self::Block => write!(f, "block"),
            Self::Hint => write!(f, "hint"),
            Self::Hash => write!(f, "hash")
        }
    }
}

/// One comment found in raw SQL; `offset` is a byte index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlComment<'a> {
    pub kind:    CommentKind,
    pub offset:  usize,
    pub content: &'a str
}

/// Every comment outside string literals and quoted identifiers.
///
/// MyBatis placeholders (`#{name}` closed on the same line) are not
/// comments. An unterminated block comment runs to the end of the text.
pub fn find_comments(sql: &str) -> Vec<SqlComment<'_>> {
    let bytes = sql.as_bytes();
    let mut comments = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let (kind, end) = match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i, quote);
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => (CommentKind::Line, line_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let kind = if bytes.get(i + 2) == Some(&b'+') {
                    CommentKind::Hint
                } else {
                    CommentKind::Block
                };
                (kind, skip_block_comment(bytes, i))
            }
            b'#' => {
                if let Some(close) = placeholder_end(bytes, i) {
                    i = close;
                    continue;
                }
                (CommentKind::Hash, line_end(bytes, i))
            }
            _ => {
                i += 1;
                continue;
            }
        };
        comments.push(SqlComment {
            kind,
            offset: i,
            content: &sql[i..end]
        });
        i = end;
    }
    comments
}

/// End of a line comment, newline excluded.
fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

/// Index past the `}` of a `#{...}` placeholder on the same line.
fn placeholder_end(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start + 1) != Some(&b'{') {
        return None;
    }
    bytes[start + 2..]
        .iter()
        .take_while(|&&b| b != b'\n')
        .position(|&b| b == b'}')
        .filter(|&p| p > 0)
        .map(|p| start + 2 + p + 1)
}

fn preview(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() <= PREVIEW_LEN {
        return content.to_string();
    }
    let mut short: String = content.chars().take(PREVIEW_LEN - 3).collect();
    short.push_str("...");
    short
}

/// Comments embedded in the statement text.
pub struct SqlCommentChecker {
    enabled:     bool,
    risk_level:  RiskLevel,
    allow_hints: bool
}

impl SqlCommentChecker {
    pub fn new(config: &SqlCommentConfig) -> Self {
        Self {
            enabled:     config.enabled,
            risk_level:  config.risk_level,
            allow_hints: config.allow_hint_comments
        }
    }
}

impl RuleChecker for SqlCommentChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC007",
            name:     "SQL comment",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        for comment in find_comments(ctx.sql()) {
            if self.allow_hints && comment.kind == CommentKind::Hint {
                continue;
            }
            result.add_violation(
                self.risk_level,
                format!(
                    "SQL contains a {} comment at offset {}: {}",
                    comment.kind,
                    comment.offset,
                    preview(comment.content)
                ),
                "Remove comments from application SQL; they can hide injected code"
            );
        }
        Ok(())
    }
}

/// MySQL `SELECT ... INTO OUTFILE|DUMPFILE`, which writes server files.
pub struct IntoOutfileChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    targets:    [(&'static str, Regex); 2]
}

impl IntoOutfileChecker {
    pub fn new(config: &IntoOutfileConfig) -> GuardResult<Self> {
        Ok(Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            targets:    [
                ("OUTFILE", file_target_pattern("OUTFILE")?),
                ("DUMPFILE", file_target_pattern("DUMPFILE")?)
            ]
        })
    }

    /// `OUTFILE` or `DUMPFILE` and the quoted path, OUTFILE first.
    pub fn file_target<'a>(&self, sql: &'a str) -> Option<(&'static str, &'a str)> {
        self.targets.iter().find_map(|(kind, re)| {
            let path = re.captures(sql)?.get(1).map_or("", |m| m.as_str());
            Some((*kind, path))
        })
    }
}

fn file_target_pattern(keyword: &str) -> GuardResult<Regex> {
    RegexBuilder::new(&format!(r#"\bINTO\s+{}\s+['"]([^'"]*)['"]"#, keyword))
        .case_insensitive(true)
        .build()
        .map_err(|e| config_error(format!("Invalid INTO {} pattern: {}", keyword, e)))
}

impl RuleChecker for IntoOutfileChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC008",
            name:     "File write",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if let Some((kind, path)) = self.file_target(ctx.sql()) {
            result.add_violation(
                self.risk_level,
                format!("SELECT INTO {} writes to server file '{}'", kind, path),
                "Remove INTO OUTFILE/DUMPFILE and export data through the application"
            );
        }
        Ok(())
    }
}
