//! Pagination checkers (`PAGE001`-`PAGE006`).
//!
//! A statement is paginated physically when the SQL carries LIMIT / FETCH /
//! TOP, or when row bounds travel with it and a pagination plugin turns them
//! into LIMIT. Row bounds without a plugin are paginated logically: the
//! driver fetches every row and the caller discards all but one page.

use std::fmt;

use compact_str::CompactString;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use sqlparser::ast::Statement;

use super::{
    CheckerCategory, CheckerInfo, RiskLevel, RuleChecker, TableFilter, ValidationResult,
    support::{
        all_fields_match, contains_dummy_condition, has_key_condition, matches_any_wildcard,
        normalize_condition
    }
};
use crate::{
    config::{
        BlacklistFieldConfig, DeepPaginationConfig, DummyConditionConfig, LargePageSizeConfig,
        LogicalPaginationConfig, MissingOrderByConfig, NoConditionPaginationConfig,
        NoPaginationConfig, PaginationConfig
    },
    context::ExecutionContext,
    error::{GuardResult, config_error},
    parser::{
        extract_fields, extract_limit, extract_offset, extract_table_name, extract_where,
        has_order_by, has_pagination_clause, plain_select
    }
};

/// How a statement is paginated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaginationType {
    None,
    /// Row bounds applied in memory after fetching every row
    Logical,
    /// LIMIT-style clause executed by the database
    Physical
}

impl fmt::Display for PaginationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Logical => write!(f, "LOGICAL"),
            Self::Physical => write!(f, "PHYSICAL")
        }
    }
}

/// Classifies the pagination of a parsed context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationDetector {
    pagination_plugin: bool
}

impl PaginationDetector {
    pub const fn new(pagination_plugin: bool) -> Self {
        Self {
            pagination_plugin
        }
    }

    pub fn has_pagination_plugin(&self) -> bool {
        self.pagination_plugin
    }

    /// [`PaginationType::None`] when the context carries no AST.
    pub fn detect(&self, ctx: &ExecutionContext) -> PaginationType {
        let Some(statement) = ctx.statement() else {
            return PaginationType::None;
        };
        let has_limit = has_pagination_clause(statement);
        let has_page_param = ctx.row_bounds().is_some() || ctx.has_page_parameter();
        if has_page_param && !has_limit && !self.pagination_plugin {
            PaginationType::Logical
        } else if has_limit || (has_page_param && self.pagination_plugin) {
            PaginationType::Physical
        } else {
            PaginationType::None
        }
    }
}

/// Suppression rules shared by the pagination checkers.
#[derive(Debug, Clone)]
pub struct PaginationScope {
    limiting_fields: Vec<Regex>,
    tables:          TableFilter
}

impl PaginationScope {
    pub fn new(limiting_fields: Vec<Regex>, tables: TableFilter) -> Self {
        Self {
            limiting_fields,
            tables
        }
    }

    /// Compile the limiting-field patterns case-insensitively.
    pub fn from_config(config: &PaginationConfig) -> GuardResult<Self> {
        let limiting_fields = config
            .limiting_fields
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        config_error(format!("Invalid limiting field pattern '{}': {}", pattern, e))
                    })
            })
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self::new(limiting_fields, config.tables.clone()))
    }

    pub fn is_limiting_field(&self, column: &str) -> bool {
        self.limiting_fields.iter().any(|re| re.is_match(column))
    }

    /// True when the table is filtered out or the WHERE clause already pins a
    /// limiting field.
    pub fn is_exempt(&self, statement: &Statement) -> bool {
        if !self.tables.allows(extract_table_name(statement).as_deref()) {
            return true;
        }
        extract_where(statement).is_some_and(|selection| {
            has_key_condition(selection, &|column: &str| self.is_limiting_field(column))
        })
    }
}

/// Offset and limit the database will apply.
///
/// SQL clauses win; row bounds count only when a plugin rewrites them.
#[derive(Debug, Clone, Copy, Default)]
struct PageWindow {
    offset: Option<u64>,
    limit:  Option<u64>
}

impl PageWindow {
    fn of(ctx: &ExecutionContext, statement: &Statement, detector: PaginationDetector) -> Self {
        if has_pagination_clause(statement) {
            return Self {
                offset: extract_offset(statement),
                limit:  extract_limit(statement)
            };
        }
        match ctx.row_bounds() {
            Some(bounds) if detector.has_pagination_plugin() => Self {
                offset: Some(bounds.offset),
                limit:  Some(bounds.limit)
            },
            _ => Self::default()
        }
    }

    fn record(&self, result: &mut ValidationResult) {
        if let Some(limit) = self.limit {
            result.insert_detail("limit", limit);
        }
        result.insert_detail("offset", self.offset.unwrap_or(0));
    }
}

/// Parsed statement when it is physically paginated and not exempt.
fn physical_target<'a>(
    ctx: &'a ExecutionContext,
    detector: PaginationDetector,
    scope: &PaginationScope
) -> Option<&'a Statement> {
    let statement = ctx.statement()?;
    if detector.detect(ctx) != PaginationType::Physical || scope.is_exempt(statement) {
        return None;
    }
    Some(statement)
}

fn normalized_patterns(config: &DummyConditionConfig) -> Vec<CompactString> {
    config
        .patterns
        .iter()
        .chain(&config.custom_patterns)
        .map(|p| normalize_condition(p))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Row bounds without a pagination plugin.
pub struct LogicalPaginationChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    detector:   PaginationDetector,
    scope:      PaginationScope
}

impl LogicalPaginationChecker {
    pub fn new(
        config: &LogicalPaginationConfig,
        detector: PaginationDetector,
        scope: PaginationScope
    ) -> Self {
        Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            detector,
            scope
        }
    }
}

impl RuleChecker for LogicalPaginationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE001",
            name:     "Logical pagination",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        if self.detector.detect(ctx) != PaginationType::Logical {
            return Ok(());
        }
        if !self.scope.tables.allows(extract_table_name(statement).as_deref()) {
            return Ok(());
        }
        result.add_violation(
            self.risk_level,
            "Logical pagination loads the whole result set into memory before paging",
            "Enable a physical pagination plugin or add LIMIT to the statement"
        );
        if let Some(bounds) = ctx.row_bounds() {
            result.insert_detail("offset", bounds.offset);
            result.insert_detail("limit", bounds.limit);
        }
        result.insert_detail("pagination_type", PaginationType::Logical.to_string());
        Ok(())
    }
}

/// Physical pagination over an unfiltered or dummy-filtered statement.
pub struct NoConditionPaginationChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    patterns:   Vec<CompactString>,
    detector:   PaginationDetector,
    scope:      PaginationScope
}

impl NoConditionPaginationChecker {
    /// `dummy` supplies the textual patterns that count as no condition.
    pub fn new(
        config: &NoConditionPaginationConfig,
        dummy: &DummyConditionConfig,
        detector: PaginationDetector,
        scope: PaginationScope
    ) -> Self {
        Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            patterns: normalized_patterns(dummy),
            detector,
            scope
        }
    }
}

impl RuleChecker for NoConditionPaginationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE002",
            name:     "Pagination without condition",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = physical_target(ctx, self.detector, &self.scope) else {
            return Ok(());
        };
        let unfiltered = match extract_where(statement) {
            None => true,
            Some(selection) => contains_dummy_condition(selection, &self.patterns)
        };
        if unfiltered {
            PageWindow::of(ctx, statement, self.detector).record(result);
            result.add_violation(
                self.risk_level,
                "Paginated query has no effective WHERE condition and still scans the whole table",
                "Add a business condition that narrows the scanned rows"
            );
        }
        Ok(())
    }
}

/// OFFSET beyond `max_offset`.
pub struct DeepPaginationChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    max_offset: u64,
    detector:   PaginationDetector,
    scope:      PaginationScope
}

impl DeepPaginationChecker {
    /// Fails for a zero `max_offset`.
    pub fn new(
        config: &DeepPaginationConfig,
        detector: PaginationDetector,
        scope: PaginationScope
    ) -> GuardResult<Self> {
        if config.max_offset == 0 {
            return Err(config_error("max_offset must be greater than 0"));
        }
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            max_offset: config.max_offset,
            detector,
            scope
        })
    }
}

impl RuleChecker for DeepPaginationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE003",
            name:     "Deep pagination",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = physical_target(ctx, self.detector, &self.scope) else {
            return Ok(());
        };
        let Some(offset) = PageWindow::of(ctx, statement, self.detector).offset else {
            return Ok(());
        };
        if offset > self.max_offset {
            result.insert_detail("offset", offset);
            result.add_violation(
                self.risk_level,
                format!("Deep pagination: OFFSET {} scans and discards {} rows", offset, offset),
                "Use keyset pagination (WHERE id > last_seen_id) instead of a large OFFSET"
            );
        }
        Ok(())
    }
}

/// Page size beyond `max_page_size`.
pub struct LargePageSizeChecker {
    enabled:       bool,
    risk_level:    RiskLevel,
    max_page_size: u64,
    detector:      PaginationDetector,
    scope:         PaginationScope
}

impl LargePageSizeChecker {
    /// Fails for a zero `max_page_size`.
    pub fn new(
        config: &LargePageSizeConfig,
        detector: PaginationDetector,
        scope: PaginationScope
    ) -> GuardResult<Self> {
        if config.max_page_size == 0 {
            return Err(config_error("max_page_size must be greater than 0"));
        }
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            max_page_size: config.max_page_size,
            detector,
            scope
        })
    }
}

impl RuleChecker for LargePageSizeChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE004",
            name:     "Large page size",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = physical_target(ctx, self.detector, &self.scope) else {
            return Ok(());
        };
        let Some(limit) = PageWindow::of(ctx, statement, self.detector).limit else {
            return Ok(());
        };
        if limit > self.max_page_size {
            result.insert_detail("limit", limit);
            result.add_violation(
                self.risk_level,
                format!("Page size {} exceeds the maximum of {}", limit, self.max_page_size),
                format!("Reduce the page size to at most {} rows", self.max_page_size)
            );
        }
        Ok(())
    }
}

/// Physical pagination without ORDER BY.
pub struct MissingOrderByChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    detector:   PaginationDetector,
    scope:      PaginationScope
}

impl MissingOrderByChecker {
    pub fn new(
        config: &MissingOrderByConfig,
        detector: PaginationDetector,
        scope: PaginationScope
    ) -> Self {
        Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            detector,
            scope
        }
    }
}

impl RuleChecker for MissingOrderByChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE005",
            name:     "Pagination without ORDER BY",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = physical_target(ctx, self.detector, &self.scope) else {
            return Ok(());
        };
        if !has_order_by(statement) {
            result.add_violation(
                self.risk_level,
                "Paginated query has no ORDER BY so row order between pages is undefined",
                "Add an ORDER BY on a unique column"
            );
        }
        Ok(())
    }
}

/// SELECT without any pagination.
///
/// Severity depends on the WHERE clause: none or dummy is CRITICAL, only
/// blacklisted fields is HIGH, anything else reports the configured level
/// when `enforce_for_all_queries` is set.
pub struct NoPaginationChecker {
    enabled:                 bool,
    risk_level:              RiskLevel,
    whitelist_statement_ids: Vec<CompactString>,
    whitelist_tables:        Vec<CompactString>,
    unique_keys:             Vec<CompactString>,
    enforce_for_all_queries: bool,
    blacklist:               Vec<CompactString>,
    patterns:                Vec<CompactString>,
    scope:                   PaginationScope
}

impl NoPaginationChecker {
    pub fn new(
        config: &NoPaginationConfig,
        blacklist: &BlacklistFieldConfig,
        dummy: &DummyConditionConfig,
        scope: PaginationScope
    ) -> Self {
        let mut unique_keys = vec![CompactString::from("id")];
        unique_keys.extend(config.unique_key_fields.iter().cloned());
        Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            whitelist_statement_ids: config.whitelist_statement_ids.clone(),
            whitelist_tables: config.whitelist_tables.clone(),
            unique_keys,
            enforce_for_all_queries: config.enforce_for_all_queries,
            blacklist: blacklist.fields.clone(),
            patterns: normalized_patterns(dummy),
            scope
        }
    }

    fn is_whitelisted(&self, ctx: &ExecutionContext, statement: &Statement) -> bool {
        if matches_any_wildcard(ctx.statement_id(), &self.whitelist_statement_ids) {
            return true;
        }
        if extract_table_name(statement)
            .is_some_and(|t| self.whitelist_tables.iter().any(|w| w.eq_ignore_ascii_case(&t)))
        {
            return true;
        }
        extract_where(statement).is_some_and(|selection| {
            has_key_condition(selection, &|column: &str| {
                self.unique_keys.iter().any(|k| k.eq_ignore_ascii_case(column))
            })
        })
    }
}

impl RuleChecker for NoPaginationChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "PAGE006",
            name:     "Missing pagination",
            category: CheckerCategory::Pagination
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        let Statement::Query(query) = statement else {
            return Ok(());
        };
        if plain_select(query).is_none_or(|select| select.from.is_empty()) {
            return Ok(());
        }
        let paginated =
            has_pagination_clause(statement) || ctx.row_bounds().is_some() || ctx.has_page_parameter();
        if paginated {
            return Ok(());
        }
        if self.is_whitelisted(ctx, statement) || self.scope.is_exempt(statement) {
            return Ok(());
        }
        let selection = match extract_where(statement) {
            Some(selection) if !contains_dummy_condition(selection, &self.patterns) => selection,
            _ => {
                result.add_violation(
                    RiskLevel::Critical,
                    "SELECT without condition or pagination may return the entire table",
                    "Add a WHERE condition and a LIMIT"
                );
                return Ok(());
            }
        };
        let fields = extract_fields(selection);
        if all_fields_match(&fields, &self.blacklist) {
            let names: Vec<&str> = fields.iter().map(CompactString::as_str).collect();
            result.add_violation(
                RiskLevel::High,
                format!(
                    "SELECT filters only on low-selectivity fields [{}] without pagination",
                    names.join(", ")
                ),
                "Add a selective condition or a LIMIT"
            );
            return Ok(());
        }
        if self.enforce_for_all_queries {
            result.add_violation(
                self.risk_level,
                "SELECT has no pagination",
                "Add a LIMIT to bound the result size"
            );
        }
        Ok(())
    }
}
