//! WHERE clause checkers (`WHERE001`-`WHERE004`).

use compact_str::CompactString;
use indexmap::IndexMap;
use sqlparser::ast::{Expr, GroupByExpr, Select, SelectItem, Statement};

use super::{
    CheckerCategory, CheckerInfo, RiskLevel, RuleChecker, ValidationResult,
    support::{all_fields_match, contains_dummy_condition, matches_field_pattern, normalize_condition}
};
use crate::{
    config::{BlacklistFieldConfig, DummyConditionConfig, NoWhereClauseConfig, WhitelistFieldConfig},
    context::{ExecutionContext, SqlCommandType},
    error::{GuardResult, config_error},
    parser::{extract_fields, extract_table_name, extract_where, plain_select}
};

const AGGREGATES: &[&str] = &["count", "sum", "avg", "min", "max"];

/// UPDATE/DELETE, and optionally SELECT, without WHERE.
pub struct NoWhereClauseChecker {
    enabled:           bool,
    risk_level:        RiskLevel,
    check_select:      bool,
    select_risk_level: RiskLevel,
    small_tables:      Vec<CompactString>
}

impl NoWhereClauseChecker {
    pub fn new(config: &NoWhereClauseConfig) -> Self {
        Self {
            enabled:           config.enabled,
            risk_level:        config.risk_level,
            check_select:      config.check_select,
            select_risk_level: config.select_risk_level,
            small_tables:      config.small_tables.clone()
        }
    }

    fn is_small_table_aggregate(&self, select: &Select, statement: &Statement) -> bool {
        if self.small_tables.is_empty() || !is_aggregate_only(select) {
            return false;
        }
        extract_table_name(statement)
            .is_some_and(|t| self.small_tables.iter().any(|s| s.eq_ignore_ascii_case(&t)))
    }
}

impl RuleChecker for NoWhereClauseChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "WHERE001",
            name:     "Missing WHERE clause",
            category: CheckerCategory::Filtering
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        match statement {
            Statement::Update(_) | Statement::Delete(_) => {
                if extract_where(statement).is_none() {
                    let command = SqlCommandType::from_statement(statement);
                    result.add_violation(
                        self.risk_level,
                        format!("{} statement has no WHERE clause and affects the entire table", command),
                        "Add a WHERE condition that limits the affected rows"
                    );
                }
            }
            Statement::Query(query) if self.check_select => {
                let Some(select) = plain_select(query) else {
                    return Ok(());
                };
                if select.from.is_empty() || select.selection.is_some() {
                    return Ok(());
                }
                if self.is_small_table_aggregate(select, statement) {
                    return Ok(());
                }
                result.add_violation(
                    self.select_risk_level,
                    "SELECT statement has no WHERE clause and reads the entire table",
                    "Add a WHERE condition or an explicit LIMIT"
                );
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_aggregate_only(select: &Select) -> bool {
    let grouped = match &select.group_by {
        GroupByExpr::All(_) => true,
        GroupByExpr::Expressions(exprs, _) => !exprs.is_empty()
    };
    !grouped
        && !select.projection.is_empty()
        && select.projection.iter().all(|item| match item {
            SelectItem::UnnamedExpr(expr)
            | SelectItem::ExprWithAlias {
                expr, ..
            } => is_aggregate_call(expr),
            _ => false
        })
}

fn is_aggregate_call(expr: &Expr) -> bool {
    let Expr::Function(func) = expr else {
        return false;
    };
    let name = func.name.to_string().to_lowercase();
    let name = name.rsplit('.').next().unwrap_or_default();
    AGGREGATES.contains(&name)
}

/// Always-true conditions such as `1=1` in WHERE.
pub struct DummyConditionChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    patterns:   Vec<CompactString>
}

impl DummyConditionChecker {
    /// Fails when the checker is enabled without any pattern.
    pub fn new(config: &DummyConditionConfig) -> GuardResult<Self> {
        let patterns: Vec<CompactString> = config
            .patterns
            .iter()
            .chain(&config.custom_patterns)
            .map(|p| normalize_condition(p))
            .filter(|p| !p.is_empty())
            .collect();
        if config.enabled && patterns.is_empty() {
            return Err(config_error("dummy condition checker requires at least one pattern"));
        }
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            patterns
        })
    }

    pub fn patterns(&self) -> &[CompactString] {
        &self.patterns
    }
}

impl RuleChecker for DummyConditionChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "WHERE002",
            name:     "Dummy condition",
            category: CheckerCategory::Filtering
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(selection) = ctx.statement().and_then(extract_where) else {
            return Ok(());
        };
        if contains_dummy_condition(selection, &self.patterns) {
            result.add_violation(
                self.risk_level,
                "WHERE clause contains an always-true condition such as 1=1",
                "Remove the placeholder condition and build the WHERE clause from real filters"
            );
        }
        Ok(())
    }
}

/// WHERE clauses that filter only on low-selectivity columns.
pub struct BlacklistFieldChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    fields:     Vec<CompactString>
}

impl BlacklistFieldChecker {
    pub fn new(config: &BlacklistFieldConfig) -> Self {
        Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            fields:     config.fields.clone()
        }
    }
}

impl RuleChecker for BlacklistFieldChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "WHERE003",
            name:     "Blacklisted WHERE fields",
            category: CheckerCategory::Filtering
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(selection) = ctx.statement().and_then(extract_where) else {
            return Ok(());
        };
        let fields = extract_fields(selection);
        if all_fields_match(&fields, &self.fields) {
            result.add_violation(
                self.risk_level,
                format!(
                    "WHERE clause only filters on low-selectivity fields [{}]",
                    join_fields(fields.iter())
                ),
                "Add a selective condition such as a primary key or indexed business column"
            );
        }
        Ok(())
    }
}

/// WHERE fields outside a per-table allow-list.
pub struct WhitelistFieldChecker {
    enabled:                    bool,
    risk_level:                 RiskLevel,
    fields:                     Vec<CompactString>,
    by_table:                   IndexMap<CompactString, Vec<CompactString>>,
    enforce_for_unknown_tables: bool
}

impl WhitelistFieldChecker {
    pub fn new(config: &WhitelistFieldConfig) -> Self {
        let by_table = config
            .by_table
            .iter()
            .map(|(table, fields)| (table.to_lowercase().into(), fields.clone()))
            .collect();
        Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            fields: config.fields.clone(),
            by_table,
            enforce_for_unknown_tables: config.enforce_for_unknown_tables
        }
    }

    fn allowed_for(&self, table: &str) -> Option<&[CompactString]> {
        match self.by_table.get(table.to_lowercase().as_str()) {
            Some(fields) => Some(fields.as_slice()),
            None if self.enforce_for_unknown_tables => Some(self.fields.as_slice()),
            None => None
        }
    }
}

impl RuleChecker for WhitelistFieldChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "WHERE004",
            name:     "Fields outside allow-list",
            category: CheckerCategory::Filtering
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some(statement) = ctx.statement() else {
            return Ok(());
        };
        let (Some(table), Some(selection)) = (extract_table_name(statement), extract_where(statement))
        else {
            return Ok(());
        };
        let Some(allowed) = self.allowed_for(&table).filter(|a| !a.is_empty()) else {
            return Ok(());
        };
        let fields = extract_fields(selection);
        let outside: Vec<&CompactString> = fields
            .iter()
            .filter(|f| !allowed.iter().any(|p| matches_field_pattern(f, p)))
            .collect();
        if !outside.is_empty() {
            result.add_violation(
                self.risk_level,
                format!(
                    "WHERE clause on table {} uses fields outside the allow-list [{}]",
                    table,
                    join_fields(outside.into_iter())
                ),
                format!("Filter {} only on [{}]", table, join_fields(allowed.iter()))
            );
        }
        Ok(())
    }
}

fn join_fields<'a>(fields: impl Iterator<Item = &'a CompactString>) -> String {
    fields.map(CompactString::as_str).collect::<Vec<_>>().join(", ")
}
