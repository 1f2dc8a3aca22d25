//! Rule checkers and their orchestrator.
//!
//! Every checker implements [`RuleChecker`]: it inspects one
//! [`ExecutionContext`] and appends findings to a shared
//! [`ValidationResult`]. The [`RuleCheckerOrchestrator`] runs the enabled
//! checkers in a fixed order against the same context and accumulator.
//!
//! # Default Chain
//!
//! | ID | Checker | Default risk |
//! |----|---------|--------------|
//! | `WHERE001` | [`NoWhereClauseChecker`] | CRITICAL |
//! | `WHERE002` | [`DummyConditionChecker`] | HIGH |
//! | `WHERE003` | [`BlacklistFieldChecker`] | HIGH |
//! | `WHERE004` | [`WhitelistFieldChecker`] | HIGH |
//! | `PAGE001` | [`LogicalPaginationChecker`] | CRITICAL |
//! | `PAGE002` | [`NoConditionPaginationChecker`] | CRITICAL |
//! | `PAGE003` | [`DeepPaginationChecker`] | MEDIUM |
//! | `PAGE004` | [`LargePageSizeChecker`] | MEDIUM |
//! | `PAGE005` | [`MissingOrderByChecker`] | LOW |
//! | `PAGE006` | [`NoPaginationChecker`] | MEDIUM / HIGH / CRITICAL |
//! | `SEC001` | [`MultiStatementChecker`] | CRITICAL |
//! | `SEC002` | [`DeniedTableChecker`] | CRITICAL |
//! | `SEC003` | [`DdlOperationChecker`] | CRITICAL |
//! | `SEC004` | [`DangerousFunctionChecker`] | CRITICAL |
//! | `SEC005` | [`ReadOnlyTableChecker`] | HIGH |
//! | `SEC006` | [`SetOperationChecker`] | CRITICAL |
//! | `SEC007` | [`SqlCommentChecker`] | CRITICAL |
//! | `SEC008` | [`IntoOutfileChecker`] | CRITICAL |
//! | `SEC009` | [`CallStatementChecker`] | HIGH |
//! | `SEC010` | [`SetStatementChecker`] | MEDIUM |
//! | `SEC011` | [`MetadataStatementChecker`] | HIGH |
//!
//! # Configuration
//!
//! ```toml
//! [rules]
//! disabled = ["PAGE005"]
//!
//! [rules.no_where_clause]
//! select_risk_level = "HIGH"
//! ```
//!
//! # Implementing Custom Checkers
//!
//! ```
//! use sql_guard::{
//!     context::ExecutionContext,
//!     error::GuardResult,
//!     rules::{CheckerCategory, CheckerInfo, RiskLevel, RuleChecker, ValidationResult}
//! };
//!
//! struct NoTruncate;
//!
//! impl RuleChecker for NoTruncate {
//!     fn info(&self) -> CheckerInfo {
//!         CheckerInfo {
//!             id:       "CUSTOM001",
//!             name:     "No TRUNCATE",
//!             category: CheckerCategory::Security
//!         }
//!     }
//!
//!     fn is_enabled(&self) -> bool {
//!         true
//!     }
//!
//!     fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
//!         if ctx.sql().trim_start().to_uppercase().starts_with("TRUNCATE") {
//!             result.add_violation(RiskLevel::Critical, "TRUNCATE removes every row", "Use DELETE with WHERE");
//!         }
//!         Ok(())
//!     }
//! }
//! ```

mod filtering;
mod pagination;
mod security;
mod statement;
pub mod support;
mod types;

pub use filtering::{
    BlacklistFieldChecker, DummyConditionChecker, NoWhereClauseChecker, WhitelistFieldChecker
};
pub use pagination::{
    DeepPaginationChecker, LargePageSizeChecker, LogicalPaginationChecker, MissingOrderByChecker,
    NoConditionPaginationChecker, NoPaginationChecker, PaginationDetector, PaginationScope,
    PaginationType
};
pub use security::{
    CommentKind, DangerousFunctionChecker, DdlOperationChecker, DeniedTableChecker,
    IntoOutfileChecker, MultiStatementChecker, ReadOnlyTableChecker, SetOperationChecker,
    SqlComment, SqlCommentChecker, ddl_operation, find_comments, has_multiple_statements,
    set_operations
};
use smallvec::SmallVec;
pub use statement::{CallStatementChecker, MetadataStatementChecker, SetStatementChecker};
pub use support::TableFilter;
use tracing::debug;
pub use types::{CheckerCategory, CheckerInfo, RiskLevel, ValidationResult, ViolationInfo};

use crate::{
    config::RulesConfig,
    context::ExecutionContext,
    error::{GuardError, GuardResult, checker_error}
};

/// Contract implemented by every checker.
///
/// Checkers hold only immutable configuration, so one instance serves all
/// threads.
pub trait RuleChecker: Send + Sync {
    /// Returns metadata about this checker.
    fn info(&self) -> CheckerInfo;

    fn is_enabled(&self) -> bool;

    /// Inspect `ctx` and append findings to `result`.
    ///
    /// Several violations from one call are allowed. An `Err` is a checker
    /// failure and aborts the orchestration.
    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()>;
}

/// Runs checkers in order against one context.
///
/// There is no short-circuit: a finding from one checker never stops the
/// next. Failures are not isolated: the first `Err` aborts the run and is
/// returned as [`GuardError::Checker`].
pub struct RuleCheckerOrchestrator {
    checkers: Vec<Box<dyn RuleChecker>>
}

impl RuleCheckerOrchestrator {
    pub fn new(checkers: Vec<Box<dyn RuleChecker>>) -> Self {
        Self {
            checkers
        }
    }

    /// Build the default chain, leaving out checkers listed in
    /// [`RulesConfig::disabled`].
    pub fn from_config(config: &RulesConfig) -> GuardResult<Self> {
        let detector = PaginationDetector::new(config.pagination.pagination_plugin);
        let scope = PaginationScope::from_config(&config.pagination)?;
        let all_checkers: Vec<Box<dyn RuleChecker>> = vec![
            Box::new(NoWhereClauseChecker::new(&config.no_where_clause)),
            Box::new(DummyConditionChecker::new(&config.dummy_condition)?),
            Box::new(BlacklistFieldChecker::new(&config.blacklist_field)),
            Box::new(WhitelistFieldChecker::new(&config.whitelist_field)),
            Box::new(LogicalPaginationChecker::new(
                &config.logical_pagination,
                detector,
                scope.clone()
            )),
            Box::new(NoConditionPaginationChecker::new(
                &config.no_condition_pagination,
                &config.dummy_condition,
                detector,
                scope.clone()
            )),
            Box::new(DeepPaginationChecker::new(&config.deep_pagination, detector, scope.clone())?),
            Box::new(LargePageSizeChecker::new(&config.large_page_size, detector, scope.clone())?),
            Box::new(MissingOrderByChecker::new(&config.missing_order_by, detector, scope.clone())),
            Box::new(NoPaginationChecker::new(
                &config.no_pagination,
                &config.blacklist_field,
                &config.dummy_condition,
                scope
            )),
            Box::new(MultiStatementChecker::new(&config.multi_statement)),
            Box::new(DeniedTableChecker::new(&config.denied_table)?),
            Box::new(DdlOperationChecker::new(&config.ddl_operation)?),
            Box::new(DangerousFunctionChecker::new(&config.dangerous_function)),
            Box::new(ReadOnlyTableChecker::new(&config.readonly_table)),
            Box::new(SetOperationChecker::new(&config.set_operation)?),
            Box::new(SqlCommentChecker::new(&config.sql_comment)),
            Box::new(IntoOutfileChecker::new(&config.into_outfile)?),
            Box::new(CallStatementChecker::new(&config.call_statement)?),
            Box::new(SetStatementChecker::new(&config.set_statement)?),
            Box::new(MetadataStatementChecker::new(&config.metadata_statement)?),
        ];
        let checkers = all_checkers
            .into_iter()
            .filter(|c| !config.is_disabled(c.info().id))
            .collect();
        Ok(Self::new(checkers))
    }

    /// Run every enabled checker against `ctx`, accumulating into `result`.
    pub fn orchestrate(
        &self,
        ctx: &ExecutionContext,
        result: &mut ValidationResult
    ) -> GuardResult<()> {
        for checker in &self.checkers {
            if !checker.is_enabled() {
                continue;
            }
            let id = checker.info().id;
            checker.check(ctx, result).map_err(|err| match err {
                err @ GuardError::Checker { .. } => err,
                other => checker_error(id, other.to_string())
            })?;
        }
        debug!(
            statement = ctx.log_label(),
            violations = result.violations().len(),
            risk = %result.risk_level(),
            "checkers finished"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// IDs of the configured checkers in evaluation order.
    pub fn checker_ids(&self) -> SmallVec<[&'static str; 16]> {
        self.checkers.iter().map(|c| c.info().id).collect()
    }
}
