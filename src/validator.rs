//! Validation entry point.
//!
//! [`SqlSafetyValidator`] ties the pieces together for one statement:
//!
//! 1. the deduplication filter may skip the statement (implicit pass)
//! 2. the statement is parsed through the cache unless the context already
//!    carries an AST; a lenient parse failure is an implicit pass
//! 3. the checker chain runs against a fresh [`ValidationResult`]
//!
//! The facade is called at most once per statement however many checkers
//! read the AST.
//!
//! ```
//! use sql_guard::{GuardConfig, RiskLevel, SqlSafetyValidator, context::ExecutionContext};
//!
//! let validator = SqlSafetyValidator::from_config(&GuardConfig::default()).unwrap();
//! let ctx = ExecutionContext::from_sql("DELETE FROM users").unwrap();
//!
//! let result = validator.validate(&ctx).unwrap();
//! assert!(!result.is_passed());
//! assert_eq!(result.risk_level(), RiskLevel::Critical);
//! ```

use std::{borrow::Cow, time::Duration};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    config::GuardConfig,
    context::ExecutionContext,
    dedup::{DedupScope, SqlDeduplicationFilter},
    error::GuardResult,
    parser::SqlParserFacade,
    rules::{RuleCheckerOrchestrator, ValidationResult}
};

/// Long-lived validator shared by all callers.
pub struct SqlSafetyValidator {
    facade:       SqlParserFacade,
    orchestrator: RuleCheckerOrchestrator,
    dedup:        SqlDeduplicationFilter
}

impl SqlSafetyValidator {
    pub fn new(
        facade: SqlParserFacade,
        orchestrator: RuleCheckerOrchestrator,
        dedup: SqlDeduplicationFilter
    ) -> Self {
        Self {
            facade,
            orchestrator,
            dedup
        }
    }

    /// Validate `config` and build the facade, default checker chain and
    /// deduplication filter from it.
    pub fn from_config(config: &GuardConfig) -> GuardResult<Self> {
        config.validate()?;
        let parser = &config.parser;
        let facade = SqlParserFacade::new(parser.mode, parser.cache_size, parser.dialect);
        let orchestrator = RuleCheckerOrchestrator::from_config(&config.rules)?;
        let dedup_config = &config.deduplication;
        let dedup = if dedup_config.enabled {
            SqlDeduplicationFilter::new(
                dedup_config.cache_size,
                Duration::from_millis(dedup_config.ttl_ms)
            )?
        } else {
            SqlDeduplicationFilter::disabled()
        };
        Ok(Self::new(facade, orchestrator, dedup))
    }

    pub fn facade(&self) -> &SqlParserFacade {
        &self.facade
    }

    pub fn orchestrator(&self) -> &RuleCheckerOrchestrator {
        &self.orchestrator
    }

    pub fn dedup(&self) -> &SqlDeduplicationFilter {
        &self.dedup
    }

    /// Validate one statement, deduplicating against the calling thread's
    /// scope.
    ///
    /// # Errors
    ///
    /// - [`GuardError::Parse`](crate::error::GuardError::Parse) in fail-fast
    ///   mode when the SQL does not parse
    /// - [`GuardError::Checker`](crate::error::GuardError::Checker) when a
    ///   checker fails
    pub fn validate(&self, ctx: &ExecutionContext) -> GuardResult<ValidationResult> {
        if !self.dedup.should_check(ctx.sql()) {
            debug!(statement = ctx.log_label(), "skipping recently validated SQL");
            return Ok(ValidationResult::pass());
        }
        self.run(ctx)
    }

    /// Validate one statement, deduplicating against `scope`.
    pub fn validate_in(
        &self,
        scope: &mut DedupScope,
        ctx: &ExecutionContext
    ) -> GuardResult<ValidationResult> {
        if !self.dedup.should_check_in(scope, ctx.sql()) {
            debug!(statement = ctx.log_label(), "skipping recently validated SQL");
            return Ok(ValidationResult::pass());
        }
        self.run(ctx)
    }

    /// Validate many statements in parallel.
    ///
    /// Deduplication does not apply: every context is checked, so repeated
    /// statements in one batch get identical results whatever the thread
    /// count. Results are returned in input order.
    pub fn validate_batch(
        &self,
        contexts: &[ExecutionContext]
    ) -> Vec<GuardResult<ValidationResult>> {
        contexts.par_iter().map(|ctx| self.run(ctx)).collect()
    }

    fn run(&self, ctx: &ExecutionContext) -> GuardResult<ValidationResult> {
        let parsed = if ctx.statement().is_some() {
            debug!(statement = ctx.log_label(), "reusing supplied AST");
            Cow::Borrowed(ctx)
        } else {
            match self.facade.parse_cached(ctx.sql())? {
                Some(ast) => Cow::Owned(ctx.with_statement(ast)),
                None => return Ok(ValidationResult::pass())
            }
        };
        let mut result = ValidationResult::pass();
        self.orchestrator.orchestrate(&parsed, &mut result)?;
        Ok(result)
    }
}
