//! What the caller does with a failed validation.

use serde::Deserialize;
use tracing::{error, info};

use crate::{
    config::StrategyConfig,
    context::ExecutionContext,
    error::{GuardError, GuardResult, sql_snippet},
    rules::{RiskLevel, ValidationResult}
};

/// Reaction to a non-passing [`ValidationResult`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStrategy {
    /// Refuse statements at or above the block threshold
    Block,
    /// Log at error level and let the statement run
    Warn,
    /// Log at info level and let the statement run
    #[default]
    Log
}

/// Applies a [`ViolationStrategy`] to validation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationHandler {
    strategy:        ViolationStrategy,
    block_threshold: RiskLevel
}

impl Default for ViolationHandler {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}

impl ViolationHandler {
    pub fn new(strategy: ViolationStrategy, block_threshold: RiskLevel) -> Self {
        Self {
            strategy,
            block_threshold
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.strategy, config.block_threshold)
    }

    pub fn strategy(&self) -> ViolationStrategy {
        self.strategy
    }

    /// `Err(GuardError::Blocked)` only under [`ViolationStrategy::Block`] for
    /// a result at or above the threshold. Passed results are ignored.
    pub fn apply(&self, ctx: &ExecutionContext, result: &ValidationResult) -> GuardResult<()> {
        if result.is_passed() {
            return Ok(());
        }
        let message = result
            .violations()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        match self.strategy {
            ViolationStrategy::Block if result.risk_level().is_at_least(self.block_threshold) => {
                error!(
                    statement = ctx.log_label(),
                    risk = %result.risk_level(),
                    sql = %sql_snippet(ctx.sql()),
                    "blocking SQL: {}", message
                );
                Err(GuardError::Blocked {
                    risk_level: result.risk_level(),
                    statement_id: ctx.statement_id().map(String::from),
                    message
                })
            }
            ViolationStrategy::Block | ViolationStrategy::Warn => {
                error!(
                    statement = ctx.log_label(),
                    risk = %result.risk_level(),
                    sql = %sql_snippet(ctx.sql()),
                    "unsafe SQL: {}", message
                );
                Ok(())
            }
            ViolationStrategy::Log => {
                info!(
                    statement = ctx.log_label(),
                    risk = %result.risk_level(),
                    sql = %sql_snippet(ctx.sql()),
                    "unsafe SQL: {}", message
                );
                Ok(())
            }
        }
    }
}
