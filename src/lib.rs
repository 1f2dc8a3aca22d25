//! # SQL Guard
//!
//! Pre-execution safety validation for SQL statements.
//!
//! Build a [`SqlSafetyValidator`] once from a [`GuardConfig`], then hand it an
//! [`ExecutionContext`](context::ExecutionContext) per intercepted
//! statement. The returned [`ValidationResult`] lists every finding with its
//! [`RiskLevel`]; a [`ViolationHandler`] turns results into block, warn or
//! log decisions.

pub mod cache;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod parser;
pub mod rules;
pub mod strategy;
pub mod validator;

pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use rules::{RiskLevel, RuleChecker, RuleCheckerOrchestrator, ValidationResult, ViolationInfo};
pub use strategy::{ViolationHandler, ViolationStrategy};
pub use validator::SqlSafetyValidator;
