//! Runtime statement-kind checkers (`SEC009`-`SEC011`).
//!
//! These work on the raw SQL text, so they also fire for statements the
//! parser does not understand.

use regex::{Captures, Regex, RegexBuilder};

use super::{
    CheckerCategory, CheckerInfo, RiskLevel, RuleChecker, ValidationResult,
    support::canonical_name
};
use crate::{
    config::{CallStatementConfig, MetadataStatementConfig, SetStatementConfig},
    context::ExecutionContext,
    error::{GuardResult, config_error}
};

const METADATA_STATEMENTS: &[&str] = &["SHOW", "DESCRIBE", "USE"];

fn leading(pattern: &str) -> GuardResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| config_error(format!("Invalid statement pattern '{}': {}", pattern, e)))
}

fn group<'a>(captures: &Captures<'a>, index: usize) -> &'a str {
    captures.get(index).map_or("UNKNOWN", |m| m.as_str())
}

/// Stored procedure calls, which run logic the checkers cannot see.
pub struct CallStatementChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    patterns:   [(&'static str, Regex); 3]
}

impl CallStatementChecker {
    pub fn new(config: &CallStatementConfig) -> GuardResult<Self> {
        Ok(Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            patterns:   [
                ("CALL", leading(r"^\s*CALL\s+([a-zA-Z_][a-zA-Z0-9_.]*)\s*(?:\(|$|;)")?),
                (
                    "EXECUTE",
                    leading(r"^\s*EXECUTE\s+([a-zA-Z_][a-zA-Z0-9_.]*)\s*(?:\(|@|$|;)")?
                ),
                ("EXEC", leading(r"^\s*EXEC\s+([a-zA-Z_][a-zA-Z0-9_.]*)\s*(?:\(|@|$|;|\s)")?)
            ]
        })
    }

    /// Keyword (`CALL`, `EXECUTE` or `EXEC`) and procedure name of a leading
    /// procedure call.
    pub fn procedure_call<'a>(&self, sql: &'a str) -> Option<(&'static str, &'a str)> {
        self.patterns
            .iter()
            .find_map(|(keyword, re)| Some((*keyword, group(&re.captures(sql)?, 1))))
    }
}

impl RuleChecker for CallStatementChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC009",
            name:     "Stored procedure call",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if let Some((keyword, procedure)) = self.procedure_call(ctx.sql()) {
            result.add_violation(
                self.risk_level,
                format!("Stored procedure call: {} {}", keyword, procedure),
                "Move the procedure logic into the application and issue plain SQL"
            );
        }
        Ok(())
    }
}

/// `SET` statements that change session variables at runtime.
pub struct SetStatementChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    pattern:    Regex
}

impl SetStatementChecker {
    pub fn new(config: &SetStatementConfig) -> GuardResult<Self> {
        Ok(Self {
            enabled:    config.enabled,
            risk_level: config.risk_level,
            pattern:    leading(r"^\s*SET\s+(\S+)")?
        })
    }
}

impl RuleChecker for SetStatementChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC010",
            name:     "Session variable change",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        if let Some(captures) = self.pattern.captures(ctx.sql()) {
            result.add_violation(
                self.risk_level,
                format!("SET statement changes session variable {}", group(&captures, 1)),
                "Configure session variables in the connection pool instead of runtime SQL"
            );
        }
        Ok(())
    }
}

/// SHOW, DESCRIBE and USE, which expose or switch schema information.
pub struct MetadataStatementChecker {
    enabled:    bool,
    risk_level: RiskLevel,
    allowed:    Vec<&'static str>,
    show:       Regex,
    describe:   Regex,
    use_db:     Regex
}

impl MetadataStatementChecker {
    pub fn new(config: &MetadataStatementConfig) -> GuardResult<Self> {
        let allowed = config
            .allowed_statements
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| canonical_name(s, METADATA_STATEMENTS, "metadata statement"))
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self {
            enabled: config.enabled,
            risk_level: config.risk_level,
            allowed,
            show: leading(r"^\s*SHOW\s+(\w+)?")?,
            describe: leading(r"^\s*(?:DESCRIBE|DESC)\s+(\S+)?")?,
            use_db: leading(r"^\s*USE\s+(\S+)?")?
        })
    }

    /// Kind of a leading metadata statement and a label such as
    /// `SHOW TABLES`.
    pub fn metadata_statement(&self, sql: &str) -> Option<(&'static str, String)> {
        if let Some(captures) = self.show.captures(sql) {
            return Some(("SHOW", format!("SHOW {}", group(&captures, 1).to_uppercase())));
        }
        if let Some(captures) = self.describe.captures(sql) {
            return Some(("DESCRIBE", format!("DESCRIBE {}", group(&captures, 1))));
        }
        self.use_db
            .captures(sql)
            .map(|captures| ("USE", format!("USE {}", group(&captures, 1))))
    }
}

impl RuleChecker for MetadataStatementChecker {
    fn info(&self) -> CheckerInfo {
        CheckerInfo {
            id:       "SEC011",
            name:     "Metadata statement",
            category: CheckerCategory::Security
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(&self, ctx: &ExecutionContext, result: &mut ValidationResult) -> GuardResult<()> {
        let Some((kind, label)) = self.metadata_statement(ctx.sql()) else {
            return Ok(());
        };
        if !self.allowed.contains(&kind) {
            result.add_violation(
                self.risk_level,
                format!("Metadata statement {} exposes schema information", label),
                "Query INFORMATION_SCHEMA or name the database in the connection settings"
            );
        }
        Ok(())
    }
}
