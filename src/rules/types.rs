//! Type definitions for the rule checker system.
//!
//! - [`RiskLevel`] - ordered severity of a finding (SAFE .. CRITICAL)
//! - [`CheckerCategory`] - checker grouping for configuration and reporting
//! - [`CheckerInfo`] - checker metadata
//! - [`ViolationInfo`] - a single finding
//! - [`ValidationResult`] - accumulator shared by the checkers of one call

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr
};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, config_error};

/// Severity of a violation.
///
/// Ordered from lowest to highest so that `max` yields the aggregate risk of a
/// result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// No finding
    #[default]
    #[serde(alias = "safe")]
    Safe,
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "critical")]
    Critical
}

impl RiskLevel {
    /// Numeric projection (SAFE = 0 .. CRITICAL = 4).
    pub const fn severity(self) -> u8 {
        self as u8
    }

    pub fn is_at_least(self, other: Self) -> bool {
        self >= other
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL")
        }
    }
}

impl FromStr for RiskLevel {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(config_error(format!("Unknown risk level '{}'", other)))
        }
    }
}

/// Category of a checker for grouping and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckerCategory {
    /// WHERE clause quality (missing, dummy, low selectivity)
    Filtering,
    /// Pagination abuse
    Pagination,
    /// Dangerous statement shapes and protected tables
    Security
}

impl fmt::Display for CheckerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtering => write!(f, "Filtering"),
            Self::Pagination => write!(f, "Pagination"),
            Self::Security => write!(f, "Security")
        }
    }
}

/// Metadata about a checker for identification and configuration.
#[derive(Debug, Clone)]
pub struct CheckerInfo {
    /// Unique checker identifier (e.g., "WHERE001")
    pub id:       &'static str,
    /// Human-readable checker name
    pub name:     &'static str,
    pub category: CheckerCategory
}

/// A single finding.
///
/// Two violations are equal when severity and message match; the suggestion
/// does not take part in equality or hashing.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationInfo {
    risk_level: RiskLevel,
    message:    String,
    suggestion: Option<String>
}

impl ViolationInfo {
    pub fn new(risk_level: RiskLevel, message: impl Into<String>) -> Self {
        Self {
            risk_level,
            message: message.into(),
            suggestion: None
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }
}

impl PartialEq for ViolationInfo {
    fn eq(&self, other: &Self) -> bool {
        self.risk_level == other.risk_level && self.message == other.message
    }
}

impl Eq for ViolationInfo {}

impl Hash for ViolationInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.risk_level.hash(state);
        self.message.hash(state);
    }
}

impl fmt::Display for ViolationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.risk_level, self.message)
    }
}

/// Outcome of validating one statement.
///
/// `risk_level` always equals the highest severity among `violations` and
/// `passed` is true exactly when there are none. The result only widens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    passed:     bool,
    risk_level: RiskLevel,
    violations: Vec<ViolationInfo>,
    details:    IndexMap<CompactString, serde_json::Value>
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl ValidationResult {
    /// Result with no violations.
    pub fn pass() -> Self {
        Self {
            passed:     true,
            risk_level: RiskLevel::Safe,
            violations: Vec::new(),
            details:    IndexMap::new()
        }
    }

    /// Append a violation with a remediation suggestion.
    pub fn add_violation(
        &mut self,
        risk_level: RiskLevel,
        message: impl Into<String>,
        suggestion: impl Into<String>
    ) {
        self.push(ViolationInfo::new(risk_level, message).with_suggestion(suggestion));
    }

    pub fn push(&mut self, violation: ViolationInfo) {
        self.risk_level = self.risk_level.max(violation.risk_level);
        self.passed = false;
        self.violations.push(violation);
    }

    /// Fold all violations and details of `other` into this result.
    pub fn merge(&mut self, other: ValidationResult) {
        for violation in other.violations {
            self.push(violation);
        }
        self.details.extend(other.details);
    }

    /// Attach a diagnostic value, replacing an earlier one with the same key.
    pub fn insert_detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.into(), value.into());
    }

    pub fn is_passed(&self) -> bool {
        self.passed
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn violations(&self) -> &[ViolationInfo] {
        &self.violations
    }

    pub fn details(&self) -> &IndexMap<CompactString, serde_json::Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }

    pub fn count_at(&self, risk_level: RiskLevel) -> usize {
        self.violations
            .iter()
            .filter(|v| v.risk_level == risk_level)
            .count()
    }

    pub fn into_violations(self) -> Vec<ViolationInfo> {
        self.violations
    }
}
