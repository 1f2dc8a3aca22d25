//! Engine configuration.
//!
//! The caller loads one file and builds the validator from it. Every section
//! and field is optional; omitted values take the defaults listed below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [parser]
//! mode = "fail_fast"           # fail_fast, lenient
//! cache_size = 1000
//! dialect = "mysql"            # generic, mysql, postgresql, sqlite, mssql
//!
//! [deduplication]
//! enabled = true
//! cache_size = 1000
//! ttl_ms = 100
//!
//! [rules]
//! disabled = ["PAGE005"]
//!
//! [rules.pagination]
//! pagination_plugin = true
//! limiting_fields = ["^id$", "_id$"]
//! tables = { exclude = ["sys_dict"] }
//!
//! [rules.deep_pagination]
//! max_offset = 5000
//!
//! [rules.whitelist_field.by_table]
//! user = ["id", "user_id"]
//!
//! [rules.denied_table]
//! tables = ["sys_*"]
//!
//! [rules.set_operation]
//! allowed_operations = ["UNION_ALL"]
//!
//! [rules.sql_comment]
//! allow_hint_comments = true
//!
//! [strategy]
//! strategy = "block"           # block, warn, log
//! block_threshold = "HIGH"
//! ```
//!
//! YAML files (`.yml`, `.yaml`) use the same layout.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SQL_GUARD_LENIENT` | `true`/`1` forces lenient parsing, `false`/`0` fail-fast |

use std::{env, fs, path::Path};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;

use crate::{
    cache::DEFAULT_CACHE_SIZE,
    dedup::{DEFAULT_DEDUP_CACHE_SIZE, DEFAULT_DEDUP_TTL_MS},
    error::{GuardResult, config_error},
    parser::{ParseMode, SqlDialect},
    rules::{RiskLevel, TableFilter},
    strategy::ViolationStrategy
};

/// Environment variable overriding [`ParserConfig::mode`].
pub const LENIENT_ENV: &str = "SQL_GUARD_LENIENT";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub parser:        ParserConfig,
    pub deduplication: DeduplicationConfig,
    pub rules:         RulesConfig,
    pub strategy:      StrategyConfig
}

/// AST facade settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub mode:       ParseMode,
    pub cache_size: usize,
    pub dialect:    SqlDialect
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode:       ParseMode::FailFast,
            cache_size: DEFAULT_CACHE_SIZE,
            dialect:    SqlDialect::Generic
        }
    }
}

/// Per-worker deduplication window
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    pub enabled:    bool,
    pub cache_size: usize,
    pub ttl_ms:     u64
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            cache_size: DEFAULT_DEDUP_CACHE_SIZE,
            ttl_ms:     DEFAULT_DEDUP_TTL_MS
        }
    }
}

/// Caller-side handling of findings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub strategy:        ViolationStrategy,
    /// Lowest risk level refused by [`ViolationStrategy::Block`]
    pub block_threshold: RiskLevel
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy:        ViolationStrategy::default(),
            block_threshold: RiskLevel::High
        }
    }
}

/// Checker configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled checker IDs
    pub disabled:                Vec<String>,
    pub pagination:              PaginationConfig,
    pub no_where_clause:         NoWhereClauseConfig,
    pub dummy_condition:         DummyConditionConfig,
    pub blacklist_field:         BlacklistFieldConfig,
    pub whitelist_field:         WhitelistFieldConfig,
    pub logical_pagination:      LogicalPaginationConfig,
    pub no_condition_pagination: NoConditionPaginationConfig,
    pub deep_pagination:         DeepPaginationConfig,
    pub large_page_size:         LargePageSizeConfig,
    pub missing_order_by:        MissingOrderByConfig,
    pub no_pagination:           NoPaginationConfig,
    pub multi_statement:         MultiStatementConfig,
    pub denied_table:            DeniedTableConfig,
    pub ddl_operation:           DdlOperationConfig,
    pub dangerous_function:      DangerousFunctionConfig,
    pub readonly_table:          ReadOnlyTableConfig,
    pub set_operation:           SetOperationConfig,
    pub sql_comment:             SqlCommentConfig,
    pub into_outfile:            IntoOutfileConfig,
    pub call_statement:          CallStatementConfig,
    pub set_statement:           SetStatementConfig,
    pub metadata_statement:      MetadataStatementConfig
}

impl RulesConfig {
    /// True when `id` appears in [`RulesConfig::disabled`] (case-insensitive).
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.iter().any(|d| d.eq_ignore_ascii_case(id))
    }
}

/// Settings shared by the pagination checkers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// A physical pagination plugin rewrites row bounds into LIMIT
    pub pagination_plugin: bool,
    /// Column regexes; `col = value` or `col IN (...)` marks the statement as
    /// already bounded
    pub limiting_fields:   Vec<String>,
    pub tables:            TableFilter
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            pagination_plugin: false,
            limiting_fields:   vec![String::from("^id$")],
            tables:            TableFilter::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoWhereClauseConfig {
    pub enabled:           bool,
    /// Severity for UPDATE and DELETE
    pub risk_level:        RiskLevel,
    pub check_select:      bool,
    pub select_risk_level: RiskLevel,
    /// Tables where aggregate-only SELECTs without WHERE are accepted
    pub small_tables:      Vec<CompactString>
}

impl Default for NoWhereClauseConfig {
    fn default() -> Self {
        Self {
            enabled:           true,
            risk_level:        RiskLevel::Critical,
            check_select:      true,
            select_risk_level: RiskLevel::Critical,
            small_tables:      Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DummyConditionConfig {
    pub enabled:         bool,
    pub risk_level:      RiskLevel,
    pub patterns:        Vec<String>,
    pub custom_patterns: Vec<String>
}

impl Default for DummyConditionConfig {
    fn default() -> Self {
        Self {
            enabled:         true,
            risk_level:      RiskLevel::High,
            patterns:        ["1=1", "1<>2", "'a'='a'", "true"]
                .into_iter()
                .map(String::from)
                .collect(),
            custom_patterns: Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlacklistFieldConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel,
    /// Low-selectivity columns; a trailing `*` matches a prefix
    pub fields:     Vec<CompactString>
}

impl Default for BlacklistFieldConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::High,
            fields:     default_blacklist()
        }
    }
}

fn default_blacklist() -> Vec<CompactString> {
    ["deleted", "del_flag", "status", "is_deleted", "enabled", "type"]
        .into_iter()
        .map(CompactString::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhitelistFieldConfig {
    pub enabled:                    bool,
    pub risk_level:                 RiskLevel,
    /// Allow-list for tables without a `by_table` entry
    pub fields:                     Vec<CompactString>,
    /// Allow-list per table
    pub by_table:                   IndexMap<CompactString, Vec<CompactString>>,
    pub enforce_for_unknown_tables: bool
}

impl Default for WhitelistFieldConfig {
    fn default() -> Self {
        Self {
            enabled:                    true,
            risk_level:                 RiskLevel::High,
            fields:                     Vec::new(),
            by_table:                   IndexMap::new(),
            enforce_for_unknown_tables: false
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogicalPaginationConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for LogicalPaginationConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Critical
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoConditionPaginationConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for NoConditionPaginationConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Critical
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeepPaginationConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel,
    pub max_offset: u64
}

impl Default for DeepPaginationConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Medium,
            max_offset: 10_000
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LargePageSizeConfig {
    pub enabled:       bool,
    pub risk_level:    RiskLevel,
    pub max_page_size: u64
}

impl Default for LargePageSizeConfig {
    fn default() -> Self {
        Self {
            enabled:       true,
            risk_level:    RiskLevel::Medium,
            max_page_size: 1_000
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissingOrderByConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for MissingOrderByConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoPaginationConfig {
    pub enabled:                 bool,
    /// Severity of an unpaginated SELECT with a regular WHERE clause
    pub risk_level:              RiskLevel,
    /// Statement-id globs exempt from the check (`UserMapper.*`)
    pub whitelist_statement_ids: Vec<CompactString>,
    pub whitelist_tables:        Vec<CompactString>,
    /// Unique columns besides `id`
    pub unique_key_fields:       Vec<CompactString>,
    pub enforce_for_all_queries: bool
}

impl Default for NoPaginationConfig {
    fn default() -> Self {
        Self {
            enabled:                 true,
            risk_level:              RiskLevel::Medium,
            whitelist_statement_ids: Vec::new(),
            whitelist_tables:        Vec::new(),
            unique_key_fields:       Vec::new(),
            enforce_for_all_queries: false
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultiStatementConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for MultiStatementConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Critical
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeniedTableConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel,
    /// Table names; `*` matches one segment without underscores (`sys_*`)
    pub tables:     Vec<CompactString>
}

impl Default for DeniedTableConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Critical,
            tables:     Vec::new()
        }
    }
}

/// Functions refused by [`DangerousFunctionConfig`] unless overridden
pub const DEFAULT_DENIED_FUNCTIONS: &[&str] = &[
    "load_file",
    "into_outfile",
    "into_dumpfile",
    "sys_exec",
    "sys_eval",
    "sleep",
    "benchmark",
    "pg_sleep",
    "waitfor",
    "xp_cmdshell",
    "dbms_pipe"
];

/// Schema changes at runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DdlOperationConfig {
    pub enabled:            bool,
    pub risk_level:         RiskLevel,
    /// Permitted operations: `CREATE`, `ALTER`, `DROP`, `TRUNCATE`
    pub allowed_operations: Vec<CompactString>
}

impl Default for DdlOperationConfig {
    fn default() -> Self {
        Self {
            enabled:            true,
            risk_level:         RiskLevel::Critical,
            allowed_operations: Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DangerousFunctionConfig {
    pub enabled:          bool,
    pub risk_level:       RiskLevel,
    /// Function names, compared case-insensitively
    pub denied_functions: Vec<CompactString>
}

impl Default for DangerousFunctionConfig {
    fn default() -> Self {
        Self {
            enabled:          true,
            risk_level:       RiskLevel::Critical,
            denied_functions: DEFAULT_DENIED_FUNCTIONS.iter().map(|&f| f.into()).collect()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadOnlyTableConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel,
    /// Table names; a trailing `*` matches any suffix (`audit_*`)
    pub tables:     Vec<CompactString>
}

impl Default for ReadOnlyTableConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::High,
            tables:     Vec::new()
        }
    }
}

/// UNION, INTERSECT, EXCEPT and MINUS
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetOperationConfig {
    pub enabled:            bool,
    pub risk_level:         RiskLevel,
    /// Permitted operations such as `UNION_ALL`; spaces count as `_`
    pub allowed_operations: Vec<CompactString>
}

impl Default for SetOperationConfig {
    fn default() -> Self {
        Self {
            enabled:            true,
            risk_level:         RiskLevel::Critical,
            allowed_operations: Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlCommentConfig {
    pub enabled:             bool,
    pub risk_level:          RiskLevel,
    /// Let `/*+ ... */` optimizer hints through
    pub allow_hint_comments: bool
}

impl Default for SqlCommentConfig {
    fn default() -> Self {
        Self {
            enabled:             true,
            risk_level:          RiskLevel::Critical,
            allow_hint_comments: false
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntoOutfileConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for IntoOutfileConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Critical
        }
    }
}

/// Stored procedure calls (`CALL`, `EXECUTE`, `EXEC`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallStatementConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for CallStatementConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::High
        }
    }
}

/// Session variable changes (`SET ...`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetStatementConfig {
    pub enabled:    bool,
    pub risk_level: RiskLevel
}

impl Default for SetStatementConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            risk_level: RiskLevel::Medium
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataStatementConfig {
    pub enabled:            bool,
    pub risk_level:         RiskLevel,
    /// Permitted statements: `SHOW`, `DESCRIBE`, `USE`
    pub allowed_statements: Vec<CompactString>
}

impl Default for MetadataStatementConfig {
    fn default() -> Self {
        Self {
            enabled:            true,
            risk_level:         RiskLevel::High,
            allowed_statements: Vec::new()
        }
    }
}

impl GuardConfig {
    /// Load configuration from `path`, apply [`LENIENT_ENV`] and validate.
    ///
    /// Files ending in `.yml` or `.yaml` are read as YAML, everything else as
    /// TOML.
    pub fn load(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            config_error(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
        let mut config = if is_yaml {
            Self::from_yaml_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        config.apply_lenient_flag(env::var(LENIENT_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> GuardResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    pub fn from_yaml_str(content: &str) -> GuardResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Reject values no checker can work with.
    ///
    /// Regex and pattern compilation errors surface later, when the checkers
    /// are built.
    pub fn validate(&self) -> GuardResult<()> {
        if self.parser.cache_size == 0 {
            return Err(config_error("parser.cache_size must be greater than 0"));
        }
        if self.deduplication.enabled && self.deduplication.cache_size == 0 {
            return Err(config_error("deduplication.cache_size must be greater than 0"));
        }
        let rules = &self.rules;
        if rules.deep_pagination.max_offset == 0 {
            return Err(config_error("rules.deep_pagination.max_offset must be greater than 0"));
        }
        if rules.large_page_size.max_page_size == 0 {
            return Err(config_error(
                "rules.large_page_size.max_page_size must be greater than 0"
            ));
        }
        let dummy = &rules.dummy_condition;
        if dummy.enabled && dummy.patterns.is_empty() && dummy.custom_patterns.is_empty() {
            return Err(config_error(
                "rules.dummy_condition needs at least one pattern when enabled"
            ));
        }
        Ok(())
    }

    fn apply_lenient_flag(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => self.parser.mode = ParseMode::Lenient,
            "0" | "false" | "no" | "off" => self.parser.mode = ParseMode::FailFast,
            other => warn!(variable = LENIENT_ENV, value = other, "ignoring unrecognized value")
        }
    }
}
