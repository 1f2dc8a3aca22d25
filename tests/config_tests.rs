// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::io::Write;

use sql_guard::{
    GuardConfig, GuardError, RiskLevel, RuleCheckerOrchestrator, ViolationStrategy,
    parser::{ParseMode, SqlDialect}
};

#[test]
fn test_defaults() {
    let config = GuardConfig::default();
    assert_eq!(config.parser.mode, ParseMode::FailFast);
    assert_eq!(config.parser.cache_size, 1000);
    assert_eq!(config.parser.dialect, SqlDialect::Generic);
    assert!(config.deduplication.enabled);
    assert_eq!(config.deduplication.ttl_ms, 100);
    assert_eq!(config.strategy.strategy, ViolationStrategy::Log);
    assert_eq!(config.strategy.block_threshold, RiskLevel::High);
    assert_eq!(config.rules.deep_pagination.max_offset, 10_000);
    assert_eq!(config.rules.large_page_size.max_page_size, 1_000);
    assert_eq!(config.rules.dummy_condition.patterns.len(), 4);
    assert!(config.rules.denied_table.tables.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_toml_is_default() {
    let config = GuardConfig::from_toml_str("").unwrap();
    assert_eq!(config.rules.no_where_clause.risk_level, RiskLevel::Critical);
    assert!(!config.rules.pagination.pagination_plugin);
}

#[test]
fn test_toml_sections() {
    let config = GuardConfig::from_toml_str(
        r#"
[parser]
mode = "lenient"
cache_size = 50
dialect = "mysql"

[deduplication]
enabled = false

[rules]
disabled = ["PAGE005"]

[rules.pagination]
pagination_plugin = true
limiting_fields = ["^id$", "_id$"]
tables = { exclude = ["sys_dict"] }

[rules.deep_pagination]
max_offset = 5000
risk_level = "high"

[rules.whitelist_field.by_table]
user = ["id", "user_id"]

[rules.denied_table]
tables = ["sys_*"]

[strategy]
strategy = "block"
block_threshold = "CRITICAL"
"#
    )
    .unwrap();
    assert_eq!(config.parser.mode, ParseMode::Lenient);
    assert_eq!(config.parser.cache_size, 50);
    assert_eq!(config.parser.dialect, SqlDialect::MySql);
    assert!(!config.deduplication.enabled);
    assert!(config.rules.is_disabled("page005"));
    assert!(config.rules.pagination.pagination_plugin);
    assert_eq!(config.rules.pagination.limiting_fields.len(), 2);
    assert_eq!(config.rules.pagination.tables.exclude, ["sys_dict"]);
    assert_eq!(config.rules.deep_pagination.max_offset, 5000);
    assert_eq!(config.rules.deep_pagination.risk_level, RiskLevel::High);
    assert_eq!(config.rules.whitelist_field.by_table["user"], ["id", "user_id"]);
    assert_eq!(config.rules.denied_table.tables, ["sys_*"]);
    assert_eq!(config.strategy.strategy, ViolationStrategy::Block);
    assert_eq!(config.strategy.block_threshold, RiskLevel::Critical);
}

#[test]
fn test_yaml_sections() {
    let config = GuardConfig::from_yaml_str(
        r#"
parser:
  dialect: postgresql
rules:
  no_where_clause:
    check_select: false
    small_tables: [sys_dict]
  no_pagination:
    whitelist_tables: [config]
    enforce_for_all_queries: true
  blacklist_field:
    fields: [deleted, "create_*"]
"#
    )
    .unwrap();
    assert_eq!(config.parser.dialect, SqlDialect::PostgreSql);
    assert!(!config.rules.no_where_clause.check_select);
    assert_eq!(config.rules.no_where_clause.small_tables, ["sys_dict"]);
    assert!(config.rules.no_pagination.enforce_for_all_queries);
    assert_eq!(config.rules.no_pagination.whitelist_tables, ["config"]);
    assert_eq!(config.rules.blacklist_field.fields, ["deleted", "create_*"]);
}

#[test]
fn test_security_sections() {
    let config = GuardConfig::from_toml_str(
        r#"
[rules.ddl_operation]
allowed_operations = ["CREATE"]

[rules.dangerous_function]
denied_functions = ["sleep"]

[rules.readonly_table]
tables = ["audit_*"]

[rules.set_operation]
allowed_operations = ["UNION_ALL"]

[rules.sql_comment]
allow_hint_comments = true

[rules.set_statement]
enabled = false

[rules.metadata_statement]
allowed_statements = ["SHOW"]
risk_level = "medium"
"#
    )
    .unwrap();
    let rules = &config.rules;
    assert_eq!(rules.ddl_operation.allowed_operations, ["CREATE"]);
    assert_eq!(rules.dangerous_function.denied_functions, ["sleep"]);
    assert_eq!(rules.readonly_table.tables, ["audit_*"]);
    assert_eq!(rules.readonly_table.risk_level, RiskLevel::High);
    assert_eq!(rules.set_operation.allowed_operations, ["UNION_ALL"]);
    assert!(rules.sql_comment.allow_hint_comments);
    assert!(!rules.set_statement.enabled);
    assert_eq!(rules.metadata_statement.risk_level, RiskLevel::Medium);
    assert!(rules.into_outfile.enabled);
    assert_eq!(rules.call_statement.risk_level, RiskLevel::High);
    assert!(RuleCheckerOrchestrator::from_config(rules).is_ok());
}

#[test]
fn test_security_defaults() {
    let rules = GuardConfig::default().rules;
    assert_eq!(rules.dangerous_function.denied_functions.len(), 11);
    assert!(rules.ddl_operation.allowed_operations.is_empty());
    assert_eq!(rules.set_statement.risk_level, RiskLevel::Medium);
    assert!(!rules.sql_comment.allow_hint_comments);
}

#[test]
fn test_invalid_security_names_fail_on_build() {
    let config = GuardConfig::from_toml_str(
        "[rules.set_operation]\nallowed_operations = [\"CROSS_JOIN\"]"
    )
    .unwrap();
    assert!(config.validate().is_ok());
    assert!(matches!(
        RuleCheckerOrchestrator::from_config(&config.rules),
        Err(GuardError::Configuration(_))
    ));
}

#[test]
fn test_invalid_toml() {
    assert!(matches!(
        GuardConfig::from_toml_str("[parser\nmode = 1"),
        Err(GuardError::Configuration(_))
    ));
    assert!(GuardConfig::from_toml_str("[strategy]\nstrategy = \"explode\"").is_err());
}

#[test]
fn test_validate_rejects_zero_values() {
    let mut config = GuardConfig::default();
    config.parser.cache_size = 0;
    assert!(config.validate().is_err());

    let mut config = GuardConfig::default();
    config.deduplication.cache_size = 0;
    assert!(config.validate().is_err());
    config.deduplication.enabled = false;
    assert!(config.validate().is_ok());

    let mut config = GuardConfig::default();
    config.rules.large_page_size.max_page_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_patternless_dummy_checker() {
    let mut config = GuardConfig::default();
    config.rules.dummy_condition.patterns.clear();
    assert!(config.validate().is_err());
    config.rules.dummy_condition.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_limiting_field_regex() {
    let config = GuardConfig::from_toml_str("[rules.pagination]\nlimiting_fields = [\"[\"]").unwrap();
    assert!(config.validate().is_ok());
    assert!(matches!(
        RuleCheckerOrchestrator::from_config(&config.rules),
        Err(GuardError::Configuration(_))
    ));
}

#[test]
fn test_load_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[rules.deep_pagination]\nmax_offset = 2000").unwrap();
    let config = GuardConfig::load(file.path()).unwrap();
    assert_eq!(config.rules.deep_pagination.max_offset, 2000);
}

#[test]
fn test_load_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "rules:\n  large_page_size:\n    max_page_size: 200").unwrap();
    let config = GuardConfig::load(file.path()).unwrap();
    assert_eq!(config.rules.large_page_size.max_page_size, 200);
}

#[test]
fn test_load_validates() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[parser]\ncache_size = 0").unwrap();
    assert!(GuardConfig::load(file.path()).is_err());
}

#[test]
fn test_load_missing_file() {
    let err = GuardConfig::load("/nonexistent/sql-guard.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
