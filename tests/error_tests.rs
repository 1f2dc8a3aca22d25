// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_guard::{
    GuardError, RiskLevel,
    error::{
        AppError, SQL_SNIPPET_MAX_LENGTH, SqlPosition, checker_error, config_error, parse_error,
        sql_snippet
    },
    parser::SqlParserFacade
};

#[test]
fn test_snippet_short_sql_unchanged() {
    assert_eq!(sql_snippet("SELECT 1"), "SELECT 1");
}

#[test]
fn test_snippet_truncates_long_sql() {
    let sql = format!("SELECT {} FROM t", "a, ".repeat(60));
    let snippet = sql_snippet(&sql);
    assert!(snippet.ends_with("..."));
    assert_eq!(snippet.chars().count(), SQL_SNIPPET_MAX_LENGTH + 3);
    assert!(sql.starts_with(snippet.trim_end_matches("...")));
}

#[test]
fn test_snippet_respects_char_boundaries() {
    let sql = "é".repeat(150);
    let snippet = sql_snippet(&sql);
    assert_eq!(snippet.chars().count(), SQL_SNIPPET_MAX_LENGTH + 3);
}

#[test]
fn test_parse_error_display() {
    let err = parse_error("SELEC * FROM x", "Expected an SQL statement");
    assert!(err.is_parse());
    assert_eq!(
        err.to_string(),
        "Failed to parse SQL: SELEC * FROM x - Reason: Expected an SQL statement"
    );
}

#[test]
fn test_parse_error_position() {
    let err = parse_error("SELECT FROM", "Expected: identifier at Line: 1, Column: 8");
    match err {
        GuardError::Parse {
            position, ..
        } => assert_eq!(
            position,
            Some(SqlPosition {
                line:   1,
                column: 8
            })
        ),
        other => panic!("unexpected error: {:?}", other)
    }
}

#[test]
fn test_facade_error_quotes_sql() {
    let err = SqlParserFacade::default().try_parse("SELEC * FROM x").unwrap_err();
    assert!(err.is_parse());
    assert!(err.to_string().contains("SELEC * FROM x"));
}

#[test]
fn test_other_variants_display() {
    assert_eq!(config_error("bad").to_string(), "Invalid configuration: bad");
    assert_eq!(checker_error("WHERE001", "boom").to_string(), "Checker WHERE001 failed: boom");
    let blocked = GuardError::Blocked {
        risk_level:   RiskLevel::High,
        statement_id: None,
        message:      "[HIGH] x".into()
    };
    assert_eq!(blocked.to_string(), "SQL blocked with risk level HIGH: [HIGH] x");
    assert!(!blocked.is_parse());
}

#[test]
fn test_into_app_error() {
    let errors = [
        parse_error("SELEC", "Expected: statement at Line: 1, Column: 1"),
        parse_error("SELEC", "Unexpected token"),
        config_error("bad"),
        checker_error("SEC001", "boom")
    ];
    for err in errors {
        let _app: AppError = err.into();
    }
}
