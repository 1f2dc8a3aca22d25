use sql_guard::{
    GuardError,
    context::{ExecutionContext, ExecutionLayer, RowBounds, SqlCommandType},
    parser::SqlParserFacade
};

#[test]
fn test_command_type_from_sql() {
    assert_eq!(SqlCommandType::from_sql("  select * from t"), SqlCommandType::Select);
    assert_eq!(SqlCommandType::from_sql("WITH x AS (SELECT 1) SELECT * FROM x"), SqlCommandType::Select);
    assert_eq!(SqlCommandType::from_sql("(SELECT 1)"), SqlCommandType::Select);
    assert_eq!(SqlCommandType::from_sql("UPDATE t SET a = 1"), SqlCommandType::Update);
    assert_eq!(SqlCommandType::from_sql("delete from t"), SqlCommandType::Delete);
    assert_eq!(SqlCommandType::from_sql("REPLACE INTO t VALUES (1)"), SqlCommandType::Insert);
    assert_eq!(SqlCommandType::from_sql("TRUNCATE t"), SqlCommandType::Unknown);
}

#[test]
fn test_command_type_from_statement() {
    let facade = SqlParserFacade::default();
    let ast = facade.try_parse("DELETE FROM t WHERE id = 1").unwrap();
    assert_eq!(SqlCommandType::from_statement(&ast), SqlCommandType::Delete);
    let ast = facade.try_parse("INSERT INTO t (id) VALUES (1)").unwrap();
    assert_eq!(SqlCommandType::from_statement(&ast), SqlCommandType::Insert);
    assert_eq!(SqlCommandType::Update.to_string(), "UPDATE");
}

#[test]
fn test_builder_fields() {
    let ctx = ExecutionContext::builder("SELECT * FROM users WHERE id = ?", SqlCommandType::Select)
        .execution_layer(ExecutionLayer::Orm)
        .statement_id("UserMapper.selectById")
        .param("id", 7)
        .datasource("primary")
        .row_bounds(RowBounds::new(40, 20))
        .page_parameter(true)
        .build()
        .unwrap();
    assert_eq!(ctx.sql(), "SELECT * FROM users WHERE id = ?");
    assert_eq!(ctx.command_type(), SqlCommandType::Select);
    assert_eq!(ctx.execution_layer(), ExecutionLayer::Orm);
    assert_eq!(ctx.statement_id(), Some("UserMapper.selectById"));
    assert_eq!(ctx.params().and_then(|p| p.get("id")), Some(&serde_json::json!(7)));
    assert_eq!(ctx.datasource(), Some("primary"));
    assert_eq!(ctx.row_bounds(), Some(RowBounds::new(40, 20)));
    assert!(ctx.has_page_parameter());
    assert!(ctx.statement().is_none());
}

#[test]
fn test_builder_defaults() {
    let ctx = ExecutionContext::from_sql("UPDATE t SET a = 1").unwrap();
    assert_eq!(ctx.command_type(), SqlCommandType::Update);
    assert_eq!(ctx.execution_layer(), ExecutionLayer::Unknown);
    assert!(ctx.statement_id().is_none());
    assert!(ctx.params().is_none());
    assert!(ctx.row_bounds().is_none());
    assert!(!ctx.has_page_parameter());
}

#[test]
fn test_empty_sql_rejected() {
    assert!(matches!(ExecutionContext::from_sql("   "), Err(GuardError::Configuration(_))));
    assert!(ExecutionContext::builder("", SqlCommandType::Select).build().is_err());
}

#[test]
fn test_with_statement_leaves_original_untouched() {
    let ctx = ExecutionContext::from_sql("SELECT * FROM users").unwrap();
    let ast = SqlParserFacade::default().try_parse(ctx.sql()).unwrap();
    let parsed = ctx.with_statement(ast.clone());
    assert!(ctx.statement().is_none());
    assert!(parsed.ast().is_some_and(|a| std::sync::Arc::ptr_eq(a, &ast)));
    assert_eq!(parsed.sql(), ctx.sql());
}
