//! Null-safe extraction helpers over parsed statements.

mod expr;
mod function;
mod pagination;
mod table;

pub use expr::{collect_fields, extract_fields};
pub use function::extract_functions;
pub use pagination::{extract_limit, extract_offset, has_order_by, has_pagination_clause, literal_u64};
use sqlparser::ast::{Delete, Expr, FromTable, Query, Select, SetExpr, Statement, TableWithJoins};
pub use table::{extract_all_tables, extract_table_name, normalize_table_name, strip_delimiters};

/// Plain `SELECT` body of a query, looking through parenthesized queries.
///
/// Set operations (`UNION`, `INTERSECT`, ...) and `VALUES` bodies yield
/// `None`.
pub fn plain_select(query: &Query) -> Option<&Select> {
    match query.body.as_ref() {
        SetExpr::Select(select) => Some(select.as_ref()),
        SetExpr::Query(inner) => plain_select(inner),
        _ => None
    }
}

/// WHERE predicate of a SELECT, UPDATE or DELETE.
///
/// INSERT and every other statement shape yield `None`.
pub fn extract_where(statement: &Statement) -> Option<&Expr> {
    match statement {
        Statement::Query(query) => plain_select(query)?.selection.as_ref(),
        Statement::Update(update) => update.selection.as_ref(),
        Statement::Delete(delete) => delete.selection.as_ref(),
        _ => None
    }
}

pub(crate) fn delete_from(delete: &Delete) -> &[TableWithJoins] {
    match &delete.from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables
    }
}
