use compact_str::CompactString;
use indexmap::IndexSet;
use sqlparser::ast::{
    Expr, OrderBy, OrderByKind, Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins
};

use super::{expr::child_exprs, table::normalize_table_name};

/// Lowercased names of every function called by a statement, in first-seen
/// order.
///
/// Covers the SELECT list, WHERE, HAVING and ORDER BY of every query block
/// (CTEs, derived tables and subqueries included), UPDATE assignments, and
/// INSERT values or source queries. Schema prefixes are dropped.
pub fn extract_functions(statement: &Statement) -> IndexSet<CompactString> {
    let mut functions = IndexSet::new();
    match statement {
        Statement::Query(query) => collect_query(query, &mut functions),
        Statement::Update(update) => {
            for assignment in &update.assignments {
                collect_expr(&assignment.value, &mut functions);
            }
            if let Some(selection) = &update.selection {
                collect_expr(selection, &mut functions);
            }
        }
        Statement::Delete(delete) => {
            if let Some(selection) = &delete.selection {
                collect_expr(selection, &mut functions);
            }
        }
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                collect_query(source, &mut functions);
            }
        }
        _ => {}
    }
    functions
}

fn collect_query(query: &Query, functions: &mut IndexSet<CompactString>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_query(&cte.query, functions);
        }
    }
    collect_set_expr(&query.body, functions);
    if let Some(OrderBy {
        kind: OrderByKind::Expressions(exprs),
        ..
    }) = &query.order_by
    {
        for order in exprs {
            collect_expr(&order.expr, functions);
        }
    }
}

fn collect_set_expr(set_expr: &SetExpr, functions: &mut IndexSet<CompactString>) {
    match set_expr {
        SetExpr::Select(select) => {
            for item in &select.projection {
                if let SelectItem::UnnamedExpr(expr)
                | SelectItem::ExprWithAlias {
                    expr, ..
                } = item
                {
                    collect_expr(expr, functions);
                }
            }
            for table in &select.from {
                collect_table_with_joins(table, functions);
            }
            for expr in select.selection.iter().chain(&select.having) {
                collect_expr(expr, functions);
            }
        }
        SetExpr::Query(query) => collect_query(query, functions),
        SetExpr::SetOperation {
            left,
            right,
            ..
        } => {
            collect_set_expr(left, functions);
            collect_set_expr(right, functions);
        }
        SetExpr::Values(values) => {
            for expr in values.rows.iter().flatten() {
                collect_expr(expr, functions);
            }
        }
        _ => {}
    }
}

fn collect_table_with_joins(table: &TableWithJoins, functions: &mut IndexSet<CompactString>) {
    for factor in std::iter::once(&table.relation).chain(table.joins.iter().map(|j| &j.relation)) {
        match factor {
            TableFactor::Derived {
                subquery, ..
            } => collect_query(subquery, functions),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => collect_table_with_joins(table_with_joins, functions),
            _ => {}
        }
    }
}

fn collect_expr(expr: &Expr, functions: &mut IndexSet<CompactString>) {
    match expr {
        Expr::Function(func) => {
            let name = normalize_table_name(&func.name.to_string()).to_lowercase();
            if !name.is_empty() {
                functions.insert(name.into());
            }
        }
        Expr::Subquery(subquery)
        | Expr::Exists {
            subquery, ..
        }
        | Expr::InSubquery {
            subquery, ..
        } => collect_query(subquery, functions),
        _ => {}
    }
    for child in child_exprs(expr) {
        collect_expr(child, functions);
    }
}
