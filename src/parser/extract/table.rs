use compact_str::CompactString;
use indexmap::IndexSet;
use smallvec::SmallVec;
use sqlparser::ast::{
    Expr, Query, SetExpr, Statement, TableFactor, TableWithJoins, UpdateTableFromKind
};

use super::{delete_from, plain_select};

/// Remove one layer of backtick, bracket or double-quote delimiters.
pub fn strip_delimiters(identifier: &str) -> &str {
    let bytes = identifier.as_bytes();
    if bytes.len() >= 2 {
        let pair = (bytes[0], bytes[bytes.len() - 1]);
        if matches!(pair, (b'`', b'`') | (b'[', b']') | (b'"', b'"')) {
            return &identifier[1..identifier.len() - 1];
        }
    }
    identifier
}

/// Bare table name: schema prefix and quoting removed.
pub fn normalize_table_name(raw: &str) -> String {
    let last = raw.rsplit('.').next().unwrap_or(raw);
    strip_delimiters(last.trim()).to_string()
}

/// Primary table of a statement.
///
/// For joins and multi-table statements this is the first table named.
pub fn extract_table_name(statement: &Statement) -> Option<String> {
    let raw = match statement {
        Statement::Query(query) => {
            let select = plain_select(query)?;
            factor_name(&select.from.first()?.relation)?
        }
        Statement::Update(update) => factor_name(&update.table.relation)?,
        Statement::Delete(delete) => match delete.tables.first() {
            Some(name) => name.to_string(),
            None => factor_name(&delete_from(delete).first()?.relation)?
        },
        Statement::Insert(insert) => insert.table.to_string(),
        _ => return None
    };
    Some(normalize_table_name(&raw))
}

/// Every table referenced by a statement, including joins, derived tables,
/// CTEs, `UPDATE ... FROM`, `DELETE ... USING` and subqueries in WHERE, in
/// first-seen order.
pub fn extract_all_tables(statement: &Statement) -> SmallVec<[CompactString; 4]> {
    let mut tables = IndexSet::new();
    match statement {
        Statement::Query(query) => collect_query(query, &mut tables),
        Statement::Update(update) => {
            collect_table_with_joins(&update.table, &mut tables);
            if let Some(from) = &update.from {
                let (UpdateTableFromKind::BeforeSet(from) | UpdateTableFromKind::AfterSet(from)) =
                    from;
                for table in from {
                    collect_table_with_joins(table, &mut tables);
                }
            }
            if let Some(selection) = &update.selection {
                collect_expr(selection, &mut tables);
            }
        }
        Statement::Delete(delete) => {
            for name in &delete.tables {
                insert_table(&name.to_string(), &mut tables);
            }
            for table in delete_from(delete) {
                collect_table_with_joins(table, &mut tables);
            }
            for table in delete.using.iter().flatten() {
                collect_table_with_joins(table, &mut tables);
            }
            if let Some(selection) = &delete.selection {
                collect_expr(selection, &mut tables);
            }
        }
        Statement::Insert(insert) => {
            insert_table(&insert.table.to_string(), &mut tables);
            if let Some(source) = &insert.source {
                collect_query(source, &mut tables);
            }
        }
        _ => {}
    }
    tables.into_iter().collect()
}

fn factor_name(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Table {
            name, ..
        } => Some(name.to_string()),
        _ => None
    }
}

fn insert_table(raw: &str, tables: &mut IndexSet<CompactString>) {
    let name = normalize_table_name(raw);
    if !name.is_empty() {
        tables.insert(name.into());
    }
}

fn collect_query(query: &Query, tables: &mut IndexSet<CompactString>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_query(&cte.query, tables);
        }
    }
    collect_set_expr(&query.body, tables);
}

fn collect_set_expr(set_expr: &SetExpr, tables: &mut IndexSet<CompactString>) {
    match set_expr {
        SetExpr::Select(select) => {
            for table in &select.from {
                collect_table_with_joins(table, tables);
            }
            if let Some(selection) = &select.selection {
                collect_expr(selection, tables);
            }
        }
        SetExpr::Query(query) => collect_query(query, tables),
        SetExpr::SetOperation {
            left,
            right,
            ..
        } => {
            collect_set_expr(left, tables);
            collect_set_expr(right, tables);
        }
        _ => {}
    }
}

fn collect_table_with_joins(table: &TableWithJoins, tables: &mut IndexSet<CompactString>) {
    collect_factor(&table.relation, tables);
    for join in &table.joins {
        collect_factor(&join.relation, tables);
    }
}

fn collect_factor(factor: &TableFactor, tables: &mut IndexSet<CompactString>) {
    match factor {
        TableFactor::Table {
            name, ..
        } => insert_table(&name.to_string(), tables),
        TableFactor::Derived {
            subquery, ..
        } => collect_query(subquery, tables),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, tables),
        _ => {}
    }
}

fn collect_expr(expr: &Expr, tables: &mut IndexSet<CompactString>) {
    match expr {
        Expr::InSubquery {
            expr,
            subquery,
            ..
        } => {
            collect_expr(expr, tables);
            collect_query(subquery, tables);
        }
        Expr::Subquery(subquery)
        | Expr::Exists {
            subquery, ..
        } => collect_query(subquery, tables),
        Expr::BinaryOp {
            left,
            right,
            ..
        } => {
            collect_expr(left, tables);
            collect_expr(right, tables);
        }
        Expr::UnaryOp {
            expr, ..
        }
        | Expr::Nested(expr) => collect_expr(expr, tables),
        Expr::InList {
            expr,
            list,
            ..
        } => {
            collect_expr(expr, tables);
            for item in list {
                collect_expr(item, tables);
            }
        }
        Expr::Between {
            expr,
            low,
            high,
            ..
        } => {
            collect_expr(expr, tables);
            collect_expr(low, tables);
            collect_expr(high, tables);
        }
        _ => {}
    }
}
