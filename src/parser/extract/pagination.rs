use sqlparser::ast::{Expr, LimitClause, OrderByKind, Query, Statement, TopQuantity, Value};

use super::plain_select;

/// Unsigned integer value of a numeric literal.
pub fn literal_u64(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::Value(val) => match &val.value {
            Value::Number(n, _) => n.parse().ok(),
            _ => None
        },
        Expr::Nested(inner) => literal_u64(inner),
        _ => None
    }
}

/// True when a SELECT carries LIMIT / OFFSET, FETCH or TOP.
pub fn has_pagination_clause(statement: &Statement) -> bool {
    let Statement::Query(query) = statement else {
        return false;
    };
    query.limit_clause.is_some()
        || query.fetch.is_some()
        || plain_select(query).is_some_and(|s| s.top.is_some())
}

/// Page size of a SELECT: `LIMIT n`, `LIMIT o, n`, `FETCH FIRST n ROWS` or
/// `TOP n`. Non-literal sizes (bind parameters) yield `None`.
pub fn extract_limit(statement: &Statement) -> Option<u64> {
    let Statement::Query(query) = statement else {
        return None;
    };
    query_limit(query)
}

/// Row offset of a SELECT: `OFFSET o` or `LIMIT o, n`.
pub fn extract_offset(statement: &Statement) -> Option<u64> {
    let Statement::Query(query) = statement else {
        return None;
    };
    match query.limit_clause.as_ref()? {
        LimitClause::LimitOffset {
            offset, ..
        } => offset.as_ref().and_then(|o| literal_u64(&o.value)),
        LimitClause::OffsetCommaLimit {
            offset, ..
        } => literal_u64(offset)
    }
}

/// True when a SELECT has a non-empty ORDER BY.
pub fn has_order_by(statement: &Statement) -> bool {
    let Statement::Query(query) = statement else {
        return false;
    };
    query
        .order_by
        .as_ref()
        .is_some_and(|o| !matches!(&o.kind, OrderByKind::Expressions(exprs) if exprs.is_empty()))
}

fn query_limit(query: &Query) -> Option<u64> {
    if let Some(limit_clause) = &query.limit_clause {
        let limit = match limit_clause {
            LimitClause::LimitOffset {
                limit, ..
            } => limit.as_ref(),
            LimitClause::OffsetCommaLimit {
                limit, ..
            } => Some(limit)
        };
        if let Some(limit) = limit {
            return literal_u64(limit);
        }
    }
    if let Some(fetch) = &query.fetch {
        return fetch.quantity.as_ref().and_then(literal_u64);
    }
    let top = plain_select(query)?.top.as_ref()?;
    match top.quantity.as_ref()? {
        TopQuantity::Constant(n) => Some(*n),
        TopQuantity::Expr(expr) => literal_u64(expr)
    }
}
