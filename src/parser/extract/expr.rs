use compact_str::CompactString;
use indexmap::IndexSet;
use smallvec::SmallVec;
use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Query};

use super::plain_select;

/// Column names referenced by a predicate, in first-seen order.
///
/// Table qualifiers are dropped (`u.status` yields `status`) and the WHERE
/// predicates of nested subqueries are included.
pub fn extract_fields(expr: &Expr) -> IndexSet<CompactString> {
    let mut fields = IndexSet::new();
    collect_fields(expr, &mut fields);
    fields
}

pub fn collect_fields(expr: &Expr, fields: &mut IndexSet<CompactString>) {
    match expr {
        Expr::Identifier(ident) => {
            fields.insert(ident.value.as_str().into());
        }
        Expr::CompoundIdentifier(idents) => {
            if let Some(col) = idents.last() {
                fields.insert(col.value.as_str().into());
            }
        }
        Expr::InSubquery {
            expr,
            subquery,
            ..
        } => {
            collect_fields(expr, fields);
            collect_subquery_fields(subquery, fields);
        }
        Expr::Subquery(subquery)
        | Expr::Exists {
            subquery, ..
        } => collect_subquery_fields(subquery, fields),
        other => {
            for child in child_exprs(other) {
                collect_fields(child, fields);
            }
        }
    }
}

fn collect_subquery_fields(query: &Query, fields: &mut IndexSet<CompactString>) {
    if let Some(selection) = plain_select(query).and_then(|s| s.selection.as_ref()) {
        collect_fields(selection, fields);
    }
}

/// Direct operands of an expression.
///
/// Identifiers, literals and subqueries have none; callers decide how far to
/// follow a subquery.
pub(crate) fn child_exprs(expr: &Expr) -> SmallVec<[&Expr; 4]> {
    let mut children = SmallVec::new();
    match expr {
        Expr::BinaryOp {
            left,
            right,
            ..
        }
        | Expr::AnyOp {
            left,
            right,
            ..
        }
        | Expr::AllOp {
            left,
            right,
            ..
        }
        | Expr::IsDistinctFrom(left, right)
        | Expr::IsNotDistinctFrom(left, right) => {
            children.push(left.as_ref());
            children.push(right.as_ref());
        }
        Expr::UnaryOp {
            expr, ..
        }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::IsUnknown(expr)
        | Expr::IsNotUnknown(expr)
        | Expr::Cast {
            expr, ..
        }
        | Expr::Extract {
            expr, ..
        }
        | Expr::Ceil {
            expr, ..
        }
        | Expr::Floor {
            expr, ..
        }
        | Expr::Collate {
            expr, ..
        }
        | Expr::InSubquery {
            expr, ..
        } => children.push(expr.as_ref()),
        Expr::Convert {
            expr,
            styles,
            ..
        } => {
            children.push(expr.as_ref());
            children.extend(styles);
        }
        Expr::AtTimeZone {
            timestamp,
            time_zone
        } => {
            children.push(timestamp.as_ref());
            children.push(time_zone.as_ref());
        }
        Expr::Position {
            expr,
            r#in
        } => {
            children.push(expr.as_ref());
            children.push(r#in.as_ref());
        }
        Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            children.push(expr.as_ref());
            children.extend(substring_from.as_deref());
            children.extend(substring_for.as_deref());
        }
        Expr::Trim {
            expr,
            trim_what,
            trim_characters,
            ..
        } => {
            children.push(expr.as_ref());
            children.extend(trim_what.as_deref());
            children.extend(trim_characters.iter().flatten());
        }
        Expr::Overlay {
            expr,
            overlay_what,
            overlay_from,
            overlay_for
        } => {
            children.push(expr.as_ref());
            children.push(overlay_what.as_ref());
            children.push(overlay_from.as_ref());
            children.extend(overlay_for.as_deref());
        }
        Expr::Tuple(items) => children.extend(items),
        Expr::InList {
            expr,
            list,
            ..
        } => {
            children.push(expr.as_ref());
            children.extend(list);
        }
        Expr::Between {
            expr,
            low,
            high,
            ..
        } => {
            children.push(expr.as_ref());
            children.push(low.as_ref());
            children.push(high.as_ref());
        }
        Expr::Like {
            expr,
            pattern,
            ..
        }
        | Expr::ILike {
            expr,
            pattern,
            ..
        }
        | Expr::SimilarTo {
            expr,
            pattern,
            ..
        }
        | Expr::RLike {
            expr,
            pattern,
            ..
        } => {
            children.push(expr.as_ref());
            children.push(pattern.as_ref());
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(arg_list) = &func.args {
                for arg in &arg_list.args {
                    let (FunctionArg::Unnamed(arg)
                    | FunctionArg::Named {
                        arg, ..
                    }
                    | FunctionArg::ExprNamed {
                        arg, ..
                    }) = arg;
                    if let FunctionArgExpr::Expr(e) = arg {
                        children.push(e);
                    }
                }
            }
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            children.extend(operand.as_deref());
            for case_when in conditions {
                children.push(&case_when.condition);
                children.push(&case_when.result);
            }
            children.extend(else_result.as_deref());
        }
        _ => {}
    }
    children
}
