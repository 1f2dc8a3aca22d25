//! Predicates shared by the checkers.
//!
//! All helpers are pure functions over [`sqlparser`] expressions. Column
//! names compare case-insensitively; statement identifiers compare exactly.

use std::cmp::Ordering;

use compact_str::CompactString;
use indexmap::IndexSet;
use serde::Deserialize;
use smallvec::SmallVec;
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};

use crate::error::{GuardResult, config_error};

/// True for a constant: number, string, boolean or NULL, optionally signed or
/// parenthesized. Bind placeholders are not literals.
pub fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Value(val) => !matches!(val.value, Value::Placeholder(_)),
        Expr::Nested(inner) => is_literal(inner),
        Expr::UnaryOp {
            op: UnaryOperator::Minus | UnaryOperator::Plus,
            expr
        } => is_literal(expr),
        _ => false
    }
}

/// True for a literal or a bind placeholder such as `?` or `:id`.
pub fn is_bound_value(expr: &Expr) -> bool {
    match expr {
        Expr::Value(_) => true,
        Expr::Nested(inner) => is_bound_value(inner),
        other => is_literal(other)
    }
}

/// Column name referenced by `expr`, qualifier dropped.
pub fn column_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Identifier(ident) => Some(&ident.value),
        Expr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.as_str()),
        Expr::Nested(inner) => column_name(inner),
        _ => None
    }
}

/// Evaluate an expression built only from literals.
///
/// Returns `None` as soon as a column, placeholder, NULL or unsupported
/// operator is involved.
pub fn constant_truth(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Nested(inner) => constant_truth(inner),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr
        } => constant_truth(expr).map(|b| !b),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right
        } => match (constant_truth(left), constant_truth(right)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None
        },
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right
        } => match (constant_truth(left), constant_truth(right)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None
        },
        Expr::BinaryOp {
            left,
            op,
            right
        } => {
            let ordering = Literal::of(left)?.compare(&Literal::of(right)?)?;
            match op {
                BinaryOperator::Eq => Some(ordering == Ordering::Equal),
                BinaryOperator::NotEq => Some(ordering != Ordering::Equal),
                BinaryOperator::Lt => Some(ordering == Ordering::Less),
                BinaryOperator::LtEq => Some(ordering != Ordering::Greater),
                BinaryOperator::Gt => Some(ordering == Ordering::Greater),
                BinaryOperator::GtEq => Some(ordering != Ordering::Less),
                _ => None
            }
        }
        other => match Literal::of(other)? {
            Literal::Bool(b) => Some(b),
            Literal::Number(n) => Some(n != 0.0),
            Literal::Text(_) => None
        }
    }
}

/// True when `expr` always holds: a literal comparison that evaluates to true,
/// a bare `TRUE` or non-zero number, or a column compared to itself
/// (`a = a`, `a >= a`).
pub fn is_tautology(expr: &Expr) -> bool {
    constant_truth(expr) == Some(true) || is_self_comparison(expr)
}

fn is_self_comparison(expr: &Expr) -> bool {
    match expr {
        Expr::Nested(inner) => is_self_comparison(inner),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq | BinaryOperator::LtEq | BinaryOperator::GtEq,
            right
        } => matches!(
            (left.as_ref(), right.as_ref()),
            (Expr::Identifier(_) | Expr::CompoundIdentifier(_), _) if left == right
        ),
        _ => false
    }
}

/// Canonical form for textual condition patterns: lowercase, whitespace
/// removed.
pub fn normalize_condition(text: &str) -> CompactString {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// True when the predicate is a tautology or any of its AND/OR operands is.
///
/// `patterns` must be normalized with [`normalize_condition`]; a pattern
/// matches an operand only when it covers the whole operand text.
pub fn contains_dummy_condition(expr: &Expr, patterns: &[CompactString]) -> bool {
    if is_tautology(expr) {
        return true;
    }
    let mut operands = SmallVec::<[&Expr; 8]>::new();
    collect_operands(expr, &mut operands);
    operands.iter().any(|operand| {
        if is_tautology(operand) {
            return true;
        }
        if patterns.is_empty() {
            return false;
        }
        let text = normalize_condition(&operand.to_string());
        patterns.iter().any(|p| *p == text)
    })
}

fn collect_operands<'a>(expr: &'a Expr, operands: &mut SmallVec<[&'a Expr; 8]>) {
    match expr {
        Expr::Nested(inner) => collect_operands(inner, operands),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And | BinaryOperator::Or,
            right
        } => {
            collect_operands(left, operands);
            collect_operands(right, operands);
        }
        other => operands.push(other)
    }
}

/// Case-insensitive field match; a trailing `*` matches any suffix
/// (`create_*` matches `create_time`).
pub fn matches_field_pattern(field: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => field
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        None => field.eq_ignore_ascii_case(pattern)
    }
}

/// True when `fields` is non-empty and every field matches some pattern.
pub fn all_fields_match(fields: &IndexSet<CompactString>, patterns: &[CompactString]) -> bool {
    !fields.is_empty()
        && fields
            .iter()
            .all(|f| patterns.iter().any(|p| matches_field_pattern(f, p)))
}

/// Glob match where `*` stands for any run of characters, `.` is literal.
pub fn matches_wildcard(text: &str, pattern: &str) -> bool {
    let (text, pattern) = (text.as_bytes(), pattern.as_bytes());
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}

/// True when `statement_id` matches any of the glob `patterns`.
pub fn matches_any_wildcard(statement_id: Option<&str>, patterns: &[CompactString]) -> bool {
    statement_id.is_some_and(|id| patterns.iter().any(|p| matches_wildcard(id, p)))
}

/// Table allow/deny lists.
///
/// An excluded table is never checked. When `include` is non-empty only the
/// listed tables are checked. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableFilter {
    pub include: Vec<CompactString>,
    pub exclude: Vec<CompactString>
}

impl TableFilter {
    pub fn allows(&self, table: Option<&str>) -> bool {
        let Some(table) = table else {
            return self.include.is_empty();
        };
        let listed = |names: &[CompactString]| names.iter().any(|n| n.eq_ignore_ascii_case(table));
        if listed(self.exclude.as_slice()) {
            return false;
        }
        self.include.is_empty() || listed(self.include.as_slice())
    }
}

/// True when the predicate pins a key column: `key = value` or
/// `key IN (values)` reachable through AND, or on both sides of an OR.
pub fn has_key_condition<F>(expr: &Expr, is_key: &F) -> bool
where
    F: Fn(&str) -> bool
{
    match expr {
        Expr::Nested(inner) => has_key_condition(inner, is_key),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right
        } => has_key_condition(left, is_key) || has_key_condition(right, is_key),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right
        } => has_key_condition(left, is_key) && has_key_condition(right, is_key),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right
        } => {
            let pinned = |col: &Expr, val: &Expr| {
                column_name(col).is_some_and(is_key) && is_bound_value(val)
            };
            pinned(left, right) || pinned(right, left)
        }
        Expr::InList {
            expr,
            list,
            negated: false
        } => {
            column_name(expr).is_some_and(is_key)
                && !list.is_empty()
                && list.iter().all(is_bound_value)
        }
        _ => false
    }
}

enum Literal<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool)
}

impl<'a> Literal<'a> {
    fn of(expr: &'a Expr) -> Option<Self> {
        match expr {
            Expr::Nested(inner) => Self::of(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr
            } => match Self::of(expr)? {
                Self::Number(n) => Some(Self::Number(-n)),
                _ => None
            },
            Expr::Value(val) => match &val.value {
                Value::Number(n, _) => n.parse().ok().map(Self::Number),
                Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Some(Self::Text(s)),
                Value::Boolean(b) => Some(Self::Bool(*b)),
                _ => None
            },
            _ => None
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None
        }
    }
}

/// Case-insensitive lookup of `name` in `valid`, after trimming and turning
/// spaces into underscores.
pub(crate) fn canonical_name(
    name: &str,
    valid: &'static [&'static str],
    kind: &str
) -> GuardResult<&'static str> {
    let normalized = name.trim().to_uppercase().replace(' ', "_");
    valid
        .iter()
        .copied()
        .find(|v| *v == normalized)
        .ok_or_else(|| {
            config_error(format!(
                "Invalid {} '{}': expected one of {}",
                kind,
                name,
                valid.join(", ")
            ))
        })
}
