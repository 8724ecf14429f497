//! Evaluator for the filter language AST.

use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

use super::ast::{
    BinaryOp, CompareOp, DottedKey, FilterAst, Scalar, UnaryOp, parse_integer, parse_number,
};
use super::error::{FilterError, Result};
use super::regex_cache::regex_cache;

/// Evaluate a filter AST against a record.
///
/// A key that cannot be resolved makes its comparison false rather than
/// failing, including for `!=` and `!~`.
pub fn evaluate_filter(ast: &FilterAst, record: &Value) -> Result<bool> {
    match ast {
        FilterAst::Compare { key, op, value } => match resolve(record, key) {
            None => {
                tracing::trace!("{} not present, comparison is false", key);
                Ok(false)
            }
            Some(actual) => compare(*op, actual, value),
        },

        FilterAst::CompareList { key, op, values } => match resolve(record, key) {
            None => Ok(false),
            Some(actual) => {
                let element_op = op.element_op();
                for candidate in values {
                    if compare(element_op, actual, candidate)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },

        FilterAst::IsDefined { key } => Ok(resolve(record, key).is_some()),

        FilterAst::NotDefined { key } => Ok(resolve(record, key).is_none()),

        FilterAst::Unary { op, operand } => match op {
            UnaryOp::Not => Ok(!evaluate_filter(operand, record)?),
            UnaryOp::Other(name) => Err(FilterError::NotImplemented(format!(
                "unary operator {}",
                name
            ))),
        },

        FilterAst::Binary {
            operands,
            operators,
        } => {
            let all_and = operators.iter().all(|op| op.is_and());
            let all_or = operators.iter().all(|op| *op == BinaryOp::Or);
            if !(all_and || all_or) {
                return Err(FilterError::AmbiguousOperators {
                    operators: describe_operators(operators),
                });
            }

            // Evaluate every operand; an error in any of them fails the node
            let mut results = Vec::with_capacity(operands.len());
            for operand in operands {
                results.push(evaluate_filter(operand, record)?);
            }

            if all_and {
                Ok(results.iter().all(|r| *r))
            } else {
                Ok(results.iter().any(|r| *r))
            }
        }

        FilterAst::Group { expr } => evaluate_filter(expr, record),
    }
}

fn describe_operators(operators: &[BinaryOp]) -> String {
    operators
        .iter()
        .map(|op| match op {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::ImplicitAnd => "(implicit AND)",
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Walk a dotted key through nested objects. Indexing into anything that is
/// not an object counts as missing.
pub fn resolve<'a>(record: &'a Value, key: &DottedKey) -> Option<&'a Value> {
    key.segments()
        .iter()
        .try_fold(record, |current, segment| current.as_object()?.get(segment))
}

/// Apply a comparison to a resolved value.
fn compare(op: CompareOp, actual: &Value, literal: &Scalar) -> Result<bool> {
    match actual {
        Value::Array(items) => match op {
            CompareOp::Ne => Ok(!any_element(CompareOp::Eq, items, literal)?),
            CompareOp::NotMatch => Ok(!any_element(CompareOp::Match, items, literal)?),
            _ => any_element(op, items, literal),
        },
        _ => compare_scalar(op, actual, literal),
    }
}

fn any_element(op: CompareOp, items: &[Value], literal: &Scalar) -> Result<bool> {
    for item in items {
        if compare_scalar(op, item, literal)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn compare_scalar(op: CompareOp, actual: &Value, literal: &Scalar) -> Result<bool> {
    let Some(text) = subject_text(actual) else {
        return Ok(false);
    };

    match op {
        CompareOp::Has => pattern_match(&text, literal),
        CompareOp::Match => regex_match(&text, literal.text()),
        CompareOp::NotMatch => Ok(!regex_match(&text, literal.text())?),
        _ => {
            // Integers compare exactly; f64 only when either side has a
            // fraction or exponent.
            let ordering = match (subject_integer(actual), literal.as_integer()) {
                (Some(left), Some(right)) => Some(left.cmp(&right)),
                _ => match (subject_number(actual), literal.as_f64()) {
                    (Some(left), Some(right)) => left.partial_cmp(&right),
                    _ => Some(text.as_ref().cmp(literal.text())),
                },
            };
            Ok(ordering.is_some_and(ordering_test(op)))
        }
    }
}

/// Map an ordering operator to its test on `actual.cmp(literal)`.
fn ordering_test(op: CompareOp) -> fn(Ordering) -> bool {
    match op {
        CompareOp::Eq => Ordering::is_eq,
        CompareOp::Ne => Ordering::is_ne,
        CompareOp::Lt => Ordering::is_lt,
        CompareOp::Le => Ordering::is_le,
        CompareOp::Gt => Ordering::is_gt,
        CompareOp::Ge => Ordering::is_ge,
        CompareOp::Has | CompareOp::Match | CompareOp::NotMatch => |_| false,
    }
}

/// Text a value is compared as. `null` has none and never matches.
fn subject_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Array(_) | Value::Object(_) => Some(Cow::Owned(value.to_string())),
    }
}

fn subject_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => parse_integer(s),
        _ => None,
    }
}

fn subject_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// `key:value` matches when the literal equals one whitespace-separated word
/// of the subject.
fn pattern_match(text: &str, literal: &Scalar) -> Result<bool> {
    let word = literal.text();
    if word.ends_with('*') {
        return Err(FilterError::NotImplemented(format!(
            "prefix matching with '*' in '{}'",
            word
        )));
    }
    Ok(text.split_whitespace().any(|part| part == word))
}

/// Regular expression match anchored at the start of the subject.
fn regex_match(text: &str, pattern: &str) -> Result<bool> {
    Ok(regex_cache().get_or_compile(pattern)?.is_match(text))
}
