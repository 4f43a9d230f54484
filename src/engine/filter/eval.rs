//! In-process evaluation of filter trees against records
//!
//! The local stores answer native queries by re-parsing the native text and
//! running it here.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::ast::{Comparison, ComparisonOp, FilterNode, LogicalOp, Operand};
use super::value::{infer_literal, lookup_param, Params};

impl FilterNode {
    /// Whether `record` satisfies the tree. `qualifier` is the collection alias
    /// stripped from field references (`t.age` -> `age`).
    pub fn matches(
        &self,
        record: &Map<String, Value>,
        params: &Params,
        qualifier: Option<&str>,
    ) -> Result<bool, String> {
        match self {
            FilterNode::Logical { op: LogicalOp::And, children } => {
                for child in children {
                    if !child.matches(record, params, qualifier)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterNode::Logical { op: LogicalOp::Or, children } => {
                for child in children {
                    if child.matches(record, params, qualifier)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterNode::Logical { op: LogicalOp::Not, children } => match children.first() {
                Some(child) => Ok(!child.matches(record, params, qualifier)?),
                None => Err("NOT requires an operand".to_string()),
            },
            FilterNode::Comparison(cmp) => {
                let result = evaluate(cmp, record, params, qualifier)?;
                Ok(result != cmp.negated)
            }
        }
    }
}

/// Strip a leading `<qualifier>.` from a field reference
pub fn unqualify<'f>(field: &'f str, qualifier: Option<&str>) -> &'f str {
    match qualifier {
        Some(q) => field
            .strip_prefix(q)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(field),
        None => field,
    }
}

fn resolve(operand: &Operand, params: &Params) -> Result<Value, String> {
    match operand {
        Operand::None => Ok(Value::Null),
        Operand::Value(raw) => Ok(infer_literal(raw)),
        Operand::Param(name) => lookup_param(params, name)
            .cloned()
            .ok_or_else(|| format!("no value bound for parameter '{}'", name)),
        Operand::Function(raw) => Err(format!("function '{}' is not supported by this store", raw)),
        Operand::List(items) => items
            .iter()
            .map(|item| resolve(item, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn evaluate(
    cmp: &Comparison,
    record: &Map<String, Value>,
    params: &Params,
    qualifier: Option<&str>,
) -> Result<bool, String> {
    let actual = record.get(unqualify(&cmp.field, qualifier));
    let expected = resolve(&cmp.value, params)?;

    let present = actual.filter(|v| !v.is_null());
    let ordered = |accept: fn(Ordering) -> bool| {
        present
            .and_then(|a| compare_values(a, &expected))
            .map_or(false, accept)
    };

    Ok(match cmp.op {
        ComparisonOp::IsNull => present.is_none(),
        ComparisonOp::IsNotNull => present.is_some(),
        ComparisonOp::Eq if expected.is_null() => present.is_none(),
        ComparisonOp::Ne if expected.is_null() => present.is_some(),
        ComparisonOp::Eq => present.map_or(false, |a| values_equal(a, &expected)),
        ComparisonOp::Ne => present.map_or(false, |a| !values_equal(a, &expected)),
        ComparisonOp::Gt => ordered(|o| o == Ordering::Greater),
        ComparisonOp::Ge => ordered(|o| o != Ordering::Less),
        ComparisonOp::Lt => ordered(|o| o == Ordering::Less),
        ComparisonOp::Le => ordered(|o| o != Ordering::Greater),
        ComparisonOp::In => match (&expected, present) {
            (Value::Array(values), Some(a)) => values.iter().any(|v| values_equal(a, v)),
            _ => false,
        },
        ComparisonOp::Like => match (present, &expected) {
            (Some(Value::String(s)), Value::String(pattern)) => match pattern.strip_suffix('%') {
                Some(prefix) => s.starts_with(prefix),
                None => s == pattern,
            },
            _ => false,
        },
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Compare two JSON values: numbers numerically, strings lexically
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Sort records by an `order_by` list (`field [ASC|DESC], ...`). Records
/// missing a field sort after those that have it.
pub fn sort_records(records: &mut [Map<String, Value>], order_by: &str, qualifier: Option<&str>) {
    let keys: Vec<(String, bool)> = order_by
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut words = part.split_whitespace();
            let field = words.next().unwrap_or_default();
            let desc = words.next().map_or(false, |dir| dir.eq_ignore_ascii_case("desc"));
            (unqualify(field, qualifier).to_string(), desc)
        })
        .collect();

    if keys.is_empty() {
        return;
    }

    records.sort_by(|a, b| {
        for (field, desc) in &keys {
            let ordering = match (a.get(field), b.get(field)) {
                (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = if *desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
