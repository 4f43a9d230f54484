//! Literal coercion and parameter binding

use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use super::ast::Operand;
use super::fields::{FieldDescriptor, FieldType};
use crate::engine::adapter::BoundParam;
use crate::engine::error::{ConnectorError, Result};

/// Replacement parameters supplied with a filter
pub type Params = Map<String, Value>;

/// Sigils a parameter reference may carry in filter text
pub const PARAM_SIGILS: [char; 2] = [':', '@'];

/// Find a parameter whether or not the caller wrote its sigil
pub fn lookup_param<'p>(params: &'p Params, name: &str) -> Option<&'p Value> {
    let bare = name.trim_start_matches(&PARAM_SIGILS[..]);
    params
        .get(name)
        .or_else(|| params.get(bare))
        .or_else(|| {
            PARAM_SIGILS
                .iter()
                .find_map(|sigil| params.get(&format!("{}{}", sigil, bare)))
        })
}

/// Strip one matching pair of outer quotes. A doubled inner quote stands for one quote.
pub fn unquote(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    if first != last || !(first == '\'' || first == '"') {
        return None;
    }
    let inner = &raw[1..raw.len() - 1];
    let doubled: String = [first, first].iter().collect();
    Some(inner.replace(&doubled, &first.to_string()))
}

fn looks_numeric(raw: &str) -> bool {
    raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Type inference for an unbound literal
pub fn infer_literal(raw: &str) -> Value {
    if let Some(text) = unquote(raw) {
        return Value::String(text);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if looks_numeric(raw) {
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    Value::String(raw.to_string())
}

/// Smallest string greater than every string starting with `prefix`
pub fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Outcome of coercing one operand
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// Typed value plus the placeholder it is bound under
    Bound(BoundParam),
    /// Native syntax passed through untouched (function calls)
    Native(String),
}

/// Per-compile coercer. Owns the placeholder counters so that compilation has
/// no shared state and compiling a node twice yields the same output.
pub struct ValueCoercer<'a> {
    params: &'a Params,
    counters: HashMap<String, usize>,
}

impl<'a> ValueCoercer<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self {
            params,
            counters: HashMap::new(),
        }
    }

    pub fn coerce(&mut self, operand: &Operand, field: &FieldDescriptor) -> Result<Coerced> {
        let value = match operand {
            Operand::Function(raw) => return Ok(Coerced::Native(raw.clone())),
            Operand::Param(name) => lookup_param(self.params, name).cloned().ok_or_else(|| {
                ConnectorError::bad_value(
                    &field.name,
                    format!("no value bound for parameter '{}'", name),
                )
            })?,
            Operand::Value(raw) => infer_literal(raw),
            Operand::None => {
                return Err(ConnectorError::bad_value(
                    &field.name,
                    "comparison requires a value",
                ))
            }
            Operand::List(_) => {
                return Err(ConnectorError::BadFilter(format!(
                    "value list for '{}' is only valid with IN",
                    field.name
                )))
            }
        };

        let value = conform(value, field)?;
        Ok(Coerced::Bound(BoundParam {
            placeholder: self.next_placeholder(&field.name),
            value,
        }))
    }

    /// `@<field><n>`, counting per field from 1
    pub fn next_placeholder(&mut self, field: &str) -> String {
        let stem: String = field
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let counter = self.counters.entry(stem.clone()).or_insert(0);
        *counter += 1;
        format!("@{}{}", stem, counter)
    }
}

/// Bring an inferred value in line with the field's declared type
fn conform(value: Value, field: &FieldDescriptor) -> Result<Value> {
    let mismatch = |text: &str, expected: &str| -> Result<Value> {
        if field.required {
            Err(ConnectorError::bad_value(
                &field.name,
                format!("'{}' is not {}", text, expected),
            ))
        } else {
            Ok(Value::String(text.to_string()))
        }
    };

    match (field.native_type, value) {
        (FieldType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Value::from(i)),
            Err(_) => mismatch(&s, "an integer"),
        },
        (FieldType::Integer, Value::Bool(b)) if field.required => {
            mismatch(&b.to_string(), "an integer")
        }
        (FieldType::Number, Value::String(s)) => {
            match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => mismatch(&s, "a number"),
            }
        }
        (FieldType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => mismatch(&s, "a boolean"),
        },
        (FieldType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (_, other) => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, native_type: FieldType) -> FieldDescriptor {
        FieldDescriptor::new(name, native_type)
    }

    #[test]
    fn test_infer_literal_forms() {
        assert_eq!(infer_literal("'quoted'"), json!("quoted"));
        assert_eq!(infer_literal("\"dq\""), json!("dq"));
        assert_eq!(infer_literal("'42'"), json!("42"));
        assert_eq!(infer_literal("42"), json!(42));
        assert_eq!(infer_literal("-7"), json!(-7));
        assert_eq!(infer_literal("2.5"), json!(2.5));
        assert_eq!(infer_literal("TRUE"), json!(true));
        assert_eq!(infer_literal("west"), json!("west"));
        assert_eq!(infer_literal("'O''Brien'"), json!("O'Brien"));
    }

    #[test]
    fn test_placeholders_count_per_field() {
        let params = Params::new();
        let mut coercer = ValueCoercer::new(&params);
        assert_eq!(coercer.next_placeholder("age"), "@age1");
        assert_eq!(coercer.next_placeholder("status"), "@status1");
        assert_eq!(coercer.next_placeholder("age"), "@age2");
        assert_eq!(coercer.next_placeholder("a.b"), "@a_b1");
    }

    #[test]
    fn test_param_substitution() {
        let mut params = Params::new();
        params.insert(":min".into(), json!(21));
        let mut coercer = ValueCoercer::new(&params);
        let out = coercer
            .coerce(&Operand::Param("min".into()), &field("age", FieldType::Integer))
            .unwrap();
        assert_eq!(
            out,
            Coerced::Bound(BoundParam { placeholder: "@age1".into(), value: json!(21) })
        );

        let missing = coercer.coerce(&Operand::Param("max".into()), &field("age", FieldType::Any));
        assert!(matches!(missing, Err(ConnectorError::BadValue { .. })));
    }

    #[test]
    fn test_function_passthrough() {
        let params = Params::new();
        let mut coercer = ValueCoercer::new(&params);
        let out = coercer
            .coerce(&Operand::Function("NOW()".into()), &field("at", FieldType::Any))
            .unwrap();
        assert_eq!(out, Coerced::Native("NOW()".into()));
    }

    #[test]
    fn test_required_integer_rejects_text() {
        let params = Params::new();
        let mut coercer = ValueCoercer::new(&params);
        let required = field("age", FieldType::Integer).required();
        let err = coercer.coerce(&Operand::Value("'abc'".into()), &required).unwrap_err();
        assert!(matches!(err, ConnectorError::BadValue { ref field, .. } if field == "age"));

        let numeric = coercer.coerce(&Operand::Value("'30'".into()), &required).unwrap();
        assert!(matches!(numeric, Coerced::Bound(ref p) if p.value == json!(30)));

        let optional = coercer
            .coerce(&Operand::Value("'abc'".into()), &field("age", FieldType::Integer))
            .unwrap();
        assert!(matches!(optional, Coerced::Bound(ref p) if p.value == json!("abc")));
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound("Joe").as_deref(), Some("Jof"));
        assert_eq!(prefix_upper_bound("").as_deref(), None);
    }
}
