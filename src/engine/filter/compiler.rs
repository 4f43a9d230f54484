//! Filter compiler interface shared by both native query languages

use serde::Serialize;
use serde_json::Value;

use super::ast::FilterNode;
use super::fields::FieldMap;
use super::parser::FilterParser;
use super::value::{prefix_upper_bound, Params};
use crate::engine::adapter::{BackendKind, BoundParam};
use crate::engine::error::{ConnectorError, Result};

/// Native filter text plus the parameters bound into it. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub native_filter: String,
    pub params: Vec<BoundParam>,
}

impl CompiledQuery {
    pub fn is_empty(&self) -> bool {
        self.native_filter.is_empty()
    }
}

pub trait FilterCompiler {
    fn kind(&self) -> BackendKind;

    /// Fields filters are resolved against
    fn fields(&self) -> &FieldMap;

    /// Replacement parameters available to the filter
    fn params(&self) -> &Params;

    /// Render a filter tree in the native language
    fn compile(&self, node: &FilterNode) -> Result<CompiledQuery>;

    /// Parse then compile. Empty text compiles to `None`.
    fn compile_text(&self, text: &str) -> Result<Option<CompiledQuery>> {
        match FilterParser::new(self.params()).parse(text)? {
            Some(node) => {
                let compiled = self.compile(&node)?;
                tracing::debug!(
                    backend = %self.kind(),
                    native = %compiled.native_filter,
                    params = compiled.params.len(),
                    "compiled filter"
                );
                Ok(Some(compiled))
            }
            None => Ok(None),
        }
    }
}

/// A LIKE pattern reduced to what a range comparison can express
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LikePattern {
    Exact(String),
    Prefix { lower: String, upper: Option<String> },
}

pub(crate) fn like_pattern(field: &str, value: &Value) -> Result<LikePattern> {
    let pattern = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConnectorError::bad_value(
                field,
                "LIKE requires a string pattern",
            ))
        }
    };

    match pattern.find('%') {
        None => Ok(LikePattern::Exact(pattern.clone())),
        Some(pos) if pos == pattern.len() - 1 => {
            let lower = pattern[..pos].to_string();
            let upper = prefix_upper_bound(&lower);
            Ok(LikePattern::Prefix { lower, upper })
        }
        Some(_) => Err(ConnectorError::BadFilter(format!(
            "only prefix patterns ('abc%') are supported by LIKE on '{}'",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_like_pattern_forms() {
        assert_eq!(
            like_pattern("name", &json!("Joe%")).unwrap(),
            LikePattern::Prefix { lower: "Joe".into(), upper: Some("Jof".into()) }
        );
        assert_eq!(
            like_pattern("name", &json!("Joe")).unwrap(),
            LikePattern::Exact("Joe".into())
        );
        assert!(matches!(
            like_pattern("name", &json!("%oe")),
            Err(ConnectorError::BadFilter(_))
        ));
        assert!(matches!(
            like_pattern("name", &json!(3)),
            Err(ConnectorError::BadValue { .. })
        ));
    }
}
