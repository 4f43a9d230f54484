//! Partitioned entity table compiler
//!
//! The entity service only accepts literals inlined in the filter string, so
//! nothing is bound. Its comparison ceiling forces identifier lists to be split
//! into several filters.

use serde_json::Value;

use super::ast::{Comparison, ComparisonOp, FilterNode, LogicalOp, Operand};
use super::compiler::{like_pattern, CompiledQuery, FilterCompiler, LikePattern};
use super::fields::{FieldDescriptor, FieldMap};
use super::parser::LIST_NOT_PARENTHESIZED;
use super::value::{Coerced, Params, ValueCoercer};
use crate::engine::adapter::{BackendKind, NativeDialect, PARTITION_KEY, ROW_KEY};
use crate::engine::error::{ConnectorError, Result};

/// Comparisons the entity service accepts in one filter
pub const MAX_FILTER_COMPARISONS: usize = 15;

/// Row keys per id filter, leaving one comparison for the partition key
pub const DEFAULT_MAX_IDS_PER_FILTER: usize = MAX_FILTER_COMPARISONS - 1;

pub struct PartitionedFilterCompiler<'a> {
    fields: &'a FieldMap,
    params: &'a Params,
    dialect: NativeDialect,
    max_ids_per_filter: usize,
}

impl<'a> PartitionedFilterCompiler<'a> {
    pub fn new(fields: &'a FieldMap, params: &'a Params) -> Self {
        Self {
            fields,
            params,
            dialect: NativeDialect::new(BackendKind::Table),
            max_ids_per_filter: DEFAULT_MAX_IDS_PER_FILTER,
        }
    }

    pub fn with_max_ids(mut self, max_ids_per_filter: usize) -> Self {
        self.max_ids_per_filter = max_ids_per_filter.clamp(1, DEFAULT_MAX_IDS_PER_FILTER);
        self
    }

    /// Row-key filters covering `ids`, at most `max_ids_per_filter` per string,
    /// each prefixed with the partition key when one is known
    pub fn ids_filters(&self, ids: &[String], partition_key: Option<&str>) -> Vec<String> {
        ids.chunks(self.max_ids_per_filter)
            .map(|chunk| {
                let rows = chunk
                    .iter()
                    .map(|id| format!("{} eq {}", ROW_KEY, self.dialect.literal(&Value::String(id.clone()))))
                    .collect::<Vec<_>>()
                    .join(" or ");
                match partition_key.filter(|pk| !pk.is_empty()) {
                    Some(pk) => format!(
                        "{} eq {} and ( {} )",
                        PARTITION_KEY,
                        self.dialect.literal(&Value::String(pk.to_string())),
                        rows
                    ),
                    None => rows,
                }
            })
            .collect()
    }

    /// Compile, splitting a row-key `IN` list (optionally and-ed with a
    /// partition key equality) that would exceed the comparison ceiling
    pub fn compile_chunked(&self, node: &FilterNode) -> Result<Vec<CompiledQuery>> {
        if let Some((ids, partition_key)) = self.oversized_id_list(node)? {
            return Ok(self
                .ids_filters(&ids, partition_key.as_deref())
                .into_iter()
                .map(|native_filter| CompiledQuery {
                    native_filter,
                    params: Vec::new(),
                })
                .collect());
        }
        Ok(vec![self.compile(node)?])
    }

    fn oversized_id_list(&self, node: &FilterNode) -> Result<Option<(Vec<String>, Option<String>)>> {
        let (rows, partition) = match node {
            FilterNode::Comparison(cmp) => (cmp, None),
            FilterNode::Logical { op: LogicalOp::And, children } if children.len() == 2 => {
                match (&children[0], &children[1]) {
                    (FilterNode::Comparison(a), FilterNode::Comparison(b)) => {
                        if self.is_field(a, ROW_KEY) {
                            (a, Some(b))
                        } else {
                            (b, Some(a))
                        }
                    }
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };

        let items = match (&rows.value, rows.op, rows.negated) {
            (Operand::List(items), ComparisonOp::In, false) if self.is_field(rows, ROW_KEY) => items,
            _ => return Ok(None),
        };
        if items.len() <= self.max_ids_per_filter {
            return Ok(None);
        }

        let mut coercer = ValueCoercer::new(self.params);
        let partition_key = match partition {
            None => None,
            Some(pk) if self.is_field(pk, PARTITION_KEY) && pk.op == ComparisonOp::Eq && !pk.negated => {
                let field = self.fields.resolve(&pk.field)?;
                Some(self.key_text(&mut coercer, &pk.value, &field)?)
            }
            Some(_) => return Ok(None),
        };

        let field = self.fields.resolve(&rows.field)?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(self.key_text(&mut coercer, item, &field)?);
        }
        Ok(Some((ids, partition_key)))
    }

    fn is_field(&self, cmp: &Comparison, name: &str) -> bool {
        self.fields
            .get(&cmp.field)
            .map_or(cmp.field == name, |f| f.name == name)
    }

    fn key_text(&self, coercer: &mut ValueCoercer<'_>, operand: &Operand, field: &FieldDescriptor) -> Result<String> {
        match coercer.coerce(operand, field)? {
            Coerced::Bound(param) => match param.value {
                Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            },
            Coerced::Native(_) => Err(ConnectorError::bad_value(
                &field.name,
                "key values must be literals",
            )),
        }
    }

    fn emit(&self, node: &FilterNode, coercer: &mut ValueCoercer<'_>) -> Result<String> {
        match node {
            FilterNode::Logical { op: LogicalOp::Not, children } => {
                let child = children
                    .first()
                    .ok_or_else(|| ConnectorError::BadFilter("NOT requires an operand".into()))?;
                Ok(format!(
                    "{} ({})",
                    self.dialect.logical(LogicalOp::Not),
                    self.emit(child, coercer)?
                ))
            }
            FilterNode::Logical { op, children } => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    let text = self.emit(child, coercer)?;
                    match child {
                        FilterNode::Logical { op: LogicalOp::And | LogicalOp::Or, .. } => {
                            parts.push(format!("({})", text))
                        }
                        _ => parts.push(text),
                    }
                }
                Ok(parts.join(&format!(" {} ", self.dialect.logical(*op))))
            }
            FilterNode::Comparison(cmp) => {
                let text = self.emit_comparison(cmp, coercer)?;
                if cmp.negated {
                    Ok(format!("{} ({})", self.dialect.logical(LogicalOp::Not), text))
                } else {
                    Ok(text)
                }
            }
        }
    }

    fn literal(&self, coercer: &mut ValueCoercer<'_>, operand: &Operand, field: &FieldDescriptor) -> Result<String> {
        Ok(match coercer.coerce(operand, field)? {
            Coerced::Bound(param) => self.dialect.literal(&param.value),
            Coerced::Native(raw) => raw,
        })
    }

    fn emit_comparison(&self, cmp: &Comparison, coercer: &mut ValueCoercer<'_>) -> Result<String> {
        let field = self.fields.resolve(&cmp.field)?;
        let name = field.name.as_str();

        match cmp.op {
            ComparisonOp::IsNull | ComparisonOp::IsNotNull => Err(ConnectorError::BadFilter(format!(
                "'{}' on '{}' is not supported by the entity table filter language",
                cmp.op, name
            ))),
            ComparisonOp::In => {
                let items = match &cmp.value {
                    Operand::List(items) => items,
                    _ => return Err(ConnectorError::BadFilter(LIST_NOT_PARENTHESIZED.into())),
                };
                let mut terms = Vec::with_capacity(items.len());
                for item in items {
                    terms.push(format!("{} eq {}", name, self.literal(coercer, item, &field)?));
                }
                Ok(format!("({})", terms.join(" or ")))
            }
            ComparisonOp::Like => {
                let value = match coercer.coerce(&cmp.value, &field)? {
                    Coerced::Bound(param) => param.value,
                    Coerced::Native(_) => {
                        return Err(ConnectorError::BadFilter(format!(
                            "LIKE on '{}' requires a literal pattern",
                            name
                        )))
                    }
                };
                match like_pattern(name, &value)? {
                    LikePattern::Exact(text) => Ok(format!(
                        "{} eq {}",
                        name,
                        self.dialect.literal(&Value::String(text))
                    )),
                    LikePattern::Prefix { lower, upper: Some(upper) } => Ok(format!(
                        "({} ge {} and {} lt {})",
                        name,
                        self.dialect.literal(&Value::String(lower)),
                        name,
                        self.dialect.literal(&Value::String(upper))
                    )),
                    LikePattern::Prefix { lower, upper: None } => Ok(format!(
                        "{} ge {}",
                        name,
                        self.dialect.literal(&Value::String(lower))
                    )),
                }
            }
            op => {
                let token = self.dialect.comparison(op).ok_or_else(|| {
                    ConnectorError::BadFilter(format!("operator {} is not supported", op))
                })?;
                Ok(format!("{} {} {}", name, token, self.literal(coercer, &cmp.value, &field)?))
            }
        }
    }
}

impl FilterCompiler for PartitionedFilterCompiler<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Table
    }

    fn fields(&self) -> &FieldMap {
        self.fields
    }

    fn params(&self) -> &Params {
        self.params
    }

    fn compile(&self, node: &FilterNode) -> Result<CompiledQuery> {
        let mut coercer = ValueCoercer::new(self.params);
        Ok(CompiledQuery {
            native_filter: self.emit(node, &mut coercer)?,
            params: Vec::new(),
        })
    }
}
