//! Document store compiler
//!
//! Emits SQL-like predicates with every value bound as a named parameter and
//! every field qualified with the collection name.

use super::ast::{Comparison, ComparisonOp, FilterNode, LogicalOp, Operand};
use super::compiler::{like_pattern, CompiledQuery, FilterCompiler, LikePattern};
use super::fields::FieldMap;
use super::parser::LIST_NOT_PARENTHESIZED;
use super::value::{Coerced, Params, ValueCoercer};
use crate::engine::adapter::{BackendKind, BoundParam, NativeDialect, DOCUMENT_ID};
use crate::engine::error::{ConnectorError, Result};

pub struct DocumentFilterCompiler<'a> {
    table: &'a str,
    fields: &'a FieldMap,
    params: &'a Params,
    dialect: NativeDialect,
}

impl<'a> DocumentFilterCompiler<'a> {
    pub fn new(table: &'a str, fields: &'a FieldMap, params: &'a Params) -> Self {
        Self {
            table,
            fields,
            params,
            dialect: NativeDialect::new(BackendKind::Document),
        }
    }

    /// Full native statement: projection, optional predicate, optional ordering.
    /// A projection always carries the document id.
    pub fn select_statement(
        &self,
        compiled: Option<&CompiledQuery>,
        projection: Option<&[String]>,
        order_by: Option<&str>,
    ) -> String {
        let columns = match projection {
            None => "*".to_string(),
            Some(fields) => {
                let mut columns: Vec<String> = fields
                    .iter()
                    .map(|f| self.dialect.qualify(self.table, f))
                    .collect();
                if !fields.iter().any(|f| f == DOCUMENT_ID) {
                    columns.push(self.dialect.qualify(self.table, DOCUMENT_ID));
                }
                columns.join(", ")
            }
        };

        let mut sql = format!("SELECT {} FROM {}", columns, self.table);
        if let Some(compiled) = compiled.filter(|c| !c.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.native_filter);
        }
        if let Some(order) = order_by.and_then(|o| self.dialect.order_by(self.table, o)) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        sql
    }

    fn emit(
        &self,
        node: &FilterNode,
        coercer: &mut ValueCoercer<'_>,
        bound: &mut Vec<BoundParam>,
    ) -> Result<String> {
        match node {
            FilterNode::Logical { op: LogicalOp::Not, children } => {
                let child = children
                    .first()
                    .ok_or_else(|| ConnectorError::BadFilter("NOT requires an operand".into()))?;
                Ok(format!(
                    "{} ({})",
                    self.dialect.logical(LogicalOp::Not),
                    self.emit(child, coercer, bound)?
                ))
            }
            FilterNode::Logical { op, children } => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    let text = self.emit(child, coercer, bound)?;
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
                let text = self.emit_comparison(cmp, coercer, bound)?;
                if cmp.negated {
                    Ok(format!("NOT ({})", text))
                } else {
                    Ok(text)
                }
            }
        }
    }

    fn emit_comparison(
        &self,
        cmp: &Comparison,
        coercer: &mut ValueCoercer<'_>,
        bound: &mut Vec<BoundParam>,
    ) -> Result<String> {
        let field = self.fields.resolve(&cmp.field)?;
        let target = self.dialect.qualify(self.table, &field.name);

        let mut rhs = |operand: &Operand, coercer: &mut ValueCoercer<'_>| -> Result<String> {
            Ok(match coercer.coerce(operand, &field)? {
                Coerced::Bound(param) => {
                    let placeholder = param.placeholder.clone();
                    bound.push(param);
                    placeholder
                }
                Coerced::Native(raw) => raw,
            })
        };

        match cmp.op {
            ComparisonOp::IsNull | ComparisonOp::IsNotNull => {
                Ok(format!("{} {}", target, cmp.op))
            }
            ComparisonOp::In => {
                let items = match &cmp.value {
                    Operand::List(items) => items,
                    _ => return Err(ConnectorError::BadFilter(LIST_NOT_PARENTHESIZED.into())),
                };
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(rhs(item, coercer)?);
                }
                Ok(format!("{} IN ({})", target, rendered.join(", ")))
            }
            ComparisonOp::Like => {
                let param = match coercer.coerce(&cmp.value, &field)? {
                    Coerced::Bound(param) => param,
                    Coerced::Native(_) => {
                        return Err(ConnectorError::BadFilter(format!(
                            "LIKE on '{}' requires a literal pattern",
                            field.name
                        )))
                    }
                };
                match like_pattern(&field.name, &param.value)? {
                    LikePattern::Exact(text) => {
                        let placeholder = param.placeholder.clone();
                        bound.push(BoundParam { placeholder: placeholder.clone(), value: text.into() });
                        Ok(format!("{} = {}", target, placeholder))
                    }
                    LikePattern::Prefix { lower, upper } => {
                        let lower_ph = param.placeholder.clone();
                        bound.push(BoundParam { placeholder: lower_ph.clone(), value: lower.into() });
                        match upper {
                            Some(upper) => {
                                let upper_ph = coercer.next_placeholder(&field.name);
                                bound.push(BoundParam { placeholder: upper_ph.clone(), value: upper.into() });
                                Ok(format!(
                                    "({} >= {} AND {} < {})",
                                    target, lower_ph, target, upper_ph
                                ))
                            }
                            None => Ok(format!("{} >= {}", target, lower_ph)),
                        }
                    }
                }
            }
            op => {
                let token = self.dialect.comparison(op).ok_or_else(|| {
                    ConnectorError::BadFilter(format!("operator {} is not supported", op))
                })?;
                let value = rhs(&cmp.value, coercer)?;
                Ok(format!("{} {} {}", target, token, value))
            }
        }
    }
}

impl FilterCompiler for DocumentFilterCompiler<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn fields(&self) -> &FieldMap {
        self.fields
    }

    fn params(&self) -> &Params {
        self.params
    }

    fn compile(&self, node: &FilterNode) -> Result<CompiledQuery> {
        let mut coercer = ValueCoercer::new(self.params);
        let mut bound = Vec::new();
        let native_filter = self.emit(node, &mut coercer, &mut bound)?;
        Ok(CompiledQuery {
            native_filter,
            params: bound,
        })
    }
}
