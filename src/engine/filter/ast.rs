//! Filter expression tree

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    /// Prefix match (`'abc%'`), emulated as a range on both backends
    Like,
    IsNull,
    IsNotNull,
}

impl ComparisonOp {
    pub fn requires_value_list(&self) -> bool {
        matches!(self, ComparisonOp::In)
    }

    pub fn requires_no_value(&self) -> bool {
        matches!(self, ComparisonOp::IsNull | ComparisonOp::IsNotNull)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::In => "IN",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::IsNull => "IS NULL",
            ComparisonOp::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{}", text)
    }
}

/// Right-hand side of a comparison, kept as written until a compiler coerces it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Null checks carry no value
    None,
    /// Literal text as written: `'quoted'`, `42`, `true`, `bare`
    Value(String),
    /// Reference to a replacement parameter
    Param(String),
    /// Native function call, passed through untouched
    Function(String),
    /// Parenthesized value list
    List(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: ComparisonOp,
    pub value: Operand,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    Logical {
        op: LogicalOp,
        children: Vec<FilterNode>,
    },
    Comparison(Comparison),
}

impl FilterNode {
    pub fn comparison(field: &str, op: ComparisonOp, value: Operand) -> Self {
        FilterNode::Comparison(Comparison {
            field: field.to_string(),
            op,
            value,
            negated: false,
        })
    }

    pub fn not(child: FilterNode) -> Self {
        FilterNode::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    /// Join two nodes with AND/OR, flattening same-operator chains
    pub fn join(op: LogicalOp, left: FilterNode, right: FilterNode) -> Self {
        let mut children = Vec::new();
        for node in [left, right] {
            match node {
                FilterNode::Logical { op: inner, children: nested } if inner == op => {
                    children.extend(nested)
                }
                other => children.push(other),
            }
        }
        FilterNode::Logical { op, children }
    }

    /// Number of comparisons a native service would count against its ceiling
    pub fn comparison_count(&self) -> usize {
        match self {
            FilterNode::Comparison(_) => 1,
            FilterNode::Logical { children, .. } => {
                children.iter().map(FilterNode::comparison_count).sum()
            }
        }
    }

    /// Every field referenced by the tree, in order of appearance
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterNode::Comparison(cmp) => out.push(cmp.field.as_str()),
            FilterNode::Logical { children, .. } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }
}
