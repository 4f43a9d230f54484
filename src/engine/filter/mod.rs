//! Filter Compiler
//!
//! Parses the backend-independent filter grammar into a `FilterNode` tree and
//! renders it in each backend's native query language:
//! - `PartitionedFilterCompiler`: inlined literals, `eq/ne/gt/ge/lt/le`, id-list chunking
//! - `DocumentFilterCompiler`: qualified fields, `@name` bound parameters
//!
//! The local stores evaluate native text by parsing it again (see `eval`).

pub mod ast;
pub mod compiler;
pub mod document;
pub mod eval;
pub mod fields;
pub mod lexer;
pub mod parser;
pub mod table;
pub mod value;

pub use ast::{Comparison, ComparisonOp, FilterNode, LogicalOp, Operand};
pub use compiler::{CompiledQuery, FilterCompiler};
pub use document::DocumentFilterCompiler;
pub use eval::{compare_values, sort_records};
pub use fields::{FieldDescriptor, FieldMap, FieldType};
pub use parser::FilterParser;
pub use table::{PartitionedFilterCompiler, DEFAULT_MAX_IDS_PER_FILTER, MAX_FILTER_COMPARISONS};
pub use value::{Params, ValueCoercer};
