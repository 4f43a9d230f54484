//! Local Document Store
//!
//! A file-backed document store speaking the document dialect:
//! - One directory per collection, one `<id>.json` per document
//! - uuid v4 ids generated on insert when absent
//! - `SELECT ... WHERE ... ORDER BY` queries with `@name` parameters

pub mod collection;
pub mod document;
pub mod error;
pub mod query;
pub mod storage;

pub use collection::Collection;
pub use document::Document;
pub use error::NoSqlError;
pub use query::SelectStatement;
pub use storage::LocalDocumentStore;
