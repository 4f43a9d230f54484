//! Batch execution over a single table
//!
//! Applies create/replace/patch/delete/get to many records with fail-fast,
//! continue-on-error or rollback semantics, and shapes the per-index results.

pub mod executor;
pub mod result;
pub mod rollback;

pub use executor::{BatchExecutor, BatchOperation, BatchOptions, Verb, DEFAULT_MAX_BATCH};
pub use result::{BatchState, ExecutionResult, FieldSelection, ItemOutcome, ResultEnvelope};
pub use rollback::{RollbackEntry, RollbackLog};
