//! kf-sql - SQL generation for Keyfill
//!
//! The `ReferenceTableDialect` trait isolates product-specific syntax (conflict
//! clauses, null-guarded updates, array merges) from aggregation and
//! coordination logic.

pub mod dialect;
pub mod error;
pub mod quote;
pub mod upsert;

pub use dialect::{dialect_for, DuckDbDialect, PostgresDialect, ReferenceTableDialect};
pub use error::{SqlError, SqlResult};
pub use upsert::UpsertStatement;
