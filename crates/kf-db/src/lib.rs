//! kf-db - Database layer for Keyfill
//!
//! This crate provides the `ReferenceStore` trait and its DuckDB implementation.

pub mod duckdb;
pub mod error;
pub(crate) mod row_helpers;
pub mod traits;

pub use duckdb::DuckDbStore;
pub use error::{DbError, DbResult};
pub use traits::ReferenceStore;
