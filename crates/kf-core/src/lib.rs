//! kf-core - Core library for Keyfill
//!
//! Shared types for the backfill engine: the `keyfill.yml` configuration,
//! foreign-key descriptors, dependency resolution, fact batches, reference
//! records and run summaries.

pub mod config;
pub mod error;
pub mod facts;
pub mod foreign_key;
pub mod names;
mod newtype_string;
pub mod reference;
pub mod resolver;
pub(crate) mod serde_helpers;
pub mod summary;
pub mod value;

pub use config::{Config, DatabaseConfig, DbType, DomainConfig, FactsSource, TrackingColumns};
pub use error::{CoreError, CoreResult};
pub use facts::FactBatch;
pub use foreign_key::{AggregationConfig, BackfillColumnMapping, BackfillMode, ForeignKeyConfig};
pub use names::ForeignKeyName;
pub use reference::{
    ColumnKind, ExistingProbe, ExistingRow, Provenance, QualifiedTable, ReferenceRecord,
    SourceTag, TargetColumn,
};
pub use resolver::{resolve_order, ForeignKeyDag};
pub use summary::{RowError, RunMode, RunSummary, TableStatus, TableSummary};
