//! kf-engine - Reference-data backfill engine for Keyfill
//!
//! Given a domain's foreign-key configs and a batch of fact rows, the
//! [`HybridReferenceCoordinator`] makes sure every referenced key exists in its
//! reference table, deriving missing rows from the facts themselves and
//! tagging them for review.

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod retry;

pub use aggregate::{group_rows, Aggregated, Aggregator, KeyGroup};
pub use coordinator::HybridReferenceCoordinator;
pub use error::{EngineError, EngineResult};
pub use executor::{Execution, UpsertExecutor};
pub use retry::RetryPolicy;
