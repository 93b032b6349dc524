//! CLI command implementations

pub(crate) mod backfill;
pub(crate) mod common;
pub(crate) mod order;
pub(crate) mod validate;
