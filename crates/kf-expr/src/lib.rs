//! kf-expr - Sandboxed expression evaluation for Keyfill
//!
//! User-supplied aggregation code (`lambda` and `jsonb_append` strategies) is
//! written as a MiniJinja expression and evaluated against one group of fact
//! rows. Expressions have no access to the filesystem, network or process
//! environment; the only inputs are `rows` and `key`.
//!
//! Besides the MiniJinja built-in filters, the environment registers
//! `pluck(column)`, `non_blank`, `distinct` and the `fail(message)` function.

pub mod error;
pub mod evaluator;
pub(crate) mod functions;

pub use error::{ExprError, ExprResult};
pub use evaluator::ExpressionEvaluator;
