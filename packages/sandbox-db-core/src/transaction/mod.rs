//! Undo-log transaction engine.

mod context;
mod operation;

pub use context::{TransactionContext, TransactionStatus};
pub use operation::Operation;
