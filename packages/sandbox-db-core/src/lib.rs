//! Record store and undo-log transaction engine for test isolation.
//!
//! Provides the in-memory table store, whole-store snapshots, and the
//! forward/inverse operation logs that let a test mutate shared state and
//! leave it exactly as it found it.

pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod transaction;

pub use config::SandboxConfig;
pub use error::SandboxError;
pub use record::{Matcher, Record};
pub use store::{Snapshot, TableStore, UpdateOutcome};
pub use transaction::{Operation, TransactionContext, TransactionStatus};
