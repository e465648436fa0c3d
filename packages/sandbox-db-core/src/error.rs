//! Engine error types.

use thiserror::Error;

/// Errors raised by the isolation engine.
///
/// Business-logic failures inside a test body are not represented here;
/// they flow through the caller's own error type. These variants cover
/// infrastructure-level violations only, so the two cannot be confused.
#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    /// Operation attempted on a transaction that already committed or
    /// rolled back
    #[error("Transaction '{id}' already completed ({status})")]
    TransactionCompleted { id: String, status: &'static str },

    /// A transaction is already active for this test identifier
    #[error("Transaction '{test_id}' is already active")]
    DuplicateTransaction { test_id: String },

    /// A scope was used after its transaction ended
    #[error("No active transaction for '{test_id}'")]
    UnknownTransaction { test_id: String },

    /// A test body panicked; the panic was contained and the transaction
    /// rolled back
    #[error("Test '{id}' panicked: {message}")]
    TestPanicked { id: String, message: String },
}
