//! Transaction context: forward/inverse logs and the commit/rollback
//! state machine.

use std::time::{Duration, Instant};

use crate::error::SandboxError;
use crate::record::{Matcher, Record};
use crate::store::TableStore;

use super::operation::{Operation, UndoOp};

/// Lifecycle state of a transaction.
///
/// `Open` transitions to exactly one of the terminal states; any mutation
/// or second termination afterwards fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting mutations
    Open,
    /// Terminal: changes kept
    Committed,
    /// Terminal: changes reversed
    RolledBack,
}

impl TransactionStatus {
    /// Lowercase name for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Open => "open",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
        }
    }
}

/// Per-test operation log with precomputed inverses.
///
/// Every mutation issued through an open context is applied to the store
/// and appends both the forward operation and its exact inverse, so
/// `undo_log.len() == forward_log.len()` at every point. Rollback cost is
/// proportional to the number of mutations, never store size.
#[derive(Debug)]
pub struct TransactionContext {
    id: String,
    forward_log: Vec<Operation>,
    undo_log: Vec<UndoOp>,
    status: TransactionStatus,
    started_at: Instant,
}

impl TransactionContext {
    /// Opens a new context.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            forward_log: Vec::new(),
            undo_log: Vec::new(),
            status: TransactionStatus::Open,
            started_at: Instant::now(),
        }
    }

    /// Transaction identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Returns whether the context still accepts mutations.
    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Open
    }

    /// Returns whether the context committed.
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Returns whether the context rolled back.
    pub fn is_rolled_back(&self) -> bool {
        self.status == TransactionStatus::RolledBack
    }

    /// Number of mutations recorded so far.
    pub fn op_count(&self) -> usize {
        self.forward_log.len()
    }

    /// Forward operations recorded so far.
    pub fn forward_log(&self) -> &[Operation] {
        &self.forward_log
    }

    /// Time since the context was opened.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fails with the protocol error unless the context is open.
    pub fn ensure_open(&self) -> Result<(), SandboxError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SandboxError::TransactionCompleted {
                id: self.id.clone(),
                status: self.status.as_str(),
            })
        }
    }

    /// Inserts rows through this context.
    pub fn insert(
        &mut self,
        store: &mut TableStore,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, SandboxError> {
        self.ensure_open()?;
        let count = rows.len();
        let inserted = store.insert(table, rows);
        self.log(
            Operation::Insert {
                table: table.to_string(),
                rows: inserted.clone(),
            },
            UndoOp::RemoveInserted {
                table: table.to_string(),
                count,
            },
        );
        Ok(inserted)
    }

    /// Updates matching rows through this context.
    pub fn update(
        &mut self,
        store: &mut TableStore,
        table: &str,
        patch: Record,
        matcher: Matcher,
    ) -> Result<Vec<Record>, SandboxError> {
        self.ensure_open()?;
        let outcome = store.update(table, &patch, &matcher);
        self.log(
            Operation::Update {
                table: table.to_string(),
                patch,
                matcher,
            },
            UndoOp::RestoreUpdated {
                table: table.to_string(),
                pre_images: outcome.pre_images,
            },
        );
        Ok(outcome.mutated)
    }

    /// Deletes matching rows through this context.
    pub fn delete(
        &mut self,
        store: &mut TableStore,
        table: &str,
        matcher: Matcher,
    ) -> Result<Vec<Record>, SandboxError> {
        self.ensure_open()?;
        let removed = store.delete(table, &matcher);
        self.log(
            Operation::Delete {
                table: table.to_string(),
                matcher,
            },
            UndoOp::RestoreDeleted {
                table: table.to_string(),
                rows: removed.clone(),
            },
        );
        Ok(removed.into_iter().map(|(_, row)| row).collect())
    }

    /// Empties a table through this context.
    pub fn truncate(
        &mut self,
        store: &mut TableStore,
        table: &str,
    ) -> Result<Vec<Record>, SandboxError> {
        self.ensure_open()?;
        let rows = store.truncate(table);
        self.log(
            Operation::Truncate {
                table: table.to_string(),
            },
            UndoOp::RestoreTruncated {
                table: table.to_string(),
                rows: rows.clone(),
            },
        );
        Ok(rows)
    }

    /// Marks the context committed; changes persist and the inverse log is
    /// discarded.
    pub fn commit(&mut self) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.status = TransactionStatus::Committed;
        self.undo_log.clear();
        tracing::debug!(
            "Transaction '{}' committed ({} operations)",
            self.id,
            self.forward_log.len()
        );
        Ok(())
    }

    /// Replays the inverse log last-to-first against the store, then marks
    /// the context rolled back.
    pub fn rollback(&mut self, store: &mut TableStore) -> Result<(), SandboxError> {
        self.ensure_open()?;
        let replayed = self.undo_log.len();
        while let Some(undo) = self.undo_log.pop() {
            undo.apply(store);
        }
        self.status = TransactionStatus::RolledBack;
        tracing::debug!(
            "Transaction '{}' rolled back ({} inverse operations replayed)",
            self.id,
            replayed
        );
        Ok(())
    }

    fn log(&mut self, forward: Operation, undo: UndoOp) {
        self.forward_log.push(forward);
        self.undo_log.push(undo);
        debug_assert_eq!(self.forward_log.len(), self.undo_log.len());
    }
}
