//! Forward operations and their precomputed inverses.

use crate::record::{Matcher, Record};
use crate::store::TableStore;

/// One mutation as issued by a test body, kept in the forward log for
/// diagnostics.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Append rows to a table
    Insert { table: String, rows: Vec<Record> },
    /// Shallow-merge a patch into every matching record
    Update {
        table: String,
        patch: Record,
        matcher: Matcher,
    },
    /// Remove every matching record
    Delete { table: String, matcher: Matcher },
    /// Remove every record in a table
    Truncate { table: String },
}

impl Operation {
    /// Table the operation targets.
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. }
            | Operation::Truncate { table } => table,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Truncate { .. } => "truncate",
        }
    }
}

/// The exact inverse of one forward operation.
///
/// Payloads carry row positions recorded at mutation time. Replayed LIFO,
/// each inverse runs against the precise store state its forward operation
/// produced, so positional reversal restores content and order exactly,
/// even when duplicate `id`s would make an identity matcher ambiguous.
#[derive(Debug, Clone)]
pub(crate) enum UndoOp {
    /// Inverse of Insert: delete the rows that were appended
    RemoveInserted { table: String, count: usize },
    /// Inverse of Update: put each affected record's pre-image back
    RestoreUpdated {
        table: String,
        pre_images: Vec<(usize, Record)>,
    },
    /// Inverse of Delete: re-insert the removed rows where they were
    RestoreDeleted {
        table: String,
        rows: Vec<(usize, Record)>,
    },
    /// Inverse of Truncate: re-insert every removed row
    RestoreTruncated { table: String, rows: Vec<Record> },
}

impl UndoOp {
    /// Applies the inverse to the store.
    pub(crate) fn apply(self, store: &mut TableStore) {
        match self {
            UndoOp::RemoveInserted { table, count } => store.remove_tail(&table, count),
            UndoOp::RestoreUpdated { table, pre_images } => {
                store.replace_at(&table, &pre_images)
            }
            UndoOp::RestoreDeleted { table, rows } => store.insert_at(&table, &rows),
            UndoOp::RestoreTruncated { table, rows } => store.set_rows(&table, rows),
        }
    }
}
