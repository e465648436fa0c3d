//! In-memory table store.
//!
//! Named, ordered record collections with no concurrency awareness; the
//! harness owns the lock. Store-level calls never fail: reads from an
//! unknown table return empty, writes create the table implicitly, and all
//! failure signalling lives at the transaction layer.

use std::collections::{HashMap, HashSet};

use crate::record::{Matcher, Record};

/// Mapping from table name to its ordered record sequence.
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    tables: HashMap<String, Vec<Record>>,
}

/// Result of an update call: the post-merge records plus a deep copy of
/// each affected record's pre-merge state and row index, as needed for
/// inverse construction.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Records after the patch was merged in
    pub mutated: Vec<Record>,
    /// `(row index, pre-merge record)` per affected row
    pub pre_images: Vec<(usize, Record)>,
}

/// Deep, point-in-time copy of the entire store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tables: HashMap<String, Vec<Record>>,
}

impl Snapshot {
    /// Total number of rows captured across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

impl TableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Appends `rows` to the named table, creating it if needed.
    ///
    /// Duplicate `id` values are legal and silently accepted; this store
    /// deliberately does not enforce identity uniqueness.
    ///
    /// # Returns
    /// The inserted rows.
    pub fn insert(&mut self, table: &str, rows: Vec<Record>) -> Vec<Record> {
        let target = self.table_entry(table);
        let start = target.len();
        target.extend(rows);
        target[start..].to_vec()
    }

    /// Shallow-merges `patch` into every record matching `matcher`.
    ///
    /// # Returns
    /// The post-merge records and each affected record's pre-merge state.
    pub fn update(&mut self, table: &str, patch: &Record, matcher: &Matcher) -> UpdateOutcome {
        let mut mutated = Vec::new();
        let mut pre_images = Vec::new();

        if let Some(rows) = self.tables.get_mut(table) {
            for (index, row) in rows.iter_mut().enumerate() {
                if row.matches(matcher) {
                    pre_images.push((index, row.clone()));
                    row.merge(patch);
                    mutated.push(row.clone());
                }
            }
        }

        UpdateOutcome {
            mutated,
            pre_images,
        }
    }

    /// Removes every record matching `matcher`.
    ///
    /// # Returns
    /// The removed rows, each paired with the index it occupied.
    pub fn delete(&mut self, table: &str, matcher: &Matcher) -> Vec<(usize, Record)> {
        let Some(rows) = self.tables.get_mut(table) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(rows.len());
        for (index, row) in rows.drain(..).enumerate() {
            if row.matches(matcher) {
                removed.push((index, row));
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        removed
    }

    /// Removes all records from the named table.
    ///
    /// # Returns
    /// All rows present before the call.
    pub fn truncate(&mut self, table: &str) -> Vec<Record> {
        std::mem::take(self.table_entry(table))
    }

    /// Returns clones of the records matching `matcher`, or the whole
    /// table when no matcher is given. Non-mutating; unknown tables read
    /// as empty.
    pub fn select(&self, table: &str, matcher: Option<&Matcher>) -> Vec<Record> {
        let Some(rows) = self.tables.get(table) else {
            return Vec::new();
        };
        match matcher {
            Some(matcher) => rows.iter().filter(|r| r.matches(matcher)).cloned().collect(),
            None => rows.clone(),
        }
    }

    /// Number of rows in the named table (0 for unknown tables).
    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }

    /// Names of all tables, including implicitly created empty ones.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Returns whether the store holds no rows at all.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Drops every table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Captures a deep copy of the whole store.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tables: self.tables.clone(),
        }
    }

    /// Replaces the whole store with the snapshot's state.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.tables = snapshot.tables;
    }

    /// Deep-compares the store against a snapshot.
    ///
    /// A table that is empty on one side and absent on the other counts as
    /// equal: both read as zero rows, and rolled-back writes may leave an
    /// implicitly created empty table behind.
    pub fn matches_snapshot(&self, snapshot: &Snapshot) -> bool {
        let empty: Vec<Record> = Vec::new();
        let names: HashSet<&String> = self
            .tables
            .keys()
            .chain(snapshot.tables.keys())
            .collect();
        names.into_iter().all(|name| {
            let live = self.tables.get(name).unwrap_or(&empty);
            let saved = snapshot.tables.get(name).unwrap_or(&empty);
            live == saved
        })
    }

    fn table_entry(&mut self, table: &str) -> &mut Vec<Record> {
        if !self.tables.contains_key(table) {
            tracing::debug!("Creating table '{}' on first write", table);
        }
        self.tables.entry(table.to_string()).or_default()
    }

    // Restore primitives used by inverse-operation replay. Indices are
    // valid by construction: LIFO replay means the table is in exactly the
    // state the forward operation left it in.

    /// Removes the trailing `count` rows of the named table.
    pub(crate) fn remove_tail(&mut self, table: &str, count: usize) {
        if let Some(rows) = self.tables.get_mut(table) {
            let new_len = rows.len().saturating_sub(count);
            rows.truncate(new_len);
        }
    }

    /// Puts each pre-image back at its recorded index.
    pub(crate) fn replace_at(&mut self, table: &str, pre_images: &[(usize, Record)]) {
        if let Some(rows) = self.tables.get_mut(table) {
            for (index, record) in pre_images {
                if let Some(slot) = rows.get_mut(*index) {
                    *slot = record.clone();
                }
            }
        }
    }

    /// Re-inserts removed rows at their recorded indices, ascending.
    pub(crate) fn insert_at(&mut self, table: &str, removed: &[(usize, Record)]) {
        let rows = self.table_entry(table);
        for (index, record) in removed {
            let at = (*index).min(rows.len());
            rows.insert(at, record.clone());
        }
    }

    /// Replaces the named table's contents wholesale.
    pub(crate) fn set_rows(&mut self, table: &str, rows: Vec<Record>) {
        *self.table_entry(table) = rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: u64, name: &str, quantity: u64) -> Record {
        Record::new()
            .field("id", id)
            .field("name", name)
            .field("quantity", quantity)
    }

    #[test]
    fn test_insert_creates_table_implicitly() {
        let mut store = TableStore::new();
        assert_eq!(store.table_count(), 0);

        let inserted = store.insert("items", vec![item(1, "Bolt", 10)]);
        assert_eq!(inserted.len(), 1);
        assert_eq!(store.table_count(), 1);
        assert_eq!(store.table_len("items"), 1);
    }

    #[test]
    fn test_insert_accepts_duplicate_ids() {
        let mut store = TableStore::new();
        store.insert("items", vec![item(1, "Bolt", 10)]);
        store.insert("items", vec![item(1, "Bolt copy", 3)]);

        let rows = store.select("items", Some(&Matcher::by_id(1)));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_select_unknown_table_reads_empty() {
        let store = TableStore::new();
        assert!(store.select("nothing", None).is_empty());
        assert_eq!(store.table_len("nothing"), 0);
        // Reads never create the table.
        assert_eq!(store.table_count(), 0);
    }

    #[test]
    fn test_update_merges_and_returns_pre_images() {
        let mut store = TableStore::new();
        store.insert("items", vec![item(1, "Bolt", 10), item(2, "Nut", 5)]);

        let patch = Record::new().field("quantity", 25);
        let outcome = store.update("items", &patch, &Matcher::by_id(2));

        assert_eq!(outcome.mutated.len(), 1);
        assert_eq!(outcome.mutated[0].get("quantity"), Some(&json!(25)));
        assert_eq!(outcome.mutated[0].get("name"), Some(&json!("Nut")));

        let (index, pre_image) = &outcome.pre_images[0];
        assert_eq!(*index, 1);
        assert_eq!(pre_image.get("quantity"), Some(&json!(5)));
    }

    #[test]
    fn test_update_no_match_is_a_no_op() {
        let mut store = TableStore::new();
        store.insert("items", vec![item(1, "Bolt", 10)]);

        let patch = Record::new().field("quantity", 0);
        let outcome = store.update("items", &patch, &Matcher::by_id(99));

        assert!(outcome.mutated.is_empty());
        assert!(outcome.pre_images.is_empty());
        assert_eq!(
            store.select("items", None)[0].get("quantity"),
            Some(&json!(10))
        );
    }

    #[test]
    fn test_delete_returns_removed_rows_with_indices() {
        let mut store = TableStore::new();
        store.insert(
            "items",
            vec![item(1, "Bolt", 10), item(2, "Nut", 5), item(3, "Washer", 7)],
        );

        let removed = store.delete("items", &Matcher::by_id(2));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, 1);
        assert_eq!(store.table_len("items"), 2);
        assert!(store.select("items", Some(&Matcher::by_id(2))).is_empty());
    }

    #[test]
    fn test_truncate_returns_all_prior_rows() {
        let mut store = TableStore::new();
        store.insert("items", vec![item(1, "Bolt", 10), item(2, "Nut", 5)]);

        let prior = store.truncate("items");
        assert_eq!(prior.len(), 2);
        assert_eq!(store.table_len("items"), 0);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = TableStore::new();
        store.insert("items", vec![item(1, "Bolt", 10)]);
        let snapshot = store.snapshot();

        store.insert("items", vec![item(2, "Nut", 5)]);
        store.insert("audit", vec![Record::new().field("id", 1)]);
        assert!(!store.matches_snapshot(&snapshot));

        store.restore(snapshot);
        assert_eq!(store.table_len("items"), 1);
        assert_eq!(store.table_len("audit"), 0);
    }

    #[test]
    fn test_empty_table_matches_absent_table() {
        let mut store = TableStore::new();
        let snapshot = store.snapshot();

        // An implicitly created table that ends up empty is equal to no
        // table at all.
        store.insert("items", vec![item(1, "Bolt", 10)]);
        store.truncate("items");
        assert!(store.matches_snapshot(&snapshot));
    }
}
