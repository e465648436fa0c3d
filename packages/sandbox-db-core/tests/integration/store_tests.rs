//! Store contract: implicit tables, relaxed identity, matcher semantics.

use serde_json::json;

use sandbox_db_core::{Matcher, Record, TableStore};

use crate::helpers::{audit, item};

#[test]
fn test_writes_create_tables_reads_do_not() {
    let mut store = TableStore::new();

    assert!(store.select("audit_log", None).is_empty());
    assert_eq!(store.table_count(), 0);

    store.insert("audit_log", vec![audit(1, "seeded")]);
    assert_eq!(store.table_count(), 1);

    store.truncate("reservations");
    assert_eq!(store.table_count(), 2);
    assert_eq!(store.table_len("reservations"), 0);
}

#[test]
fn test_duplicate_ids_are_accepted_silently() {
    let mut store = TableStore::new();
    store.insert("inventory", vec![item(1, "Bolt", 4), item(1, "Bolt", 4)]);

    // Relaxed on purpose: this store is a test double, not a real
    // datastore with key constraints.
    assert_eq!(store.select("inventory", Some(&Matcher::by_id(1))).len(), 2);
}

#[test]
fn test_update_matches_on_every_condition() {
    let mut store = TableStore::new();
    store.insert(
        "inventory",
        vec![
            item(1, "Bolt", 4).field("zone", "a"),
            item(2, "Nut", 4).field("zone", "b"),
        ],
    );

    let outcome = store.update(
        "inventory",
        &Record::new().field("quantity", 0),
        &Matcher::new().field("quantity", 4).field("zone", "b"),
    );

    assert_eq!(outcome.mutated.len(), 1);
    assert_eq!(outcome.mutated[0].get("id"), Some(&json!(2)));
}

#[test]
fn test_empty_matcher_selects_everything() {
    let mut store = TableStore::new();
    store.insert("inventory", vec![item(1, "Bolt", 4), item(2, "Nut", 5)]);

    assert_eq!(store.select("inventory", Some(&Matcher::new())).len(), 2);

    let removed = store.delete("inventory", &Matcher::new());
    assert_eq!(removed.len(), 2);
    assert_eq!(store.table_len("inventory"), 0);
}

#[test]
fn test_select_does_not_expose_store_internals() {
    let mut store = TableStore::new();
    store.insert("inventory", vec![item(1, "Bolt", 4)]);

    let mut rows = store.select("inventory", None);
    rows[0].merge(&Record::new().field("quantity", 999));

    // Mutating the returned clone leaves the store untouched.
    assert_eq!(
        store.select("inventory", None)[0].get("quantity"),
        Some(&json!(4))
    );
}
