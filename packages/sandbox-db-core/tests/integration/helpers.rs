//! Shared fixtures for the integration suite.

use sandbox_db_core::Record;

/// Builds an inventory item record.
pub fn item(id: u64, name: &str, quantity: u64) -> Record {
    Record::new()
        .field("id", id)
        .field("name", name)
        .field("quantity", quantity)
}

/// Builds an audit-log record.
pub fn audit(id: u64, action: &str) -> Record {
    Record::new().field("id", id).field("action", action)
}
