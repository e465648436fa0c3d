//! Baseline entity-graph seeding.
//!
//! Builds the related inventory entities (users, categories, locations,
//! items, transactions) through the public store API only, with
//! deterministic ids and values so a seeded baseline is reproducible and
//! snapshot-comparable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use sandbox_db_core::{Record, TableStore};

const ROLES: [&str; 3] = ["admin", "manager", "staff"];
const ZONES: [&str; 3] = ["ambient", "chilled", "secure"];

/// How many of each entity `seed_baseline` creates.
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub users: usize,
    pub categories: Vec<String>,
    pub locations: usize,
    pub items: usize,
    pub transactions: usize,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            users: 4,
            categories: ["Hardware", "Electrical", "Plumbing", "Safety"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            locations: 3,
            items: 24,
            transactions: 40,
        }
    }
}

/// The rows inserted by `seed_baseline`, grouped by entity.
#[derive(Debug, Clone, Default)]
pub struct BaselineData {
    pub users: Vec<Record>,
    pub categories: Vec<Record>,
    pub locations: Vec<Record>,
    pub items: Vec<Record>,
    pub transactions: Vec<Record>,
}

impl BaselineData {
    /// Total rows inserted.
    pub fn row_count(&self) -> usize {
        self.users.len()
            + self.categories.len()
            + self.locations.len()
            + self.items.len()
            + self.transactions.len()
    }
}

/// Builds related entity graphs on top of the shared store.
pub struct Seeder {
    store: Arc<RwLock<TableStore>>,
    next_id: AtomicU64,
}

impl Seeder {
    /// Creates a seeder over a shared store. Ids start at 1.
    pub fn new(store: Arc<RwLock<TableStore>>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Seeds `count` users with cycling roles.
    pub fn seed_users(&self, count: usize) -> Vec<Record> {
        let rows = (0..count)
            .map(|i| {
                let id = self.next_id();
                Record::new()
                    .field("id", id)
                    .field("email", format!("user{id}@example.com"))
                    .field("name", format!("User {id}"))
                    .field("role", ROLES[i % ROLES.len()])
            })
            .collect();
        self.store.write().insert("users", rows)
    }

    /// Seeds one category per name.
    pub fn seed_categories(&self, names: &[String]) -> Vec<Record> {
        let rows = names
            .iter()
            .map(|name| {
                Record::new()
                    .field("id", self.next_id())
                    .field("name", name.clone())
            })
            .collect();
        self.store.write().insert("categories", rows)
    }

    /// Seeds `count` storage locations with cycling zones.
    pub fn seed_locations(&self, count: usize) -> Vec<Record> {
        let rows = (0..count)
            .map(|i| {
                let id = self.next_id();
                Record::new()
                    .field("id", id)
                    .field("name", format!("Aisle {}", i + 1))
                    .field("zone", ZONES[i % ZONES.len()])
            })
            .collect();
        self.store.write().insert("locations", rows)
    }

    /// Seeds `count` items referencing the given categories and
    /// locations round-robin. Returns empty when either reference list is
    /// empty.
    pub fn seed_items(
        &self,
        count: usize,
        categories: &[Record],
        locations: &[Record],
    ) -> Vec<Record> {
        if categories.is_empty() || locations.is_empty() {
            tracing::warn!("seed_items needs categories and locations; nothing seeded");
            return Vec::new();
        }

        let rows = (0..count)
            .map(|i| {
                let id = self.next_id();
                Record::new()
                    .field("id", id)
                    .field("sku", format!("SKU-{id:04}"))
                    .field("name", format!("Item {id}"))
                    .field("category_id", ref_id(&categories[i % categories.len()]))
                    .field("location_id", ref_id(&locations[i % locations.len()]))
                    .field("quantity", (i as u64 * 7) % 50 + 1)
                    .field("unit_cost", (i % 20) as f64 * 1.25 + 0.75)
            })
            .collect();
        self.store.write().insert("items", rows)
    }

    /// Seeds `count` stock movements referencing the given items and
    /// users round-robin. Returns empty when either reference list is
    /// empty.
    pub fn seed_transactions(
        &self,
        count: usize,
        items: &[Record],
        users: &[Record],
    ) -> Vec<Record> {
        if items.is_empty() || users.is_empty() {
            tracing::warn!("seed_transactions needs items and users; nothing seeded");
            return Vec::new();
        }

        let rows = (0..count)
            .map(|i| {
                Record::new()
                    .field("id", self.next_id())
                    .field("item_id", ref_id(&items[i % items.len()]))
                    .field("user_id", ref_id(&users[i % users.len()]))
                    .field("kind", if i % 3 == 0 { "inbound" } else { "outbound" })
                    .field("quantity", i as u64 % 9 + 1)
            })
            .collect();
        self.store.write().insert("transactions", rows)
    }

    /// Seeds the full baseline graph per `plan`.
    pub fn seed_baseline(&self, plan: &SeedPlan) -> BaselineData {
        let users = self.seed_users(plan.users);
        let categories = self.seed_categories(&plan.categories);
        let locations = self.seed_locations(plan.locations);
        let items = self.seed_items(plan.items, &categories, &locations);
        let transactions = self.seed_transactions(plan.transactions, &items, &users);

        let data = BaselineData {
            users,
            categories,
            locations,
            items,
            transactions,
        };
        tracing::debug!("Seeded baseline: {} rows", data.row_count());
        data
    }
}

fn ref_id(record: &Record) -> Value {
    record.id().cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_db_core::Matcher;

    fn seeded() -> (Arc<RwLock<TableStore>>, BaselineData) {
        let store = Arc::new(RwLock::new(TableStore::new()));
        let seeder = Seeder::new(Arc::clone(&store));
        let data = seeder.seed_baseline(&SeedPlan::default());
        (store, data)
    }

    #[test]
    fn test_baseline_row_counts_match_plan() {
        let (store, data) = seeded();
        let plan = SeedPlan::default();

        assert_eq!(data.users.len(), plan.users);
        assert_eq!(data.categories.len(), plan.categories.len());
        assert_eq!(data.locations.len(), plan.locations);
        assert_eq!(data.items.len(), plan.items);
        assert_eq!(data.transactions.len(), plan.transactions);
        assert_eq!(store.read().row_count(), data.row_count());
    }

    #[test]
    fn test_item_references_resolve() {
        let (store, data) = seeded();
        let store = store.read();

        for item in &data.items {
            let category = item.get("category_id").cloned().unwrap();
            let location = item.get("location_id").cloned().unwrap();
            assert_eq!(
                store
                    .select("categories", Some(&Matcher::new().field("id", category)))
                    .len(),
                1
            );
            assert_eq!(
                store
                    .select("locations", Some(&Matcher::new().field("id", location)))
                    .len(),
                1
            );
        }
    }

    #[test]
    fn test_transaction_references_resolve() {
        let (store, data) = seeded();
        let store = store.read();

        for movement in &data.transactions {
            let item = movement.get("item_id").cloned().unwrap();
            let user = movement.get("user_id").cloned().unwrap();
            assert_eq!(
                store
                    .select("items", Some(&Matcher::new().field("id", item)))
                    .len(),
                1
            );
            assert_eq!(
                store
                    .select("users", Some(&Matcher::new().field("id", user)))
                    .len(),
                1
            );
        }
    }

    #[test]
    fn test_ids_are_unique_across_entities() {
        let (_store, data) = seeded();
        let mut seen = std::collections::HashSet::new();
        let all = data
            .users
            .iter()
            .chain(&data.categories)
            .chain(&data.locations)
            .chain(&data.items)
            .chain(&data.transactions);

        for record in all {
            assert!(seen.insert(record.id().cloned().unwrap().to_string()));
        }
    }
}
