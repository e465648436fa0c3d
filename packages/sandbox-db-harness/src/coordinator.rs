//! Transaction lifecycle coordination for isolated test runs.
//!
//! Maps test identifiers to open transactions, captures a whole-store
//! snapshot at start, runs registered cleanups at end, and samples memory
//! around each run. The store is shared as an explicit
//! `Arc<RwLock<TableStore>>` constructed once per process; there is no
//! global state.
//!
//! Lock order is coordinator bookkeeping before store, everywhere.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use sandbox_db_core::{
    Matcher, Record, SandboxConfig, SandboxError, Snapshot, TableStore, TransactionContext,
};

use crate::memory::{MemoryLeakDetector, MemorySample};
use crate::Result;

/// Callback run after a transaction ends. Failures are panics; each is
/// caught and logged without affecting sibling cleanups or the caller.
pub type CleanupFn = Box<dyn FnOnce() + Send + 'static>;

struct ActiveTransaction {
    context: TransactionContext,
    snapshot: Snapshot,
    cleanups: Vec<CleanupFn>,
    start_sample: MemorySample,
    seq: u64,
}

/// Maps test identifiers to transactions and orchestrates their
/// start/end lifecycle.
pub struct IsolationCoordinator {
    store: Arc<RwLock<TableStore>>,
    active: Mutex<HashMap<String, ActiveTransaction>>,
    completed: Mutex<HashSet<String>>,
    fallback_cleanups: Mutex<Vec<CleanupFn>>,
    leak_detector: Mutex<MemoryLeakDetector>,
    config: SandboxConfig,
    next_seq: AtomicU64,
}

impl IsolationCoordinator {
    /// Creates a coordinator over a shared store.
    pub fn new(store: Arc<RwLock<TableStore>>, config: SandboxConfig) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashSet::new()),
            fallback_cleanups: Mutex::new(Vec::new()),
            leak_detector: Mutex::new(MemoryLeakDetector::new()),
            config,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Opens a transaction for `test_id`: duplicate guard, whole-store
    /// snapshot, start memory sample.
    pub fn start_transaction(&self, test_id: &str) -> Result<()> {
        let mut active = self.active.lock();
        if active.contains_key(test_id) {
            return Err(SandboxError::DuplicateTransaction {
                test_id: test_id.to_string(),
            });
        }

        let snapshot = self.store.read().snapshot();
        let start_sample = self
            .leak_detector
            .lock()
            .take_snapshot(&format!("{test_id}:start"));
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        active.insert(
            test_id.to_string(),
            ActiveTransaction {
                context: TransactionContext::new(test_id),
                snapshot,
                cleanups: Vec::new(),
                start_sample,
                seq,
            },
        );
        // The id may be reused now that the previous run fully ended.
        self.completed.lock().remove(test_id);

        tracing::debug!("Transaction '{}' started", test_id);
        Ok(())
    }

    /// Ends the transaction for `test_id`, rolling back or committing,
    /// then runs its cleanups and takes the end memory sample.
    ///
    /// A never-started id is warned about and ignored; an id that already
    /// ended fails with the protocol error so double invocation stays
    /// visible.
    pub fn end_transaction(&self, test_id: &str, rollback: bool) -> Result<()> {
        // Terminate while the id stays registered: the duplicate guard
        // must block reuse until the end has fully completed, cleanups
        // included.
        let (cleanups, start_sample) = {
            let mut active = self.active.lock();
            let Some(entry) = active.get_mut(test_id) else {
                drop(active);
                if self.completed.lock().contains(test_id) {
                    return Err(SandboxError::TransactionCompleted {
                        id: test_id.to_string(),
                        status: "ended",
                    });
                }
                tracing::warn!("end_transaction for unknown test '{}'; ignoring", test_id);
                return Ok(());
            };

            if rollback {
                let mut store = self.store.write();
                if let Err(err) = entry.context.rollback(&mut store) {
                    // Never substituted for the body's own error; see
                    // run_isolated.
                    tracing::error!("Rollback of '{}' failed: {}", test_id, err);
                }
                if self.config.verify_rollback && !store.matches_snapshot(&entry.snapshot) {
                    tracing::error!(
                        "Store diverged from start snapshot after rollback of '{}'; restoring",
                        test_id
                    );
                    store.restore(entry.snapshot.clone());
                }
            } else {
                entry.context.commit()?;
            }

            (
                std::mem::take(&mut entry.cleanups),
                entry.start_sample.clone(),
            )
        };

        Self::run_cleanups(test_id, cleanups);

        let end_sample = self
            .leak_detector
            .lock()
            .take_snapshot(&format!("{test_id}:end"));
        self.warn_on_growth(test_id, &start_sample, &end_sample);

        // Only now does the id become reusable.
        self.active.lock().remove(test_id);
        self.completed.lock().insert(test_id.to_string());

        Ok(())
    }

    /// Registers a cleanup for `test_id`, or on the process-wide fallback
    /// list when no transaction is active for it.
    pub fn add_cleanup(&self, test_id: &str, cleanup: CleanupFn) {
        let mut active = self.active.lock();
        match active.get_mut(test_id) {
            Some(entry) => entry.cleanups.push(cleanup),
            None => {
                tracing::debug!(
                    "No active transaction for '{}'; cleanup registered on fallback list",
                    test_id
                );
                self.fallback_cleanups.lock().push(cleanup);
            }
        }
    }

    /// Returns whether `test_id` has an open transaction.
    pub fn has_active_transaction(&self, test_id: &str) -> bool {
        self.active.lock().contains_key(test_id)
    }

    /// Number of open transactions.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Most recent memory sample, if any.
    pub fn last_memory_sample(&self) -> Option<MemorySample> {
        self.leak_detector.lock().last_sample().cloned()
    }

    /// Force-ends every active transaction (rolling back, newest first),
    /// runs fallback cleanups, clears all tracking state, and empties the
    /// store. Idempotent when nothing is active.
    pub fn reset_all_state(&self) {
        let mut entries: Vec<(String, ActiveTransaction)> =
            self.active.lock().drain().collect();
        // Reverse start order: later transactions may depend on state the
        // earlier ones created.
        entries.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));

        for (test_id, mut entry) in entries {
            tracing::warn!("Force-ending transaction '{}'", test_id);
            {
                let mut store = self.store.write();
                if let Err(err) = entry.context.rollback(&mut store) {
                    tracing::error!("Forced rollback of '{}' failed: {}", test_id, err);
                }
            }
            Self::run_cleanups(&test_id, entry.cleanups);
        }

        let fallback: Vec<CleanupFn> = std::mem::take(&mut *self.fallback_cleanups.lock());
        Self::run_cleanups("fallback", fallback);

        self.completed.lock().clear();
        self.store.write().clear();
        self.leak_detector.lock().reset();
        tracing::debug!("Coordinator state reset");
    }

    // === Mutations routed through the active transaction ===

    /// Inserts rows within `test_id`'s transaction.
    pub fn insert(
        &self,
        test_id: &str,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let mut active = self.active.lock();
        let entry = Self::entry_mut(&mut active, test_id)?;
        let mut store = self.store.write();
        entry.context.insert(&mut store, table, rows)
    }

    /// Updates matching rows within `test_id`'s transaction.
    pub fn update(
        &self,
        test_id: &str,
        table: &str,
        patch: Record,
        matcher: Matcher,
    ) -> Result<Vec<Record>> {
        let mut active = self.active.lock();
        let entry = Self::entry_mut(&mut active, test_id)?;
        let mut store = self.store.write();
        entry.context.update(&mut store, table, patch, matcher)
    }

    /// Deletes matching rows within `test_id`'s transaction.
    pub fn delete(
        &self,
        test_id: &str,
        table: &str,
        matcher: Matcher,
    ) -> Result<Vec<Record>> {
        let mut active = self.active.lock();
        let entry = Self::entry_mut(&mut active, test_id)?;
        let mut store = self.store.write();
        entry.context.delete(&mut store, table, matcher)
    }

    /// Empties a table within `test_id`'s transaction.
    pub fn truncate(&self, test_id: &str, table: &str) -> Result<Vec<Record>> {
        let mut active = self.active.lock();
        let entry = Self::entry_mut(&mut active, test_id)?;
        let mut store = self.store.write();
        entry.context.truncate(&mut store, table)
    }

    /// Non-mutating read, visible to every test.
    pub fn select(&self, table: &str, matcher: Option<&Matcher>) -> Vec<Record> {
        self.store.read().select(table, matcher)
    }

    /// Runs `body` inside a transaction for `test_id`: acquire, run,
    /// release on every exit path.
    ///
    /// On success the transaction commits; on error or panic it rolls
    /// back, and the body's own failure propagates only after the
    /// rollback has been attempted. Rollback failures are logged, never
    /// substituted for the body's error. Panics surface as
    /// [`SandboxError::TestPanicked`].
    pub async fn run_isolated<F, Fut, T, E>(
        self: &Arc<Self>,
        test_id: &str,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(IsolationScope) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<SandboxError> + Send + 'static,
    {
        self.start_transaction(test_id).map_err(E::from)?;
        let scope = IsolationScope {
            coordinator: Arc::clone(self),
            test_id: test_id.to_string(),
        };

        // Spawned so an unwinding body is contained instead of skipping
        // the release path.
        match tokio::spawn(body(scope)).await {
            Ok(Ok(value)) => {
                self.end_transaction(test_id, false).map_err(E::from)?;
                Ok(value)
            }
            Ok(Err(body_err)) => {
                if let Err(end_err) = self.end_transaction(test_id, true) {
                    tracing::error!(
                        "Rollback after failure of '{}' also failed: {}",
                        test_id,
                        end_err
                    );
                }
                Err(body_err)
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    let payload = join_err.into_panic();
                    if let Some(msg) = payload.downcast_ref::<&str>() {
                        msg.to_string()
                    } else if let Some(msg) = payload.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    }
                } else {
                    "task cancelled".to_string()
                };
                tracing::error!("Test '{}' panicked: {}", test_id, message);
                if let Err(end_err) = self.end_transaction(test_id, true) {
                    tracing::error!(
                        "Rollback after panic of '{}' also failed: {}",
                        test_id,
                        end_err
                    );
                }
                Err(E::from(SandboxError::TestPanicked {
                    id: test_id.to_string(),
                    message,
                }))
            }
        }
    }

    fn entry_mut<'a>(
        active: &'a mut HashMap<String, ActiveTransaction>,
        test_id: &str,
    ) -> Result<&'a mut ActiveTransaction> {
        active
            .get_mut(test_id)
            .ok_or_else(|| SandboxError::UnknownTransaction {
                test_id: test_id.to_string(),
            })
    }

    fn run_cleanups(test_id: &str, cleanups: Vec<CleanupFn>) {
        for (index, cleanup) in cleanups.into_iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
                let message = if let Some(msg) = payload.downcast_ref::<&str>() {
                    msg.to_string()
                } else if let Some(msg) = payload.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::warn!(
                    "Cleanup {} for '{}' failed: {}",
                    index,
                    test_id,
                    message
                );
            }
        }
    }

    fn warn_on_growth(&self, test_id: &str, start: &MemorySample, end: &MemorySample) {
        let threshold = self.config.leak_threshold_bytes as i64;
        let heap_growth = end.heap_used as i64 - start.heap_used as i64;
        let rss_growth = end.rss as i64 - start.rss as i64;
        if heap_growth > threshold || rss_growth > threshold {
            tracing::warn!(
                "Possible leak in '{}': heap {:+} bytes, rss {:+} bytes",
                test_id,
                heap_growth,
                rss_growth
            );
        }
    }
}

/// Handle a test body uses to mutate the store within its transaction.
#[derive(Clone)]
pub struct IsolationScope {
    coordinator: Arc<IsolationCoordinator>,
    test_id: String,
}

impl IsolationScope {
    /// Test identifier this scope belongs to.
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Inserts rows within this scope's transaction.
    pub fn insert(&self, table: &str, rows: Vec<Record>) -> Result<Vec<Record>> {
        self.coordinator.insert(&self.test_id, table, rows)
    }

    /// Updates matching rows within this scope's transaction.
    pub fn update(
        &self,
        table: &str,
        patch: Record,
        matcher: Matcher,
    ) -> Result<Vec<Record>> {
        self.coordinator.update(&self.test_id, table, patch, matcher)
    }

    /// Deletes matching rows within this scope's transaction.
    pub fn delete(&self, table: &str, matcher: Matcher) -> Result<Vec<Record>> {
        self.coordinator.delete(&self.test_id, table, matcher)
    }

    /// Empties a table within this scope's transaction.
    pub fn truncate(&self, table: &str) -> Result<Vec<Record>> {
        self.coordinator.truncate(&self.test_id, table)
    }

    /// Non-mutating read.
    pub fn select(&self, table: &str, matcher: Option<&Matcher>) -> Vec<Record> {
        self.coordinator.select(table, matcher)
    }

    /// Registers a cleanup to run when this scope's transaction ends.
    pub fn add_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.coordinator
            .add_cleanup(&self.test_id, Box::new(cleanup));
    }
}
