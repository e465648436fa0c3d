//! Harness configuration.

/// Configuration for the isolation harness.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum number of test bodies running concurrently
    pub max_concurrency: usize,
    /// Heap/RSS growth per test that triggers a leak warning, in bytes
    pub leak_threshold_bytes: usize,
    /// Cross-check every rollback against the start-of-transaction
    /// snapshot and restore from it on divergence. Intended for tests of
    /// the rollback engine itself; the undo log alone is authoritative.
    pub verify_rollback: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            leak_threshold_bytes: 10 * 1024 * 1024, // 10 MiB
            verify_rollback: false,
        }
    }
}
