//! Test-run orchestration over the sandbox store.
//!
//! Maps test identifiers to transactions, bounds how many test bodies run
//! at once, watches memory growth, and seeds baseline entity graphs.

pub mod admission;
pub mod coordinator;
pub mod diagnostics;
pub mod memory;
pub mod seeder;

pub use sandbox_db_core::SandboxError;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, SandboxError>;

pub use admission::{AdmissionController, AdmissionStats};
pub use coordinator::{IsolationCoordinator, IsolationScope};
pub use diagnostics::DiagnosticsReport;
pub use memory::{LeakReport, MemoryLeakDetector, MemorySample, TrackingAllocator};
pub use seeder::{BaselineData, SeedPlan, Seeder};
