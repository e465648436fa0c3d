//! Read-only run-health reporting.

use serde::Serialize;

use crate::admission::{AdmissionController, AdmissionStats};
use crate::coordinator::IsolationCoordinator;
use crate::memory::MemorySample;

/// Aggregate harness state for test-run health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    /// Transactions currently open
    pub active_transactions: usize,
    /// Admission counters
    pub admission: AdmissionStats,
    /// Most recent memory sample, if any
    pub last_memory_sample: Option<MemorySample>,
}

impl DiagnosticsReport {
    /// Assembles a point-in-time report.
    pub fn collect(
        coordinator: &IsolationCoordinator,
        admission: &AdmissionController,
    ) -> Self {
        Self {
            active_transactions: coordinator.active_count(),
            admission: admission.stats(),
            last_memory_sample: coordinator.last_memory_sample(),
        }
    }
}
