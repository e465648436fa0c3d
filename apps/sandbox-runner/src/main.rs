//! Scenario runner for the sandbox isolation engine.
//!
//! Seeds the baseline inventory graph, runs a batch of isolated scenarios
//! under admission control, verifies the store came back byte-identical to
//! the baseline, then demonstrates the scoped wrapper's commit and
//! rollback paths and prints a diagnostics report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use parking_lot::RwLock;

use sandbox_db_core::{Matcher, Record, SandboxConfig, TableStore};
use sandbox_db_harness::{
    AdmissionController, DiagnosticsReport, IsolationCoordinator, MemoryLeakDetector, SeedPlan,
    Seeder, TrackingAllocator,
};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

/// Command-line arguments for the scenario runner.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of isolated scenarios to run
    #[arg(short, long, default_value_t = 8)]
    tasks: usize,

    /// Concurrency limit for scenario admission
    #[arg(short, long, default_value_t = 2)]
    max_concurrency: usize,

    /// Leak-warning threshold in MiB
    #[arg(long, default_value_t = 10)]
    leak_threshold_mib: usize,

    /// Every n-th scenario fails its assertion, exercising the rollback
    /// path
    #[arg(long, default_value_t = 3)]
    fail_every: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let mut detector = MemoryLeakDetector::new();
    detector.take_snapshot("boot");

    // The store is the one explicit shared object; everything else gets a
    // handle to it.
    let store = Arc::new(RwLock::new(TableStore::new()));
    let config = SandboxConfig {
        max_concurrency: args.max_concurrency,
        leak_threshold_bytes: args.leak_threshold_mib * 1024 * 1024,
        verify_rollback: true,
    };
    let coordinator = Arc::new(IsolationCoordinator::new(Arc::clone(&store), config));
    let admission = Arc::new(AdmissionController::new(args.max_concurrency));

    let seeder = Seeder::new(Arc::clone(&store));
    let baseline = seeder.seed_baseline(&SeedPlan::default());
    let baseline_snapshot = store.read().snapshot();

    println!("Seeded baseline: {} rows", baseline.row_count());
    println!(
        "Running {} scenarios, max {} concurrent...",
        args.tasks, args.max_concurrency
    );

    // Phase 1: every scenario mutates shared tables and rolls back, the
    // way a test framework isolates each test.
    let begin = Instant::now();
    let mut handles = Vec::new();
    for i in 0..args.tasks {
        let coordinator = Arc::clone(&coordinator);
        let admission = Arc::clone(&admission);
        let item_id = baseline.items[i % baseline.items.len()]
            .id()
            .cloned()
            .expect("seeded items carry ids");
        let fails = args.fail_every > 0 && i % args.fail_every == args.fail_every - 1;

        handles.push(tokio::spawn(async move {
            let test_id = format!("scenario-{i}");
            admission
                .execute(&test_id, || async {
                    coordinator.start_transaction(&test_id)?;
                    coordinator.add_cleanup(&test_id, {
                        let test_id = test_id.clone();
                        Box::new(move || tracing::debug!("Cleanup for '{}' ran", test_id))
                    });

                    coordinator.update(
                        &test_id,
                        "items",
                        Record::new().field("quantity", 0),
                        Matcher::new().field("id", item_id.clone()),
                    )?;
                    coordinator.insert(
                        &test_id,
                        "audit_log",
                        vec![Record::new()
                            .field("id", i as u64 + 1)
                            .field("action", "stock-recount")],
                    )?;
                    tokio::time::sleep(Duration::from_millis(50)).await;

                    coordinator.end_transaction(&test_id, true)?;
                    Ok::<bool, sandbox_db_core::SandboxError>(fails)
                })
                .await
        }));
    }

    let mut failed = 0usize;
    for handle in handles {
        if handle.await?? {
            failed += 1;
        }
    }
    println!(
        "Scenarios done in {:?} ({} assertion failures, all rolled back)",
        begin.elapsed(),
        failed
    );
    println!(
        "Store byte-identical to baseline: {}",
        store.read().matches_snapshot(&baseline_snapshot)
    );

    // Phase 2: the scoped wrapper's two exit paths.
    coordinator
        .run_isolated::<_, _, _, anyhow::Error>("recount-commit", |scope| async move {
            scope.insert(
                "audit_log",
                vec![Record::new().field("id", 9001_u64).field("action", "recount")],
            )?;
            Ok(())
        })
        .await?;

    let doomed: anyhow::Result<()> = coordinator
        .run_isolated("recount-doomed", |scope| async move {
            scope.insert(
                "audit_log",
                vec![Record::new().field("id", 9002_u64).field("action", "never")],
            )?;
            anyhow::bail!("simulated mid-test failure");
        })
        .await;
    println!(
        "Doomed scenario surfaced its own error: {}",
        doomed.unwrap_err()
    );
    println!(
        "Audit rows after wrapper phase: {} (committed run only)",
        store.read().table_len("audit_log")
    );

    let report = DiagnosticsReport::collect(&coordinator, &admission);
    println!(
        "Diagnostics: {}",
        serde_json::to_string_pretty(&report)?
    );

    let leaks = detector.check_for_leaks(args.leak_threshold_mib * 1024 * 1024);
    println!(
        "Leak check: has_leak={} heap_growth={:+} rss_growth={:+}",
        leaks.has_leak, leaks.heap_growth, leaks.rss_growth
    );

    coordinator.reset_all_state();
    Ok(())
}
