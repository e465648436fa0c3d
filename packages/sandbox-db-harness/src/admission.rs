//! Bounded-concurrency test admission.
//!
//! At most `max_concurrency` task bodies run at once; beyond that,
//! submissions queue FIFO and are granted slots in submission order as
//! running tasks complete. The caller of [`AdmissionController::execute`]
//! always receives its own task's output, regardless of queueing delay.
//!
//! There is no cancellation or deadline primitive: a task body that never
//! settles permanently occupies its slot.

use std::collections::VecDeque;
use std::future::Future;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

/// Point-in-time admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    /// Tasks currently executing
    pub running: usize,
    /// Tasks waiting for a slot
    pub queued: usize,
    /// Current concurrency limit
    pub max_concurrency: usize,
}

struct Waiter {
    id: String,
    grant: oneshot::Sender<()>,
}

struct AdmissionState {
    running: usize,
    max_concurrency: usize,
    queue: VecDeque<Waiter>,
}

/// FIFO admission gate over a configurable concurrency limit.
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    /// Creates a controller admitting up to `max_concurrency` tasks at
    /// once (clamped to at least 1).
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                running: 0,
                max_concurrency: max_concurrency.max(1),
                queue: VecDeque::new(),
            }),
        }
    }

    /// Runs `task` once a slot is available, releasing the slot on every
    /// completion path (including an unwinding panic).
    pub async fn execute<F, Fut, T>(&self, id: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.admit(id).await;
        task().await
    }

    /// Raises or lowers the concurrency limit (clamped to at least 1).
    ///
    /// Affects only future admissions: running tasks are never preempted,
    /// and a raised limit immediately admits queued waiters.
    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        let mut state = self.state.lock();
        state.max_concurrency = max_concurrency.max(1);
        Self::admit_waiting(&mut state);
    }

    /// Current counters.
    pub fn stats(&self) -> AdmissionStats {
        let state = self.state.lock();
        AdmissionStats {
            running: state.running,
            queued: state.queue.len(),
            max_concurrency: state.max_concurrency,
        }
    }

    async fn admit(&self, id: &str) -> SlotPermit<'_> {
        let waiting = {
            let mut state = self.state.lock();
            if state.running < state.max_concurrency {
                state.running += 1;
                tracing::debug!("Task '{}' admitted immediately", id);
                None
            } else {
                let (grant, granted) = oneshot::channel();
                state.queue.push_back(Waiter {
                    id: id.to_string(),
                    grant,
                });
                tracing::debug!("Task '{}' queued ({} ahead)", id, state.queue.len() - 1);
                Some(granted)
            }
        };

        if let Some(granted) = waiting {
            if granted.await.is_err() {
                // The sender lives in the controller's own queue, so it
                // cannot drop ungranted while `&self` is alive; count the
                // slot anyway so release stays balanced.
                self.state.lock().running += 1;
            }
        }

        SlotPermit { controller: self }
    }

    fn release_one(&self) {
        let mut state = self.state.lock();
        state.running -= 1;
        Self::admit_waiting(&mut state);
    }

    fn admit_waiting(state: &mut AdmissionState) {
        while state.running < state.max_concurrency {
            match state.queue.pop_front() {
                Some(waiter) => {
                    // A send failure means the waiter gave up; skip it.
                    if waiter.grant.send(()).is_ok() {
                        state.running += 1;
                        tracing::debug!("Task '{}' admitted from queue", waiter.id);
                    }
                }
                None => break,
            }
        }
    }
}

/// Occupies one concurrency slot; releasing happens on drop.
struct SlotPermit<'a> {
    controller: &'a AdmissionController,
}

impl Drop for SlotPermit<'_> {
    fn drop(&mut self) {
        self.controller.release_one();
    }
}
