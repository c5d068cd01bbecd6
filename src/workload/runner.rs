use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};
use serde::Serialize;
use tracing::info;
use crate::core::error::{Error, Result};
use crate::store::GeoStore;
use crate::workload::context::WorkerContext;
use crate::workload::workload::{check_runnable, GeoPointWorkload};

/// Progress is logged every this many operations.
const PROGRESS_EVERY: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Load,
    Run,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Run => "run",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub threads: usize,
    pub operations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed_ms: u64,
    pub throughput_ops_sec: f64,
}

impl PhaseReport {
    fn new(phase: Phase, threads: usize, succeeded: u64, failed: u64, elapsed: Duration) -> Self {
        let operations = succeeded + failed;
        let secs = elapsed.as_secs_f64();
        PhaseReport {
            phase,
            threads,
            operations,
            succeeded,
            failed,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput_ops_sec: if secs > 0.0 { operations as f64 / secs } else { 0.0 },
        }
    }
}

/// Thread-per-worker driver for the two phases. Each worker opens its own
/// session, runs its share of the operations and drops the session.
pub struct WorkloadRunner {
    pub workers: usize,
    pub progress: Arc<AtomicU64>,
}

impl WorkloadRunner {
    pub fn new(workers: usize) -> Self {
        WorkloadRunner {
            workers: workers.max(1),
            progress: Arc::new(AtomicU64::new(0)),
        }
    }

    /// One worker per available core.
    pub fn with_available_cores() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn get_progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Inserts the workload's whole insert range.
    pub fn load(&self, workload: &GeoPointWorkload, store: &dyn GeoStore) -> Result<PhaseReport> {
        let (_, count) = workload.insert_range();
        self.execute(Phase::Load, count, workload, store, |w, ctx| w.do_insert(ctx))
    }

    /// Issues `operations` transactions.
    pub fn run(&self, workload: &GeoPointWorkload, store: &dyn GeoStore, operations: u64) -> Result<PhaseReport> {
        check_runnable(workload)?;
        self.execute(Phase::Run, operations, workload, store, |w, ctx| w.do_transaction(ctx))
    }

    fn execute<F>(
        &self,
        phase: Phase,
        total: u64,
        workload: &GeoPointWorkload,
        store: &dyn GeoStore,
        op: F,
    ) -> Result<PhaseReport>
    where
        F: Fn(&GeoPointWorkload, &mut WorkerContext) -> bool + Sync,
    {
        self.progress.store(0, Ordering::Relaxed);
        let workers = self.workers.min(total.max(1) as usize);
        let start_line = Barrier::new(workers);
        info!(phase = phase.name(), workers, operations = total, backend = store.name(), "phase started");
        let started = Instant::now();

        let outcomes = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let quota = share(total, workers, id);
                    let start_line = &start_line;
                    let op = &op;
                    s.spawn(move |_| -> Result<(u64, u64)> {
                        let opened = WorkerContext::open(id, store);
                        // release the others even if this worker has no session
                        start_line.wait();
                        let mut ctx = opened?;

                        let mut succeeded = 0;
                        for _ in 0..quota {
                            if op(workload, &mut ctx) {
                                succeeded += 1;
                            }
                            let done = self.progress.fetch_add(1, Ordering::Relaxed) + 1;
                            if done % PROGRESS_EVERY == 0 {
                                info!(phase = phase.name(), done, total, "progress");
                            }
                        }
                        Ok((succeeded, quota - succeeded))
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| Err(Error::backend("worker thread panicked"))))
                .collect::<Vec<_>>()
        })
        .map_err(|_| Error::backend("worker scope panicked"))?;

        let mut succeeded = 0;
        let mut failed = 0;
        for outcome in outcomes {
            let (ok, err) = outcome?;
            succeeded += ok;
            failed += err;
        }

        let report = PhaseReport::new(phase, workers, succeeded, failed, started.elapsed());
        info!(
            phase = phase.name(),
            done = self.get_progress(),
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "phase finished"
        );
        Ok(report)
    }
}

/// Operations assigned to worker `id` when `total` is split over `workers`.
fn share(total: u64, workers: usize, id: usize) -> u64 {
    let workers = workers as u64;
    let id = id as u64;
    total / workers + u64::from(id < total % workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_cover_the_total() {
        for (total, workers) in [(100, 8), (7, 3), (3, 8), (0, 4)] {
            let sum: u64 = (0..workers).map(|id| share(total, workers, id)).sum();
            assert_eq!(sum, total);
        }
        assert_eq!(share(10, 4, 0), 3);
        assert_eq!(share(10, 4, 3), 2);
    }
}
