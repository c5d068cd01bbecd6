use std::sync::Arc;
use std::thread;
use std::time::Duration;
use rand::Rng;
use tracing::{debug, error, info, warn};
use crate::core::config::WorkloadConfig;
use crate::core::error::{Error, Result};
use crate::core::stats::{OperationStats, StatsSnapshot};
use crate::core::types::{Operation, Status};
use crate::dataset::Dataset;
use crate::geo::polygon::synthesize_square;
use crate::workload::context::WorkerContext;
use crate::workload::counters::{AcknowledgedCounter, InsertCursor, ResetGate};
use crate::workload::generator::{KeyChooser, OperationChooser, UniformRange};

/// How the driver waits between insert retries.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Retry pauses are the configured interval scaled by a factor in this range.
pub const RETRY_JITTER: (f64, f64) = (0.8, 1.2);

/// State every worker of a run mutates.
#[derive(Debug)]
pub struct SharedState {
    pub cursor: InsertCursor,
    pub acknowledged: AcknowledgedCounter,
    pub reset_gate: ResetGate,
    pub stats: OperationStats,
}

/// The geo workload: loads dataset records into a backend, then issues
/// randomized KNN, radius and polygon scans around already inserted points.
pub struct GeoPointWorkload {
    config: WorkloadConfig,
    dataset: Dataset,
    insert_start: u64,
    insert_count: u64,
    operations: OperationChooser,
    keys: KeyChooser,
    neighbors: UniformRange,
    distance_km: UniformRange,
    polygon_km: UniformRange,
    shared: SharedState,
    sleeper: Sleeper,
}

impl GeoPointWorkload {
    pub fn init(config: WorkloadConfig, dataset: Dataset) -> Result<Self> {
        let (insert_start, insert_count) = config.resolve_insert_range(dataset.len())?;

        let operations = OperationChooser::new(&config.operation_mix);
        if operations.is_empty() {
            warn!("no scan kind has a positive proportion; transactions will all fail");
        }
        let keys = KeyChooser::new(config.request_distribution, insert_start, insert_count)?;

        let acknowledged = if config.preloaded {
            AcknowledgedCounter::preloaded(insert_start, insert_count)
        } else {
            AcknowledgedCounter::new(insert_start)
        };

        debug!(config = ?config, "workload configured");
        info!(
            table = %config.table,
            records = dataset.len(),
            insert_start,
            insert_count,
            "workload initialized"
        );

        Ok(GeoPointWorkload {
            neighbors: UniformRange::new(config.scan_neighbors),
            distance_km: UniformRange::new(config.scan_distance_km),
            polygon_km: UniformRange::new(config.scan_polygon_distance_km),
            shared: SharedState {
                cursor: InsertCursor::new(insert_start, insert_count),
                acknowledged,
                reset_gate: ResetGate::new(),
                stats: OperationStats::new(),
            },
            sleeper: Arc::new(thread::sleep),
            config,
            dataset,
            insert_start,
            insert_count,
            operations,
            keys,
        })
    }

    /// Replaces the retry sleep, e.g. to observe pauses in tests.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// `(insert_start, insert_count)` after resolution against the dataset.
    pub fn insert_range(&self) -> (u64, u64) {
        (self.insert_start, self.insert_count)
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn acknowledged_limit(&self) -> Option<u64> {
        self.shared.acknowledged.last_value()
    }

    /// Inserts the next record of the insert range. The first caller of the
    /// run resets the table before anything is inserted.
    ///
    /// Returns whether a record was inserted. Failed attempts are retried up
    /// to the configured limit; a record that still fails is dropped.
    pub fn do_insert(&self, ctx: &mut WorkerContext) -> bool {
        self.ensure_reset(ctx);

        let Some(index) = self.shared.cursor.next() else {
            debug!(worker = ctx.id(), "insert range exhausted");
            return false;
        };
        let Some(point) = self.dataset.get(index) else {
            error!(worker = ctx.id(), index, "insert index outside the dataset");
            return false;
        };

        let table = self.config.table.as_str();
        let limit = self.config.insertion_retry_limit;
        let mut attempt: u32 = 0;
        loop {
            let result = ctx.session().insert(table, &point.id, point);
            let status = Status::of(&result);
            let err = match result {
                Ok(()) => {
                    self.shared.stats.record(Operation::Insert, Status::Success);
                    self.shared.acknowledged.acknowledge(index);
                    return true;
                }
                Err(err) => err,
            };

            if attempt >= limit {
                error!(
                    worker = ctx.id(),
                    key = %point.id,
                    attempts = attempt + 1,
                    error = %err,
                    "insert failed, record abandoned"
                );
                self.shared.stats.record(Operation::Insert, status);
                self.shared.stats.record_abandoned();
                return false;
            }

            attempt += 1;
            self.shared.stats.record_retry();
            let pause = self.retry_pause(ctx.rng());
            warn!(
                worker = ctx.id(),
                key = %point.id,
                attempt,
                limit,
                pause_ms = pause.as_millis() as u64,
                error = %err,
                "insert failed, retrying"
            );
            (self.sleeper)(pause);
        }
    }

    /// Issues one randomly chosen scan around an acknowledged record.
    /// Returns whether the backend answered successfully.
    pub fn do_transaction(&self, ctx: &mut WorkerContext) -> bool {
        let Some(operation) = self.operations.choose(ctx.rng()) else {
            return false;
        };
        let acknowledged = self.shared.acknowledged.last_value();
        let Some(keynum) = self.keys.next_keynum(ctx.rng(), acknowledged) else {
            debug!(worker = ctx.id(), "no acknowledged record to scan around yet");
            return false;
        };
        let Some(reference) = self.dataset.get(keynum) else {
            error!(worker = ctx.id(), keynum, "reference index outside the dataset");
            return false;
        };

        let table = self.config.table.as_str();
        let (session, rng) = ctx.parts();
        let result = match operation {
            Operation::ScanKnn => {
                let k = self.neighbors.sample(rng) as usize;
                session.scan_knn(table, reference.latitude, reference.longitude, k)
            }
            Operation::ScanByDistance => {
                let km = self.distance_km.sample(rng) as f64;
                session.scan_by_distance(table, reference.latitude, reference.longitude, km)
            }
            Operation::ScanByPolygon => {
                let offset_km = self.polygon_km.sample(rng) as f64;
                let ring = synthesize_square(reference, offset_km);
                session.scan_by_polygon(table, &ring)
            }
            Operation::Insert => return false,
        };

        let status = Status::of(&result);
        self.shared.stats.record(operation, status);
        match result {
            Ok(points) => {
                debug!(worker = ctx.id(), operation = operation.name(), found = points.len(), "scan finished");
                true
            }
            Err(err) => {
                error!(worker = ctx.id(), operation = operation.name(), key = %reference.id, error = %err, "scan failed");
                false
            }
        }
    }

    fn ensure_reset(&self, ctx: &mut WorkerContext) {
        let table = self.config.table.as_str();
        let worker = ctx.id();
        self.shared.reset_gate.run_once(|| {
            self.shared.stats.record_reset();
            match ctx.session().reset(table) {
                Ok(()) => info!(worker, table, "table reset"),
                Err(err) => error!(worker, table, error = %err, "table reset failed; continuing"),
            }
        });
    }

    fn retry_pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let factor = rng.gen_range(RETRY_JITTER.0..=RETRY_JITTER.1);
        self.config.insertion_retry_interval.mul_f64(factor)
    }
}

impl std::fmt::Debug for GeoPointWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoPointWorkload")
            .field("table", &self.config.table)
            .field("insert_start", &self.insert_start)
            .field("insert_count", &self.insert_count)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// Fails fast when a config cannot drive a run phase at all.
pub fn check_runnable(workload: &GeoPointWorkload) -> Result<()> {
    if workload.operations.is_empty() {
        return Err(Error::config(
            "run phase needs at least one of scanknnproportion, scanbydistanceproportion, \
             scanbypolygonproportion to be positive",
        ));
    }
    Ok(())
}
