use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Serialize, Deserialize};
use crate::core::types::{Operation, Status};

#[derive(Debug, Default)]
struct Counter {
    success: AtomicU64,
    failure: AtomicU64,
}

impl Counter {
    fn record(&self, status: Status) {
        if status.is_ok() {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> OperationCount {
        OperationCount {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }
}

/// Per-operation success/failure counters shared by all workers
#[derive(Debug, Default)]
pub struct OperationStats {
    insert: Counter,
    scan_knn: Counter,
    scan_by_distance: Counter,
    scan_by_polygon: Counter,
    resets: AtomicU64,
    insert_retries: AtomicU64,
    abandoned_inserts: AtomicU64,
}

impl OperationStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, operation: Operation) -> &Counter {
        match operation {
            Operation::Insert => &self.insert,
            Operation::ScanKnn => &self.scan_knn,
            Operation::ScanByDistance => &self.scan_by_distance,
            Operation::ScanByPolygon => &self.scan_by_polygon,
        }
    }

    pub fn record(&self, operation: Operation, status: Status) {
        self.counter(operation).record(status);
    }

    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.insert_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned_inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            insert: self.insert.snapshot(),
            scan_knn: self.scan_knn.snapshot(),
            scan_by_distance: self.scan_by_distance.snapshot(),
            scan_by_polygon: self.scan_by_polygon.snapshot(),
            resets: self.resets.load(Ordering::Relaxed),
            insert_retries: self.insert_retries.load(Ordering::Relaxed),
            abandoned_inserts: self.abandoned_inserts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCount {
    pub success: u64,
    pub failure: u64,
}

impl OperationCount {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

/// Point-in-time copy of [`OperationStats`] for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub insert: OperationCount,
    pub scan_knn: OperationCount,
    pub scan_by_distance: OperationCount,
    pub scan_by_polygon: OperationCount,
    pub resets: u64,
    pub insert_retries: u64,
    pub abandoned_inserts: u64,
}

impl StatsSnapshot {
    pub fn get(&self, operation: Operation) -> OperationCount {
        match operation {
            Operation::Insert => self.insert,
            Operation::ScanKnn => self.scan_knn,
            Operation::ScanByDistance => self.scan_by_distance,
            Operation::ScanByPolygon => self.scan_by_polygon,
        }
    }

    pub fn scans(&self) -> OperationCount {
        Operation::SCANS.iter().fold(OperationCount::default(), |acc, op| {
            let count = self.get(*op);
            OperationCount {
                success: acc.success + count.success,
                failure: acc.failure + count.failure,
            }
        })
    }
}
