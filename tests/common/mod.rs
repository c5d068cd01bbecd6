#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use geobench::core::config::Properties;
use geobench::core::types::GeoPoint;
use geobench::store::{GeoSession, GeoStore, MemoryStore, StoreError, StoreResult};
use tempfile::NamedTempFile;

pub const TABLE: &str = "GEOPOINTS";

pub fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A trajectory file in the loader's layout with `n` records spread
/// over a few kilometers.
pub fn trajectory_file(n: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,vehicle,speed,time,status,heading,latitude,longitude").unwrap();
    for i in 0..n {
        writeln!(
            file,
            "{},taxi,10,2008-02-02 13:{:02}:{:02},1,0,{:.6},{:.6}",
            i % 7,
            (i / 60) % 60,
            i % 60,
            39.90 + (i % 10) as f64 * 0.003,
            116.40 + (i / 10) as f64 * 0.004,
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

#[derive(Debug, Default)]
pub struct Calls {
    pub resets: AtomicUsize,
    pub inserts: AtomicUsize,
    pub knn: Mutex<Vec<KnnCall>>,
    pub distance: AtomicUsize,
    pub polygon: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct KnnCall {
    pub lat: f64,
    pub lon: f64,
    pub k: usize,
    pub found: Vec<GeoPoint>,
}

/// Memory store that records every call made through its sessions.
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub calls: Arc<Calls>,
}

impl GeoStore for CountingStore {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(CountingSession {
            inner: self.inner.open_session()?,
            calls: self.calls.clone(),
        }))
    }
}

struct CountingSession {
    inner: Box<dyn GeoSession>,
    calls: Arc<Calls>,
}

impl GeoSession for CountingSession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        self.calls.resets.fetch_add(1, Ordering::SeqCst);
        self.inner.reset(table)
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        self.calls.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, key, point)
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        let found = self.inner.scan_knn(table, lat, lon, k)?;
        self.calls.knn.lock().push(KnnCall { lat, lon, k, found: found.clone() });
        Ok(found)
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        self.calls.distance.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_by_distance(table, lat, lon, max_km)
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        self.calls.polygon.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_by_polygon(table, ring)
    }
}

/// Fails the first `failures` inserts across all sessions, then behaves
/// like the memory store.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failures: Arc<AtomicUsize>,
    pub attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        FlakyStore {
            inner: MemoryStore::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl GeoStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(FlakySession {
            inner: self.inner.open_session()?,
            failures: self.failures.clone(),
            attempts: self.attempts.clone(),
        }))
    }
}

struct FlakySession {
    inner: Box<dyn GeoSession>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl GeoSession for FlakySession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        self.inner.reset(table)
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Backend("connection reset by peer".into()));
        }
        self.inner.insert(table, key, point)
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        self.inner.scan_knn(table, lat, lon, k)
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        self.inner.scan_by_distance(table, lat, lon, max_km)
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        self.inner.scan_by_polygon(table, ring)
    }
}
