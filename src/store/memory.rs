use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use rayon::prelude::*;
use crate::core::types::GeoPoint;
use crate::geo::distance::{haversine_km, BoundingBox};
use crate::geo::polygon::{contains_point, open_ring, ring_bounds};
use crate::store::{GeoSession, GeoStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Table {
    points: Vec<GeoPoint>,
    keys: HashSet<String>,
}

/// In-process backend. Always available; also the reference other
/// backends are compared against.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.points.len())
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

impl GeoStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(MemorySession {
            tables: self.tables.clone(),
        }))
    }
}

pub struct MemorySession {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemorySession {
    fn scan<F>(&self, table: &str, keep: F) -> Vec<GeoPoint>
    where
        F: Fn(&GeoPoint) -> bool + Sync,
    {
        let tables = self.tables.read();
        match tables.get(table) {
            Some(t) => t.points.par_iter().filter(|p| keep(p)).cloned().collect(),
            None => Vec::new(),
        }
    }
}

impl GeoSession for MemorySession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        self.tables.write().insert(table.to_string(), Table::default());
        Ok(())
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let t = tables.entry(table.to_string()).or_default();
        if !t.keys.insert(key.to_string()) {
            return Err(StoreError::UnexpectedState(format!("key {} already present in {}", key, table)));
        }
        let mut stored = point.clone();
        stored.id = key.to_string();
        t.points.push(stored);
        Ok(())
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut ranked: Vec<(f64, &GeoPoint)> = t
            .points
            .par_iter()
            .map(|p| (haversine_km(lat, lon, p.latitude, p.longitude), p))
            .collect();
        if ranked.len() > k {
            ranked.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            ranked.truncate(k);
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(ranked.into_iter().map(|(_, p)| p.clone()).collect())
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        let bbox = BoundingBox::around(lat, lon, max_km);
        Ok(self.scan(table, |p| {
            bbox.contains(p.latitude, p.longitude) && haversine_km(lat, lon, p.latitude, p.longitude) <= max_km
        }))
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        let vertices = open_ring(ring);
        let Some(bounds) = ring_bounds(vertices) else {
            return Ok(Vec::new());
        };
        Ok(self.scan(table, |p| {
            bounds.contains(p.latitude, p.longitude) && contains_point(vertices, p.latitude, p.longitude)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::polygon::synthesize_square;
    use chrono::NaiveDateTime;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TABLE: &str = "GEOPOINTS";

    fn populated(n: usize, seed: u64) -> (MemoryStore, Vec<GeoPoint>) {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        session.reset(TABLE).unwrap();

        let mut rng = StdRng::seed_from_u64(seed);
        let points: Vec<GeoPoint> = (0..n)
            .map(|i| {
                GeoPoint::new(
                    format!("p-{}", i),
                    rng.gen_range(39.0..41.0),
                    rng.gen_range(115.5..117.5),
                    NaiveDateTime::default(),
                )
            })
            .collect();
        for p in &points {
            session.insert(TABLE, &p.id, p).unwrap();
        }
        (store, points)
    }

    fn ids(points: &[GeoPoint]) -> Vec<String> {
        let mut ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn reset_clears_and_duplicates_are_rejected() {
        let (store, points) = populated(10, 1);
        assert_eq!(store.len(TABLE), 10);

        let mut session = store.open_session().unwrap();
        let err = session.insert(TABLE, &points[0].id, &points[0]).unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedState(_)));

        session.reset(TABLE).unwrap();
        assert!(store.is_empty(TABLE));
        session.insert(TABLE, &points[0].id, &points[0]).unwrap();
    }

    #[test]
    fn knn_matches_brute_force() {
        let (store, points) = populated(500, 7);
        let mut session = store.open_session().unwrap();
        let (lat, lon) = (40.0, 116.4);

        let found = session.scan_knn(TABLE, lat, lon, 10).unwrap();
        assert_eq!(found.len(), 10);
        let distances: Vec<f64> = found.iter().map(|p| haversine_km(lat, lon, p.latitude, p.longitude)).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));

        let mut expected: Vec<f64> = points.iter().map(|p| haversine_km(lat, lon, p.latitude, p.longitude)).collect();
        expected.sort_by(f64::total_cmp);
        assert_eq!(distances, expected[..10].to_vec());

        assert_eq!(session.scan_knn(TABLE, lat, lon, 1000).unwrap().len(), 500);
        assert!(session.scan_knn(TABLE, lat, lon, 0).unwrap().is_empty());
    }

    #[test]
    fn distance_scan_matches_brute_force() {
        let (store, points) = populated(500, 11);
        let mut session = store.open_session().unwrap();

        for &(lat, lon, km) in &[(40.0, 116.4, 25.0), (39.1, 115.6, 60.0), (40.0, 116.4, 0.5)] {
            let found = session.scan_by_distance(TABLE, lat, lon, km).unwrap();
            let expected: Vec<GeoPoint> = points
                .iter()
                .filter(|p| haversine_km(lat, lon, p.latitude, p.longitude) <= km)
                .cloned()
                .collect();
            assert_eq!(ids(&found), ids(&expected));
        }
    }

    #[test]
    fn polygon_scan_matches_brute_force() {
        let (store, points) = populated(500, 13);
        let mut session = store.open_session().unwrap();
        let square = synthesize_square(&GeoPoint::vertex(40.0, 116.5), 30.0);

        let found = session.scan_by_polygon(TABLE, &square).unwrap();
        let expected: Vec<GeoPoint> = points
            .iter()
            .filter(|p| contains_point(&square, p.latitude, p.longitude))
            .cloned()
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(ids(&found), ids(&expected));
    }

    #[test]
    fn missing_table_scans_are_empty() {
        let store = MemoryStore::new();
        let mut session = store.open_session().unwrap();
        assert!(session.scan_knn("NOPE", 0.0, 0.0, 5).unwrap().is_empty());
        assert!(session.scan_by_distance("NOPE", 0.0, 0.0, 5.0).unwrap().is_empty());
        assert!(session.scan_by_polygon("NOPE", &[]).unwrap().is_empty());
    }
}
