//! Neo4j adapter.
//!
//! One node per record, labelled with the table name, holding a `location`
//! point under a point index plus plain `latitude`/`longitude` properties
//! used by the polygon prefilter. The async driver runs on a runtime owned
//! by the store; workers block on it from their own threads.

use std::sync::Arc;
use neo4rs::{query, Graph, Query, Row};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use crate::core::config::{Properties, PropertiesExt};
use crate::core::error::{Error, Result};
use crate::core::types::GeoPoint;
use crate::geo::distance::{retain_within_km, widen_radius_km};
use crate::geo::polygon::{contains_point, open_ring, ring_bounds};
use crate::store::cache::StatementCache;
use crate::store::{checked_table, GeoSession, GeoStore, StoreError, StoreResult};

pub const URI_PROPERTY: &str = "neo4j.uri";
pub const URI_PROPERTY_DEFAULT: &str = "127.0.0.1:7687";
pub const USER_PROPERTY: &str = "neo4j.user";
pub const USER_PROPERTY_DEFAULT: &str = "neo4j";
pub const PASSWORD_PROPERTY: &str = "neo4j.password";
pub const PASSWORD_PROPERTY_DEFAULT: &str = "neo4j";

/// Sphere radius behind `point.distance` for WGS-84 points.
pub const NATIVE_EARTH_RADIUS_KM: f64 = 6378.14;

const RETURN_POINT: &str =
    "RETURN n.id AS id, n.latitude AS latitude, n.longitude AS longitude, n.time_of_record AS time_of_record";
const REFERENCE: &str = "point({latitude: $lat, longitude: $lon})";

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        StoreError::Backend(format!("neo4j: {}", err))
    }
}

pub struct Neo4jStore {
    graph: Graph,
    runtime: Arc<Runtime>,
    statements: StatementCache,
}

impl Neo4jStore {
    pub fn connect(props: &Properties) -> Result<Self> {
        let uri = props.get_str(URI_PROPERTY).unwrap_or(URI_PROPERTY_DEFAULT);
        let user = props.get_str(USER_PROPERTY).unwrap_or(USER_PROPERTY_DEFAULT);
        let password = props.get_str(PASSWORD_PROPERTY).unwrap_or(PASSWORD_PROPERTY_DEFAULT);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::backend(format!("cannot start neo4j runtime: {}", e)))?;
        let graph = runtime
            .block_on(Graph::new(uri, user, password))
            .map_err(|e| Error::backend(format!("cannot connect to neo4j: {}", e)))?;

        info!(backend = "neo4j", uri, "connected");
        Ok(Neo4jStore {
            graph,
            runtime: Arc::new(runtime),
            statements: StatementCache::new(),
        })
    }
}

impl GeoStore for Neo4jStore {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(Neo4jSession {
            graph: self.graph.clone(),
            runtime: self.runtime.clone(),
            statements: self.statements.clone(),
        }))
    }
}

pub struct Neo4jSession {
    graph: Graph,
    runtime: Arc<Runtime>,
    statements: StatementCache,
}

impl Neo4jSession {
    fn cypher(&self, table: &str, name: &'static str) -> StoreResult<String> {
        let label = checked_table(table)?;
        Ok(self.statements.get_or_build(label, name, |l| statement_text(l, name)).to_string())
    }

    fn rows(&self, q: Query) -> StoreResult<Vec<Row>> {
        self.runtime.block_on(async {
            let mut stream = self.graph.execute(q).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, StoreError>(rows)
        })
    }

    fn points(&self, q: Query) -> StoreResult<Vec<GeoPoint>> {
        self.rows(q)?.iter().map(point_from_row).collect()
    }
}

impl GeoSession for Neo4jSession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        let label = checked_table(table)?;
        // schema and data changes cannot share a transaction
        let steps = [
            format!("MATCH (n:{}) DETACH DELETE n", label),
            format!("CREATE CONSTRAINT {l}_id IF NOT EXISTS FOR (n:{l}) REQUIRE n.id IS UNIQUE", l = label),
            format!("CREATE POINT INDEX {l}_location IF NOT EXISTS FOR (n:{l}) ON (n.location)", l = label),
        ];
        self.runtime.block_on(async {
            for step in steps {
                self.graph.run(query(&step)).await?;
            }
            Ok::<(), StoreError>(())
        })?;
        self.statements.invalidate(label);
        debug!(table, cached = self.statements.stats().statements, "neo4j label recreated");
        Ok(())
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        let cypher = self.cypher(table, "insert")?;
        let q = query(&cypher)
            .param("id", key)
            .param("lat", point.latitude)
            .param("lon", point.longitude)
            .param("ts", point.timestamp.and_utc().timestamp_millis());
        let rows = self.rows(q)?;
        let created: i64 = match rows.first() {
            Some(row) => row.get("created").map_err(malformed)?,
            None => 0,
        };
        if created != 1 {
            return Err(StoreError::UnexpectedState(format!("insert of {} created {} nodes", key, created)));
        }
        Ok(())
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        let cypher = self.cypher(table, "scan_knn")?;
        self.points(query(&cypher).param("lat", lat).param("lon", lon).param("k", k as i64))
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        let cypher = self.cypher(table, "scan_by_distance")?;
        let meters = widen_radius_km(max_km, NATIVE_EARTH_RADIUS_KM) * 1000.0;
        let mut points = self.points(query(&cypher).param("lat", lat).param("lon", lon).param("meters", meters))?;
        retain_within_km(&mut points, lat, lon, max_km);
        Ok(points)
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        let vertices = open_ring(ring);
        let Some(bounds) = ring_bounds(vertices) else {
            return Ok(Vec::new());
        };
        let cypher = self.cypher(table, "scan_by_polygon")?;
        let q = query(&cypher)
            .param("min_lat", bounds.min_lat)
            .param("max_lat", bounds.max_lat)
            .param("min_lon", bounds.min_lon)
            .param("max_lon", bounds.max_lon);
        let mut points = self.points(q)?;
        points.retain(|p| contains_point(vertices, p.latitude, p.longitude));
        Ok(points)
    }
}

fn statement_text(label: &str, name: &str) -> String {
    match name {
        "insert" => format!(
            "OPTIONAL MATCH (e:{l} {{id: $id}}) WITH e WHERE e IS NULL \
             CREATE (n:{l} {{id: $id, latitude: $lat, longitude: $lon, \
             location: point({{latitude: $lat, longitude: $lon}}), time_of_record: $ts}}) \
             RETURN count(n) AS created",
            l = label
        ),
        "scan_knn" => format!(
            "MATCH (n:{}) WITH n, point.distance(n.location, {}) AS d ORDER BY d ASC LIMIT $k {}",
            label, REFERENCE, RETURN_POINT
        ),
        "scan_by_distance" => format!(
            "MATCH (n:{}) WHERE point.distance(n.location, {}) <= $meters {}",
            label, REFERENCE, RETURN_POINT
        ),
        _ => format!(
            "MATCH (n:{}) WHERE n.latitude >= $min_lat AND n.latitude <= $max_lat \
             AND n.longitude >= $min_lon AND n.longitude <= $max_lon {}",
            label, RETURN_POINT
        ),
    }
}

fn malformed(err: impl std::fmt::Display) -> StoreError {
    StoreError::UnexpectedState(format!("neo4j: malformed row: {}", err))
}

fn point_from_row(row: &Row) -> StoreResult<GeoPoint> {
    let id: String = row.get("id").map_err(malformed)?;
    let latitude: f64 = row.get("latitude").map_err(malformed)?;
    let longitude: f64 = row.get("longitude").map_err(malformed)?;
    let millis: i64 = row.get("time_of_record").map_err(malformed)?;
    let timestamp = chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.naive_utc())
        .ok_or_else(|| StoreError::UnexpectedState(format!("node {} has an invalid time_of_record", id)))?;
    Ok(GeoPoint::new(id, latitude, longitude, timestamp))
}
