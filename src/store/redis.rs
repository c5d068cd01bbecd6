//! Redis adapter over the GEO commands.
//!
//! A table is two keys: a geo set `<table>:location` and a hash
//! `<table>:time` mapping each member to its formatted timestamp.

use ::redis::{Client, Connection, RedisError};
use chrono::NaiveDateTime;
use tracing::{debug, info};
use crate::core::config::{Properties, PropertiesExt};
use crate::core::error::{Error, Result};
use crate::core::types::{GeoPoint, TIMESTAMP_FORMAT};
use crate::geo::distance::{retain_within_km, widen_radius_km};
use crate::geo::polygon::{contains_point, enclosing_circle, open_ring};
use crate::store::{checked_table, GeoSession, GeoStore, StoreError, StoreResult};

pub const URL_PROPERTY: &str = "redis.url";
pub const HOST_PROPERTY: &str = "redis.host";
pub const HOST_PROPERTY_DEFAULT: &str = "127.0.0.1";
pub const PORT_PROPERTY: &str = "redis.port";
pub const PORT_PROPERTY_DEFAULT: u16 = 6379;
pub const PASSWORD_PROPERTY: &str = "redis.password";

/// Earth radius Redis uses for geohash distances.
pub const NATIVE_EARTH_RADIUS_KM: f64 = 6372.797560856;

/// Covers the whole planet on the Redis sphere.
const WHOLE_PLANET_KM: f64 = 20100.0;

/// GEOADD rejects latitudes beyond the web-mercator limit.
pub const MAX_INDEXABLE_LATITUDE: f64 = 85.05112878;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Backend(format!("redis: {}", err))
    }
}

pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn connect(props: &Properties) -> Result<Self> {
        let url = connection_url(props)?;
        let client = Client::open(url.as_str()).map_err(|e| Error::config(format!("invalid redis url: {}", e)))?;
        let mut con = client
            .get_connection()
            .map_err(|e| Error::backend(format!("cannot connect to redis: {}", e)))?;
        ::redis::cmd("PING")
            .query::<String>(&mut con)
            .map_err(|e| Error::backend(format!("redis did not answer PING: {}", e)))?;
        info!(backend = "redis", "connected");
        Ok(RedisStore { client })
    }
}

fn check_indexable(key: &str, point: &GeoPoint) -> StoreResult<()> {
    if point.latitude.abs() > MAX_INDEXABLE_LATITUDE || point.longitude.abs() > 180.0 {
        return Err(StoreError::Backend(format!(
            "redis cannot index {} at ({}, {})",
            key, point.latitude, point.longitude
        )));
    }
    Ok(())
}

fn connection_url(props: &Properties) -> Result<String> {
    if let Some(url) = props.get_str(URL_PROPERTY) {
        return Ok(url.to_string());
    }
    let host = props.get_str(HOST_PROPERTY).unwrap_or(HOST_PROPERTY_DEFAULT);
    let port: u16 = props.get_or(PORT_PROPERTY, PORT_PROPERTY_DEFAULT)?;
    Ok(match props.get_str(PASSWORD_PROPERTY) {
        Some(password) => format!("redis://:{}@{}:{}/", password, host, port),
        None => format!("redis://{}:{}/", host, port),
    })
}

impl GeoStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(RedisSession {
            con: self.client.get_connection()?,
        }))
    }
}

pub struct RedisSession {
    con: Connection,
}

struct Keys {
    location: String,
    time: String,
}

fn keys(table: &str) -> StoreResult<Keys> {
    let table = checked_table(table)?;
    Ok(Keys {
        location: format!("{}:location", table),
        time: format!("{}:time", table),
    })
}

impl RedisSession {
    /// Removes whichever half of an insert went in when the other half
    /// found the member already present.
    fn undo_half_insert(&mut self, keys: &Keys, key: &str, location_added: bool) -> StoreResult<()> {
        if location_added {
            ::redis::cmd("ZREM").arg(&keys.location).arg(key).query::<i64>(&mut self.con)?;
        } else {
            ::redis::cmd("HDEL").arg(&keys.time).arg(key).query::<i64>(&mut self.con)?;
        }
        Ok(())
    }

    /// `GEOSEARCH ... BYRADIUS` returning `(member, (lon, lat))`.
    fn search(&mut self, keys: &Keys, lat: f64, lon: f64, km: f64, count: Option<usize>) -> StoreResult<Vec<(String, (f64, f64))>> {
        let mut cmd = ::redis::cmd("GEOSEARCH");
        cmd.arg(&keys.location)
            .arg("FROMLONLAT")
            .arg(lon)
            .arg(lat)
            .arg("BYRADIUS")
            .arg(km)
            .arg("km")
            .arg("ASC");
        if let Some(count) = count {
            cmd.arg("COUNT").arg(count);
        }
        cmd.arg("WITHCOORD");
        Ok(cmd.query(&mut self.con)?)
    }

    fn with_timestamps(&mut self, keys: &Keys, hits: Vec<(String, (f64, f64))>) -> StoreResult<Vec<GeoPoint>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let members: Vec<&str> = hits.iter().map(|(m, _)| m.as_str()).collect();
        let stamps: Vec<Option<String>> = ::redis::cmd("HMGET").arg(&keys.time).arg(&members).query(&mut self.con)?;

        hits.into_iter()
            .zip(stamps)
            .map(|((member, (lon, lat)), stamp)| {
                let stamp = stamp.ok_or_else(|| {
                    StoreError::UnexpectedState(format!("redis: {} has no timestamp in {}", member, keys.time))
                })?;
                let timestamp = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).map_err(|e| {
                    StoreError::UnexpectedState(format!("redis: bad timestamp {:?} for {}: {}", stamp, member, e))
                })?;
                Ok(GeoPoint::new(member, lat, lon, timestamp))
            })
            .collect()
    }
}

impl GeoSession for RedisSession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        let keys = keys(table)?;
        ::redis::cmd("DEL").arg(&keys.location).arg(&keys.time).query::<()>(&mut self.con)?;
        debug!(table, "redis keys cleared");
        Ok(())
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        let keys = keys(table)?;
        // MULTI/EXEC does not roll back, so a GEOADD failing inside the
        // transaction would still leave the timestamp behind
        check_indexable(key, point)?;
        let (added, stamped): (i64, i64) = ::redis::pipe()
            .atomic()
            .cmd("GEOADD")
            .arg(&keys.location)
            .arg("NX")
            .arg(point.longitude)
            .arg(point.latitude)
            .arg(key)
            .cmd("HSETNX")
            .arg(&keys.time)
            .arg(key)
            .arg(point.formatted_timestamp())
            .query(&mut self.con)?;
        if added != stamped {
            self.undo_half_insert(&keys, key, added == 1)?;
        }
        if added != 1 || stamped != 1 {
            return Err(StoreError::UnexpectedState(format!(
                "insert of {} added {} locations and {} timestamps",
                key, added, stamped
            )));
        }
        Ok(())
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let keys = keys(table)?;
        let hits = self.search(&keys, lat, lon, WHOLE_PLANET_KM, Some(k))?;
        self.with_timestamps(&keys, hits)
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        let keys = keys(table)?;
        let hits = self.search(&keys, lat, lon, widen_radius_km(max_km, NATIVE_EARTH_RADIUS_KM), None)?;
        let mut points = self.with_timestamps(&keys, hits)?;
        retain_within_km(&mut points, lat, lon, max_km);
        Ok(points)
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        let vertices = open_ring(ring);
        if vertices.len() < 3 {
            return Ok(Vec::new());
        }
        let Some((lat, lon, radius_km)) = enclosing_circle(vertices) else {
            return Ok(Vec::new());
        };
        let keys = keys(table)?;
        let hits: Vec<_> = self
            .search(&keys, lat, lon, widen_radius_km(radius_km, NATIVE_EARTH_RADIUS_KM), None)?
            .into_iter()
            .filter(|(_, (p_lon, p_lat))| contains_point(vertices, *p_lat, *p_lon))
            .collect();
        self.with_timestamps(&keys, hits)
    }
}
