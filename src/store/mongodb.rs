//! MongoDB adapter, on the driver's blocking API.
//!
//! Documents carry a GeoJSON `location` under a `2dsphere` index and use
//! the record key as `_id`, so a repeated key is rejected by the server.

use ::mongodb::bson::document::ValueAccessError;
use ::mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use ::mongodb::error::{ErrorKind, WriteFailure};
use ::mongodb::options::FindOptions;
use ::mongodb::sync::{Client, Collection, Cursor, Database};
use ::mongodb::IndexModel;
use tracing::{debug, info};
use crate::core::config::{Properties, PropertiesExt};
use crate::core::error::{Error, Result};
use crate::core::types::GeoPoint;
use crate::geo::distance::{retain_within_km, widen_radius_km};
use crate::geo::polygon::closed_coordinates;
use crate::store::{checked_table, GeoSession, GeoStore, StoreError, StoreResult};

pub const URL_PROPERTY: &str = "mongodb.url";
pub const URL_PROPERTY_DEFAULT: &str = "mongodb://localhost:27017";
pub const DATABASE_PROPERTY: &str = "mongodb.database";
pub const DATABASE_PROPERTY_DEFAULT: &str = "ycsb";

/// Sphere radius behind `$nearSphere` distances.
pub const NATIVE_EARTH_RADIUS_KM: f64 = 6378.1;

const DUPLICATE_KEY: i32 = 11000;

impl From<::mongodb::error::Error> for StoreError {
    fn from(err: ::mongodb::error::Error) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(ref write)) = *err.kind {
            if write.code == DUPLICATE_KEY {
                return StoreError::UnexpectedState(format!("mongodb: duplicate key: {}", write.message));
            }
        }
        StoreError::Backend(format!("mongodb: {}", err))
    }
}

impl From<ValueAccessError> for StoreError {
    fn from(err: ValueAccessError) -> Self {
        StoreError::UnexpectedState(format!("mongodb: malformed document: {}", err))
    }
}

pub struct MongoStore {
    client: Client,
    database: String,
}

impl MongoStore {
    pub fn connect(props: &Properties) -> Result<Self> {
        let url = props.get_str(URL_PROPERTY).unwrap_or(URL_PROPERTY_DEFAULT);
        let database = props.get_str(DATABASE_PROPERTY).unwrap_or(DATABASE_PROPERTY_DEFAULT).to_string();

        let client = Client::with_uri_str(url)
            .map_err(|e| Error::backend(format!("invalid mongodb url: {}", e)))?;
        // the driver connects lazily
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .map_err(|e| Error::backend(format!("cannot reach mongodb: {}", e)))?;

        info!(backend = "mongodb", database = %database, "connected");
        Ok(MongoStore { client, database })
    }
}

impl GeoStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>> {
        Ok(Box::new(MongoSession {
            database: self.client.database(&self.database),
        }))
    }
}

pub struct MongoSession {
    database: Database,
}

impl MongoSession {
    fn collection(&self, table: &str) -> StoreResult<Collection<Document>> {
        Ok(self.database.collection::<Document>(checked_table(table)?))
    }
}

impl GeoSession for MongoSession {
    fn reset(&mut self, table: &str) -> StoreResult<()> {
        let collection = self.collection(table)?;
        // a missing collection is not an error here
        collection.drop(None)?;
        let index = IndexModel::builder().keys(doc! { "location": "2dsphere" }).build();
        collection.create_index(index, None)?;
        debug!(table, "mongodb collection recreated");
        Ok(())
    }

    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()> {
        self.collection(table)?.insert_one(point_document(key, point), None)?;
        Ok(())
    }

    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let filter = doc! {
            "location": { "$near": { "$geometry": geojson_point(lat, lon) } }
        };
        let options = FindOptions::builder().limit(k as i64).build();
        collect_points(self.collection(table)?.find(filter, options)?)
    }

    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>> {
        let meters = widen_radius_km(max_km, NATIVE_EARTH_RADIUS_KM) * 1000.0;
        let filter = doc! {
            "location": {
                "$nearSphere": { "$geometry": geojson_point(lat, lon), "$maxDistance": meters }
            }
        };
        let mut points = collect_points(self.collection(table)?.find(filter, None)?)?;
        retain_within_km(&mut points, lat, lon, max_km);
        Ok(points)
    }

    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>> {
        if ring.len() < 3 {
            return Ok(Vec::new());
        }
        let filter = doc! {
            "location": { "$geoWithin": { "$geometry": geojson_polygon(ring) } }
        };
        collect_points(self.collection(table)?.find(filter, None)?)
    }
}

fn geojson_point(lat: f64, lon: f64) -> Document {
    doc! { "type": "Point", "coordinates": [lon, lat] }
}

fn geojson_polygon(ring: &[GeoPoint]) -> Document {
    let coordinates: Vec<Vec<f64>> = closed_coordinates(ring).into_iter().map(|c| c.to_vec()).collect();
    doc! { "type": "Polygon", "coordinates": [coordinates] }
}

fn point_document(key: &str, point: &GeoPoint) -> Document {
    let millis = point.timestamp.and_utc().timestamp_millis();
    doc! {
        "_id": key,
        "id": key,
        "location": geojson_point(point.latitude, point.longitude),
        "time_of_record": BsonDateTime::from_millis(millis),
    }
}

fn point_from_document(doc: &Document) -> StoreResult<GeoPoint> {
    let id = doc.get_str("id")?.to_string();
    let coordinates = doc.get_document("location")?.get_array("coordinates")?;
    let coordinate = |i: usize| {
        coordinates
            .get(i)
            .and_then(Bson::as_f64)
            .ok_or_else(|| StoreError::UnexpectedState(format!("document {} has malformed coordinates", id)))
    };
    let longitude = coordinate(0)?;
    let latitude = coordinate(1)?;

    let millis = doc.get_datetime("time_of_record")?.timestamp_millis();
    let timestamp = chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.naive_utc())
        .ok_or_else(|| StoreError::UnexpectedState(format!("document {} has an invalid time_of_record", id)))?;

    Ok(GeoPoint::new(id, latitude, longitude, timestamp))
}

fn collect_points(cursor: Cursor<Document>) -> StoreResult<Vec<GeoPoint>> {
    cursor.map(|doc| point_from_document(&doc?)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn document_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2008, 2, 2).and_then(|d| d.and_hms_opt(13, 30, 49)).unwrap();
        let point = GeoPoint::new("1131-0", 39.9, 116.4, ts);
        let doc = point_document("1131-0", &point);
        assert_eq!(doc.get_str("_id").unwrap(), "1131-0");
        assert_eq!(point_from_document(&doc).unwrap(), point);
    }

    #[test]
    fn polygon_is_closed_lon_lat() {
        let ring = vec![GeoPoint::vertex(0.0, 0.0), GeoPoint::vertex(0.0, 1.0), GeoPoint::vertex(1.0, 1.0)];
        let polygon = geojson_polygon(&ring);
        let outer = polygon.get_array("coordinates").unwrap()[0].as_array().unwrap().clone();
        assert_eq!(outer.len(), 4);
        assert_eq!(outer.first(), outer.last());
        assert_eq!(outer[1], Bson::Array(vec![Bson::Double(1.0), Bson::Double(0.0)]));
    }

    #[test]
    fn malformed_documents_are_unexpected_state() {
        let doc = doc! { "id": "x", "location": { "coordinates": [1.0] } };
        assert!(matches!(point_from_document(&doc), Err(StoreError::UnexpectedState(_))));
    }
}
