use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format used by the dataset file and by backends that store the
/// observation time as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: NaiveDateTime,
}

impl GeoPoint {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, timestamp: NaiveDateTime) -> Self {
        GeoPoint {
            id: id.into(),
            latitude,
            longitude,
            timestamp,
        }
    }

    /// A bare coordinate, used for polygon vertices.
    pub fn vertex(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            id: String::new(),
            latitude,
            longitude,
            timestamp: NaiveDateTime::default(),
        }
    }

    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Outcome of one backend call as seen by the workload driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    RecoverableError,
    UnexpectedState,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Operations the workload issues against a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Insert,
    ScanKnn,
    ScanByDistance,
    ScanByPolygon,
}

impl Operation {
    pub const SCANS: [Operation; 3] = [Operation::ScanKnn, Operation::ScanByDistance, Operation::ScanByPolygon];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::ScanKnn => "SCAN_KNN",
            Operation::ScanByDistance => "SCAN_BY_DISTANCE",
            Operation::ScanByPolygon => "SCAN_BY_POLYGON",
        }
    }
}
