use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use chrono::NaiveDateTime;
use tracing::{info, warn};
use crate::core::error::{Error, Result};
use crate::core::types::{GeoPoint, TIMESTAMP_FORMAT};

const ID_COLUMN: usize = 0;
const TIMESTAMP_COLUMN: usize = 3;
const LATITUDE_COLUMN: usize = 6;
const LONGITUDE_COLUMN: usize = 7;

/// Immutable, index-addressed set of points for one run
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    points: Arc<Vec<GeoPoint>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&GeoPoint> {
        usize::try_from(index).ok().and_then(|i| self.points.get(i))
    }
}

impl From<Vec<GeoPoint>> for Dataset {
    fn from(points: Vec<GeoPoint>) -> Self {
        Dataset { points: Arc::new(points) }
    }
}

/// Reads the trajectory CSV: one header line, then
/// `id, _, _, timestamp, _, _, latitude, longitude, ...`.
///
/// Strict by default: the first malformed record aborts the load.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    max_records: Option<usize>,
    skip_malformed: bool,
}

impl DatasetLoader {
    pub fn new(max_records: Option<usize>) -> Self {
        DatasetLoader { max_records, skip_malformed: false }
    }

    /// Log and drop malformed records instead of failing.
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    pub fn load_path(&self, path: &Path) -> Result<Dataset> {
        let file = File::open(path)
            .map_err(|e| Error::load(format!("cannot open dataset {}: {}", path.display(), e)))?;
        let dataset = self.load(BufReader::new(file))?;
        info!(path = %path.display(), records = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    pub fn load<R: BufRead>(&self, reader: R) -> Result<Dataset> {
        let limit = self.max_records.unwrap_or(usize::MAX);
        let mut points = Vec::new();

        // line 1 is the header
        for (line_no, line) in reader.lines().enumerate().skip(1) {
            if points.len() >= limit {
                break;
            }
            let line = line.map_err(|e| Error::load(format!("reading line {}: {}", line_no + 1, e)))?;
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(line, points.len()) {
                Ok(point) => points.push(point),
                Err(reason) if self.skip_malformed => {
                    warn!(line = line_no + 1, %reason, "skipping malformed dataset record");
                }
                Err(reason) => {
                    return Err(Error::load(format!("line {}: {}", line_no + 1, reason)));
                }
            }
        }

        Ok(Dataset::from(points))
    }
}

/// Parses one data line. `index` is the record's position in the dataset and
/// is appended to the raw id, which repeats across a trajectory.
pub fn parse_record(line: &str, index: usize) -> std::result::Result<GeoPoint, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let field = |col: usize, name: &str| {
        fields
            .get(col)
            .copied()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| format!("missing {} (column {})", name, col + 1))
    };

    let raw_id = field(ID_COLUMN, "id")?;
    let timestamp_raw = field(TIMESTAMP_COLUMN, "timestamp")?;
    let timestamp = NaiveDateTime::parse_from_str(timestamp_raw, TIMESTAMP_FORMAT)
        .map_err(|e| format!("bad timestamp {:?}: {}", timestamp_raw, e))?;

    let latitude = parse_coordinate(field(LATITUDE_COLUMN, "latitude")?, "latitude", 90.0)?;
    let longitude = parse_coordinate(field(LONGITUDE_COLUMN, "longitude")?, "longitude", 180.0)?;

    Ok(GeoPoint::new(format!("{}-{}", raw_id, index), latitude, longitude, timestamp))
}

fn parse_coordinate(raw: &str, name: &str, bound: f64) -> std::result::Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("bad {} {:?}", name, raw))?;
    if !value.is_finite() || value.abs() > bound {
        return Err(format!("{} {} out of range", name, value));
    }
    Ok(value)
}
