use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use serde::Serialize;
use crate::core::error::{Error, Result};

/// Opaque key/value settings, YCSB style. Adapters read their own keys.
pub type Properties = HashMap<String, String>;

pub const TABLENAME_PROPERTY: &str = "table";
pub const TABLENAME_PROPERTY_DEFAULT: &str = "GEOPOINTS";
pub const RECORD_COUNT_PROPERTY: &str = "recordcount";
pub const INSERT_START_PROPERTY: &str = "insertstart";
pub const INSERT_COUNT_PROPERTY: &str = "insertcount";
pub const SCAN_KNN_PROPORTION_PROPERTY: &str = "scanknnproportion";
pub const SCAN_BY_DISTANCE_PROPORTION_PROPERTY: &str = "scanbydistanceproportion";
pub const SCAN_BY_POLYGON_PROPORTION_PROPERTY: &str = "scanbypolygonproportion";
pub const MIN_SCAN_NEIGHBORS_PROPERTY: &str = "minscanneighbors";
pub const MAX_SCAN_NEIGHBORS_PROPERTY: &str = "maxscanneighbors";
pub const MIN_SCAN_DISTANCE_PROPERTY: &str = "minscandistance";
pub const MAX_SCAN_DISTANCE_PROPERTY: &str = "maxscandistance";
pub const MIN_SCAN_POLYGON_DISTANCE_PROPERTY: &str = "minscanpolygondistance";
pub const MAX_SCAN_POLYGON_DISTANCE_PROPERTY: &str = "maxscanpolygondistance";
pub const INSERTION_RETRY_LIMIT_PROPERTY: &str = "insertionretrylimit";
pub const INSERTION_RETRY_INTERVAL_PROPERTY: &str = "insertionretryinterval";
pub const REQUEST_DISTRIBUTION_PROPERTY: &str = "requestdistribution";
pub const EXPONENTIAL_PERCENTILE_PROPERTY: &str = "exponential.percentile";
pub const EXPONENTIAL_FRAC_PROPERTY: &str = "exponential.frac";
pub const PRELOADED_PROPERTY: &str = "preloaded";
pub const DATASET_PATH_PROPERTY: &str = "dataset.path";
pub const DATASET_SKIP_MALFORMED_PROPERTY: &str = "dataset.skipmalformed";
pub const BACKEND_PROPERTY: &str = "db";
pub const THREAD_COUNT_PROPERTY: &str = "threadcount";
pub const OPERATION_COUNT_PROPERTY: &str = "operationcount";

/// Typed lookups over [`Properties`].
pub trait PropertiesExt {
    fn get_str<'a>(&'a self, key: &str) -> Option<&'a str>;

    fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get_str(key) {
            Some(raw) => raw.trim().parse::<T>().map_err(|_| {
                Error::config(format!("invalid value for {}: {:?}", key, raw))
            }),
            None => Ok(default),
        }
    }

    fn get_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get_str(key) {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                Error::config(format!("invalid value for {}: {:?}", key, raw))
            }),
            None => Ok(None),
        }
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| Error::config(format!("missing required property {}", key)))
    }
}

impl PropertiesExt for Properties {
    fn get_str<'a>(&'a self, key: &str) -> Option<&'a str> {
        self.get(key).map(|s| s.as_str()).filter(|s| !s.trim().is_empty())
    }
}

/// Inclusive integer range for per-transaction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntRange {
    pub min: u64,
    pub max: u64,
}

impl IntRange {
    pub fn new(min: u64, max: u64) -> Self {
        IntRange { min, max }
    }

    fn from_properties(props: &Properties, min_key: &str, max_key: &str, defaults: (u64, u64)) -> Result<Self> {
        let range = IntRange {
            min: props.get_or(min_key, defaults.0)?,
            max: props.get_or(max_key, defaults.1)?,
        };
        if range.min > range.max {
            return Err(Error::config(format!(
                "{} ({}) must not exceed {} ({})",
                min_key, range.min, max_key, range.max
            )));
        }
        Ok(range)
    }
}

/// Relative weights of the three scan kinds. Zero disables a kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationMix {
    pub knn: f64,
    pub distance: f64,
    pub polygon: f64,
}

impl Default for OperationMix {
    fn default() -> Self {
        OperationMix { knn: 0.0, distance: 0.0, polygon: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RequestDistribution {
    Uniform,
    /// Offsets back from the newest acknowledged record.
    Exponential { percentile: f64, frac: f64 },
}

impl RequestDistribution {
    pub const DEFAULT_EXPONENTIAL_PERCENTILE: f64 = 95.0;
    pub const DEFAULT_EXPONENTIAL_FRAC: f64 = 0.8571428571;

    fn from_properties(props: &Properties) -> Result<Self> {
        match props.get_str(REQUEST_DISTRIBUTION_PROPERTY).unwrap_or("uniform") {
            "uniform" => Ok(RequestDistribution::Uniform),
            "exponential" => {
                let percentile = props.get_or(EXPONENTIAL_PERCENTILE_PROPERTY, Self::DEFAULT_EXPONENTIAL_PERCENTILE)?;
                let frac = props.get_or(EXPONENTIAL_FRAC_PROPERTY, Self::DEFAULT_EXPONENTIAL_FRAC)?;
                if !(percentile > 0.0 && percentile < 100.0) {
                    return Err(Error::config(format!(
                        "{} must be in (0, 100), got {}",
                        EXPONENTIAL_PERCENTILE_PROPERTY, percentile
                    )));
                }
                if !(frac > 0.0) {
                    return Err(Error::config(format!("{} must be positive, got {}", EXPONENTIAL_FRAC_PROPERTY, frac)));
                }
                Ok(RequestDistribution::Exponential { percentile, frac })
            }
            other => Err(Error::config(format!("unknown request distribution {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadConfig {
    pub table: String,
    /// 0 means "as many records as the dataset holds".
    pub record_count: u64,
    pub insert_start: u64,
    /// `None` until resolved against the dataset (only when `record_count` is 0).
    pub insert_count: Option<u64>,

    pub operation_mix: OperationMix,
    pub scan_neighbors: IntRange,
    pub scan_distance_km: IntRange,
    pub scan_polygon_distance_km: IntRange,

    pub insertion_retry_limit: u32,
    pub insertion_retry_interval: Duration,

    pub request_distribution: RequestDistribution,
    /// Records were loaded by an earlier process; treat the whole insert range as acknowledged.
    pub preloaded: bool,

    pub dataset_path: Option<PathBuf>,
    pub skip_malformed: bool,

    pub backend: String,
    pub thread_count: usize,
    pub operation_count: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            table: TABLENAME_PROPERTY_DEFAULT.to_string(),
            record_count: 0,
            insert_start: 0,
            insert_count: None,
            operation_mix: OperationMix::default(),
            scan_neighbors: IntRange::new(1, 10),
            scan_distance_km: IntRange::new(1, 100),
            scan_polygon_distance_km: IntRange::new(1, 100),
            insertion_retry_limit: 0,
            insertion_retry_interval: Duration::from_secs(3),
            request_distribution: RequestDistribution::Uniform,
            preloaded: false,
            dataset_path: None,
            skip_malformed: false,
            backend: "memory".to_string(),
            thread_count: 1,
            operation_count: 0,
        }
    }
}

impl WorkloadConfig {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let defaults = WorkloadConfig::default();

        let table = props.get_str(TABLENAME_PROPERTY).unwrap_or(TABLENAME_PROPERTY_DEFAULT).to_string();
        validate_identifier(&table)?;

        let record_count: u64 = props.get_or(RECORD_COUNT_PROPERTY, 0)?;
        let insert_start: u64 = props.get_or(INSERT_START_PROPERTY, 0)?;
        let insert_count = match props.get_opt::<u64>(INSERT_COUNT_PROPERTY)? {
            Some(count) => Some(count),
            None if record_count > 0 => Some(record_count.saturating_sub(insert_start)),
            None => None,
        };

        if record_count > 0 {
            if let Some(count) = insert_count {
                let end = insert_start.checked_add(count).ok_or_else(|| {
                    Error::config(format!("insertstart ({}) + insertcount ({}) overflows", insert_start, count))
                })?;
                if record_count < end {
                    return Err(Error::config(format!(
                        "invalid combination of insertstart ({}), insertcount ({}) and recordcount ({}): \
                         recordcount must be bigger than insertstart + insertcount",
                        insert_start, count, record_count
                    )));
                }
            }
        }

        let operation_mix = OperationMix {
            knn: non_negative(props, SCAN_KNN_PROPORTION_PROPERTY)?,
            distance: non_negative(props, SCAN_BY_DISTANCE_PROPORTION_PROPERTY)?,
            polygon: non_negative(props, SCAN_BY_POLYGON_PROPORTION_PROPERTY)?,
        };

        let scan_neighbors = IntRange::from_properties(props, MIN_SCAN_NEIGHBORS_PROPERTY, MAX_SCAN_NEIGHBORS_PROPERTY, (1, 10))?;
        if scan_neighbors.min == 0 {
            return Err(Error::config(format!("{} must be at least 1", MIN_SCAN_NEIGHBORS_PROPERTY)));
        }
        let scan_distance_km = IntRange::from_properties(props, MIN_SCAN_DISTANCE_PROPERTY, MAX_SCAN_DISTANCE_PROPERTY, (1, 100))?;
        let scan_polygon_distance_km = IntRange::from_properties(
            props,
            MIN_SCAN_POLYGON_DISTANCE_PROPERTY,
            MAX_SCAN_POLYGON_DISTANCE_PROPERTY,
            (1, 100),
        )?;

        let retry_secs: f64 = props.get_or(
            INSERTION_RETRY_INTERVAL_PROPERTY,
            defaults.insertion_retry_interval.as_secs_f64(),
        )?;
        if !(retry_secs >= 0.0) || !retry_secs.is_finite() {
            return Err(Error::config(format!(
                "{} must be a non-negative number of seconds",
                INSERTION_RETRY_INTERVAL_PROPERTY
            )));
        }

        let thread_count = props.get_or(THREAD_COUNT_PROPERTY, defaults.thread_count)?;
        if thread_count == 0 {
            return Err(Error::config(format!("{} must be at least 1", THREAD_COUNT_PROPERTY)));
        }

        Ok(WorkloadConfig {
            table,
            record_count,
            insert_start,
            insert_count,
            operation_mix,
            scan_neighbors,
            scan_distance_km,
            scan_polygon_distance_km,
            insertion_retry_limit: props.get_or(INSERTION_RETRY_LIMIT_PROPERTY, defaults.insertion_retry_limit)?,
            insertion_retry_interval: Duration::from_secs_f64(retry_secs),
            request_distribution: RequestDistribution::from_properties(props)?,
            preloaded: props.get_or(PRELOADED_PROPERTY, false)?,
            dataset_path: props.get_str(DATASET_PATH_PROPERTY).map(PathBuf::from),
            skip_malformed: props.get_or(DATASET_SKIP_MALFORMED_PROPERTY, false)?,
            backend: props.get_str(BACKEND_PROPERTY).unwrap_or("memory").to_string(),
            thread_count,
            operation_count: props.get_or(OPERATION_COUNT_PROPERTY, 0)?,
        })
    }

    /// Upper bound handed to the dataset loader.
    pub fn load_limit(&self) -> Option<usize> {
        if self.record_count == 0 {
            None
        } else {
            Some(self.record_count as usize)
        }
    }

    /// Resolves `insert_count` for a loaded dataset and checks the
    /// insert range actually exists in it.
    pub fn resolve_insert_range(&self, dataset_len: usize) -> Result<(u64, u64)> {
        let available = dataset_len as u64;
        let count = match self.insert_count {
            Some(count) => count,
            None => available.saturating_sub(self.insert_start),
        };
        if count == 0 {
            return Err(Error::config("insert range is empty: nothing to insert or query"));
        }
        let end = self
            .insert_start
            .checked_add(count)
            .ok_or_else(|| Error::config("insertstart + insertcount overflows"))?;
        if end > available {
            return Err(Error::config(format!(
                "dataset holds {} records but insertstart + insertcount = {}",
                available, end
            )));
        }
        Ok((self.insert_start, count))
    }
}

/// Java-style properties text: `key=value` or `key: value` per line,
/// `#` and `!` start comments. Later keys win.
pub fn parse_properties(text: &str) -> Properties {
    let mut props = Properties::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line.find(|c| c == '=' || c == ':');
        let (key, value) = match split {
            Some(at) => (&line[..at], &line[at + 1..]),
            None => (line, ""),
        };
        props.insert(key.trim().to_string(), value.trim().to_string());
    }
    props
}

pub fn load_properties(path: &Path) -> Result<Properties> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("cannot read properties file {}: {}", path.display(), e)))?;
    Ok(parse_properties(&text))
}

/// Table names end up inside SQL, Cypher and Redis keys.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_head = chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::config(format!("table name {:?} is not a plain identifier", name)))
    }
}

fn non_negative(props: &Properties, key: &str) -> Result<f64> {
    let value: f64 = props.get_or(key, 0.0)?;
    if value < 0.0 || !value.is_finite() {
        return Err(Error::config(format!("{} must be a non-negative number, got {}", key, value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_follow_ycsb_geo_workload() {
        let config = WorkloadConfig::from_properties(&Properties::new()).unwrap();
        assert_eq!(config.table, "GEOPOINTS");
        assert_eq!(config.scan_neighbors, IntRange::new(1, 10));
        assert_eq!(config.scan_distance_km, IntRange::new(1, 100));
        assert_eq!(config.insertion_retry_limit, 0);
        assert_eq!(config.insertion_retry_interval, Duration::from_secs(3));
        assert_eq!(config.operation_mix, OperationMix::default());
        assert_eq!(config.insert_count, None);
    }

    #[test]
    fn insert_count_defaults_to_remaining_records() {
        let config = WorkloadConfig::from_properties(&props(&[("recordcount", "100"), ("insertstart", "40")])).unwrap();
        assert_eq!(config.insert_count, Some(60));
    }

    #[test]
    fn rejects_insert_range_beyond_record_count() {
        let err = WorkloadConfig::from_properties(&props(&[
            ("recordcount", "100"),
            ("insertstart", "50"),
            ("insertcount", "60"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn rejects_inverted_ranges_and_bad_numbers() {
        assert!(WorkloadConfig::from_properties(&props(&[("minscandistance", "50"), ("maxscandistance", "10")])).is_err());
        assert!(WorkloadConfig::from_properties(&props(&[("scanknnproportion", "lots")])).is_err());
        assert!(WorkloadConfig::from_properties(&props(&[("scanknnproportion", "-1")])).is_err());
        assert!(WorkloadConfig::from_properties(&props(&[("minscanneighbors", "0")])).is_err());
    }

    #[test]
    fn parses_exponential_distribution() {
        let config = WorkloadConfig::from_properties(&props(&[
            ("requestdistribution", "exponential"),
            ("exponential.percentile", "90"),
        ]))
        .unwrap();
        assert_eq!(
            config.request_distribution,
            RequestDistribution::Exponential { percentile: 90.0, frac: RequestDistribution::DEFAULT_EXPONENTIAL_FRAC }
        );
        assert!(WorkloadConfig::from_properties(&props(&[("requestdistribution", "zipfian")])).is_err());
    }

    #[test]
    fn fractional_retry_interval() {
        let config = WorkloadConfig::from_properties(&props(&[("insertionretryinterval", "0.25")])).unwrap();
        assert_eq!(config.insertion_retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_identifier("GEOPOINTS").is_ok());
        assert!(validate_identifier("_geo_2").is_ok());
        assert!(validate_identifier("2geo").is_err());
        assert!(validate_identifier("geo; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn parses_properties_text() {
        let props = parse_properties(
            "# geo workload\n\
             recordcount=1000\n\
             table : TAXI\n\
             ! also a comment\n\
             \n\
             dataset.path = /data/taxi.csv\n\
             recordcount=2000\n",
        );
        assert_eq!(props.get_str("recordcount"), Some("2000"));
        assert_eq!(props.get_str("table"), Some("TAXI"));
        assert_eq!(props.get_str("dataset.path"), Some("/data/taxi.csv"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn missing_properties_file_is_a_configuration_error() {
        let err = load_properties(Path::new("/no/such/workload")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn resolve_insert_range_checks_dataset_length() {
        let mut config = WorkloadConfig::default();
        assert_eq!(config.resolve_insert_range(10).unwrap(), (0, 10));
        config.insert_start = 4;
        config.insert_count = Some(8);
        assert!(config.resolve_insert_range(10).is_err());
        assert!(WorkloadConfig::default().resolve_insert_range(0).is_err());

        config.insert_start = u64::MAX;
        config.insert_count = Some(2);
        assert_eq!(config.resolve_insert_range(10).unwrap_err().kind, ErrorKind::Configuration);
    }

    #[test]
    fn overflowing_insert_range_is_a_configuration_error() {
        let err = WorkloadConfig::from_properties(&props(&[
            ("recordcount", "100"),
            ("insertstart", "18446744073709551615"),
            ("insertcount", "2"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
