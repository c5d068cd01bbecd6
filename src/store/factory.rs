use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use crate::core::config::{Properties, WorkloadConfig};
use crate::core::error::{Error, Result};
use crate::store::memory::MemoryStore;
use crate::store::GeoStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Postgres,
    MongoDb,
    Neo4j,
    Redis,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Memory,
        BackendKind::Postgres,
        BackendKind::MongoDb,
        BackendKind::Neo4j,
        BackendKind::Redis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Postgres => "postgres",
            BackendKind::MongoDb => "mongodb",
            BackendKind::Neo4j => "neo4j",
            BackendKind::Redis => "redis",
        }
    }

    /// Whether this build carries the adapter.
    pub fn is_available(&self) -> bool {
        match self {
            BackendKind::Memory => true,
            BackendKind::Postgres => cfg!(feature = "postgres"),
            BackendKind::MongoDb => cfg!(feature = "mongodb"),
            BackendKind::Neo4j => cfg!(feature = "neo4j"),
            BackendKind::Redis => cfg!(feature = "redis"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "postgres" | "postgis" | "postgresql" => Ok(BackendKind::Postgres),
            "mongodb" | "mongo" => Ok(BackendKind::MongoDb),
            "neo4j" => Ok(BackendKind::Neo4j),
            "redis" => Ok(BackendKind::Redis),
            other => Err(Error::config(format!(
                "unknown backend {:?}, expected one of memory, postgres, mongodb, neo4j, redis",
                other
            ))),
        }
    }
}

/// Opens the backend named by `config.backend`.
pub fn open_store_from_config(config: &WorkloadConfig, props: &Properties) -> Result<Arc<dyn GeoStore>> {
    let kind: BackendKind = config.backend.parse()?;
    open_store(kind, props)
}

pub fn open_store(kind: BackendKind, props: &Properties) -> Result<Arc<dyn GeoStore>> {
    if !kind.is_available() {
        return Err(Error::config(format!(
            "backend {} is not compiled into this build; rebuild with `--features {}`",
            kind, kind
        )));
    }

    let store: Arc<dyn GeoStore> = match kind {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => Arc::new(crate::store::postgres::PostgresStore::connect(props)?),
        #[cfg(feature = "mongodb")]
        BackendKind::MongoDb => Arc::new(crate::store::mongodb::MongoStore::connect(props)?),
        #[cfg(feature = "neo4j")]
        BackendKind::Neo4j => Arc::new(crate::store::neo4j::Neo4jStore::connect(props)?),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Arc::new(crate::store::redis::RedisStore::connect(props)?),
        #[allow(unreachable_patterns)]
        other => {
            let _ = props;
            return Err(Error::config(format!("backend {} is not compiled into this build", other)));
        }
    };

    info!(backend = store.name(), "store opened");
    Ok(store)
}
