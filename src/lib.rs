pub mod core;
pub mod geo;
pub mod dataset;
pub mod store;
pub mod workload;

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                              GEOBENCH ARCHITECTURE                               │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── DRIVER LAYER ────────────────────────────────────┐
│                                                                                  │
│  WorkloadRunner ── crossbeam scope, one thread per worker                        │
│       │                                                                          │
│       ▼                                                                          │
│  ┌────────────────────────────────────────────────────────────────────────┐      │
│  │                        struct GeoPointWorkload                        │      │
│  │  config: WorkloadConfig        // table, ranges, proportions, retry   │      │
│  │  dataset: Dataset              // Arc<Vec<GeoPoint>>, index addressed │      │
│  │  operations: OperationChooser  // WeightedIndex over scan kinds       │      │
│  │  keys: KeyChooser              // uniform | exponential               │      │
│  │  shared: SharedState                                                  │      │
│  │    ├─ cursor: InsertCursor              // AtomicU64                  │      │
│  │    ├─ acknowledged: AcknowledgedCounter // contiguous watermark       │      │
│  │    ├─ reset_gate: ResetGate             // parking_lot::Once          │      │
│  │    └─ stats: OperationStats             // atomics per operation      │      │
│  └────────────────────────────────────────────────────────────────────────┘      │
│       │ do_insert / do_transaction (&mut WorkerContext)                          │
│       ▼                                                                          │
│  WorkerContext { id, session: Box<dyn GeoSession>, rng: StdRng }                 │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── STORE LAYER ─────────────────────────────────────┐
│                                                                                  │
│  trait GeoStore: Send + Sync      → open_session()                               │
│  trait GeoSession: Send           → reset / insert / scan_knn /                  │
│                                     scan_by_distance / scan_by_polygon           │
│                                                                                  │
│  MemoryStore     RwLock<HashMap<table, Table>>, rayon scans      (always)        │
│  PostgresStore   PostGIS geography + GiST, StatementCache        (postgres)      │
│  MongoStore      2dsphere, $near / $nearSphere / $geoWithin      (mongodb)       │
│  Neo4jStore      point index, bbox + winding fallback            (neo4j)         │
│  RedisStore      GEOSEARCH, enclosing circle + winding fallback  (redis)         │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── GEO LAYER ───────────────────────────────────────┐
│  haversine_km (R = 6371)   km ↔ degrees (111.32 km/°)   widen_radius_km          │
│  synthesize_square         contains_point (winding)     WKT / GeoJSON rings      │
└──────────────────────────────────────────────────────────────────────────────────┘
*/
