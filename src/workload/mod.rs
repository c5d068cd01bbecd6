pub mod context;
pub mod counters;
pub mod generator;
pub mod runner;
#[allow(clippy::module_inception)]
pub mod workload;

pub use context::WorkerContext;
pub use counters::{AcknowledgedCounter, InsertCursor, ResetGate};
pub use generator::{KeyChooser, OperationChooser, UniformRange};
pub use runner::{Phase, PhaseReport, WorkloadRunner};
pub use workload::{GeoPointWorkload, SharedState, Sleeper, RETRY_JITTER};
