pub mod loader;

pub use loader::{parse_record, Dataset, DatasetLoader};
