pub mod duckdb;
pub mod traits;

pub use traits::{PersistedRecord, Storage, StorageError};
