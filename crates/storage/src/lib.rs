mod error;
mod memory;
mod traits;

pub mod conformance;

pub use error::StorageError;
pub use memory::{InMemoryStorage, MemorySnapshot};
pub use traits::RideStorage;
