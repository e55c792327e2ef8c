/// All errors that can be returned by a `RideStorage` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the ride's version no longer equals
    /// the version the writer observed.
    #[error("concurrent conflict on ride {ride_id}: expected version {expected_version}")]
    ConcurrentConflict {
        ride_id: String,
        expected_version: i64,
    },

    #[error("ride not found: {ride_id}")]
    RideNotFound { ride_id: String },

    #[error("driver not found: {driver_id}")]
    DriverNotFound { driver_id: String },

    /// A ride with this id was already created by the booking flow.
    #[error("ride already exists: {ride_id}")]
    RideAlreadyExists { ride_id: String },

    /// An append-only record with this id is already stored.
    #[error("duplicate audit record id: {id}")]
    DuplicateRecord { id: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
