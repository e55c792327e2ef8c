use async_trait::async_trait;
use rideshare_domain::{
    AdminAction, AdminActionQuery, DriverProfile, Ride, RideStatus, StatusHistoryEntry,
};

use crate::error::StorageError;

/// The storage trait for ride lifecycle backends.
///
/// A `RideStorage` implementation provides durable storage for rides, driver
/// eligibility data, the per-ride status history, and the admin action log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a unit of work. The
/// lifecycle is:
///
/// 1. `begin_snapshot()`: start a unit of work
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: apply everything atomically
///    OR `abort_snapshot(snapshot)`: discard everything
///
/// Writes made through a snapshot are invisible to the query methods until
/// the snapshot commits. A snapshot dropped without committing MUST have no
/// effect.
///
/// ## Conditional Writes
///
/// `update_ride` is a compare-and-swap on the ride's version:
/// `UPDATE ... WHERE id = ? AND version = expected_version`. A backend may
/// detect a lost race either when `update_ride` is called or when the
/// snapshot commits; in both cases it returns
/// `StorageError::ConcurrentConflict` and a failed commit applies nothing.
/// The backend is the only arbiter of who wins: two snapshots updating the
/// same ride from the same version never both commit.
///
/// ## Append-only records
///
/// Status history entries and admin actions are never updated or deleted.
/// Both are returned in insertion order.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// request-handling tasks.
#[async_trait]
pub trait RideStorage: Send + Sync + 'static {
    /// The snapshot (unit of work) type used by this backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all of its writes durable at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Discard a snapshot and all of its writes.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Writes (within snapshot) ─────────────────────────────────────────────

    /// Create a ride exactly as given. Used by the booking flow and fixtures;
    /// the lifecycle engine never creates rides.
    ///
    /// Returns `Err(StorageError::RideAlreadyExists)` if the id is taken.
    async fn insert_ride(&self, snapshot: &mut Self::Snapshot, ride: Ride)
        -> Result<(), StorageError>;

    /// Create or replace a driver's eligibility profile.
    async fn upsert_driver(
        &self,
        snapshot: &mut Self::Snapshot,
        driver: DriverProfile,
    ) -> Result<(), StorageError>;

    /// Conditionally overwrite a ride (OCC).
    ///
    /// Every column of `ride` except `version` is written; the stored version
    /// becomes `expected_version + 1`, which is returned.
    async fn update_ride(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_version: i64,
        ride: &Ride,
    ) -> Result<i64, StorageError>;

    /// Append a status history entry.
    ///
    /// Must be called in the SAME snapshot as the `update_ride` it records, so
    /// that no status change is ever committed without its history entry.
    async fn append_status_history(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: StatusHistoryEntry,
    ) -> Result<(), StorageError>;

    /// Append an admin action record.
    async fn append_admin_action(
        &self,
        snapshot: &mut Self::Snapshot,
        action: AdminAction,
    ) -> Result<(), StorageError>;

    // ── Queries (committed state only) ───────────────────────────────────────

    /// Returns `Err(StorageError::RideNotFound)` if the ride does not exist.
    async fn get_ride(&self, ride_id: &str) -> Result<Ride, StorageError>;

    /// Returns `Err(StorageError::DriverNotFound)` if the driver does not exist.
    async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile, StorageError>;

    /// List rides ordered by id, optionally filtered by status.
    async fn list_rides(&self, status_filter: Option<RideStatus>)
        -> Result<Vec<Ride>, StorageError>;

    /// Status history of one ride in insertion order. Empty for unknown rides.
    async fn list_status_history(
        &self,
        ride_id: &str,
    ) -> Result<Vec<StatusHistoryEntry>, StorageError>;

    /// Admin actions matching `query`, in insertion order, truncated to
    /// `query.limit` when non-zero.
    async fn list_admin_actions(
        &self,
        query: &AdminActionQuery,
    ) -> Result<Vec<AdminAction>, StorageError>;
}
