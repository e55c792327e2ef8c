//! In-process `RideStorage` backend.
//!
//! Snapshots buffer their writes. `update_ride` checks the expected version
//! against the snapshot's own view (falling back to committed state), and
//! `commit_snapshot` re-validates every buffered conditional write under the
//! table lock before applying anything. Two snapshots racing from the same
//! version can therefore both buffer an update, but only the first to commit
//! wins; the second gets `ConcurrentConflict` and applies nothing.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rideshare_domain::{
    AdminAction, AdminActionQuery, DriverProfile, Ride, RideStatus, StatusHistoryEntry,
};

use crate::error::StorageError;
use crate::traits::RideStorage;

#[derive(Default)]
struct Tables {
    rides: BTreeMap<String, Ride>,
    drivers: BTreeMap<String, DriverProfile>,
    history: Vec<StatusHistoryEntry>,
    admin_actions: Vec<AdminAction>,
    record_ids: HashSet<String>,
}

/// Shared, cloneable in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
}

/// How a buffered ride write must be validated at commit.
#[derive(Debug, Clone, Copy)]
enum Precondition {
    /// The id must still be free.
    Absent,
    /// The committed version must still equal this.
    Version(i64),
}

#[derive(Debug)]
struct PendingRide {
    precondition: Precondition,
    ride: Ride,
}

/// Buffered writes of one unit of work.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    rides: BTreeMap<String, PendingRide>,
    drivers: Vec<DriverProfile>,
    history: Vec<StatusHistoryEntry>,
    admin_actions: Vec<AdminAction>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("in-memory tables poisoned".to_string()))
    }
}

fn validate(tables: &Tables, snapshot: &MemorySnapshot) -> Result<(), StorageError> {
    for (ride_id, pending) in &snapshot.rides {
        match (pending.precondition, tables.rides.get(ride_id)) {
            (Precondition::Absent, None) => {}
            (Precondition::Absent, Some(_)) => {
                return Err(StorageError::RideAlreadyExists {
                    ride_id: ride_id.clone(),
                })
            }
            (Precondition::Version(expected), Some(current)) if current.version == expected => {}
            (Precondition::Version(expected), Some(_)) => {
                return Err(StorageError::ConcurrentConflict {
                    ride_id: ride_id.clone(),
                    expected_version: expected,
                })
            }
            (Precondition::Version(_), None) => {
                return Err(StorageError::RideNotFound {
                    ride_id: ride_id.clone(),
                })
            }
        }
    }

    let mut seen = HashSet::new();
    let ids = snapshot
        .history
        .iter()
        .map(|e| &e.id)
        .chain(snapshot.admin_actions.iter().map(|a| &a.id));
    for id in ids {
        if tables.record_ids.contains(id) || !seen.insert(id) {
            return Err(StorageError::DuplicateRecord { id: id.clone() });
        }
    }
    Ok(())
}

#[async_trait]
impl RideStorage for InMemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.tables()?;
        validate(&tables, &snapshot)?;

        for (ride_id, pending) in snapshot.rides {
            tables.rides.insert(ride_id, pending.ride);
        }
        for driver in snapshot.drivers {
            tables.drivers.insert(driver.id.clone(), driver);
        }
        for entry in snapshot.history {
            tables.record_ids.insert(entry.id.clone());
            tables.history.push(entry);
        }
        for action in snapshot.admin_actions {
            tables.record_ids.insert(action.id.clone());
            tables.admin_actions.push(action);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_ride(
        &self,
        snapshot: &mut MemorySnapshot,
        ride: Ride,
    ) -> Result<(), StorageError> {
        let exists =
            snapshot.rides.contains_key(&ride.id) || self.tables()?.rides.contains_key(&ride.id);
        if exists {
            return Err(StorageError::RideAlreadyExists { ride_id: ride.id });
        }
        snapshot.rides.insert(
            ride.id.clone(),
            PendingRide {
                precondition: Precondition::Absent,
                ride,
            },
        );
        Ok(())
    }

    async fn upsert_driver(
        &self,
        snapshot: &mut MemorySnapshot,
        driver: DriverProfile,
    ) -> Result<(), StorageError> {
        snapshot.drivers.push(driver);
        Ok(())
    }

    async fn update_ride(
        &self,
        snapshot: &mut MemorySnapshot,
        expected_version: i64,
        ride: &Ride,
    ) -> Result<i64, StorageError> {
        let (current_version, precondition) = match snapshot.rides.get(&ride.id) {
            Some(pending) => (pending.ride.version, pending.precondition),
            None => {
                let tables = self.tables()?;
                let committed = tables
                    .rides
                    .get(&ride.id)
                    .ok_or_else(|| StorageError::RideNotFound {
                        ride_id: ride.id.clone(),
                    })?;
                (committed.version, Precondition::Version(committed.version))
            }
        };
        if current_version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                ride_id: ride.id.clone(),
                expected_version,
            });
        }

        let mut next = ride.clone();
        next.version = expected_version + 1;
        snapshot.rides.insert(
            ride.id.clone(),
            PendingRide {
                precondition,
                ride: next,
            },
        );
        Ok(expected_version + 1)
    }

    async fn append_status_history(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: StatusHistoryEntry,
    ) -> Result<(), StorageError> {
        snapshot.history.push(entry);
        Ok(())
    }

    async fn append_admin_action(
        &self,
        snapshot: &mut MemorySnapshot,
        action: AdminAction,
    ) -> Result<(), StorageError> {
        snapshot.admin_actions.push(action);
        Ok(())
    }

    async fn get_ride(&self, ride_id: &str) -> Result<Ride, StorageError> {
        self.tables()?
            .rides
            .get(ride_id)
            .cloned()
            .ok_or_else(|| StorageError::RideNotFound {
                ride_id: ride_id.to_string(),
            })
    }

    async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile, StorageError> {
        self.tables()?
            .drivers
            .get(driver_id)
            .cloned()
            .ok_or_else(|| StorageError::DriverNotFound {
                driver_id: driver_id.to_string(),
            })
    }

    async fn list_rides(
        &self,
        status_filter: Option<RideStatus>,
    ) -> Result<Vec<Ride>, StorageError> {
        Ok(self
            .tables()?
            .rides
            .values()
            .filter(|r| status_filter.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn list_status_history(
        &self,
        ride_id: &str,
    ) -> Result<Vec<StatusHistoryEntry>, StorageError> {
        Ok(self
            .tables()?
            .history
            .iter()
            .filter(|e| e.ride_id == ride_id)
            .cloned()
            .collect())
    }

    async fn list_admin_actions(
        &self,
        query: &AdminActionQuery,
    ) -> Result<Vec<AdminAction>, StorageError> {
        let tables = self.tables()?;
        let matching = tables.admin_actions.iter().filter(|a| query.matches(a)).cloned();
        Ok(if query.limit > 0 {
            matching.take(query.limit).collect()
        } else {
            matching.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_memory_backend_passes_conformance() {
        let report = run_conformance_suite(|| async { InMemoryStorage::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total() > 20);
    }

    #[tokio::test]
    async fn dropped_snapshot_has_no_effect() {
        let storage = InMemoryStorage::new();
        {
            let mut snap = storage.begin_snapshot().await.unwrap();
            storage
                .insert_ride(&mut snap, crate::conformance::make_ride("R1"))
                .await
                .unwrap();
        }
        assert!(matches!(
            storage.get_ride("R1").await,
            Err(StorageError::RideNotFound { .. })
        ));
    }
}
