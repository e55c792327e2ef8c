//! Backend-agnostic checks every `RideStorage` must pass.
//!
//! Covers ride creation, error variants, snapshot isolation, conditional
//! writes, the append-only logs, and racing writers. A backend crate calls
//! [`run_conformance_suite`] with a factory for empty stores:
//!
//! ```ignore
//! let report = run_conformance_suite(|| async {
//!     SqliteRideStorage::open_in_memory().unwrap()
//! }).await;
//! assert!(report.failed == 0, "{report}");
//! ```

mod audit;
mod concurrent;
mod error;
mod init;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use rideshare_domain::{
    new_record_id, Actor, AdminAction, AdminActionKind, DriverProfile, Ride, RideStatus,
    StatusHistoryEntry,
};
use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

use crate::{RideStorage, StorageError};

/// One named check and how it went.
#[derive(Debug, Clone)]
pub struct Check {
    pub suite: &'static str,
    pub name: &'static str,
    pub outcome: Result<(), String>,
}

impl Check {
    fn new(suite: &'static str, name: &'static str, outcome: Result<(), String>) -> Self {
        Self {
            suite,
            name,
            outcome,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub checks: Vec<Check>,
    pub failed: usize,
}

impl ConformanceReport {
    fn from_checks(checks: Vec<Check>) -> Self {
        let failed = checks.iter().filter(|c| !c.is_ok()).count();
        Self { checks, failed }
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    /// Failed checks with their messages, in run order.
    pub fn failures(&self) -> impl Iterator<Item = (&Check, &str)> {
        self.checks
            .iter()
            .filter_map(|c| c.outcome.as_ref().err().map(|msg| (c, msg.as_str())))
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ride storage conformance: {} of {} checks failed",
            self.failed,
            self.total()
        )?;
        for (check, msg) in self.failures() {
            write!(f, "\n  {}::{} -> {}", check.suite, check.name, msg)?;
        }
        Ok(())
    }
}

/// Run every check against a backend.
///
/// `factory` builds a fresh, empty store for each check. The race checks
/// spawn tasks, so drive this from a multi-threaded runtime.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut checks = init::run_init_tests(&factory).await;
    checks.append(&mut error::run_error_tests(&factory).await);
    checks.append(&mut snapshot::run_snapshot_tests(&factory).await);
    checks.append(&mut version::run_version_tests(&factory).await);
    checks.append(&mut audit::run_audit_tests(&factory).await);
    checks.append(&mut concurrent::run_concurrent_tests(&factory).await);
    ConformanceReport::from_checks(checks)
}


const T0: OffsetDateTime = datetime!(2025-01-01 0:00 UTC);

/// A `requested` ride at version 0 priced 15.00.
pub fn make_ride(id: &str) -> Ride {
    Ride::requested(id, "passenger-1", Decimal::new(1500, 2), T0)
}

fn make_history(
    ride_id: &str,
    from: RideStatus,
    to: RideStatus,
    version: i64,
) -> StatusHistoryEntry {
    StatusHistoryEntry {
        id: new_record_id(),
        ride_id: ride_id.to_string(),
        from_status: from,
        status: to,
        version,
        actor: Actor::driver("driver-1"),
        recorded_at: T0 + time::Duration::seconds(version),
    }
}

fn make_admin_action(ride_id: &str, admin_id: &str, at: OffsetDateTime) -> AdminAction {
    AdminAction {
        id: new_record_id(),
        ride_id: ride_id.to_string(),
        admin_id: admin_id.to_string(),
        kind: AdminActionKind::Cancel,
        reason: "rider called support".to_string(),
        old_value: Some("requested".to_string()),
        new_value: Some("cancelled_by_admin".to_string()),
        recorded_at: at,
    }
}

/// Insert `ride` in its own snapshot and commit.
async fn seed_ride<S: RideStorage>(s: &S, ride: Ride) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_ride(&mut snap, ride)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit insert: {e}"))
}

async fn seed_driver<S: RideStorage>(s: &S, driver: DriverProfile) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_driver(&mut snap, driver)
        .await
        .map_err(|e| format!("upsert driver: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit driver: {e}"))
}

/// Update `ride_id` to `status` from `expected_version` in one snapshot.
///
/// Conflicts may surface at update or at commit; both are returned as-is.
async fn update_status<S: RideStorage>(
    s: &S,
    ride_id: &str,
    expected_version: i64,
    status: RideStatus,
) -> Result<i64, StorageError> {
    let mut ride = s.get_ride(ride_id).await?;
    ride.status = status;
    let mut snap = s.begin_snapshot().await?;
    let new_version = match s.update_ride(&mut snap, expected_version, &ride).await {
        Ok(v) => v,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            return Err(e);
        }
    };
    s.commit_snapshot(snap).await?;
    Ok(new_version)
}
