//! Driver matching gate.
//!
//! Advisory only: the gate reads, never writes. Two eligible drivers can
//! both pass it for the same ride; the conditional write in the engine
//! decides which accept commits.

use std::fmt;

use rideshare_domain::{DriverProfile, DriverStatus, Ride, RideStatus};
use rideshare_storage::{RideStorage, StorageError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::EngineError;

/// Why a driver may not take a ride. Checks run in declaration order and
/// stop at the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotEligibleReason {
    DriverNotFound,
    DriverBanned,
    DriverDeleted,
    DriverNotApproved,
    DriverSuspended,
    CommunityMismatch,
    RideNotAvailable,
}

impl fmt::Display for NotEligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotEligibleReason::DriverNotFound => "driver does not exist",
            NotEligibleReason::DriverBanned => "driver is banned",
            NotEligibleReason::DriverDeleted => "driver account is deleted",
            NotEligibleReason::DriverNotApproved => "driver is not approved",
            NotEligibleReason::DriverSuspended => "driver is suspended",
            NotEligibleReason::CommunityMismatch => {
                "driver is outside the ride's community and the ride is closed to external drivers"
            }
            NotEligibleReason::RideNotAvailable => "ride is no longer open for acceptance",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<NotEligibleReason>,
}

impl Eligibility {
    fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    fn denied(reason: NotEligibleReason) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// Account-level checks shared by accept and admin reassignment.
pub(crate) fn check_account(
    driver: Option<&DriverProfile>,
    now: OffsetDateTime,
) -> Result<(), NotEligibleReason> {
    let driver = driver.ok_or(NotEligibleReason::DriverNotFound)?;
    if driver.banned {
        return Err(NotEligibleReason::DriverBanned);
    }
    if driver.deleted_at.is_some() {
        return Err(NotEligibleReason::DriverDeleted);
    }
    if driver.status != DriverStatus::Approved {
        return Err(NotEligibleReason::DriverNotApproved);
    }
    if driver.is_suspended_at(now) {
        return Err(NotEligibleReason::DriverSuspended);
    }
    Ok(())
}

/// A ride without a community is open to every driver.
fn community_allows(ride: &Ride, driver: &DriverProfile) -> bool {
    match &ride.community_id {
        None => true,
        Some(community) => {
            ride.allow_external_drivers || driver.community_id.as_deref() == Some(community)
        }
    }
}

/// Pure eligibility decision over freshly read records.
pub fn evaluate(ride: &Ride, driver: Option<&DriverProfile>, now: OffsetDateTime) -> Eligibility {
    if let Err(reason) = check_account(driver, now) {
        return Eligibility::denied(reason);
    }
    if let Some(driver) = driver {
        if !community_allows(ride, driver) {
            return Eligibility::denied(NotEligibleReason::CommunityMismatch);
        }
    }
    if ride.status != RideStatus::Requested {
        return Eligibility::denied(NotEligibleReason::RideNotAvailable);
    }
    Eligibility::eligible()
}

pub(crate) async fn load_driver<S: RideStorage>(
    storage: &S,
    driver_id: &str,
) -> Result<Option<DriverProfile>, EngineError> {
    match storage.get_driver(driver_id).await {
        Ok(driver) => Ok(Some(driver)),
        Err(StorageError::DriverNotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read the ride and driver afresh and decide whether `driver_id` may accept.
///
/// Returns `Err(RideNotFound)` for an unknown ride; every other negative
/// answer is an `Eligibility` with a reason.
pub async fn can_accept<S: RideStorage>(
    storage: &S,
    ride_id: &str,
    driver_id: &str,
    now: OffsetDateTime,
) -> Result<Eligibility, EngineError> {
    let ride = storage.get_ride(ride_id).await?;
    let driver = load_driver(storage, driver_id).await?;
    let eligibility = evaluate(&ride, driver.as_ref(), now);
    if let Some(reason) = eligibility.reason {
        tracing::debug!(ride_id, driver_id, %reason, "driver not eligible");
    }
    Ok(eligibility)
}
