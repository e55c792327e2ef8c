//! The ride record and its outbound projection.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::incentive::{AbGroup, IncentiveAssignment};
use crate::status::RideStatus;

/// A ride as persisted by the ride store.
///
/// `version` is the optimistic concurrency token: every committed change
/// increments it by exactly one. Rides are created by the booking flow in
/// `requested` at version 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    pub id: String,
    pub status: RideStatus,
    pub passenger_id: String,
    pub driver_id: Option<String>,
    /// Community the ride was booked in; `None` means any community.
    pub community_id: Option<String>,
    pub allow_external_drivers: bool,
    pub price: Decimal,
    pub platform_fee: Option<Decimal>,
    pub driver_amount: Option<Decimal>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub offer_sent_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub accepted_at: Option<OffsetDateTime>,
    pub accept_time_seconds: Option<i64>,
    /// `None` until the incentive assignor has run for this ride.
    pub has_bonus: Option<bool>,
    pub ab_group: Option<AbGroup>,
    pub bonus_amount: Option<Decimal>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub forced_completed_by: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub forced_completed_at: Option<OffsetDateTime>,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Ride {
    /// A fresh ride as the booking flow would hand it over.
    pub fn requested(
        id: impl Into<String>,
        passenger_id: impl Into<String>,
        price: Decimal,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            status: RideStatus::Requested,
            passenger_id: passenger_id.into(),
            driver_id: None,
            community_id: None,
            allow_external_drivers: false,
            price,
            platform_fee: None,
            driver_amount: None,
            offer_sent_at: None,
            accepted_at: None,
            accept_time_seconds: None,
            has_bonus: None,
            ab_group: None,
            bonus_amount: None,
            cancel_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            forced_completed_by: None,
            forced_completed_at: None,
            version: 0,
            updated_at: created_at,
        }
    }

    pub fn with_community(mut self, community_id: impl Into<String>) -> Self {
        self.community_id = Some(community_id.into());
        self
    }

    pub fn with_external_drivers(mut self) -> Self {
        self.allow_external_drivers = true;
        self
    }

    pub fn with_offer_sent_at(mut self, at: OffsetDateTime) -> Self {
        self.offer_sent_at = Some(at);
        self
    }

    /// Whether the incentive assignor has already stamped this ride.
    pub fn incentive_assigned(&self) -> bool {
        self.has_bonus.is_some()
    }

    pub fn apply_incentive(&mut self, assignment: &IncentiveAssignment) {
        self.has_bonus = Some(assignment.has_bonus);
        self.ab_group = assignment.group;
        self.bonus_amount = Some(assignment.bonus_amount);
    }

    pub fn projection(&self) -> RideProjection {
        RideProjection::from(self)
    }
}

/// The ride view handed to outer layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideProjection {
    pub id: String,
    pub status: RideStatus,
    pub driver_id: Option<String>,
    pub price: Decimal,
    pub platform_fee: Option<Decimal>,
    pub driver_amount: Option<Decimal>,
    pub accept_time_seconds: Option<i64>,
    pub has_bonus: bool,
    pub ab_group: Option<AbGroup>,
    pub bonus_amount: Decimal,
    pub version: i64,
}

impl From<&Ride> for RideProjection {
    fn from(ride: &Ride) -> Self {
        Self {
            id: ride.id.clone(),
            status: ride.status,
            driver_id: ride.driver_id.clone(),
            price: ride.price,
            platform_fee: ride.platform_fee,
            driver_amount: ride.driver_amount,
            accept_time_seconds: ride.accept_time_seconds,
            has_bonus: ride.has_bonus.unwrap_or(false),
            ab_group: ride.ab_group,
            bonus_amount: ride.bonus_amount.unwrap_or(Decimal::ZERO),
            version: ride.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn new_ride_starts_requested_at_version_zero() {
        let ride = Ride::requested("R1", "P1", Decimal::from(15), datetime!(2025-01-01 0:00 UTC));
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(ride.version, 0);
        assert!(ride.driver_id.is_none());
        assert!(!ride.incentive_assigned());
    }

    #[test]
    fn projection_defaults_unassigned_bonus_to_zero() {
        let ride = Ride::requested("R1", "P1", Decimal::from(15), datetime!(2025-01-01 0:00 UTC));
        let p = ride.projection();
        assert!(!p.has_bonus);
        assert_eq!(p.bonus_amount, Decimal::ZERO);
        assert_eq!(p.ab_group, None);
    }

    #[test]
    fn ride_round_trips_through_json() {
        let created = datetime!(2025-01-01 0:00 UTC);
        let ride = Ride::requested("R1", "P1", Decimal::new(1550, 2), created)
            .with_community("north")
            .with_offer_sent_at(datetime!(2025-01-01 0:00:05 UTC));
        let json = serde_json::to_string(&ride).unwrap();
        assert!(json.contains("\"price\":\"15.50\""));
        let back: Ride = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ride);
    }
}
