//! Ride statuses and the fixed adjacency table.
//!
//! The standard edges are the only ones `transition` accepts. Admin override
//! edges (driver reassignment and forced completion) are a separate, narrower
//! table consulted only by the admin facade.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Accepted,
    Arrived,
    Started,
    Completed,
    Paid,
    CancelledByUser,
    CancelledByDriver,
    CancelledByAdmin,
}

use RideStatus::*;

/// The states from which a ride may still be cancelled, reassigned or forced
/// to completion.
const ACTIVE: &[RideStatus] = &[Requested, Accepted, Arrived, Started];

const CANCELLATIONS: [RideStatus; 3] = [CancelledByUser, CancelledByDriver, CancelledByAdmin];

impl RideStatus {
    pub const ALL: [RideStatus; 9] = [
        Requested,
        Accepted,
        Arrived,
        Started,
        Completed,
        Paid,
        CancelledByUser,
        CancelledByDriver,
        CancelledByAdmin,
    ];

    /// Statically allowed successors of `self`.
    pub fn successors(self) -> &'static [RideStatus] {
        match self {
            Requested => &[
                Accepted,
                CancelledByUser,
                CancelledByDriver,
                CancelledByAdmin,
            ],
            Accepted => &[Arrived, CancelledByUser, CancelledByDriver, CancelledByAdmin],
            Arrived => &[Started, CancelledByUser, CancelledByDriver, CancelledByAdmin],
            Started => &[Completed, CancelledByUser, CancelledByDriver, CancelledByAdmin],
            Completed => &[Paid],
            Paid | CancelledByUser | CancelledByDriver | CancelledByAdmin => &[],
        }
    }

    /// Whether `self -> to` is an edge of the standard adjacency table.
    pub fn can_transition_to(self, to: RideStatus) -> bool {
        self.successors().contains(&to)
    }

    /// Whether an admin override (reassign or force-complete) may start from
    /// `self`.
    pub fn accepts_admin_override(self) -> bool {
        ACTIVE.contains(&self)
    }

    /// `paid` and every cancellation.
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn is_cancellation(self) -> bool {
        CANCELLATIONS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Requested => "requested",
            Accepted => "accepted",
            Arrived => "arrived",
            Started => "started",
            Completed => "completed",
            Paid => "paid",
            CancelledByUser => "cancelled_by_user",
            CancelledByDriver => "cancelled_by_driver",
            CancelledByAdmin => "cancelled_by_admin",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a ride status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ride status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for RideStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RideStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}
