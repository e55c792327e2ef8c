//! Append-only audit records: per-ride status history and admin actions.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::actor::Actor;
use crate::status::RideStatus;

/// Fresh, lexicographically time-ordered record id.
pub fn new_record_id() -> String {
    Ulid::new().to_string()
}

/// One committed status change of a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub ride_id: String,
    pub from_status: RideStatus,
    pub status: RideStatus,
    /// Ride version produced by this change.
    pub version: i64,
    pub actor: Actor,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionKind {
    Cancel,
    ReassignDriver,
    ForceComplete,
    StatusUpdate,
}

impl AdminActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminActionKind::Cancel => "cancel",
            AdminActionKind::ReassignDriver => "reassign_driver",
            AdminActionKind::ForceComplete => "force_complete",
            AdminActionKind::StatusUpdate => "status_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cancel" => Some(AdminActionKind::Cancel),
            "reassign_driver" => Some(AdminActionKind::ReassignDriver),
            "force_complete" => Some(AdminActionKind::ForceComplete),
            "status_update" => Some(AdminActionKind::StatusUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for AdminActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed admin mutation, written once and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: String,
    pub ride_id: String,
    pub admin_id: String,
    pub kind: AdminActionKind,
    pub reason: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// Filter for admin action look-ups. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminActionQuery {
    pub ride_id: Option<String>,
    pub admin_id: Option<String>,
    /// Inclusive lower bound on `recorded_at`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    /// Exclusive upper bound on `recorded_at`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub until: Option<OffsetDateTime>,
    /// 0 = no limit.
    #[serde(default)]
    pub limit: usize,
}

impl AdminActionQuery {
    pub fn for_ride(ride_id: impl Into<String>) -> Self {
        Self {
            ride_id: Some(ride_id.into()),
            ..Self::default()
        }
    }

    pub fn for_admin(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: Some(admin_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, action: &AdminAction) -> bool {
        self.ride_id.as_deref().map_or(true, |r| action.ride_id == r)
            && self.admin_id.as_deref().map_or(true, |a| action.admin_id == a)
            && self.from.map_or(true, |from| action.recorded_at >= from)
            && self.until.map_or(true, |until| action.recorded_at < until)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn action(ride: &str, admin: &str, at: OffsetDateTime) -> AdminAction {
        AdminAction {
            id: new_record_id(),
            ride_id: ride.to_string(),
            admin_id: admin.to_string(),
            kind: AdminActionKind::Cancel,
            reason: "duplicate booking".to_string(),
            old_value: Some("requested".to_string()),
            new_value: Some("cancelled_by_admin".to_string()),
            recorded_at: at,
        }
    }

    #[test]
    fn query_filters_by_admin_and_window() {
        let a = action("R1", "adm-1", datetime!(2025-03-01 10:00 UTC));
        let q = AdminActionQuery {
            admin_id: Some("adm-1".to_string()),
            from: Some(datetime!(2025-03-01 0:00 UTC)),
            until: Some(datetime!(2025-03-02 0:00 UTC)),
            ..AdminActionQuery::default()
        };
        assert!(q.matches(&a));
        assert!(!AdminActionQuery::for_admin("adm-2").matches(&a));
        let late = AdminActionQuery {
            from: Some(datetime!(2025-03-01 10:00:01 UTC)),
            ..AdminActionQuery::default()
        };
        assert!(!late.matches(&a));
    }

    #[test]
    fn until_bound_is_exclusive() {
        let a = action("R1", "adm-1", datetime!(2025-03-01 10:00 UTC));
        let q = AdminActionQuery {
            until: Some(datetime!(2025-03-01 10:00 UTC)),
            ..AdminActionQuery::default()
        };
        assert!(!q.matches(&a));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            AdminActionKind::Cancel,
            AdminActionKind::ReassignDriver,
            AdminActionKind::ForceComplete,
            AdminActionKind::StatusUpdate,
        ] {
            assert_eq!(AdminActionKind::parse(kind.as_str()), Some(kind));
        }
    }
}
