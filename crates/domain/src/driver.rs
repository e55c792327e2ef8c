//! Driver eligibility data read by the matching gate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Onboarding/compliance status of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Pending,
    Approved,
    Rejected,
}

/// The subset of a driver's profile that decides whether they may take rides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: String,
    pub status: DriverStatus,
    #[serde(default)]
    pub banned: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub suspended_until: Option<OffsetDateTime>,
    #[serde(default)]
    pub community_id: Option<String>,
}

impl DriverProfile {
    pub fn approved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DriverStatus::Approved,
            banned: false,
            deleted_at: None,
            suspended_until: None,
            community_id: None,
        }
    }

    pub fn in_community(mut self, community_id: impl Into<String>) -> Self {
        self.community_id = Some(community_id.into());
        self
    }

    pub fn is_suspended_at(&self, now: OffsetDateTime) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }
}
