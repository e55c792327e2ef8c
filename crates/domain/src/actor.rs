//! Who is asking for a change, and what admins are allowed to do.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Back-office role of an administrator, as asserted by the (external)
/// authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Support,
    Admin,
    SuperAdmin,
}

/// A single admin-only mutation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCapability {
    CancelRide,
    ReassignDriver,
    CorrectStatus,
    ForceComplete,
}

impl AdminRole {
    pub fn capabilities(self) -> &'static [AdminCapability] {
        use AdminCapability::*;
        match self {
            AdminRole::Support => &[CancelRide],
            AdminRole::Admin => &[CancelRide, ReassignDriver, CorrectStatus],
            AdminRole::SuperAdmin => &[CancelRide, ReassignDriver, CorrectStatus, ForceComplete],
        }
    }

    pub fn has(self, capability: AdminCapability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for AdminCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdminCapability::CancelRide => "cancel_ride",
            AdminCapability::ReassignDriver => "reassign_driver",
            AdminCapability::CorrectStatus => "correct_status",
            AdminCapability::ForceComplete => "force_complete",
        };
        f.write_str(s)
    }
}

/// The party requesting a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Driver { id: String },
    Passenger { id: String },
    Admin { id: String, role: AdminRole },
}

impl Actor {
    pub fn driver(id: impl Into<String>) -> Self {
        Actor::Driver { id: id.into() }
    }

    pub fn passenger(id: impl Into<String>) -> Self {
        Actor::Passenger { id: id.into() }
    }

    pub fn admin(id: impl Into<String>, role: AdminRole) -> Self {
        Actor::Admin {
            id: id.into(),
            role,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Actor::Driver { id } | Actor::Passenger { id } | Actor::Admin { id, .. } => id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Driver { id } => write!(f, "driver:{id}"),
            Actor::Passenger { id } => write!(f, "passenger:{id}"),
            Actor::Admin { id, .. } => write!(f, "admin:{id}"),
        }
    }
}
