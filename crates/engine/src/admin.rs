//! Admin mutation facade.
//!
//! Admin-only changes with a capability check and a mandatory reason. The
//! admin action record is staged in the same snapshot as the ride write, so
//! it exists exactly when the change committed: a rejected or lost attempt
//! leaves no record behind.

use std::sync::Arc;

use rideshare_domain::{Actor, AdminActionKind, AdminCapability, AdminRole, RideStatus};
use rideshare_storage::RideStorage;
use serde::{Deserialize, Serialize};

use crate::engine::{
    normalize_reason, Edge, Plan, TransitionEngine, TransitionOutcome, TransitionRequest,
};
use crate::error::EngineError;
use crate::gate;

/// Who is acting, on which ride, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRequest {
    pub ride_id: String,
    pub admin_id: String,
    pub role: AdminRole,
    pub reason: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl AdminRequest {
    pub fn new(
        ride_id: impl Into<String>,
        admin_id: impl Into<String>,
        role: AdminRole,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ride_id: ride_id.into(),
            admin_id: admin_id.into(),
            role,
            reason: reason.into(),
            expected_version: None,
        }
    }

    pub fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminCommand {
    Cancel,
    ReassignDriver { new_driver_id: String },
    ForceComplete,
    CorrectStatus { new_status: RideStatus },
}

impl AdminCommand {
    pub fn capability(&self) -> AdminCapability {
        match self {
            AdminCommand::Cancel => AdminCapability::CancelRide,
            AdminCommand::ReassignDriver { .. } => AdminCapability::ReassignDriver,
            AdminCommand::ForceComplete => AdminCapability::ForceComplete,
            AdminCommand::CorrectStatus { .. } => AdminCapability::CorrectStatus,
        }
    }

    pub fn kind(&self) -> AdminActionKind {
        match self {
            AdminCommand::Cancel => AdminActionKind::Cancel,
            AdminCommand::ReassignDriver { .. } => AdminActionKind::ReassignDriver,
            AdminCommand::ForceComplete => AdminActionKind::ForceComplete,
            AdminCommand::CorrectStatus { .. } => AdminActionKind::StatusUpdate,
        }
    }
}

pub struct AdminFacade<S> {
    engine: Arc<TransitionEngine<S>>,
}

impl<S: RideStorage> AdminFacade<S> {
    pub fn new(engine: Arc<TransitionEngine<S>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TransitionEngine<S> {
        &self.engine
    }

    /// Move a live ride to `cancelled_by_admin`.
    pub async fn cancel(&self, request: AdminRequest) -> Result<TransitionOutcome, EngineError> {
        self.execute(request, AdminCommand::Cancel).await
    }

    /// Hand a live ride to another approved driver; the ride lands in
    /// `accepted`.
    pub async fn reassign_driver(
        &self,
        request: AdminRequest,
        new_driver_id: impl Into<String>,
    ) -> Result<TransitionOutcome, EngineError> {
        let command = AdminCommand::ReassignDriver {
            new_driver_id: new_driver_id.into(),
        };
        self.execute(request, command).await
    }

    /// Complete a live ride with the fare split applied. Super admins only.
    pub async fn force_complete(
        &self,
        request: AdminRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        self.execute(request, AdminCommand::ForceComplete).await
    }

    /// Move a ride along a standard edge, e.g. `completed -> paid`.
    pub async fn correct_status(
        &self,
        request: AdminRequest,
        new_status: RideStatus,
    ) -> Result<TransitionOutcome, EngineError> {
        self.execute(request, AdminCommand::CorrectStatus { new_status })
            .await
    }

    pub async fn execute(
        &self,
        request: AdminRequest,
        command: AdminCommand,
    ) -> Result<TransitionOutcome, EngineError> {
        let capability = command.capability();
        if !request.role.has(capability) {
            tracing::debug!(
                ride_id = %request.ride_id,
                admin_id = %request.admin_id,
                role = ?request.role,
                %capability,
                "admin capability missing"
            );
            return Err(EngineError::forbidden(
                format!("admin:{}", request.admin_id),
                format!("{capability} on ride {}", request.ride_id),
            ));
        }
        let reason = normalize_reason(Some(request.reason.as_str()), true)?.unwrap_or_default();

        let (to, edge) = match &command {
            AdminCommand::Cancel => (RideStatus::CancelledByAdmin, Edge::Standard),
            AdminCommand::ReassignDriver { new_driver_id } => {
                self.check_new_driver(&request.ride_id, new_driver_id).await?;
                (
                    RideStatus::Accepted,
                    Edge::Reassign {
                        driver_id: new_driver_id.clone(),
                    },
                )
            }
            AdminCommand::ForceComplete => (RideStatus::Completed, Edge::ForceComplete),
            AdminCommand::CorrectStatus { new_status } => (*new_status, Edge::Standard),
        };

        let actor = Actor::admin(request.admin_id.as_str(), request.role);
        let transition = TransitionRequest::new(request.ride_id.as_str(), to, actor)
            .maybe_expecting(request.expected_version)
            .with_reason(reason);
        self.engine
            .execute(Plan {
                request: transition,
                edge,
                audit: Some(command.kind()),
            })
            .await
    }

    /// Account checks for the incoming driver. Community is not enforced on
    /// an explicit reassignment.
    async fn check_new_driver(&self, ride_id: &str, driver_id: &str) -> Result<(), EngineError> {
        if driver_id.trim().is_empty() {
            return Err(EngineError::Validation(
                "new_driver_id must not be empty".to_string(),
            ));
        }
        let driver = gate::load_driver(self.engine.storage(), driver_id).await?;
        gate::check_account(driver.as_ref(), self.engine.now()).map_err(|reason| {
            EngineError::NotEligible {
                ride_id: ride_id.to_string(),
                driver_id: driver_id.to_string(),
                reason,
            }
        })
    }
}
