use rideshare_domain::{Actor, RideStatus};
use rideshare_storage::RideStorage;
use serde::{Deserialize, Serialize};

use crate::engine::{TransitionEngine, TransitionOutcome, TransitionRequest};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverAction {
    Accept,
    Decline,
    Arrive,
    Start,
    Finish,
    Cancel,
}

impl DriverAction {
    /// Status the action moves the ride into; `None` for decline.
    pub fn target(self) -> Option<RideStatus> {
        match self {
            DriverAction::Accept => Some(RideStatus::Accepted),
            DriverAction::Decline => None,
            DriverAction::Arrive => Some(RideStatus::Arrived),
            DriverAction::Start => Some(RideStatus::Started),
            DriverAction::Finish => Some(RideStatus::Completed),
            DriverAction::Cancel => Some(RideStatus::CancelledByDriver),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRequest {
    pub ride_id: String,
    pub driver_id: String,
    pub action: DriverAction,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DriverRequest {
    pub fn new(
        ride_id: impl Into<String>,
        driver_id: impl Into<String>,
        action: DriverAction,
    ) -> Self {
        Self {
            ride_id: ride_id.into(),
            driver_id: driver_id.into(),
            action,
            expected_version: None,
            reason: None,
        }
    }

    pub fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DriverOutcome {
    Transitioned(TransitionOutcome),
    /// The driver passed on the offer. Nothing was written.
    Declined { ride_id: String, driver_id: String },
}

impl<S: RideStorage> TransitionEngine<S> {
    /// Run one driver action.
    ///
    /// `accept` consults the matching gate first; a driver the gate turns
    /// away gets `NotEligible`. Two eligible drivers racing for the same
    /// ride both pass the gate and only the conditional write picks the
    /// winner; the loser gets `ConcurrentModification` telling it to seek
    /// another ride.
    pub async fn driver_action(
        &self,
        request: DriverRequest,
    ) -> Result<DriverOutcome, EngineError> {
        let DriverRequest {
            ride_id,
            driver_id,
            action,
            expected_version,
            reason,
        } = request;

        let to = match action.target() {
            Some(to) => to,
            None => return self.decline(ride_id, driver_id).await,
        };

        let mut transition =
            TransitionRequest::new(ride_id.as_str(), to, Actor::driver(driver_id.as_str()))
                .maybe_expecting(expected_version)
                .maybe_reason(reason);

        if action == DriverAction::Accept {
            let eligibility = self.can_accept(&ride_id, &driver_id).await?;
            if let Some(reason) = eligibility.reason {
                return Err(EngineError::NotEligible {
                    ride_id,
                    driver_id,
                    reason,
                });
            }
            // The gate saw `requested`; anything else by now is a lost race.
            transition = transition.from_status(RideStatus::Requested);
        }

        self.transition(transition)
            .await
            .map(DriverOutcome::Transitioned)
    }

    async fn decline(
        &self,
        ride_id: String,
        driver_id: String,
    ) -> Result<DriverOutcome, EngineError> {
        let ride = self.storage().get_ride(&ride_id).await?;
        if ride.status != RideStatus::Requested {
            tracing::debug!(
                ride_id = %ride_id,
                driver_id = %driver_id,
                status = %ride.status,
                "decline of a ride that is not open"
            );
            return Err(EngineError::Validation(format!(
                "ride {ride_id} is {}; only requested rides can be declined",
                ride.status
            )));
        }
        tracing::debug!(ride_id = %ride_id, driver_id = %driver_id, "offer declined");
        Ok(DriverOutcome::Declined { ride_id, driver_id })
    }

    /// Cancel on behalf of the ride's own passenger.
    pub async fn passenger_cancel(
        &self,
        ride_id: &str,
        passenger_id: &str,
        reason: Option<String>,
        expected_version: Option<i64>,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(
            TransitionRequest::new(
                ride_id,
                RideStatus::CancelledByUser,
                Actor::passenger(passenger_id),
            )
            .maybe_expecting(expected_version)
            .maybe_reason(reason),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_snake_case() {
        let req: DriverRequest = serde_json::from_str(
            r#"{"ride_id": "R1", "driver_id": "D1", "action": "finish"}"#,
        )
        .unwrap();
        assert_eq!(req.action, DriverAction::Finish);
        assert_eq!(req.expected_version, None);
    }

    #[test]
    fn only_decline_has_no_target() {
        for action in [
            DriverAction::Accept,
            DriverAction::Arrive,
            DriverAction::Start,
            DriverAction::Finish,
            DriverAction::Cancel,
        ] {
            assert!(action.target().is_some(), "{action:?}");
        }
        assert_eq!(DriverAction::Decline.target(), None);
    }
}
