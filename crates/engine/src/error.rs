use std::fmt;

use rideshare_domain::{AmountOverflow, RideStatus};
use rideshare_storage::StorageError;
use serde::{Deserialize, Serialize};

use crate::gate::NotEligibleReason;

/// Outcome vocabulary shared with callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    NotFound,
    InvalidTransition,
    ConcurrentModification,
    NotEligible,
    Validation,
    Forbidden,
    StorageFailure,
}

impl ResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::NotFound => "NOT_FOUND",
            ResultCode::InvalidTransition => "INVALID_TRANSITION",
            ResultCode::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ResultCode::NotEligible => "NOT_ELIGIBLE",
            ResultCode::Validation => "VALIDATION",
            ResultCode::Forbidden => "FORBIDDEN",
            ResultCode::StorageFailure => "STORAGE_FAILURE",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the transition engine, the matching gate, and the
/// admin facade. None of them leaves a side effect behind.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("ride not found: {ride_id}")]
    RideNotFound { ride_id: String },

    #[error("invalid transition for ride {ride_id}: {from} -> {to}")]
    InvalidTransition {
        ride_id: String,
        from: RideStatus,
        to: RideStatus,
    },

    /// The ride changed between read and conditional write. Never retried
    /// internally.
    #[error(
        "ride {ride_id} was modified concurrently (expected version {expected_version}); {}",
        retry_hint(.seek_new_ride)
    )]
    ConcurrentModification {
        ride_id: String,
        expected_version: i64,
        /// Set when an accept lost the race: the ride is gone for this driver.
        seek_new_ride: bool,
    },

    #[error("driver {driver_id} may not take ride {ride_id}: {reason}")]
    NotEligible {
        ride_id: String,
        driver_id: String,
        reason: NotEligibleReason,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{actor} is not allowed to {action}")]
    Forbidden { actor: String, action: String },

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

fn retry_hint(seek_new_ride: &bool) -> &'static str {
    if *seek_new_ride {
        "the ride is no longer available, seek a new ride"
    } else {
        "re-read the ride and try again"
    }
}

impl EngineError {
    pub fn code(&self) -> ResultCode {
        match self {
            EngineError::RideNotFound { .. } => ResultCode::NotFound,
            EngineError::InvalidTransition { .. } => ResultCode::InvalidTransition,
            EngineError::ConcurrentModification { .. } => ResultCode::ConcurrentModification,
            EngineError::NotEligible { .. } => ResultCode::NotEligible,
            EngineError::Validation(_) => ResultCode::Validation,
            EngineError::Forbidden { .. } => ResultCode::Forbidden,
            EngineError::Storage(_) => ResultCode::StorageFailure,
        }
    }

    /// Whether re-reading the ride and resubmitting can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification { .. })
    }

    pub(crate) fn forbidden(actor: impl fmt::Display, action: impl Into<String>) -> Self {
        EngineError::Forbidden {
            actor: actor.to_string(),
            action: action.into(),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RideNotFound { ride_id } => EngineError::RideNotFound { ride_id },
            StorageError::ConcurrentConflict {
                ride_id,
                expected_version,
            } => EngineError::ConcurrentModification {
                ride_id,
                expected_version,
                seek_new_ride: false,
            },
            other => EngineError::Storage(other),
        }
    }
}

impl From<AmountOverflow> for EngineError {
    fn from(err: AmountOverflow) -> Self {
        EngineError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrent_modification_is_retryable() {
        let conflict = EngineError::from(StorageError::ConcurrentConflict {
            ride_id: "R1".to_string(),
            expected_version: 3,
        });
        assert!(conflict.is_retryable());
        assert_eq!(conflict.code(), ResultCode::ConcurrentModification);

        let invalid = EngineError::InvalidTransition {
            ride_id: "R1".to_string(),
            from: RideStatus::Completed,
            to: RideStatus::CancelledByAdmin,
        };
        assert!(!invalid.is_retryable());
        assert_eq!(
            invalid.to_string(),
            "invalid transition for ride R1: completed -> cancelled_by_admin"
        );
    }

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err = EngineError::from(StorageError::RideNotFound {
            ride_id: "R9".to_string(),
        });
        assert_eq!(err.code(), ResultCode::NotFound);
        let err = EngineError::from(StorageError::Backend("disk full".to_string()));
        assert_eq!(err.code(), ResultCode::StorageFailure);
    }

    #[test]
    fn lost_accept_tells_driver_to_move_on() {
        let err = EngineError::ConcurrentModification {
            ride_id: "R1".to_string(),
            expected_version: 0,
            seek_new_ride: true,
        };
        assert!(err.to_string().contains("seek a new ride"));
    }

    #[test]
    fn result_codes_serialize_screaming() {
        let json = serde_json::to_string(&ResultCode::ConcurrentModification).unwrap();
        assert_eq!(json, "\"CONCURRENT_MODIFICATION\"");
        assert_eq!(ResultCode::NotEligible.to_string(), "NOT_ELIGIBLE");
    }
}
