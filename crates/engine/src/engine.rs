//! State transition engine.
//!
//! Every status change goes through [`TransitionEngine::execute`]:
//!
//! 1. Read the ride and its version
//! 2. Check the caller's view (`expected_version`, `from`) is still current
//! 3. Validate the edge against the persisted status, then the actor's authority;
//!    a driver claiming a ride must also pass the matching gate
//! 4. Compute the new row (driver, accept timing, incentive, fare split, stamps)
//! 5. Conditionally write it and append the history entry, plus the admin
//!    action when there is one, in a single snapshot
//!
//! A lost conditional write surfaces as `ConcurrentModification` and is
//! never retried here. Nothing in this module takes a lock for correctness;
//! the storage backend is the only arbiter.

use std::sync::Arc;

use rideshare_domain::{
    assign, new_record_id, Actor, AdminAction, AdminActionKind, BucketBy, Clock, FeePolicy,
    IncentiveConfig, Ride, RideStatus, StatusHistoryEntry, SystemClock,
};
use rideshare_storage::{RideStorage, StorageError};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::gate::{self, Eligibility};

/// Longest accepted justification, in characters.
pub const MAX_REASON_LEN: usize = 1000;

/// One requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub ride_id: String,
    /// Version the caller last saw. `None` means "whatever is current".
    pub expected_version: Option<i64>,
    /// Status the caller last saw. `None` means any.
    pub from: Option<RideStatus>,
    pub to: RideStatus,
    pub actor: Actor,
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(ride_id: impl Into<String>, to: RideStatus, actor: Actor) -> Self {
        Self {
            ride_id: ride_id.into(),
            expected_version: None,
            from: None,
            to,
            actor,
            reason: None,
        }
    }

    pub fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn maybe_expecting(mut self, version: Option<i64>) -> Self {
        self.expected_version = version;
        self
    }

    pub fn from_status(mut self, from: RideStatus) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn maybe_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub ride: Ride,
    pub previous_status: RideStatus,
    pub history: StatusHistoryEntry,
    /// Present when the change came through the admin facade.
    pub admin_action: Option<AdminAction>,
}

/// Which edge table a plan is validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Edge {
    Standard,
    Reassign { driver_id: String },
    ForceComplete,
}

#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) request: TransitionRequest,
    pub(crate) edge: Edge,
    pub(crate) audit: Option<AdminActionKind>,
}

impl Plan {
    fn standard(request: TransitionRequest) -> Self {
        Self {
            request,
            edge: Edge::Standard,
            audit: None,
        }
    }
}

/// Trim a justification and enforce presence and length.
pub(crate) fn normalize_reason(
    reason: Option<&str>,
    required: bool,
) -> Result<Option<String>, EngineError> {
    let trimmed = reason.map(str::trim).filter(|r| !r.is_empty());
    match trimmed {
        None if required => Err(EngineError::Validation(
            "a non-empty reason is required".to_string(),
        )),
        None => Ok(None),
        Some(r) if r.chars().count() > MAX_REASON_LEN => Err(EngineError::Validation(format!(
            "reason exceeds {MAX_REASON_LEN} characters"
        ))),
        Some(r) => Ok(Some(r.to_string())),
    }
}

fn check_edge(ride: &Ride, to: RideStatus, edge: &Edge) -> Result<(), EngineError> {
    let allowed = match edge {
        Edge::Standard => ride.status.can_transition_to(to),
        Edge::Reassign { .. } | Edge::ForceComplete => ride.status.accepts_admin_override(),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            ride_id: ride.id.clone(),
            from: ride.status,
            to,
        })
    }
}

fn check_authority(
    ride: &Ride,
    to: RideStatus,
    actor: &Actor,
    edge: &Edge,
) -> Result<(), EngineError> {
    let action = || format!("move ride {} from {} to {to}", ride.id, ride.status);

    if !matches!(edge, Edge::Standard) && !actor.is_admin() {
        return Err(EngineError::forbidden(actor, action()));
    }
    if to == RideStatus::Paid && !actor.is_admin() {
        return Err(EngineError::forbidden(actor, action()));
    }

    match actor {
        Actor::Driver { id } => {
            let claiming = ride.status == RideStatus::Requested && to == RideStatus::Accepted;
            if !claiming && ride.driver_id.as_deref() != Some(id.as_str()) {
                return Err(EngineError::forbidden(actor, action()));
            }
            if to.is_cancellation() && to != RideStatus::CancelledByDriver {
                return Err(EngineError::forbidden(actor, action()));
            }
        }
        Actor::Passenger { id } => {
            if to != RideStatus::CancelledByUser || ride.passenger_id != *id {
                return Err(EngineError::forbidden(actor, action()));
            }
        }
        Actor::Admin { .. } => {
            if to.is_cancellation() && to != RideStatus::CancelledByAdmin {
                return Err(EngineError::forbidden(actor, action()));
            }
            if matches!(edge, Edge::Standard)
                && ride.status == RideStatus::Requested
                && to == RideStatus::Accepted
            {
                return Err(EngineError::Validation(
                    "accepting on behalf of a driver requires a driver reassignment".to_string(),
                ));
            }
        }
    }

    if let Edge::Reassign { driver_id } = edge {
        if ride.driver_id.as_deref() == Some(driver_id.as_str()) {
            return Err(EngineError::Validation(format!(
                "driver {driver_id} is already assigned to ride {}",
                ride.id
            )));
        }
    }
    Ok(())
}

fn audit_values(
    kind: AdminActionKind,
    before: &Ride,
    after: &Ride,
) -> (Option<String>, Option<String>) {
    match kind {
        AdminActionKind::ReassignDriver => (before.driver_id.clone(), after.driver_id.clone()),
        AdminActionKind::Cancel
        | AdminActionKind::ForceComplete
        | AdminActionKind::StatusUpdate => (
            Some(before.status.to_string()),
            Some(after.status.to_string()),
        ),
    }
}

/// Re-tag a storage conflict with whether the loser should look elsewhere.
fn lost_race(err: StorageError, seek_new_ride: bool) -> EngineError {
    match EngineError::from(err) {
        EngineError::ConcurrentModification {
            ride_id,
            expected_version,
            ..
        } => EngineError::ConcurrentModification {
            ride_id,
            expected_version,
            seek_new_ride,
        },
        other => other,
    }
}

/// Applies status changes to rides held in a [`RideStorage`] backend.
pub struct TransitionEngine<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    fees: FeePolicy,
    incentive: RwLock<IncentiveConfig>,
}

impl<S: RideStorage> TransitionEngine<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            fees: FeePolicy::default(),
            incentive: RwLock::new(IncentiveConfig::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fee_policy(mut self, fees: FeePolicy) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_incentive(mut self, config: IncentiveConfig) -> Self {
        self.incentive = RwLock::new(config);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn fee_policy(&self) -> FeePolicy {
        self.fees
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub async fn incentive_config(&self) -> IncentiveConfig {
        self.incentive.read().await.clone()
    }

    /// Replace the live incentive configuration. Rides that already carry an
    /// assignment keep it.
    pub async fn set_incentive_config(&self, config: IncentiveConfig) {
        *self.incentive.write().await = config;
    }

    /// Ask the matching gate whether `driver_id` may accept `ride_id` now.
    pub async fn can_accept(
        &self,
        ride_id: &str,
        driver_id: &str,
    ) -> Result<Eligibility, EngineError> {
        gate::can_accept(self.storage.as_ref(), ride_id, driver_id, self.now()).await
    }

    /// Apply one standard-edge transition.
    pub async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        self.execute(Plan::standard(request)).await
    }

    pub(crate) async fn execute(&self, plan: Plan) -> Result<TransitionOutcome, EngineError> {
        let ride_id = plan.request.ride_id.clone();
        let to = plan.request.to;
        let actor = plan.request.actor.to_string();

        let result = self.try_execute(plan).await;
        match &result {
            Ok(outcome) => tracing::info!(
                ride_id = %ride_id,
                from = %outcome.previous_status,
                to = %outcome.ride.status,
                version = outcome.ride.version,
                actor = %actor,
                "ride transition committed"
            ),
            Err(err @ EngineError::ConcurrentModification { .. }) => tracing::warn!(
                ride_id = %ride_id,
                to = %to,
                actor = %actor,
                error = %err,
                "ride transition lost a concurrent write"
            ),
            Err(err) => tracing::debug!(
                ride_id = %ride_id,
                to = %to,
                actor = %actor,
                code = %err.code(),
                error = %err,
                "ride transition rejected"
            ),
        }
        result
    }

    async fn try_execute(&self, plan: Plan) -> Result<TransitionOutcome, EngineError> {
        let Plan {
            request,
            edge,
            audit,
        } = plan;
        let reason = normalize_reason(request.reason.as_deref(), request.actor.is_admin())?;

        let current = self.storage.get_ride(&request.ride_id).await?;

        let driver_claim = matches!(request.actor, Actor::Driver { .. })
            && request.to == RideStatus::Accepted
            && matches!(edge, Edge::Standard);
        let expected_version = request.expected_version.unwrap_or(current.version);
        let stale = request.expected_version.is_some_and(|v| v != current.version)
            || request.from.is_some_and(|from| from != current.status);
        if stale {
            return Err(EngineError::ConcurrentModification {
                ride_id: current.id.clone(),
                expected_version,
                seek_new_ride: driver_claim,
            });
        }

        check_edge(&current, request.to, &edge)?;
        check_authority(&current, request.to, &request.actor, &edge)?;

        // History stays ordered even if the wall clock steps backwards.
        let now = self.now().max(current.updated_at);
        if driver_claim {
            self.gate_accept(&current, &request.actor, now).await?;
        }

        let mut next = current.clone();
        self.apply_effects(&mut next, &request, &edge, reason.as_deref(), now)
            .await?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = self
            .stage(&mut snapshot, &current, &mut next, &request, audit, reason, now)
            .await;
        let (history, admin_action) = match staged {
            Ok(records) => records,
            Err(e) => {
                if let Err(abort_err) = self.storage.abort_snapshot(snapshot).await {
                    tracing::warn!(
                        ride_id = %current.id,
                        error = %abort_err,
                        "failed to abort ride snapshot"
                    );
                }
                return Err(lost_race(e, driver_claim));
            }
        };
        self.storage
            .commit_snapshot(snapshot)
            .await
            .map_err(|e| lost_race(e, driver_claim))?;

        Ok(TransitionOutcome {
            ride: next,
            previous_status: current.status,
            history,
            admin_action,
        })
    }

    /// A driver claiming a ride must pass the matching gate against the
    /// ride as just read, whichever entry point it came through.
    async fn gate_accept(
        &self,
        ride: &Ride,
        actor: &Actor,
        now: OffsetDateTime,
    ) -> Result<(), EngineError> {
        let Actor::Driver { id } = actor else {
            return Ok(());
        };
        let driver = gate::load_driver(self.storage.as_ref(), id).await?;
        match gate::evaluate(ride, driver.as_ref(), now).reason {
            None => Ok(()),
            Some(reason) => Err(EngineError::NotEligible {
                ride_id: ride.id.clone(),
                driver_id: id.clone(),
                reason,
            }),
        }
    }

    async fn apply_effects(
        &self,
        next: &mut Ride,
        request: &TransitionRequest,
        edge: &Edge,
        reason: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(), EngineError> {
        next.status = request.to;
        next.updated_at = now;

        match edge {
            Edge::Standard => match request.to {
                RideStatus::Accepted => {
                    if let Actor::Driver { id } = &request.actor {
                        next.driver_id = Some(id.clone());
                        self.stamp_accept(next, now).await?;
                    }
                }
                RideStatus::Completed => self.apply_split(next)?,
                to if to.is_cancellation() => {
                    next.cancel_reason = reason.map(str::to_string);
                    next.cancelled_by = Some(request.actor.id().to_string());
                    next.cancelled_at = Some(now);
                }
                _ => {}
            },
            Edge::Reassign { driver_id } => {
                next.driver_id = Some(driver_id.clone());
                self.stamp_accept(next, now).await?;
            }
            Edge::ForceComplete => {
                self.apply_split(next)?;
                next.forced_completed_by = Some(request.actor.id().to_string());
                next.forced_completed_at = Some(now);
            }
        }
        Ok(())
    }

    /// First-accept bookkeeping. Each field is written at most once.
    async fn stamp_accept(
        &self,
        next: &mut Ride,
        now: OffsetDateTime,
    ) -> Result<(), EngineError> {
        if next.accepted_at.is_none() {
            next.accepted_at = Some(now);
            if next.accept_time_seconds.is_none() {
                next.accept_time_seconds = next
                    .offer_sent_at
                    .map(|offered| (now - offered).whole_seconds().max(0));
            }
        }
        if !next.incentive_assigned() {
            let config = self.incentive.read().await;
            let key = match config.bucket_by {
                BucketBy::Ride => next.id.as_str(),
                BucketBy::Passenger => next.passenger_id.as_str(),
            };
            let assignment = assign(key, next.price, &config)?;
            next.apply_incentive(&assignment);
        }
        Ok(())
    }

    fn apply_split(&self, next: &mut Ride) -> Result<(), EngineError> {
        let split = self.fees.split(next.price)?;
        next.platform_fee = Some(split.platform_fee);
        next.driver_amount = Some(split.driver_amount);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage(
        &self,
        snapshot: &mut S::Snapshot,
        current: &Ride,
        next: &mut Ride,
        request: &TransitionRequest,
        audit: Option<AdminActionKind>,
        reason: Option<String>,
        now: OffsetDateTime,
    ) -> Result<(StatusHistoryEntry, Option<AdminAction>), StorageError> {
        next.version = self
            .storage
            .update_ride(snapshot, current.version, next)
            .await?;

        let history = StatusHistoryEntry {
            id: new_record_id(),
            ride_id: current.id.clone(),
            from_status: current.status,
            status: next.status,
            version: next.version,
            actor: request.actor.clone(),
            recorded_at: now,
        };
        self.storage
            .append_status_history(snapshot, history.clone())
            .await?;

        let admin_action = match audit {
            Some(kind) => {
                let (old_value, new_value) = audit_values(kind, current, next);
                let action = AdminAction {
                    id: new_record_id(),
                    ride_id: current.id.clone(),
                    admin_id: request.actor.id().to_string(),
                    kind,
                    reason: reason.unwrap_or_default(),
                    old_value,
                    new_value,
                    recorded_at: now,
                };
                self.storage
                    .append_admin_action(snapshot, action.clone())
                    .await?;
                Some(action)
            }
            None => None,
        };
        Ok((history, admin_action))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rideshare_domain::{AdminRole, DriverProfile, ManualClock};
    use rideshare_storage::{InMemoryStorage, MemorySnapshot};
    use rust_decimal::Decimal;
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::gate::NotEligibleReason;

    const T0: OffsetDateTime = datetime!(2025-03-01 9:00 UTC);

    async fn engine_with(ride: Ride) -> (TransitionEngine<InMemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(InMemoryStorage::new());
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage.insert_ride(&mut snap, ride).await.unwrap();
        storage
            .upsert_driver(&mut snap, DriverProfile::approved("D1"))
            .await
            .unwrap();
        let mut banned = DriverProfile::approved("DB");
        banned.banned = true;
        storage.upsert_driver(&mut snap, banned).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let engine = TransitionEngine::new(storage).with_clock(clock.clone());
        (engine, clock)
    }

    fn requested() -> Ride {
        Ride::requested("R1", "P1", Decimal::new(1500, 2), T0)
    }

    #[test]
    fn reason_is_trimmed_and_bounded() {
        assert_eq!(
            normalize_reason(Some("  no-show  "), true).unwrap(),
            Some("no-show".to_string())
        );
        assert!(normalize_reason(Some("   "), true).is_err());
        assert!(normalize_reason(None, true).is_err());
        assert_eq!(normalize_reason(None, false).unwrap(), None);
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(normalize_reason(Some(long.as_str()), false).is_err());
        let max = "é".repeat(MAX_REASON_LEN);
        assert!(normalize_reason(Some(max.as_str()), true).is_ok());
    }

    #[tokio::test]
    async fn accept_stamps_driver_and_accept_time() {
        let ride = requested().with_offer_sent_at(T0);
        let (engine, clock) = engine_with(ride).await;
        clock.advance(Duration::seconds(42));

        let outcome = engine
            .transition(
                TransitionRequest::new("R1", RideStatus::Accepted, Actor::driver("D1"))
                    .expecting(0),
            )
            .await
            .unwrap();

        assert_eq!(outcome.ride.driver_id.as_deref(), Some("D1"));
        assert_eq!(outcome.ride.accept_time_seconds, Some(42));
        assert_eq!(outcome.ride.accepted_at, Some(T0 + Duration::seconds(42)));
        assert_eq!(outcome.ride.version, 1);
        assert_eq!(outcome.history.version, 1);
        assert_eq!(outcome.history.from_status, RideStatus::Requested);
        assert!(outcome.admin_action.is_none());
    }

    #[tokio::test]
    async fn accept_without_offer_time_leaves_accept_time_empty() {
        let (engine, _clock) = engine_with(requested()).await;
        let outcome = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::Accepted,
                Actor::driver("D1"),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.ride.accept_time_seconds, None);
        assert!(outcome.ride.accepted_at.is_some());
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_concurrent_modification() {
        let (engine, _clock) = engine_with(requested()).await;
        let err = engine
            .transition(
                TransitionRequest::new("R1", RideStatus::CancelledByUser, Actor::passenger("P1"))
                    .expecting(5),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn admin_transition_requires_reason() {
        let (engine, _clock) = engine_with(requested()).await;
        let err = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::CancelledByAdmin,
                Actor::admin("adm-1", AdminRole::Admin),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let ride = engine.storage().get_ride("R1").await.unwrap();
        assert_eq!(ride.version, 0);
    }

    #[tokio::test]
    async fn updated_at_never_moves_backwards() {
        let (engine, clock) = engine_with(requested()).await;
        clock.set(T0 - Duration::hours(1));
        let outcome = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::Accepted,
                Actor::driver("D1"),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.ride.updated_at, T0);
        assert_eq!(outcome.history.recorded_at, T0);
    }

    #[tokio::test]
    async fn passenger_cannot_accept() {
        let (engine, _clock) = engine_with(requested()).await;
        let err = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::Accepted,
                Actor::passenger("P1"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn direct_accept_still_runs_the_matching_gate() {
        let (engine, _clock) = engine_with(requested()).await;
        let err = engine
            .transition(
                TransitionRequest::new("R1", RideStatus::Accepted, Actor::driver("DB"))
                    .expecting(0),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::NotEligible {
                    reason: NotEligibleReason::DriverBanned,
                    ..
                }
            ),
            "{err}"
        );

        let err = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::Accepted,
                Actor::driver("D-unknown"),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ResultCode::NotEligible);

        let ride = engine.storage().get_ride("R1").await.unwrap();
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(ride.driver_id, None);
        assert_eq!(ride.version, 0);
        assert!(engine.storage().list_status_history("R1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bonus_overflow_rejects_the_accept_without_writing() {
        let huge = Decimal::from_str("50000000000000000000000000000").unwrap();
        let (engine, _clock) = engine_with(Ride::requested("R1", "P1", huge, T0)).await;
        engine
            .set_incentive_config(IncentiveConfig {
                enabled: true,
                split_pct: 100,
                bonus_rate: Decimal::from(2),
                ..IncentiveConfig::default()
            })
            .await;

        let err = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::Accepted,
                Actor::driver("D1"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{err}");
        assert!(err.to_string().contains("bonus amount"));

        let ride = engine.storage().get_ride("R1").await.unwrap();
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(ride.version, 0);
    }

    /// Every conditional write conflicts and every abort fails.
    struct BrokenAbort(InMemoryStorage);

    #[async_trait::async_trait]
    impl RideStorage for BrokenAbort {
        type Snapshot = MemorySnapshot;

        async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
            self.0.begin_snapshot().await
        }

        async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
            self.0.commit_snapshot(snapshot).await
        }

        async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
            Err(StorageError::Backend("connection reset".to_string()))
        }

        async fn insert_ride(
            &self,
            snapshot: &mut MemorySnapshot,
            ride: Ride,
        ) -> Result<(), StorageError> {
            self.0.insert_ride(snapshot, ride).await
        }

        async fn upsert_driver(
            &self,
            snapshot: &mut MemorySnapshot,
            driver: DriverProfile,
        ) -> Result<(), StorageError> {
            self.0.upsert_driver(snapshot, driver).await
        }

        async fn update_ride(
            &self,
            _snapshot: &mut MemorySnapshot,
            expected_version: i64,
            ride: &Ride,
        ) -> Result<i64, StorageError> {
            Err(StorageError::ConcurrentConflict {
                ride_id: ride.id.clone(),
                expected_version,
            })
        }

        async fn append_status_history(
            &self,
            snapshot: &mut MemorySnapshot,
            entry: StatusHistoryEntry,
        ) -> Result<(), StorageError> {
            self.0.append_status_history(snapshot, entry).await
        }

        async fn append_admin_action(
            &self,
            snapshot: &mut MemorySnapshot,
            action: AdminAction,
        ) -> Result<(), StorageError> {
            self.0.append_admin_action(snapshot, action).await
        }

        async fn get_ride(&self, ride_id: &str) -> Result<Ride, StorageError> {
            self.0.get_ride(ride_id).await
        }

        async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile, StorageError> {
            self.0.get_driver(driver_id).await
        }

        async fn list_rides(
            &self,
            status_filter: Option<RideStatus>,
        ) -> Result<Vec<Ride>, StorageError> {
            self.0.list_rides(status_filter).await
        }

        async fn list_status_history(
            &self,
            ride_id: &str,
        ) -> Result<Vec<StatusHistoryEntry>, StorageError> {
            self.0.list_status_history(ride_id).await
        }

        async fn list_admin_actions(
            &self,
            query: &rideshare_domain::AdminActionQuery,
        ) -> Result<Vec<AdminAction>, StorageError> {
            self.0.list_admin_actions(query).await
        }
    }

    #[tokio::test]
    async fn failed_abort_does_not_mask_the_conflict() {
        let inner = InMemoryStorage::new();
        let mut snap = inner.begin_snapshot().await.unwrap();
        inner.insert_ride(&mut snap, requested()).await.unwrap();
        inner.commit_snapshot(snap).await.unwrap();
        let engine = TransitionEngine::new(Arc::new(BrokenAbort(inner)));

        let err = engine
            .transition(TransitionRequest::new(
                "R1",
                RideStatus::CancelledByUser,
                Actor::passenger("P1"),
            ))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::ConcurrentModification {
                    seek_new_ride: false,
                    ..
                }
            ),
            "{err}"
        );
        assert_eq!(engine.storage().get_ride("R1").await.unwrap().version, 0);
    }
}
