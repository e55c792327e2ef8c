mod common;

use common::{dec, memory_harness, ride, T0};
use rideshare_domain::{
    Actor, AdminActionKind, AdminActionQuery, AdminRole, DriverProfile, RideStatus,
};
use rideshare_engine::{
    AdminRequest, DriverAction, DriverOutcome, DriverRequest, EngineError, ResultCode,
    TransitionOutcome, TransitionRequest,
};
use rideshare_storage::RideStorage;
use time::Duration;

fn transitioned(outcome: DriverOutcome) -> TransitionOutcome {
    match outcome {
        DriverOutcome::Transitioned(outcome) => outcome,
        other => panic!("expected a transition, got {other:?}"),
    }
}

#[tokio::test]
async fn ride_runs_from_request_to_paid() {
    let h = memory_harness(
        vec![ride("R1", "20.00").with_offer_sent_at(T0)],
        vec![DriverProfile::approved("D1")],
    )
    .await;

    let steps = [
        (DriverAction::Accept, RideStatus::Accepted),
        (DriverAction::Arrive, RideStatus::Arrived),
        (DriverAction::Start, RideStatus::Started),
        (DriverAction::Finish, RideStatus::Completed),
    ];
    for (i, (action, expected)) in steps.into_iter().enumerate() {
        h.clock.advance(Duration::seconds(30));
        let outcome = transitioned(
            h.engine
                .driver_action(DriverRequest::new("R1", "D1", action).expecting(i as i64))
                .await
                .unwrap(),
        );
        assert_eq!(outcome.ride.status, expected);
        assert_eq!(outcome.ride.version, i as i64 + 1);
    }

    let completed = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(completed.platform_fee, Some(dec("3.00")));
    assert_eq!(completed.driver_amount, Some(dec("17.00")));
    assert_eq!(completed.accept_time_seconds, Some(30));
    assert_eq!(completed.accepted_at, Some(T0 + Duration::seconds(30)));

    let paid = h
        .admin
        .correct_status(
            AdminRequest::new("R1", "adm-1", AdminRole::Admin, "settled offline"),
            RideStatus::Paid,
        )
        .await
        .unwrap();
    assert_eq!(paid.ride.status, RideStatus::Paid);
    assert!(paid.ride.status.is_terminal());

    let history = h.engine.storage().list_status_history("R1").await.unwrap();
    let statuses: Vec<_> = history.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        [
            RideStatus::Accepted,
            RideStatus::Arrived,
            RideStatus::Started,
            RideStatus::Completed,
            RideStatus::Paid,
        ]
    );
    assert_eq!(history[4].actor, Actor::admin("adm-1", AdminRole::Admin));

    let actions = h
        .engine
        .storage()
        .list_admin_actions(&AdminActionQuery::for_ride("R1"))
        .await
        .unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, AdminActionKind::StatusUpdate);
    assert_eq!(actions[0].old_value.as_deref(), Some("completed"));
    assert_eq!(actions[0].new_value.as_deref(), Some("paid"));
}

#[tokio::test]
async fn passenger_cancels_their_own_ride() {
    let h = memory_harness(vec![ride("R1", "12.00")], vec![]).await;
    h.clock.advance(Duration::minutes(2));

    let outcome = h
        .engine
        .passenger_cancel("R1", "P1", Some("  changed plans ".to_string()), Some(0))
        .await
        .unwrap();

    assert_eq!(outcome.ride.status, RideStatus::CancelledByUser);
    assert_eq!(outcome.ride.cancel_reason.as_deref(), Some("changed plans"));
    assert_eq!(outcome.ride.cancelled_by.as_deref(), Some("P1"));
    assert_eq!(outcome.ride.cancelled_at, Some(T0 + Duration::minutes(2)));
    assert!(outcome.admin_action.is_none());

    let err = h
        .engine
        .passenger_cancel("R1", "P1", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidTransition);
}

#[tokio::test]
async fn passenger_cannot_cancel_someone_elses_ride() {
    let h = memory_harness(vec![ride("R1", "12.00")], vec![]).await;
    let err = h
        .engine
        .passenger_cancel("R1", "P2", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::Forbidden);
    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.version, 0);
}

#[tokio::test]
async fn only_the_assigned_driver_moves_the_ride() {
    let h = memory_harness(
        vec![ride("R1", "12.00")],
        vec![DriverProfile::approved("D1"), DriverProfile::approved("D2")],
    )
    .await;
    h.engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap();

    let err = h
        .engine
        .driver_action(DriverRequest::new("R1", "D2", DriverAction::Arrive))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }), "{err}");

    let err = h
        .engine
        .transition(TransitionRequest::new(
            "R1",
            RideStatus::CancelledByUser,
            Actor::driver("D1"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::Forbidden);

    let outcome = transitioned(
        h.engine
            .driver_action(DriverRequest::new("R1", "D1", DriverAction::Cancel))
            .await
            .unwrap(),
    );
    assert_eq!(outcome.ride.status, RideStatus::CancelledByDriver);
    assert_eq!(outcome.ride.cancelled_by.as_deref(), Some("D1"));
}

#[tokio::test]
async fn skipping_a_step_is_an_invalid_transition() {
    let h = memory_harness(vec![ride("R1", "12.00")], vec![DriverProfile::approved("D1")]).await;
    h.engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap();

    let err = h
        .engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Finish))
        .await
        .unwrap_err();
    match err {
        EngineError::InvalidTransition { from, to, .. } => {
            assert_eq!(from, RideStatus::Accepted);
            assert_eq!(to, RideStatus::Completed);
        }
        other => panic!("unexpected error: {other}"),
    }
    let history = h.engine.storage().list_status_history("R1").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn drivers_cannot_mark_rides_paid() {
    let h = memory_harness(vec![ride("R1", "12.00")], vec![DriverProfile::approved("D1")]).await;
    for action in [
        DriverAction::Accept,
        DriverAction::Arrive,
        DriverAction::Start,
        DriverAction::Finish,
    ] {
        h.engine
            .driver_action(DriverRequest::new("R1", "D1", action))
            .await
            .unwrap();
    }
    let err = h
        .engine
        .transition(TransitionRequest::new("R1", RideStatus::Paid, Actor::driver("D1")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::Forbidden);
}

#[tokio::test]
async fn decline_writes_nothing() {
    let h = memory_harness(vec![ride("R1", "12.00")], vec![DriverProfile::approved("D1")]).await;
    let outcome = h
        .engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Decline))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DriverOutcome::Declined {
            ride_id: "R1".to_string(),
            driver_id: "D1".to_string(),
        }
    );
    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.version, 0);
    assert!(h
        .engine
        .storage()
        .list_status_history("R1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_ride_is_not_found() {
    let h = memory_harness(vec![], vec![DriverProfile::approved("D1")]).await;
    let err = h
        .engine
        .driver_action(DriverRequest::new("R404", "D1", DriverAction::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::NotFound);
}

#[tokio::test]
async fn gate_rejects_driver_from_another_community() {
    let h = memory_harness(
        vec![ride("R1", "12.00").with_community("north")],
        vec![DriverProfile::approved("D1").in_community("south")],
    )
    .await;
    let err = h
        .engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::NotEligible);
    assert!(!err.is_retryable());
    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.driver_id, None);
}

#[tokio::test]
async fn engine_entry_point_applies_the_gate_to_accepts() {
    let mut banned = DriverProfile::approved("DB");
    banned.banned = true;
    let h = memory_harness(
        vec![ride("R1", "12.00").with_community("north")],
        vec![banned, DriverProfile::approved("D2").in_community("south")],
    )
    .await;

    for driver in ["DB", "D2"] {
        let err = h
            .engine
            .transition(
                TransitionRequest::new("R1", RideStatus::Accepted, Actor::driver(driver))
                    .expecting(0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::NotEligible, "{driver}: {err}");
    }

    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.driver_id, None);
    assert_eq!(ride.version, 0);
}
