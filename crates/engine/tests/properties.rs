mod common;

use common::{dec, memory_harness, ride, T0};
use rideshare_domain::{
    assign, AbGroup, AdminRole, BucketBy, DriverProfile, IncentiveConfig, Ride, RideStatus,
};
use rideshare_engine::{AdminRequest, DriverAction, DriverOutcome, DriverRequest};
use rideshare_storage::RideStorage;
use time::Duration;

fn bonus_config() -> IncentiveConfig {
    IncentiveConfig {
        enabled: true,
        split_pct: 50,
        bonus_rate: dec("0.2"),
        experiment_key: "first-accept".to_string(),
        bucket_by: BucketBy::Ride,
    }
}

async fn accepted_ride(config: IncentiveConfig) -> Ride {
    let h = memory_harness(vec![ride("R1", "15.00")], vec![DriverProfile::approved("D1")]).await;
    h.engine.set_incentive_config(config).await;
    match h
        .engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap()
    {
        DriverOutcome::Transitioned(outcome) => outcome.ride,
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn history_versions_and_timestamps_increase() {
    let h = memory_harness(vec![ride("R1", "15.00")], vec![DriverProfile::approved("D1")]).await;
    let steps = [
        DriverAction::Accept,
        DriverAction::Arrive,
        DriverAction::Start,
        DriverAction::Finish,
    ];
    for (i, action) in steps.into_iter().enumerate() {
        // The wall clock jumps back once; recorded times must not.
        if i == 2 {
            h.clock.set(T0 - Duration::minutes(5));
        } else {
            h.clock.advance(Duration::minutes(3));
        }
        h.engine
            .driver_action(DriverRequest::new("R1", "D1", action))
            .await
            .unwrap();
    }

    let history = h.engine.storage().list_status_history("R1").await.unwrap();
    assert_eq!(history.len(), 4);
    for pair in history.windows(2) {
        assert_eq!(pair[1].version, pair[0].version + 1);
        assert!(pair[1].recorded_at >= pair[0].recorded_at);
        assert_eq!(pair[1].from_status, pair[0].status);
    }
    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.version, history[3].version);
    assert_eq!(ride.updated_at, history[3].recorded_at);
}

#[tokio::test]
async fn bonus_assignment_is_reproducible() {
    let config = bonus_config();
    let expected = assign("R1", dec("15.00"), &config).unwrap();

    let first = accepted_ride(config.clone()).await;
    let second = accepted_ride(config).await;

    assert_eq!(first.has_bonus, Some(expected.has_bonus));
    assert_eq!(first.ab_group, expected.group);
    assert_eq!(first.bonus_amount, Some(expected.bonus_amount));
    assert_eq!(
        (first.has_bonus, first.ab_group, first.bonus_amount),
        (second.has_bonus, second.ab_group, second.bonus_amount)
    );

    let amount = first.bonus_amount.unwrap();
    match first.ab_group {
        Some(AbGroup::A) => assert_eq!(amount, dec("3.00")),
        Some(AbGroup::B) => assert_eq!(amount, dec("0")),
        None => panic!("enabled experiment must assign a group"),
    }
}

#[tokio::test]
async fn bucketing_by_passenger_groups_their_rides() {
    let config = IncentiveConfig {
        bucket_by: BucketBy::Passenger,
        ..bonus_config()
    };
    let h = memory_harness(
        vec![ride("R1", "15.00"), ride("R2", "15.00")],
        vec![DriverProfile::approved("D1"), DriverProfile::approved("D2")],
    )
    .await;
    h.engine.set_incentive_config(config).await;
    for (ride_id, driver_id) in [("R1", "D1"), ("R2", "D2")] {
        h.engine
            .driver_action(DriverRequest::new(ride_id, driver_id, DriverAction::Accept))
            .await
            .unwrap();
    }
    let r1 = h.engine.storage().get_ride("R1").await.unwrap();
    let r2 = h.engine.storage().get_ride("R2").await.unwrap();
    assert_eq!(r1.ab_group, r2.ab_group);
    assert_eq!(r1.has_bonus, r2.has_bonus);
}

#[tokio::test]
async fn config_change_does_not_rewrite_assigned_rides() {
    let h = memory_harness(
        vec![ride("R1", "15.00")],
        vec![DriverProfile::approved("D1"), DriverProfile::approved("D2")],
    )
    .await;
    h.engine.set_incentive_config(bonus_config()).await;
    h.engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap();
    let before = h.engine.storage().get_ride("R1").await.unwrap();
    assert!(before.incentive_assigned());

    h.engine
        .set_incentive_config(IncentiveConfig {
            split_pct: 100,
            experiment_key: "reshuffled".to_string(),
            ..bonus_config()
        })
        .await;
    h.admin
        .reassign_driver(
            AdminRequest::new("R1", "adm-1", AdminRole::Admin, "driver unreachable"),
            "D2",
        )
        .await
        .unwrap();

    let after = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(after.driver_id.as_deref(), Some("D2"));
    assert_eq!(after.has_bonus, before.has_bonus);
    assert_eq!(after.ab_group, before.ab_group);
    assert_eq!(after.bonus_amount, before.bonus_amount);
    assert_eq!(after.accepted_at, before.accepted_at);
}

#[tokio::test]
async fn disabled_experiment_records_no_bonus() {
    let ride = accepted_ride(IncentiveConfig::default()).await;
    assert_eq!(ride.has_bonus, Some(false));
    assert_eq!(ride.ab_group, None);
    assert_eq!(ride.bonus_amount, Some(dec("0")));
    assert_eq!(ride.status, RideStatus::Accepted);
}

#[tokio::test]
async fn bonus_that_cannot_be_represented_fails_the_accept_cleanly() {
    let h = memory_harness(
        vec![ride("R1", "50000000000000000000000000000")],
        vec![DriverProfile::approved("D1")],
    )
    .await;
    h.engine
        .set_incentive_config(IncentiveConfig {
            split_pct: 100,
            bonus_rate: dec("2"),
            ..bonus_config()
        })
        .await;

    let err = h
        .engine
        .driver_action(DriverRequest::new("R1", "D1", DriverAction::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.code(), rideshare_engine::ResultCode::Validation);

    let ride = h.engine.storage().get_ride("R1").await.unwrap();
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.has_bonus, None);
    assert!(h.engine.storage().list_status_history("R1").await.unwrap().is_empty());
}
