use std::future::Future;

use rideshare_domain::{DriverProfile, DriverStatus, RideStatus};
use rust_decimal::Decimal;

use super::{make_ride, seed_driver, seed_ride, Check};
use crate::{RideStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "init";
    vec![
        Check::new(
            suite,
            "insert_creates_ride_at_version_0",
            insert_creates_ride_at_version_0(factory).await,
        ),
        Check::new(
            suite,
            "insert_preserves_all_fields",
            insert_preserves_all_fields(factory).await,
        ),
        Check::new(
            suite,
            "double_insert_same_snapshot_rejected",
            double_insert_same_snapshot_rejected(factory).await,
        ),
        Check::new(
            suite,
            "double_insert_across_snapshots_rejected",
            double_insert_across_snapshots_rejected(factory).await,
        ),
        Check::new(
            suite,
            "list_rides_filters_by_status",
            list_rides_filters_by_status(factory).await,
        ),
        Check::new(
            suite,
            "upsert_driver_replaces_profile",
            upsert_driver_replaces_profile(factory).await,
        ),
    ]
}

/// A freshly inserted ride reads back at version 0 in `requested`.
async fn insert_creates_ride_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if ride.version != 0 {
        return Err(format!("expected version 0, got {}", ride.version));
    }
    if ride.status != RideStatus::Requested {
        return Err(format!("expected requested, got {}", ride.status));
    }
    Ok(())
}

async fn insert_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut ride = make_ride("R1")
        .with_community("north")
        .with_external_drivers()
        .with_offer_sent_at(time::macros::datetime!(2025-01-01 0:00:10 UTC));
    ride.price = Decimal::new(1234, 2);
    seed_ride(&s, ride.clone()).await?;

    let back = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if back != ride {
        return Err(format!("round trip mismatch:\n  wrote {ride:?}\n  read  {back:?}"));
    }
    Ok(())
}

async fn double_insert_same_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_ride(&mut snap, make_ride("R1"))
        .await
        .map_err(|e| e.to_string())?;
    match s.insert_ride(&mut snap, make_ride("R1")).await {
        Err(StorageError::RideAlreadyExists { ride_id }) if ride_id == "R1" => Ok(()),
        Err(e) => Err(format!("expected RideAlreadyExists, got {e}")),
        Ok(()) => Err("second insert in same snapshot succeeded".to_string()),
    }
}

async fn double_insert_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = match s.insert_ride(&mut snap, make_ride("R1")).await {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::RideAlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected RideAlreadyExists, got {e}")),
        Ok(()) => Err("duplicate ride committed".to_string()),
    }
}

async fn list_rides_filters_by_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    seed_ride(&s, make_ride("R2")).await?;
    super::update_status(&s, "R2", 0, RideStatus::Accepted)
        .await
        .map_err(|e| e.to_string())?;

    let all = s.list_rides(None).await.map_err(|e| e.to_string())?;
    if all.len() != 2 {
        return Err(format!("expected 2 rides, got {}", all.len()));
    }
    let accepted = s
        .list_rides(Some(RideStatus::Accepted))
        .await
        .map_err(|e| e.to_string())?;
    if accepted.len() != 1 || accepted[0].id != "R2" {
        return Err(format!("expected only R2 accepted, got {accepted:?}"));
    }
    Ok(())
}

async fn upsert_driver_replaces_profile<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut driver = DriverProfile::approved("D1").in_community("north");
    seed_driver(&s, driver.clone()).await?;

    driver.status = DriverStatus::Rejected;
    driver.banned = true;
    seed_driver(&s, driver.clone()).await?;

    let back = s.get_driver("D1").await.map_err(|e| e.to_string())?;
    if back != driver {
        return Err(format!("expected {driver:?}, got {back:?}"));
    }
    Ok(())
}
