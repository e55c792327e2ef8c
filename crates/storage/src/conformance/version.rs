use std::future::Future;

use rideshare_domain::RideStatus;

use super::{make_ride, seed_ride, update_status, Check};
use crate::{RideStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "version";
    vec![
        Check::new(
            suite,
            "version_increments_sequentially",
            version_increments_sequentially(factory).await,
        ),
        Check::new(
            suite,
            "caller_supplied_version_field_is_ignored",
            caller_supplied_version_field_is_ignored(factory).await,
        ),
        Check::new(
            suite,
            "stale_version_returns_conflict",
            stale_version_returns_conflict(factory).await,
        ),
        Check::new(
            suite,
            "future_version_returns_conflict",
            future_version_returns_conflict(factory).await,
        ),
        Check::new(
            suite,
            "conflict_has_correct_fields",
            conflict_has_correct_fields(factory).await,
        ),
        Check::new(
            suite,
            "conflict_does_not_change_ride",
            conflict_does_not_change_ride(factory).await,
        ),
        Check::new(
            suite,
            "second_update_same_snapshot_uses_new_version",
            second_update_same_snapshot_uses_new_version(factory).await,
        ),
        Check::new(
            suite,
            "version_per_ride_independent",
            version_per_ride_independent(factory).await,
        ),
    ]
}

/// Three successive updates must yield versions 0 -> 1 -> 2 -> 3.
async fn version_increments_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let states = [RideStatus::Accepted, RideStatus::Arrived, RideStatus::Started];
    for (i, status) in states.into_iter().enumerate() {
        let v = update_status(&s, "R1", i as i64, status)
            .await
            .map_err(|e| format!("update {i}: {e}"))?;
        if v != i as i64 + 1 {
            return Err(format!("update {i} returned version {v}"));
        }
        let ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
        if ride.version != v || ride.status != status {
            return Err(format!("after update {i}: {} v{}", ride.status, ride.version));
        }
    }
    Ok(())
}

/// The stored version is always `expected + 1`, whatever the written row says.
async fn caller_supplied_version_field_is_ignored<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let mut ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    ride.status = RideStatus::Accepted;
    ride.version = 42;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_ride(&mut snap, 0, &ride)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if stored.version != 1 {
        return Err(format!("expected version 1, got {}", stored.version));
    }
    Ok(())
}

async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    update_status(&s, "R1", 0, RideStatus::Accepted)
        .await
        .map_err(|e| e.to_string())?;

    match update_status(&s, "R1", 0, RideStatus::CancelledByUser).await {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(v) => Err(format!("stale update succeeded with version {v}")),
    }
}

async fn future_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    match update_status(&s, "R1", 1, RideStatus::Accepted).await {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(v) => Err(format!("future-version update succeeded with version {v}")),
    }
}

async fn conflict_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    update_status(&s, "R1", 0, RideStatus::Accepted)
        .await
        .map_err(|e| e.to_string())?;

    match update_status(&s, "R1", 0, RideStatus::Accepted).await {
        Err(StorageError::ConcurrentConflict {
            ride_id,
            expected_version,
        }) => {
            if ride_id != "R1" || expected_version != 0 {
                return Err(format!(
                    "conflict fields wrong: ride_id={ride_id} expected_version={expected_version}"
                ));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(_) => Err("stale update succeeded".to_string()),
    }
}

async fn conflict_does_not_change_ride<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    update_status(&s, "R1", 0, RideStatus::Accepted)
        .await
        .map_err(|e| e.to_string())?;
    let before = s.get_ride("R1").await.map_err(|e| e.to_string())?;

    let _ = update_status(&s, "R1", 0, RideStatus::CancelledByDriver).await;

    let after = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if after != before {
        return Err(format!("conflict mutated ride: {before:?} -> {after:?}"));
    }
    Ok(())
}

/// Two updates in one snapshot chain their versions: 0 -> 1 -> 2.
async fn second_update_same_snapshot_uses_new_version<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let mut ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    ride.status = RideStatus::Accepted;
    let v1 = s
        .update_ride(&mut snap, 0, &ride)
        .await
        .map_err(|e| e.to_string())?;
    ride.status = RideStatus::Arrived;
    let v2 = s
        .update_ride(&mut snap, v1, &ride)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if (v1, v2) != (1, 2) {
        return Err(format!("expected versions (1, 2), got ({v1}, {v2})"));
    }
    let stored = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if stored.version != 2 || stored.status != RideStatus::Arrived {
        return Err(format!("expected arrived v2, got {} v{}", stored.status, stored.version));
    }
    Ok(())
}

async fn version_per_ride_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    seed_ride(&s, make_ride("R2")).await?;
    update_status(&s, "R1", 0, RideStatus::Accepted)
        .await
        .map_err(|e| e.to_string())?;
    update_status(&s, "R1", 1, RideStatus::Arrived)
        .await
        .map_err(|e| e.to_string())?;

    let r2 = s.get_ride("R2").await.map_err(|e| e.to_string())?;
    if r2.version != 0 {
        return Err(format!("R2 version moved to {}", r2.version));
    }
    update_status(&s, "R2", 0, RideStatus::Accepted)
        .await
        .map_err(|e| format!("R2 update from 0: {e}"))?;
    Ok(())
}
