use std::future::Future;
use std::sync::Arc;

use rideshare_domain::RideStatus;

use super::{make_ride, Check};
use crate::{RideStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "concurrent";
    vec![
        Check::new(
            suite,
            "concurrent_updates_exactly_one_wins",
            concurrent_updates_exactly_one_wins(factory).await,
        ),
        Check::new(
            suite,
            "concurrent_inserts_exactly_one_wins",
            concurrent_inserts_exactly_one_wins(factory).await,
        ),
        Check::new(
            suite,
            "concurrent_updates_different_rides_all_succeed",
            concurrent_updates_different_rides_all_succeed(factory).await,
        ),
    ]
}

/// One racer: update `R1` from version 0 to `status`, commit, report whether
/// it won. A conflict at update or at commit counts as a loss.
async fn race_once<S: RideStorage>(
    s: Arc<S>,
    status: RideStatus,
    driver: String,
) -> Result<bool, StorageError> {
    let mut ride = s.get_ride("R1").await?;
    ride.status = status;
    ride.driver_id = Some(driver);
    let mut snap = s.begin_snapshot().await?;
    match s.update_ride(&mut snap, 0, &ride).await {
        Ok(_) => match s.commit_snapshot(snap).await {
            Ok(()) => Ok(true),
            Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        },
        Err(StorageError::ConcurrentConflict { .. }) => {
            s.abort_snapshot(snap).await?;
            Ok(false)
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each try to move the same ride off version 0. Exactly one commit
/// succeeds; the rest must get ConcurrentConflict, and the stored ride must
/// carry the winner's write at version 1.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    super::seed_ride(storage.as_ref(), make_ride("R1")).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(race_once(
            s,
            RideStatus::Accepted,
            format!("driver-{i}"),
        )));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let ride = storage.get_ride("R1").await.map_err(|e| e.to_string())?;
    if ride.version != 1 || ride.status != RideStatus::Accepted || ride.driver_id.is_none() {
        return Err(format!("inconsistent final ride: {ride:?}"));
    }
    Ok(())
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

async fn concurrent_inserts_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.insert_ride(&mut snap, make_ride("R1")).await {
                Ok(()) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::RideAlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::RideAlreadyExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winning insert, got {winners}"));
    }
    Ok(())
}

// ── Concurrent updates to different rides: all succeed ──────────────────────

/// N tasks each update a different ride. All should succeed, with no false
/// conflicts when there is no contention.
async fn concurrent_updates_different_rides_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        for i in 0..N {
            storage
                .insert_ride(&mut snap, make_ride(&format!("ride-{i}")))
                .await
                .map_err(|e| format!("insert ride-{i}: {e}"))?;
        }
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit insert: {e}"))?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("ride-{i}");
            let mut ride = s.get_ride(&id).await?;
            ride.status = RideStatus::Accepted;
            let mut snap = s.begin_snapshot().await?;
            s.update_ride(&mut snap, 0, &ride).await?;
            s.commit_snapshot(snap).await?;
            Ok::<(), StorageError>(())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for i in 0..N {
        let ride = storage
            .get_ride(&format!("ride-{i}"))
            .await
            .map_err(|e| format!("get ride-{i}: {e}"))?;
        if ride.status != RideStatus::Accepted || ride.version != 1 {
            return Err(format!(
                "ride-{i}: expected accepted v1, got {} v{}",
                ride.status, ride.version
            ));
        }
    }

    Ok(())
}
