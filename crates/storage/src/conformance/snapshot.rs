//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible together, and aborted writes are discarded.

use std::future::Future;

use rideshare_domain::{AdminActionQuery, RideStatus};

use super::{make_admin_action, make_history, make_ride, seed_ride, Check, T0};
use crate::{RideStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "snapshot";
    vec![
        Check::new(
            suite,
            "uncommitted_insert_invisible",
            uncommitted_insert_invisible(factory).await,
        ),
        Check::new(
            suite,
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        Check::new(
            suite,
            "abort_discards_update_and_records",
            abort_discards_update_and_records(factory).await,
        ),
        Check::new(
            suite,
            "commit_publishes_update_and_records_together",
            commit_publishes_update_and_records_together(factory).await,
        ),
        Check::new(
            suite,
            "failed_commit_applies_nothing",
            failed_commit_applies_nothing(factory).await,
        ),
    ]
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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

    if s.get_ride("R1").await.is_ok() {
        return Err("uncommitted ride visible to get_ride".to_string());
    }
    let listed = s.list_rides(None).await.map_err(|e| e.to_string())?;
    if !listed.is_empty() {
        return Err("uncommitted ride visible to list_rides".to_string());
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let mut ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    ride.status = RideStatus::Accepted;
    ride.driver_id = Some("D1".to_string());
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_ride(&mut snap, 0, &ride)
        .await
        .map_err(|e| e.to_string())?;

    let seen = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if seen.status != RideStatus::Requested || seen.version != 0 || seen.driver_id.is_some() {
        return Err(format!("uncommitted update leaked: {seen:?}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn abort_discards_update_and_records<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let mut ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    ride.status = RideStatus::CancelledByAdmin;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_ride(&mut snap, 0, &ride)
        .await
        .map_err(|e| e.to_string())?;
    s.append_status_history(
        &mut snap,
        make_history("R1", RideStatus::Requested, RideStatus::CancelledByAdmin, 1),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.append_admin_action(&mut snap, make_admin_action("R1", "adm-1", T0))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let after = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if after.status != RideStatus::Requested || after.version != 0 {
        return Err(format!("aborted update applied: {after:?}"));
    }
    let history = s.list_status_history("R1").await.map_err(|e| e.to_string())?;
    let actions = s
        .list_admin_actions(&AdminActionQuery::for_ride("R1"))
        .await
        .map_err(|e| e.to_string())?;
    if !history.is_empty() || !actions.is_empty() {
        return Err(format!(
            "aborted records applied: {} history, {} actions",
            history.len(),
            actions.len()
        ));
    }
    Ok(())
}

async fn commit_publishes_update_and_records_together<S, F, Fut>(
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
    ride.status = RideStatus::CancelledByAdmin;
    ride.cancel_reason = Some("duplicate".to_string());
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_ride(&mut snap, 0, &ride)
        .await
        .map_err(|e| e.to_string())?;
    s.append_status_history(
        &mut snap,
        make_history("R1", RideStatus::Requested, RideStatus::CancelledByAdmin, 1),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.append_admin_action(&mut snap, make_admin_action("R1", "adm-1", T0))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let after = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if after.status != RideStatus::CancelledByAdmin || after.version != 1 {
        return Err(format!("committed update missing: {after:?}"));
    }
    if after.cancel_reason.as_deref() != Some("duplicate") {
        return Err("non-status column not written".to_string());
    }
    let history = s.list_status_history("R1").await.map_err(|e| e.to_string())?;
    let actions = s
        .list_admin_actions(&AdminActionQuery::for_ride("R1"))
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 || actions.len() != 1 {
        return Err(format!(
            "expected 1 history + 1 action, got {} + {}",
            history.len(),
            actions.len()
        ));
    }
    Ok(())
}

/// A snapshot whose conditional write loses must not publish any of its
/// audit records either.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;
    let ride = s.get_ride("R1").await.map_err(|e| e.to_string())?;

    // Loser buffers its write first...
    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut loser_ride = ride.clone();
    loser_ride.status = RideStatus::CancelledByUser;
    let loser_update = s.update_ride(&mut loser, 0, &loser_ride).await;

    // ...but the winner commits first.
    super::update_status(&s, "R1", 0, RideStatus::Accepted)
        .await
        .map_err(|e| format!("winner: {e}"))?;

    let outcome = match loser_update {
        Ok(_) => {
            s.append_status_history(
                &mut loser,
                make_history("R1", RideStatus::Requested, RideStatus::CancelledByUser, 1),
            )
            .await
            .map_err(|e| e.to_string())?;
            s.commit_snapshot(loser).await
        }
        Err(e) => {
            let _ = s.abort_snapshot(loser).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(()) => return Err("stale snapshot committed".to_string()),
    }

    let after = s.get_ride("R1").await.map_err(|e| e.to_string())?;
    if after.status != RideStatus::Accepted || after.version != 1 {
        return Err(format!("winner's write lost: {after:?}"));
    }
    let history = s.list_status_history("R1").await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("loser's history leaked: {history:?}"));
    }
    Ok(())
}
