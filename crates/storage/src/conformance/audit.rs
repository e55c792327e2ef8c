//! Append-only audit record conformance tests.

use std::future::Future;

use rideshare_domain::{AdminActionQuery, RideStatus};
use time::Duration;

use super::{make_admin_action, make_history, make_ride, seed_ride, Check, T0};
use crate::{RideStorage, StorageError};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "audit";
    vec![
        Check::new(
            suite,
            "history_returned_in_insertion_order",
            history_returned_in_insertion_order(factory).await,
        ),
        Check::new(suite, "history_scoped_to_ride", history_scoped_to_ride(factory).await),
        Check::new(
            suite,
            "admin_actions_filter_by_admin_and_window",
            admin_actions_filter_by_admin_and_window(factory).await,
        ),
        Check::new(
            suite,
            "admin_actions_respect_limit",
            admin_actions_respect_limit(factory).await,
        ),
        Check::new(
            suite,
            "duplicate_record_id_rejected",
            duplicate_record_id_rejected(factory).await,
        ),
    ]
}

async fn history_returned_in_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_ride(&s, make_ride("R1")).await?;

    let walk = [
        RideStatus::Requested,
        RideStatus::Accepted,
        RideStatus::Arrived,
        RideStatus::Started,
    ];
    for (i, pair) in walk.windows(2).enumerate() {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.append_status_history(&mut snap, make_history("R1", pair[0], pair[1], i as i64 + 1))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let history = s.list_status_history("R1").await.map_err(|e| e.to_string())?;
    let statuses: Vec<_> = history.iter().map(|h| h.status).collect();
    if statuses != walk[1..] {
        return Err(format!("expected {:?}, got {statuses:?}", &walk[1..]));
    }
    Ok(())
}

async fn history_scoped_to_ride<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for ride in ["R1", "R2", "R1"] {
        s.append_status_history(
            &mut snap,
            make_history(ride, RideStatus::Requested, RideStatus::Accepted, 1),
        )
        .await
        .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let r1 = s.list_status_history("R1").await.map_err(|e| e.to_string())?;
    let r2 = s.list_status_history("R2").await.map_err(|e| e.to_string())?;
    if r1.len() != 2 || r2.len() != 1 {
        return Err(format!("expected 2/1 entries, got {}/{}", r1.len(), r2.len()));
    }
    Ok(())
}

async fn admin_actions_filter_by_admin_and_window<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rows = [
        ("R1", "adm-1", T0),
        ("R2", "adm-1", T0 + Duration::days(1)),
        ("R3", "adm-2", T0 + Duration::days(1)),
        ("R4", "adm-1", T0 + Duration::days(2)),
    ];
    for (ride, admin, at) in rows {
        s.append_admin_action(&mut snap, make_admin_action(ride, admin, at))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let by_admin = s
        .list_admin_actions(&AdminActionQuery::for_admin("adm-1"))
        .await
        .map_err(|e| e.to_string())?;
    let rides: Vec<_> = by_admin.iter().map(|a| a.ride_id.as_str()).collect();
    if rides != ["R1", "R2", "R4"] {
        return Err(format!("admin filter: expected [R1, R2, R4], got {rides:?}"));
    }

    let window = AdminActionQuery {
        admin_id: Some("adm-1".to_string()),
        from: Some(T0 + Duration::hours(1)),
        until: Some(T0 + Duration::days(2)),
        ..AdminActionQuery::default()
    };
    let in_window = s
        .list_admin_actions(&window)
        .await
        .map_err(|e| e.to_string())?;
    if in_window.len() != 1 || in_window[0].ride_id != "R2" {
        return Err(format!("window filter: expected [R2], got {in_window:?}"));
    }

    let by_ride = s
        .list_admin_actions(&AdminActionQuery::for_ride("R3"))
        .await
        .map_err(|e| e.to_string())?;
    if by_ride.len() != 1 || by_ride[0].admin_id != "adm-2" {
        return Err(format!("ride filter: expected one adm-2 row, got {by_ride:?}"));
    }
    Ok(())
}

async fn admin_actions_respect_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for i in 0..5 {
        s.append_admin_action(
            &mut snap,
            make_admin_action(&format!("R{i}"), "adm-1", T0 + Duration::minutes(i)),
        )
        .await
        .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let query = AdminActionQuery {
        limit: 2,
        ..AdminActionQuery::for_admin("adm-1")
    };
    let limited = s
        .list_admin_actions(&query)
        .await
        .map_err(|e| e.to_string())?;
    let rides: Vec<_> = limited.iter().map(|a| a.ride_id.as_str()).collect();
    if rides != ["R0", "R1"] {
        return Err(format!("expected first two rows [R0, R1], got {rides:?}"));
    }
    Ok(())
}

/// Records are written once: re-appending the same id must fail and leave
/// the original intact.
async fn duplicate_record_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let action = make_admin_action("R1", "adm-1", T0);

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_admin_action(&mut snap, action.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut dup = action.clone();
    dup.reason = "rewritten".to_string();
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = match s.append_admin_action(&mut snap, dup).await {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::DuplicateRecord { .. }) => {}
        Err(e) => return Err(format!("expected DuplicateRecord, got {e}")),
        Ok(()) => return Err("duplicate admin action committed".to_string()),
    }

    let stored = s
        .list_admin_actions(&AdminActionQuery::for_ride("R1"))
        .await
        .map_err(|e| e.to_string())?;
    if stored.len() != 1 || stored[0].reason != action.reason {
        return Err(format!("original record changed: {stored:?}"));
    }
    Ok(())
}
