use std::future::Future;

use rideshare_domain::AdminActionQuery;

use super::{make_ride, Check};
use crate::{RideStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let suite = "error";
    vec![
        Check::new(
            suite,
            "get_ride_not_found_has_correct_field",
            get_ride_not_found_has_correct_field(factory).await,
        ),
        Check::new(
            suite,
            "get_driver_not_found_has_correct_field",
            get_driver_not_found_has_correct_field(factory).await,
        ),
        Check::new(suite, "update_nonexistent_ride", update_nonexistent_ride(factory).await),
        Check::new(
            suite,
            "history_empty_for_nonexistent",
            history_empty_for_nonexistent(factory).await,
        ),
        Check::new(
            suite,
            "admin_actions_empty_for_nonexistent",
            admin_actions_empty_for_nonexistent(factory).await,
        ),
    ]
}

async fn get_ride_not_found_has_correct_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_ride("ghost").await {
        Err(StorageError::RideNotFound { ride_id }) if ride_id == "ghost" => Ok(()),
        Err(e) => Err(format!("expected RideNotFound(ghost), got {e}")),
        Ok(r) => Err(format!("expected error, got ride {}", r.id)),
    }
}

async fn get_driver_not_found_has_correct_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_driver("D404").await {
        Err(StorageError::DriverNotFound { driver_id }) if driver_id == "D404" => Ok(()),
        Err(e) => Err(format!("expected DriverNotFound(D404), got {e}")),
        Ok(d) => Err(format!("expected error, got driver {}", d.id)),
    }
}

/// Updating a ride nobody created is a not-found, whether it surfaces at
/// update or at commit.
async fn update_nonexistent_ride<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = match s.update_ride(&mut snap, 0, &make_ride("ghost")).await {
        Ok(_) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::RideNotFound { .. }) => {}
        Err(e) => return Err(format!("expected RideNotFound, got {e}")),
        Ok(()) => return Err("update of nonexistent ride committed".to_string()),
    }
    if s.get_ride("ghost").await.is_ok() {
        return Err("failed update created the ride".to_string());
    }
    Ok(())
}

async fn history_empty_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let history = s
        .list_status_history("ghost")
        .await
        .map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("expected empty history, got {}", history.len()));
    }
    Ok(())
}

async fn admin_actions_empty_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RideStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let actions = s
        .list_admin_actions(&AdminActionQuery::for_ride("ghost"))
        .await
        .map_err(|e| e.to_string())?;
    if !actions.is_empty() {
        return Err(format!("expected no actions, got {}", actions.len()));
    }
    Ok(())
}
