//! Route handlers. Identities in request bodies are trusted; authentication
//! happens in front of this server.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rideshare_domain::{AdminAction, AdminActionQuery, AdminRole, Ride, StatusHistoryEntry};
use rideshare_engine::{
    AdminCommand, AdminRequest, DriverAction, DriverOutcome, DriverRequest, Eligibility,
    EngineError, ResultCode, TransitionOutcome,
};
use rideshare_storage::{RideStorage, StorageError};
use serde::Deserialize;

use super::state::AppState;

/// An engine error rendered as `{"code": ..., "error": ...}`.
pub(crate) struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self(err.into())
    }
}

pub(crate) fn status_for(code: ResultCode) -> StatusCode {
    match code {
        ResultCode::Ok => StatusCode::OK,
        ResultCode::NotFound => StatusCode::NOT_FOUND,
        ResultCode::InvalidTransition | ResultCode::ConcurrentModification => {
            StatusCode::CONFLICT
        }
        ResultCode::NotEligible => StatusCode::UNPROCESSABLE_ENTITY,
        ResultCode::Validation => StatusCode::BAD_REQUEST,
        ResultCode::Forbidden => StatusCode::FORBIDDEN,
        ResultCode::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({
            "code": code,
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub(crate) async fn handle_not_found() -> impl IntoResponse {
    let body = serde_json::json!({"code": ResultCode::NotFound, "error": "no such route"});
    (StatusCode::NOT_FOUND, Json(body))
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /rides/{id}
pub(crate) async fn handle_get_ride<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(ride_id): Path<String>,
) -> ApiResult<Ride> {
    Ok(Json(state.engine.storage().get_ride(&ride_id).await?))
}

/// GET /rides/{id}/history
pub(crate) async fn handle_history<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(ride_id): Path<String>,
) -> ApiResult<Vec<StatusHistoryEntry>> {
    let storage = state.engine.storage();
    storage.get_ride(&ride_id).await?;
    Ok(Json(storage.list_status_history(&ride_id).await?))
}

/// GET /rides/{id}/eligibility/{driver_id}
pub(crate) async fn handle_eligibility<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path((ride_id, driver_id)): Path<(String, String)>,
) -> ApiResult<Eligibility> {
    Ok(Json(state.engine.can_accept(&ride_id, &driver_id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DriverActionBody {
    driver_id: String,
    action: DriverAction,
    #[serde(default)]
    expected_version: Option<i64>,
    #[serde(default)]
    reason: Option<String>,
}

/// POST /rides/{id}/driver-actions
pub(crate) async fn handle_driver_action<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(ride_id): Path<String>,
    Json(body): Json<DriverActionBody>,
) -> ApiResult<DriverOutcome> {
    let request = DriverRequest {
        ride_id,
        driver_id: body.driver_id,
        action: body.action,
        expected_version: body.expected_version,
        reason: body.reason,
    };
    Ok(Json(state.engine.driver_action(request).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PassengerCancelBody {
    passenger_id: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    expected_version: Option<i64>,
}

/// POST /rides/{id}/passenger-cancel
pub(crate) async fn handle_passenger_cancel<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(ride_id): Path<String>,
    Json(body): Json<PassengerCancelBody>,
) -> ApiResult<TransitionOutcome> {
    let outcome = state
        .engine
        .passenger_cancel(&ride_id, &body.passenger_id, body.reason, body.expected_version)
        .await?;
    Ok(Json(outcome))
}

/// `{"admin_id", "role", "reason", "expected_version"?, "action", ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct AdminActionBody {
    admin_id: String,
    role: AdminRole,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    expected_version: Option<i64>,
    #[serde(flatten)]
    command: AdminCommand,
}

/// POST /rides/{id}/admin-actions
pub(crate) async fn handle_admin_action<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(ride_id): Path<String>,
    Json(body): Json<AdminActionBody>,
) -> ApiResult<TransitionOutcome> {
    let request = AdminRequest {
        ride_id,
        admin_id: body.admin_id,
        role: body.role,
        reason: body.reason,
        expected_version: body.expected_version,
    };
    Ok(Json(state.admin.execute(request, body.command).await?))
}

/// GET /admin-actions?ride_id=&admin_id=&from=&until=&limit=
pub(crate) async fn handle_list_admin_actions<S: RideStorage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<AdminActionQuery>,
) -> ApiResult<Vec<AdminAction>> {
    Ok(Json(state.engine.storage().list_admin_actions(&query).await?))
}
