use super::{ApiError, engine_error};
use crate::push as push_service;
use crate::schedule::PendingBucket;
use crate::state;
use crate::types::appointment::UserId;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterAlertRequest {
    pub(crate) caller: UserId,
    pub(crate) owner: UserId,
    pub(crate) name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) at: OffsetDateTime,
}

pub(crate) async fn register_alert(
    State(state): State<state::AppState>,
    Json(request): Json<RegisterAlertRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .register_alert(&request.caller, &request.owner, &request.name, request.at)
        .map_err(engine_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn cancel_alert(
    State(state): State<state::AppState>,
    Path((caller, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .cancel_alert(&caller, &name)
        .map_err(engine_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Deserialize)]
pub(crate) struct AlertsDebugResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) server_time: OffsetDateTime,
    pub(crate) push_enabled: bool,
    pub(crate) pending: Vec<PendingBucket>,
}

pub(crate) async fn alerts_debug(
    State(state): State<state::AppState>,
) -> Json<AlertsDebugResponse> {
    Json(AlertsDebugResponse {
        server_time: state.engine.now(),
        push_enabled: matches!(
            push_service::load_vapid_config(&state.config),
            push_service::VapidConfigStatus::Ready(_)
        ),
        pending: state.engine.pending_alerts(),
    })
}
