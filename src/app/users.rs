use super::{ApiError, engine_error};
use crate::state;
use crate::types::appointment::AppointmentSnapshot;
use crate::types::push::CallbackAddress;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterUserRequest {
    pub(crate) user: String,
    pub(crate) endpoint: String,
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

#[derive(Serialize)]
pub(crate) struct RegisterUserResponse {
    pub(crate) credential: String,
}

pub(crate) async fn register_user(
    State(state): State<state::AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<Json<RegisterUserResponse>, ApiError> {
    let address = CallbackAddress {
        endpoint: request.endpoint,
        p256dh: request.p256dh,
        auth: request.auth,
    };
    let credential = state
        .engine
        .register_user(&request.user, address)
        .map_err(engine_error)?;
    Ok(Json(RegisterUserResponse { credential }))
}

pub(crate) async fn user_appointments(
    State(state): State<state::AppState>,
    Path(user): Path<String>,
) -> Json<Vec<AppointmentSnapshot>> {
    Json(state.engine.get_appointments(&user))
}
