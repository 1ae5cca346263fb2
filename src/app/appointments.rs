use super::{ApiError, engine_error};
use crate::engine::Registered;
use crate::schedule::NewAppointment;
use crate::state;
use crate::types::appointment::{AlertEntry, AppointmentSnapshot, UserId};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateAppointmentRequest {
    pub(crate) owner: UserId,
    pub(crate) name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) date: OffsetDateTime,
    #[serde(default)]
    pub(crate) guests: Vec<UserId>,
    #[serde(default)]
    pub(crate) alerts: Vec<AlertEntry>,
}

#[derive(Serialize)]
pub(crate) struct FailedDelivery {
    pub(crate) user: UserId,
    pub(crate) error: String,
}

/// An appointment plus who was and was not reached about it.
#[derive(Serialize)]
pub(crate) struct NotifiedResponse {
    pub(crate) appointment: AppointmentSnapshot,
    pub(crate) delivered: Vec<UserId>,
    pub(crate) failed: Vec<FailedDelivery>,
}

impl From<Registered> for NotifiedResponse {
    fn from(registered: Registered) -> Self {
        Self {
            appointment: registered.appointment,
            delivered: registered.notified.delivered,
            failed: registered
                .notified
                .failed
                .iter()
                .map(|failure| FailedDelivery {
                    user: failure.user().to_string(),
                    error: failure.to_string(),
                })
                .collect(),
        }
    }
}

pub(crate) async fn create_appointment(
    State(state): State<state::AppState>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<NotifiedResponse>), ApiError> {
    let request = NewAppointment {
        owner: request.owner,
        name: request.name,
        date: request.date,
        guests: request.guests,
        alerts: request
            .alerts
            .into_iter()
            .map(|entry| (entry.user, entry.at))
            .collect(),
    };
    let registered = state
        .engine
        .register_appointment(request)
        .await
        .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(registered.into())))
}

pub(crate) async fn cancel_appointment(
    State(state): State<state::AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<AppointmentSnapshot>, ApiError> {
    state
        .engine
        .cancel_appointment(&owner, &name)
        .map(Json)
        .map_err(engine_error)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddGuestRequest {
    pub(crate) guest: UserId,
}

pub(crate) async fn add_guest(
    State(state): State<state::AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(request): Json<AddGuestRequest>,
) -> Result<Json<NotifiedResponse>, ApiError> {
    let registered = state
        .engine
        .add_guest(&owner, &name, &request.guest)
        .await
        .map_err(engine_error)?;
    Ok(Json(registered.into()))
}

pub(crate) async fn remove_guest(
    State(state): State<state::AppState>,
    Path((owner, name, guest)): Path<(String, String, String)>,
) -> Result<Json<AppointmentSnapshot>, ApiError> {
    state
        .engine
        .remove_guest(&owner, &name, &guest)
        .map(Json)
        .map_err(engine_error)
}
