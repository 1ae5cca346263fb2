use crate::adapters::TokioTimeProvider;
use crate::config;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::push as push_service;
use crate::signing::{NotificationSigner, SIGNATURE_ISSUER};
use crate::state;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use tracing::warn;

mod alerts;
mod appointments;
mod users;

pub fn app(config: config::AppConfig) -> Result<Router, config::ConfigError> {
    let engine = build_engine(&config)?;
    let state = state::AppState { config, engine };
    Ok(Router::new()
        .route("/api/users", post(users::register_user))
        .route(
            "/api/users/{user}/appointments",
            get(users::user_appointments),
        )
        .route("/api/appointments", post(appointments::create_appointment))
        .route(
            "/api/appointments/{owner}/{name}",
            delete(appointments::cancel_appointment),
        )
        .route(
            "/api/appointments/{owner}/{name}/guests",
            post(appointments::add_guest),
        )
        .route(
            "/api/appointments/{owner}/{name}/guests/{guest}",
            delete(appointments::remove_guest),
        )
        .route("/api/alerts", post(alerts::register_alert))
        .route("/api/alerts/{caller}/{name}", delete(alerts::cancel_alert))
        .route("/api/debug/alerts", get(alerts::alerts_debug))
        .route("/health", get(health))
        .with_state(state))
}

fn build_engine(config: &config::AppConfig) -> Result<state::AppEngine, config::ConfigError> {
    let signing_key = config
        .signing_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());
    let signer = match signing_key {
        Some(raw) => NotificationSigner::from_key(raw, SIGNATURE_ISSUER, config.signature_ttl)
            .map_err(|_| config::ConfigError::InvalidSigningKey)?,
        None => {
            warn!("no signing key configured; using an ephemeral key for this run");
            NotificationSigner::ephemeral(SIGNATURE_ISSUER, config.signature_ttl)
        }
    };
    let notifier = push_service::build_notifier(config);
    Ok(Engine::new(
        TokioTimeProvider,
        notifier,
        signer,
        config.delivery_timeout,
    ))
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::AppointmentNotFound { .. }
        | EngineError::AlertNotFound { .. }
        | EngineError::GuestNotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::DuplicateName { .. } => StatusCode::CONFLICT,
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::NoRuntime => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
