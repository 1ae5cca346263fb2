use thiserror::Error;

/// Errors returned to callers of the engine facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("appointment '{name}' not found for '{user}'")]
    AppointmentNotFound { user: String, name: String },

    #[error("'{user}' has no alert on appointment '{name}'")]
    AlertNotFound { user: String, name: String },

    #[error("'{user}' is not a guest of appointment '{name}'")]
    GuestNotFound { user: String, name: String },

    #[error("'{owner}' already has an appointment named '{name}'")]
    DuplicateName { owner: String, name: String },

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("alert timers need a running tokio runtime")]
    NoRuntime,
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::AppointmentNotFound { .. }
                | EngineError::AlertNotFound { .. }
                | EngineError::GuestNotFound { .. }
        )
    }

    pub(crate) fn appointment_not_found(user: &str, name: &str) -> Self {
        EngineError::AppointmentNotFound {
            user: user.to_string(),
            name: name.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
