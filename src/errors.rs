use crate::gateway::GatewayError;
use axum::http::StatusCode;
use thiserror::Error;

/// Input rejected locally; no remote call was issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("habit name is required")]
    EmptyHabitName,
    #[error("sign in first")]
    NotSignedIn,
    #[error("habit '{0}' already exists")]
    DuplicateHabit(String),
    #[error("unknown habit {0}")]
    UnknownHabit(String),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn bad_gateway(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.to_string(),
        }
    }
}

impl From<ActionError> for AppError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Validation(err) => Self::bad_request(err.to_string()),
            ActionError::Remote(err) => Self::bad_gateway(err),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
