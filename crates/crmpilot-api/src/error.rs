use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crmpilot::TurnError;
use serde_json::json;
use thiserror::Error;

pub const UNAUTHORIZED_MESSAGE: &str = "You must be signed in to use the chat.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("You must be signed in to use the chat.")]
    Unauthorized,

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Persistence error: {0}")]
    Persist(#[from] crmpilot::persist::PersistError),

    #[error("{0}")]
    Turn(TurnError),

    #[error("Internal server error")]
    Internal,
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::UnknownAgent(_) | TurnError::EmptyMessage => Self::BadRequest(err.to_string()),
            TurnError::ThreadNotFound(id) => Self::ThreadNotFound(id),
            TurnError::Storage(e) => Self::Persist(e),
            other => Self::Turn(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::ThreadNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::Turn(ref e) => {
                tracing::error!("Turn setup error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::Internal => {
                tracing::error!("Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_is_bad_request() {
        let err: ApiError = TurnError::UnknownAgent("x".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_carries_sign_in_message() {
        assert_eq!(ApiError::Unauthorized.to_string(), "You must be signed in to use the chat.");
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
