use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use hitch_core::DispatchError;

/// Error surface of the REST handlers. Dispatch errors keep their machine
/// code so clients can branch on it; everything else collapses to a 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Dispatch(err) => {
                let status = match err {
                    DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                    DispatchError::NotAuthorized => StatusCode::FORBIDDEN,
                    DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
                    DispatchError::InvalidTransition { .. }
                    | DispatchError::StaleState
                    | DispatchError::AlreadyAssigned
                    | DispatchError::DriverUnavailable => StatusCode::CONFLICT,
                    DispatchError::OfferExpired => StatusCode::GONE,
                    DispatchError::Store(_) => {
                        tracing::error!("store failure: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.code(), err.to_string())
            }
            ApiError::Internal(err) => {
                tracing::error!("internal server error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
