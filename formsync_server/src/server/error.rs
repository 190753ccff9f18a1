use axum::{
    http::{header::WWW_AUTHENTICATE, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Unauthorized = self {
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Basic realm=\"formsync\"")],
                ErrorResponse {
                    error: "UNAUTHORIZED".to_string(),
                },
            )
                .into_response();
        }
        if cfg!(debug_assertions) {
            error!("{:#?}", self);
        }
        match self {
            ApiError::IoError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "IO_ERROR".to_string(),
                },
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: "UNAUTHORIZED".to_string(),
                },
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "NOT_FOUND".to_string(),
                },
            ),
        }
        .into_response()
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        self.error.into_response()
    }
}
