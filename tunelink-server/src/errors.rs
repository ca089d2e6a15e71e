use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use thiserror::Error;
use tunelink_collab::{DatabaseError, LinkError};
use tunelink_core::DispatchError;

use crate::schemas::ErrorResponse;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Invalid or missing API key")]
    Unauthorized,
    #[error("Service is not ready, try again later")]
    NotReady(#[from] DispatchError),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(e) = &self {
            error!("Request failed: {}", e);
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::NotFound(resource),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<LinkError> for ServerError {
    fn from(value: LinkError) -> Self {
        match value {
            LinkError::UserNotFound(_) => Self::NotFound("User"),
            LinkError::Database(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}
