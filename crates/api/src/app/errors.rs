use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crudforge_core::StoreError;

use crate::app::query::QueryError;

/// Every way a generated route can fail.
///
/// Rendered as `{"error": <message>}` with the status from [`CrudError::status`].
#[derive(Debug, Error)]
pub enum CrudError {
    #[error("Item not found")]
    NotFound,

    /// Store faults pass their message through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    Body(String),

    #[error("No token provided")]
    AuthRequired,

    #[error("Failed to authenticate token")]
    AuthInvalid,
}

impl CrudError {
    pub fn status(&self) -> StatusCode {
        match self {
            CrudError::NotFound => StatusCode::NOT_FOUND,
            CrudError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CrudError::Query(_) | CrudError::Body(_) => StatusCode::BAD_REQUEST,
            CrudError::AuthRequired | CrudError::AuthInvalid => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        json_error(self.status(), self.to_string())
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}
