use axum::{extract::Extension, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::context::Identity;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn welcome() -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to crudforge {}", env!("CARGO_PKG_VERSION")),
    }))
}

/// Identity of the bearer; mount behind the bearer guard.
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
