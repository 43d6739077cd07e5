//! `POST /login`: email + password against the router's own store.

use std::sync::{Arc, LazyLock};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use regex::Regex;

use crudforge_auth::{verify_password, Hs256JwtIssuer};
use crudforge_core::document::scalar_text;
use crudforge_core::{Filter, FindQuery, Sort};

use crate::app::dto::{LoginRequest, LoginResponse};
use crate::app::routes::{CrudState, ExtraRoute};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Which record fields hold the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFields {
    pub email: String,
    /// Argon2 PHC string, see [`crudforge_auth::hash_password`].
    pub password: String,
}

impl Default for LoginFields {
    fn default() -> Self {
        Self {
            email: "email".to_string(),
            password: "password".to_string(),
        }
    }
}

pub fn login_route(issuer: Arc<Hs256JwtIssuer>) -> ExtraRoute {
    login_route_with(issuer, LoginFields::default())
}

pub fn login_route_with(issuer: Arc<Hs256JwtIssuer>, fields: LoginFields) -> ExtraRoute {
    let fields = Arc::new(fields);
    let handler = move |State(state): State<CrudState>, body: Bytes| {
        let issuer = Arc::clone(&issuer);
        let fields = Arc::clone(&fields);
        async move { login(&state, &issuer, &fields, &body).await }
    };
    ExtraRoute::post("/login", handler).named("login")
}

fn reply(status: StatusCode, body: LoginResponse) -> Response {
    (status, Json(body)).into_response()
}

async fn login(state: &CrudState, issuer: &Hs256JwtIssuer, fields: &LoginFields, body: &[u8]) -> Response {
    let request: LoginRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LoginRequest::default()
    } else {
        match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                return reply(
                    StatusCode::BAD_REQUEST,
                    LoginResponse::rejected(format!("malformed JSON body: {e}")),
                );
            }
        }
    };

    let (Some(email), Some(password)) = (
        request.email.filter(|e| !e.is_empty()),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return reply(
            StatusCode::BAD_REQUEST,
            LoginResponse::rejected("Email and password are required"),
        );
    };

    if !EMAIL_RE.is_match(&email) {
        return reply(StatusCode::BAD_REQUEST, LoginResponse::rejected("Invalid email format"));
    }

    let mut filter = Filter::new();
    filter.insert(fields.email.clone(), email.clone());
    let query = FindQuery {
        filter,
        sort: Sort::default(),
        skip: 0,
        limit: 1,
        projection: None,
    };
    let record = match state.store.find_many(&query).await {
        Ok(mut found) => found.pop(),
        Err(e) => {
            tracing::error!(entity = state.store.entity(), error = %e, "login lookup failed");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, LoginResponse::failed(e.to_string()));
        }
    };
    let Some(record) = record else {
        return reply(StatusCode::NOT_FOUND, LoginResponse::rejected("Email address not found"));
    };

    let Some(stored) = record.get(&fields.password).and_then(|v| v.as_str()).map(str::to_owned) else {
        return reply(StatusCode::UNAUTHORIZED, LoginResponse::rejected("Invalid email or password"));
    };

    // Argon2 verification is CPU-bound.
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await;
    match verified {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            tracing::debug!(entity = state.store.entity(), "login rejected");
            return reply(StatusCode::UNAUTHORIZED, LoginResponse::rejected("Invalid email or password"));
        }
        Ok(Err(e)) => {
            tracing::error!(entity = state.store.entity(), error = %e, "stored password unreadable");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, LoginResponse::failed(e.to_string()));
        }
        Err(e) => {
            return reply(StatusCode::INTERNAL_SERVER_ERROR, LoginResponse::failed(e.to_string()));
        }
    }

    let subject = record
        .get(state.store.identity_field())
        .and_then(scalar_text)
        .unwrap_or_default();
    let token = match issuer.issue(&subject, Utc::now()) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "token signing failed");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, LoginResponse::failed(e.to_string()));
        }
    };

    tracing::info!(entity = state.store.entity(), subject = %subject, "login succeeded");

    let mut response = reply(StatusCode::OK, LoginResponse::success(token.clone(), email));
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        response.headers_mut().insert(header::AUTHORIZATION, value);
    }
    response
}
