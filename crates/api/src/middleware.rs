//! Per-route middleware: the trait the router builder composes, plus the
//! bearer guard and request logger shipped with the crate.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crudforge_auth::JwtValidator;

use crate::app::errors::CrudError;
use crate::context::Identity;

/// One step of a route's chain.
///
/// Calling `next.run(req)` continues the chain; returning a response without
/// calling it ends the request there.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Label shown in route tables.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, req: Request, next: Next) -> Response;
}

/// Middleware built from an async closure.
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

/// Wrap `f` as a named [`Middleware`].
pub fn middleware_fn<F, Fut>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FnMiddleware { name, f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, req: Request, next: Next) -> Response {
        (self.f)(req, next).await
    }
}

/// Rejects requests without a valid `Authorization: Bearer <token>` header
/// (403) and attaches an [`Identity`] to those that pass.
#[derive(Clone)]
pub struct RequireBearer {
    jwt: Arc<dyn JwtValidator>,
}

impl RequireBearer {
    pub fn new(jwt: Arc<dyn JwtValidator>) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl Middleware for RequireBearer {
    fn name(&self) -> &str {
        "require_bearer"
    }

    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let Some(token) = extract_bearer(req.headers()) else {
            return CrudError::AuthRequired.into_response();
        };

        let claims = match self.jwt.validate(token, Utc::now()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                return CrudError::AuthInvalid.into_response();
            }
        };

        req.extensions_mut().insert(Identity::from_claims(&claims));
        next.run(req).await
    }
}

/// Logs method and URI, then continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequest;

pub fn log_request() -> LogRequest {
    LogRequest
}

#[async_trait]
impl Middleware for LogRequest {
    fn name(&self) -> &str {
        "log_request"
    }

    async fn handle(&self, req: Request, next: Next) -> Response {
        tracing::info!(method = %req.method(), uri = %req.uri(), "request");
        next.run(req).await
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
