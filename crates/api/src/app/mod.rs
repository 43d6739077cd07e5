//! HTTP application wiring.
//!
//! - `routes/`: the CRUD router builder, its handlers, login and system routes
//! - `query.rs`: list query translation
//! - `dto.rs`: response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crudforge_auth::{Hs256JwtIssuer, Hs256JwtValidator, JwtValidator};
use crudforge_core::SharedStore;

use crate::middleware::{self, Middleware, RequireBearer};
use routes::{BuildError, CrudRouter, ExtraRoute, Operation};

pub mod dto;
pub mod errors;
pub mod query;
pub mod routes;

#[cfg(test)]
pub(crate) mod testing;

/// Build the demo application around a `users` store.
///
/// `/users` gets the generated CRUD routes with request logging on reads,
/// the bearer guard on update and delete, `POST /users/login` and
/// `GET /users/me`. Password hashes are never returned.
pub fn build_app(users: SharedStore, jwt_secret: &str) -> Result<Router, BuildError> {
    let jwt: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::new(jwt_secret));
    let issuer = Arc::new(Hs256JwtIssuer::new(jwt_secret));
    let guard: Arc<dyn Middleware> = Arc::new(RequireBearer::new(jwt));

    let users = CrudRouter::new(users)
        .hide_fields(["password"])
        .middleware(Operation::List, middleware::log_request())
        .middleware(Operation::GetById, middleware::log_request())
        .shared_middleware(Operation::Update, Arc::clone(&guard))
        .shared_middleware(Operation::Delete, Arc::clone(&guard))
        .extra_route(routes::login::login_route(issuer))
        .extra_route(ExtraRoute::get("/me", routes::system::me).with_shared_middleware(guard))
        .build()?;

    Ok(Router::new()
        .route("/", get(routes::system::welcome))
        .route("/health", get(routes::system::health))
        .nest("/users", users)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}
