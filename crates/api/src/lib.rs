//! HTTP API: CRUD route generation, request middleware, and the demo server.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
