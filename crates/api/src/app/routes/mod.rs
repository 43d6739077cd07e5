//! CRUD router builder.
//!
//! A [`CrudRouter`] owns a store handle and produces five base routes
//! (list, get, create, update, delete), each behind its own middleware chain,
//! followed by any extra routes the caller registered. A router-wide chain
//! runs in front of every one of them.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::Request,
    handler::Handler,
    http::Method,
    middleware::Next,
    routing::{self, MethodFilter, MethodRouter},
    Router,
};
use thiserror::Error;

use crudforge_core::{Document, Projection, SharedStore, Store, StoreResult};

use crate::app::query::QueryDefaults;
use crate::middleware::Middleware;

pub mod crud;
pub mod login;
pub mod system;

/// State every generated route (and every extra route) is bound to.
#[derive(Clone)]
pub struct CrudState {
    pub store: SharedStore,
    pub defaults: QueryDefaults,
    /// Exclusion applied to every record a handler responds with.
    pub hidden: Option<Projection>,
}

impl CrudState {
    /// Strip the hidden fields from an outgoing record.
    pub fn redact(&self, doc: Document) -> StoreResult<Document> {
        match &self.hidden {
            Some(hidden) => hidden.apply(&doc, self.store.identity_field()),
            None => Ok(doc),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: Method, path: String },

    #[error("route {path} uses parameter '{found}' where {other} already uses '{existing}'")]
    ConflictingParameter {
        path: String,
        other: String,
        existing: String,
        found: String,
    },

    #[error("invalid route path '{0}'")]
    InvalidPath(String),

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
}

/// The five generated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    GetById,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Base-route order.
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::GetById,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn method(self) -> Method {
        match self {
            Operation::List | Operation::GetById => Method::GET,
            Operation::Create => Method::POST,
            Operation::Update => Method::PUT,
            Operation::Delete => Method::DELETE,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Operation::List | Operation::Create => "/",
            Operation::GetById | Operation::Update | Operation::Delete => "/:id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::GetById => "get_by_id",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    fn method_router(self) -> MethodRouter<CrudState> {
        match self {
            Operation::List => routing::get(crud::list_items),
            Operation::GetById => routing::get(crud::get_item),
            Operation::Create => routing::post(crud::create_item),
            Operation::Update => routing::put(crud::update_item),
            Operation::Delete => routing::delete(crud::delete_item),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered middleware for each operation.
#[derive(Clone, Default)]
pub struct OperationMiddleware {
    chains: [Vec<Arc<dyn Middleware>>; 5],
}

impl OperationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mw` to the chain of `op`.
    pub fn with(mut self, op: Operation, mw: impl Middleware) -> Self {
        self.push(op, Arc::new(mw));
        self
    }

    pub fn push(&mut self, op: Operation, mw: Arc<dyn Middleware>) {
        self.chains[op.index()].push(mw);
    }

    pub fn for_operation(&self, op: Operation) -> &[Arc<dyn Middleware>] {
        &self.chains[op.index()]
    }
}

/// A caller-defined route mounted next to the base routes.
#[derive(Clone)]
pub struct ExtraRoute {
    method: Method,
    path: String,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: MethodRouter<CrudState>,
    handler_name: String,
}

impl ExtraRoute {
    pub fn new<H, T>(method: Method, path: impl Into<String>, handler: H) -> Result<Self, BuildError>
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        let filter =
            MethodFilter::try_from(method.clone()).map_err(|_| BuildError::UnsupportedMethod(method.clone()))?;
        Ok(Self::with_filter(method, filter, path.into(), handler))
    }

    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self::with_filter(Method::GET, MethodFilter::GET, path.into(), handler)
    }

    pub fn post<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self::with_filter(Method::POST, MethodFilter::POST, path.into(), handler)
    }

    pub fn put<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self::with_filter(Method::PUT, MethodFilter::PUT, path.into(), handler)
    }

    pub fn patch<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self::with_filter(Method::PATCH, MethodFilter::PATCH, path.into(), handler)
    }

    pub fn delete<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self::with_filter(Method::DELETE, MethodFilter::DELETE, path.into(), handler)
    }

    fn with_filter<H, T>(method: Method, filter: MethodFilter, path: String, handler: H) -> Self
    where
        H: Handler<T, CrudState>,
        T: 'static,
    {
        Self {
            method,
            path,
            middleware: Vec::new(),
            handler: routing::on(filter, handler),
            handler_name: std::any::type_name::<H>().to_string(),
        }
    }

    /// Label used for the handler in route tables.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.handler_name = name.into();
        self
    }

    pub fn with_middleware(self, mw: impl Middleware) -> Self {
        self.with_shared_middleware(Arc::new(mw))
    }

    pub fn with_shared_middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One entry of a built route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    /// Middleware names in execution order.
    pub middleware: Vec<String>,
    pub handler: String,
}

/// Builder for the CRUD routes of one store.
#[derive(Clone)]
pub struct CrudRouter {
    store: SharedStore,
    defaults: QueryDefaults,
    hidden: Option<Projection>,
    global: Vec<Arc<dyn Middleware>>,
    middleware: OperationMiddleware,
    extra_routes: Vec<ExtraRoute>,
}

impl CrudRouter {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            defaults: QueryDefaults::default(),
            hidden: None,
            global: Vec::new(),
            middleware: OperationMiddleware::default(),
            extra_routes: Vec::new(),
        }
    }

    pub fn for_store<S: Store + 'static>(store: S) -> Self {
        Self::new(Arc::new(store))
    }

    /// Append `mw` to the router-wide chain. It runs before the chain of
    /// every base and extra route.
    pub fn middleware_all(self, mw: impl Middleware) -> Self {
        self.shared_middleware_all(Arc::new(mw))
    }

    pub fn shared_middleware_all(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.global.push(mw);
        self
    }

    /// Append `mw` to the chain of `op`.
    pub fn middleware(self, op: Operation, mw: impl Middleware) -> Self {
        self.shared_middleware(op, Arc::new(mw))
    }

    /// Append an already shared middleware, e.g. one guard used on several
    /// operations.
    pub fn shared_middleware(mut self, op: Operation, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(op, mw);
        self
    }

    /// Replace every per-operation chain at once. The router-wide chain is
    /// left as is.
    pub fn configure(mut self, middleware: OperationMiddleware) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Never return these fields from list, get, create or update, whatever
    /// `fields` the client asks for. Dotted paths reach into sub-documents.
    pub fn hide_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        let exclusion: Vec<String> = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_string())
            .filter(|f| !f.is_empty())
            .map(|f| format!("-{f}"))
            .collect();
        self.hidden = Projection::new(exclusion.join(" "));
        self
    }

    pub fn extra_route(mut self, route: ExtraRoute) -> Self {
        self.extra_routes.push(route);
        self
    }

    /// Base routes in fixed order, then extra routes in registration order.
    pub fn route_table(&self) -> Result<Vec<RouteDescriptor>, BuildError> {
        let mut table: Vec<RouteDescriptor> = Operation::ALL
            .iter()
            .map(|&op| RouteDescriptor {
                method: op.method(),
                path: op.path().to_string(),
                middleware: names(&self.chain(self.middleware.for_operation(op))),
                handler: op.as_str().to_string(),
            })
            .collect();

        for extra in &self.extra_routes {
            validate_path(&extra.path)?;
            for existing in &table {
                check_collision(existing, &extra.method, &extra.path)?;
            }
            table.push(RouteDescriptor {
                method: extra.method.clone(),
                path: extra.path.clone(),
                middleware: names(&self.chain(&extra.middleware)),
                handler: extra.handler_name.clone(),
            });
        }

        Ok(table)
    }

    /// Materialize the routes from the builder's current state.
    ///
    /// Nothing is sent to the store until a request arrives.
    pub fn build(&self) -> Result<Router, BuildError> {
        let table = self.route_table()?;

        let mut router = Router::new();
        for op in Operation::ALL {
            let route = with_chain(op.method_router(), &self.chain(self.middleware.for_operation(op)));
            router = router.route(op.path(), route);
        }
        for extra in &self.extra_routes {
            router = router.route(&extra.path, with_chain(extra.handler.clone(), &self.chain(&extra.middleware)));
        }

        tracing::debug!(entity = self.store.entity(), routes = table.len(), "crud routes built");

        Ok(router.with_state(CrudState {
            store: Arc::clone(&self.store),
            defaults: self.defaults,
            hidden: self.hidden.clone(),
        }))
    }

    /// Router-wide middleware followed by `own`.
    fn chain(&self, own: &[Arc<dyn Middleware>]) -> Vec<Arc<dyn Middleware>> {
        self.global.iter().chain(own).cloned().collect()
    }
}

fn names(chain: &[Arc<dyn Middleware>]) -> Vec<String> {
    chain.iter().map(|mw| mw.name().to_string()).collect()
}

/// Wrap `route` so `chain[0]` runs first and the handler runs last.
fn with_chain(
    mut route: MethodRouter<CrudState>,
    chain: &[Arc<dyn Middleware>],
) -> MethodRouter<CrudState> {
    for mw in chain.iter().rev() {
        let mw = Arc::clone(mw);
        route = route.route_layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            let mw = Arc::clone(&mw);
            async move { mw.handle(req, next).await }
        }));
    }
    route
}

/// `:name` and `*name` segments are parameters.
fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix(':')
        .or_else(|| segment.strip_prefix('*'))
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim_start_matches('/').split('/')
}

/// Reject paths axum's path tree would panic on.
fn validate_path(path: &str) -> Result<(), BuildError> {
    let invalid = || BuildError::InvalidPath(path.to_string());
    if !path.starts_with('/') {
        return Err(invalid());
    }

    let mut rest = segments(path).peekable();
    while let Some(segment) = rest.next() {
        match param_name(segment) {
            None if segment.contains([':', '*']) => return Err(invalid()),
            None => {}
            Some(name) if name.is_empty() || name.contains([':', '*']) => return Err(invalid()),
            Some(_) if segment.starts_with('*') && rest.peek().is_some() => return Err(invalid()),
            Some(_) => {}
        }
    }
    Ok(())
}

/// Same shape once parameter names are erased.
fn same_shape(a: &str, b: &str) -> bool {
    let erase = |s: &str| match s.chars().next() {
        Some(c @ (':' | '*')) => c.to_string(),
        _ => s.to_string(),
    };
    segments(a).map(erase).eq(segments(b).map(erase))
}

fn check_collision(existing: &RouteDescriptor, method: &Method, path: &str) -> Result<(), BuildError> {
    if existing.method == *method && same_shape(&existing.path, path) {
        return Err(BuildError::DuplicateRoute {
            method: method.clone(),
            path: path.to_string(),
        });
    }

    // The path tree is shared by all methods, so parameter names at one
    // position must agree regardless of method.
    for (ours, theirs) in segments(path).zip(segments(&existing.path)) {
        match (param_name(ours), param_name(theirs)) {
            (Some(_), Some(_)) if ours == theirs => continue,
            (Some(_), Some(_)) => {
                return Err(BuildError::ConflictingParameter {
                    path: path.to_string(),
                    other: existing.path.clone(),
                    existing: theirs.to_string(),
                    found: ours.to_string(),
                });
            }
            _ if ours == theirs => continue,
            _ => break,
        }
    }
    Ok(())
}
