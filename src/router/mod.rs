//! Route table — exact path strings mapped to a method and a handler.
//!
//! Matching is a single hash lookup on the path exactly as the caller supplies
//! it. There are no parameters, wildcards, prefixes, or trailing-slash and case
//! normalization: `/users`, `/users/`, and `/Users` are three different routes.
//!
//! Each path holds one route. Registering a path again replaces the earlier
//! route whatever its method was, so a path cannot serve both `GET` and `POST`.
//! The replacement is logged at `warn` level so that an accidental collision
//! shows up at startup.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::dispatcher::Responder;
use crate::http::Method;

/// Boxed future returned by a type-erased handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type-erased async handler.
///
/// A handler receives the [`RequestContext`] and a [`Responder`] through
/// which it writes its response. Returning `Err` makes the dispatcher answer
/// with the `500` envelope. You never build this type yourself; use
/// [`RouteTable::get`] and [`RouteTable::post`], which accept any
/// `Fn(RequestContext, Responder) -> impl Future<Output = anyhow::Result<()>>`.
pub type Handler =
    Arc<dyn Fn(RequestContext, Responder) -> HandlerFuture + Send + Sync + 'static>;

/// Methods a route can be registered for.
///
/// `POST` routes get their body read and parsed as JSON before the handler
/// runs; `GET` routes get their query string parsed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
}

impl RouteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    /// Whether an incoming request method is the one this route was registered for.
    pub fn matches(self, method: &Method) -> bool {
        matches!(
            (self, method),
            (Self::Get, Method::Get) | (Self::Post, Method::Post)
        )
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered `(path, method, handler)` triple.
#[derive(Clone)]
pub struct Route {
    path: String,
    method: RouteMethod,
    handler: Handler,
}

impl Route {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> RouteMethod {
        self.method
    }

    /// Starts the handler. The returned future may suspend on the handler's own I/O.
    pub fn invoke(&self, ctx: RequestContext, res: Responder) -> HandlerFuture {
        (self.handler)(ctx, res)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Exact-path route table. Populated before serving and read-only afterwards.
///
/// # Examples
///
/// ```rust,no_run
/// use jsonroute::router::{RouteMethod, RouteTable};
/// use serde_json::json;
///
/// let mut routes = RouteTable::new();
/// routes.get("/", |_ctx, res| async move {
///     res.respond_json(&json!({ "message": "Welcome to my API" }));
///     Ok(())
/// });
///
/// assert_eq!(routes.lookup("/").map(|r| r.method()), Some(RouteMethod::Get));
/// assert!(routes.lookup("/missing").is_none());
/// ```
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `GET` requests to exactly `path`.
    pub fn get<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(RequestContext, Responder) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(path, RouteMethod::Get, handler);
    }

    /// Registers `handler` for `POST` requests to exactly `path`.
    pub fn post<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(RequestContext, Responder) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(path, RouteMethod::Post, handler);
    }

    /// Stores a route at `path`, replacing any route already there regardless of its method.
    pub fn register<H, F>(&mut self, path: &str, method: RouteMethod, handler: H)
    where
        H: Fn(RequestContext, Responder) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, res| -> HandlerFuture {
            Box::pin(handler(ctx, res))
        });
        let route = Route {
            path: path.to_owned(),
            method,
            handler,
        };

        match self.routes.insert(path.to_owned(), route) {
            Some(previous) => warn!(
                path,
                replaced = %previous.method,
                method = %method,
                "route replaced by later registration"
            ),
            None => debug!(path, method = %method, "route registered"),
        }
    }

    /// Exact-match lookup. `None` means no route is registered at `path`.
    pub fn lookup(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes.values()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: RequestContext, _res: Responder) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn table_starts_empty() {
        let table = RouteTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(table.lookup("/").is_none());
    }

    #[test]
    fn get_and_post_register_with_their_method() {
        let mut table = RouteTable::new();
        table.get("/a", noop);
        table.post("/b", noop);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/a").unwrap().method(), RouteMethod::Get);
        assert_eq!(table.lookup("/b").unwrap().method(), RouteMethod::Post);
        assert_eq!(table.lookup("/b").unwrap().path(), "/b");
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut table = RouteTable::new();
        table.get("/same", noop);
        table.post("/same", noop);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("/same").unwrap().method(), RouteMethod::Post);
    }

    #[test]
    fn lookup_is_exact() {
        let mut table = RouteTable::new();
        table.get("/users", noop);
        assert!(table.lookup("/users").is_some());
        assert!(table.lookup("/users/").is_none());
        assert!(table.lookup("/Users").is_none());
        assert!(table.lookup("/users/1").is_none());
        assert!(table.lookup("/users?x=1").is_none());
    }

    #[test]
    fn route_method_matching() {
        assert!(RouteMethod::Get.matches(&Method::Get));
        assert!(RouteMethod::Post.matches(&Method::Post));
        assert!(!RouteMethod::Get.matches(&Method::Post));
        assert!(!RouteMethod::Post.matches(&Method::Put));
        assert!(!RouteMethod::Get.matches(&Method::Custom("get".into())));
    }

    #[test]
    fn paths_lists_registrations() {
        let mut table = RouteTable::new();
        table.get("/", noop);
        table.post("/post", noop);
        let mut paths: Vec<_> = table.paths().collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["/", "/post"]);
    }
}
