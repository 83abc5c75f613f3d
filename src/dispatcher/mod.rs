//! The per-request pipeline: classify, route, parse, invoke, answer.
//!
//! [`Dispatcher::dispatch`] turns one framed [`Request`] into at most one
//! [`Response`]. The steps run in order and stop at the first response:
//!
//! 1. `OPTIONS` → `204 No Content`, before any route lookup.
//! 2. No route at the path → `{status:404, message:"Not Found"}`.
//! 3. Route registered for another method → `{status:405, message:"Method Not Allowed"}`.
//! 4. `POST` route → body parsed as JSON; failure → `{status:400, message:"Bad Request", ...}`.
//!    `GET` route → query string parsed and attached.
//! 5. Handler invoked; an error or a panic → `{status:500, message:"Internal server error", ...}`.
//!
//! Every JSON answer, error envelopes included, goes out through
//! [`Responder::respond_json`] and therefore with transport status `200`.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::Environment;
use crate::context::{Query, RequestContext};
use crate::http::{Request, Response};
use crate::router::{RouteMethod, RouteTable};

mod error;
mod responder;

pub use error::DispatchError;
pub use responder::{Responder, ResponseSlot, ResponseWriter, SERIALIZATION_FALLBACK};

use responder::query_field;

/// Owns the route table and answers requests against it.
///
/// The table is read-only once a dispatcher exists, so one dispatcher can be
/// shared by every connection without locking.
///
/// # Examples
///
/// ```rust
/// use jsonroute::config::Environment;
/// use jsonroute::dispatcher::Dispatcher;
/// use jsonroute::http::Request;
/// use jsonroute::router::RouteTable;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut routes = RouteTable::new();
/// routes.get("/", |_ctx, res| async move {
///     res.respond_json(&json!({ "message": "Welcome to my API" }));
///     Ok(())
/// });
/// let dispatcher = Dispatcher::new(routes, Environment::Development);
///
/// let (request, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// let response = dispatcher
///     .dispatch(request, "127.0.0.1:4000".parse().unwrap())
///     .await
///     .unwrap();
/// assert_eq!(response.payload(), br#"{"message":"Welcome to my API"}"#);
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    routes: RouteTable,
    environment: Environment,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, environment: Environment) -> Self {
        Self {
            routes,
            environment,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Runs the pipeline for `request`, received from `peer`.
    ///
    /// Returns `None` only when the handler finished without writing a
    /// response; the caller should then close the connection.
    pub async fn dispatch(&self, request: Request, peer: SocketAddr) -> Option<Response> {
        let mut ctx = RequestContext::from_request(&request, peer);

        if request.method().is_preflight() {
            ctx.attach_query(Query::parse(request.query_string().unwrap_or_default()));
            let response = Response::no_content();
            debug!(
                ip = %ctx.ip(),
                method = %ctx.method(),
                path = %ctx.path_name(),
                user_agent = %ctx.user_agent().unwrap_or("-"),
                status = response.status().as_u16(),
                query = query_field(&ctx).as_deref().unwrap_or("-"),
                "preflight answered"
            );
            return Some(response);
        }

        let slot = Arc::new(ResponseSlot::new());

        let Some(route) = self.routes.lookup(request.path()) else {
            self.reject(&ctx, slot.clone(), DispatchError::RouteUnresolved);
            return slot.take();
        };

        if !route.method().matches(request.method()) {
            self.reject(&ctx, slot.clone(), DispatchError::MethodMismatch);
            return slot.take();
        }

        match route.method() {
            RouteMethod::Post => match parse_json_body(&request) {
                Ok(body) => ctx.attach_body(body),
                Err(cause) => {
                    self.reject(&ctx, slot.clone(), DispatchError::MalformedRequest { cause });
                    return slot.take();
                }
            },
            RouteMethod::Get => {
                ctx.attach_query(Query::parse(request.query_string().unwrap_or_default()));
            }
        }

        let responder = Responder::new(slot.clone(), &ctx);
        let report_ctx = ctx.clone();

        let outcome = AssertUnwindSafe(route.invoke(ctx, responder))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(cause)) => Some(cause),
            Err(panic) => Some(anyhow!("handler panicked: {}", panic_message(&*panic))),
        };

        if let Some(cause) = failure {
            self.reject(&report_ctx, slot.clone(), DispatchError::HandlerFailure { cause });
        }

        let response = slot.take();
        if response.is_none() {
            warn!(
                ip = %report_ctx.ip(),
                method = %report_ctx.method(),
                path = %report_ctx.path_name(),
                user_agent = %report_ctx.user_agent().unwrap_or("-"),
                status = "-",
                query = query_field(&report_ctx).as_deref().unwrap_or("-"),
                "handler completed without writing a response"
            );
        }
        response
    }

    // Log the failure and write its envelope. If the handler already wrote a
    // response, that one stands and the envelope is dropped by the slot.
    fn reject(&self, ctx: &RequestContext, slot: Arc<ResponseSlot>, err: DispatchError) {
        match &err {
            DispatchError::HandlerFailure { cause } => error!(
                ip = %ctx.ip(),
                method = %ctx.method(),
                path = %ctx.path_name(),
                error = %cause,
                "handler failed"
            ),
            DispatchError::MalformedRequest { cause } => warn!(
                ip = %ctx.ip(),
                method = %ctx.method(),
                path = %ctx.path_name(),
                error = %cause,
                "bad request body"
            ),
            DispatchError::RouteUnresolved | DispatchError::MethodMismatch => {}
        }

        Responder::new(slot, ctx).respond_json(&err.to_envelope(self.environment));
    }
}

// A transport failure while the body was accumulated counts the same as malformed JSON.
fn parse_json_body(request: &Request) -> anyhow::Result<Value> {
    let bytes = request.body().map_err(|e| anyhow::Error::new(e.clone()))?;
    Ok(serde_json::from_slice(bytes)?)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
