//! The response-writing capability handed to every handler.
//!
//! [`Responder::respond_json`] is the only way a handler produces output. It
//! renders the payload, wraps it in a `200` response with the CORS headers,
//! and hands it to a [`ResponseWriter`], the transport-facing half of the
//! capability. Only the first response written for a request is kept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::envelope::to_json_tree;
use crate::http::Response;

/// Written in place of a payload that could not be serialized.
pub const SERIALIZATION_FALLBACK: &[u8] =
    br#"{"status":500,"message":"response serialization failed"}"#;

/// Transport side of the response capability.
///
/// Implementors receive finished responses. The dispatcher uses
/// [`ResponseSlot`]; tests and alternative transports can supply their own.
pub trait ResponseWriter: Send + Sync {
    /// Delivers `response`. Returns `false` if a response was already
    /// delivered for this request, in which case `response` is discarded.
    fn write(&self, response: Response) -> bool;
}

/// Holds at most one response until the dispatcher collects it.
#[derive(Debug, Default)]
pub struct ResponseSlot {
    response: Mutex<Option<Response>>,
    written: AtomicBool,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the written response, if any. The slot stays closed to further writes.
    pub fn take(&self) -> Option<Response> {
        self.written.store(true, Ordering::Release);
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }
}

impl ResponseWriter for ResponseSlot {
    fn write(&self, response: Response) -> bool {
        if self.written.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
        true
    }
}

// Request fields reported alongside every response.
#[derive(Debug)]
struct AccessFields {
    ip: String,
    method: String,
    path: String,
    user_agent: String,
    query: Option<String>,
}

// Query rendered as JSON for log lines.
pub(crate) fn query_field(ctx: &RequestContext) -> Option<String> {
    ctx.query().and_then(|q| serde_json::to_string(q).ok())
}

/// Writes the JSON response for one request.
///
/// Cloning is cheap; every clone writes to the same destination.
#[derive(Clone)]
pub struct Responder {
    writer: Arc<dyn ResponseWriter>,
    fields: Arc<AccessFields>,
}

impl Responder {
    /// Binds a responder to `writer`, capturing the request fields used for logging.
    pub fn new(writer: Arc<dyn ResponseWriter>, ctx: &RequestContext) -> Self {
        let fields = AccessFields {
            ip: ctx.ip().to_owned(),
            method: ctx.method().to_string(),
            path: ctx.path_name().to_owned(),
            user_agent: ctx.user_agent().unwrap_or("-").to_owned(),
            query: query_field(ctx),
        };
        Self {
            writer,
            fields: Arc::new(fields),
        }
    }

    /// Serializes `data` as JSON and sends it with transport status `200`.
    ///
    /// Object keys whose value is `null` are left out. The `status` inside
    /// `data` is not reflected on the status line. Failures never reach the
    /// caller: a payload that cannot be serialized is replaced by
    /// [`SERIALIZATION_FALLBACK`], and a second write for the same request is
    /// dropped. Both are logged.
    pub fn respond_json<T>(&self, data: &T)
    where
        T: Serialize + ?Sized,
    {
        let f = &self.fields;

        let rendered = to_json_tree(data).and_then(|tree| {
            let status = tree.get("status").and_then(Value::as_u64);
            serde_json::to_vec(&tree).map(|body| (status, body))
        });

        let (status, body) = match rendered {
            Ok(pair) => pair,
            Err(e) => {
                error!(
                    method = %f.method,
                    path = %f.path,
                    error = %e,
                    "cannot serialize response, sending fallback"
                );
                (Some(500), SERIALIZATION_FALLBACK.to_vec())
            }
        };

        if !self.writer.write(Response::json(body)) {
            warn!(
                method = %f.method,
                path = %f.path,
                "response already sent, dropping additional write"
            );
            return;
        }

        debug!(
            ip = %f.ip,
            method = %f.method,
            path = %f.path,
            user_agent = %f.user_agent,
            status,
            query = f.query.as_deref().unwrap_or("-"),
            "response sent"
        );
    }
}
