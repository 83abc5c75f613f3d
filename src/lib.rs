//! # jsonroute
//!
//! A minimal async HTTP/1.1 router that answers in JSON.
//!
//! Routes are exact path strings bound to one method (`GET` or `POST`).
//! Every request goes through the same pipeline: CORS preflight short-circuit,
//! route lookup, method check, JSON body or query parsing, handler invocation.
//! Every outcome, failures included, becomes a JSON document shaped like
//! [`Envelope`](envelope::Envelope), sent with transport status `200`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jsonroute::Server;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new();
//!     server.get("/", |_ctx, res| async move {
//!         res.respond_json(&json!({ "message": "Welcome to my API" }));
//!         Ok(())
//!     });
//!     server
//!         .listen(3000, "127.0.0.1", |addr| println!("Listening on http://{addr}"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod http;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::Environment;
pub use context::{Query, QueryValue, RequestContext};
pub use dispatcher::{DispatchError, Dispatcher, Responder, ResponseWriter};
pub use envelope::Envelope;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{RouteMethod, RouteTable};
pub use server::{Listening, Server, ServerError};
