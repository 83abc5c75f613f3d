//! Async TCP server using Tokio.
//!
//! Collects routes, binds a listener, and feeds every framed HTTP/1.1 request
//! to a shared [`Dispatcher`]. Connections are persistent (keep-alive) unless
//! the client asks otherwise or the request body could not be framed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::Environment;
use crate::context::RequestContext;
use crate::dispatcher::{Dispatcher, Responder};
use crate::http::request::MAX_BODY_SIZE;
use crate::http::{Request, RequestError, Response, StatusCode};
use crate::router::RouteTable;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Allowance for the request line and headers on top of the largest body.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum bytes buffered for a single request before the connection is dropped.
const MAX_REQUEST_SIZE: usize = MAX_HEAD_SIZE + MAX_BODY_SIZE;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Route registration plus listener setup.
///
/// # Examples
///
/// ```rust,no_run
/// use jsonroute::Server;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::new();
///     server.get("/", |_ctx, res| async move {
///         res.respond_json(&json!({ "message": "Welcome to my API" }));
///         Ok(())
///     });
///     server.post("/post", |ctx, res| async move {
///         res.respond_json(&json!({ "message": "Post request received", "data": ctx.body() }));
///         Ok(())
///     });
///
///     server
///         .listen(3000, "localhost", |addr| {
///             println!("Server is running at http://{addr}");
///         })
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    routes: RouteTable,
    environment: Environment,
}

impl Server {
    /// A server with no routes, configured from the process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::from_env())
    }

    pub fn with_environment(environment: Environment) -> Self {
        Self {
            routes: RouteTable::new(),
            environment,
        }
    }

    /// Registers a `GET` route at exactly `path`, replacing any route already there.
    pub fn get<H, F>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestContext, Responder) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.routes.get(path, handler);
        self
    }

    /// Registers a `POST` route at exactly `path`, replacing any route already there.
    pub fn post<H, F>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestContext, Responder) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.routes.post(path, handler);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Binds `host:port`, calls `on_ready` with the bound address, then serves forever.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound and
    /// [`ServerError::Io`] if the listener itself fails.
    pub async fn listen<F>(self, port: u16, host: &str, on_ready: F) -> Result<(), ServerError>
    where
        F: FnOnce(SocketAddr),
    {
        let listening = self.bind(format!("{host}:{port}")).await?;
        on_ready(listening.local_addr());
        listening.serve().await
    }

    /// Binds the listener without accepting yet. Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(self, addr: impl AsRef<str>) -> Result<Listening, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Listening {
            listener,
            local_addr,
            dispatcher: Arc::new(Dispatcher::new(self.routes, self.environment)),
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server whose route table is frozen.
#[derive(Debug)]
pub struct Listening {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
}

impl Listening {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the process ends, one Tokio task per connection.
    ///
    /// A failed `accept` is logged and skipped.
    pub async fn serve(self) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr,
            routes = self.dispatcher.routes().len(),
            environment = %self.dispatcher.environment(),
            "jsonroute listening"
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = Arc::clone(&self.dispatcher);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, dispatcher).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Serves one TCP connection, answering requests in order until it closes.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            if buf.is_empty() {
                debug!(peer = %peer_addr, "connection closed by peer");
            } else {
                warn!(
                    peer = %peer_addr,
                    buffered = buf.len(),
                    "connection closed mid-request, discarding partial request"
                );
            }
            return Ok(());
        }

        // Answer every complete request in the buffer; pipelined requests share one read.
        loop {
            let (request, consumed) = match Request::parse(&buf) {
                Ok(pair) => pair,
                Err(RequestError::Incomplete) => {
                    if buf.len() > MAX_REQUEST_SIZE {
                        warn!(peer = %peer_addr, "request head too large, closing");
                        let response = Response::new(StatusCode::BadRequest)
                            .body("Request head too large")
                            .keep_alive(false);
                        stream.write_all(&response.into_bytes()).await?;
                        return Ok(());
                    }
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "unparsable request, sending 400");
                    let response = Response::new(StatusCode::BadRequest)
                        .body(format!("Bad Request: {e}"))
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    return Ok(());
                }
            };
            buf.advance(consumed);

            let keep_alive = request.is_keep_alive() && !request.has_body_error();

            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let Some(response) = dispatcher.dispatch(request, peer_addr).await else {
                debug!(peer = %peer_addr, "no response written, closing");
                return Ok(());
            };

            stream
                .write_all(&response.keep_alive(keep_alive).into_bytes())
                .await?;
            stream.flush().await?;

            if !keep_alive {
                debug!(peer = %peer_addr, "connection not reusable, shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use serde_json::{Value, json};

    use super::*;

    async fn start(environment: Environment) -> SocketAddr {
        let mut server = Server::with_environment(environment);
        server
            .get("/", |_ctx, res| async move {
                res.respond_json(&json!({ "message": "Welcome to my API" }));
                Ok(())
            })
            .post("/post", |ctx, res| async move {
                res.respond_json(&json!({ "message": "Post request received", "data": ctx.body() }));
                Ok(())
            })
            .get("/whoami", |ctx, res| async move {
                res.respond_json(&json!({ "ip": ctx.ip(), "country": ctx.country() }));
                Ok(())
            })
            .get("/fail", |_ctx, _res| async move { bail!("boom") })
            .get("/silent", |_ctx, _res| async move { Ok(()) });

        let listening = server.bind("127.0.0.1:0").await.unwrap();
        let addr = listening.local_addr();
        tokio::spawn(listening.serve());
        addr
    }

    async fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn json_body(response: &str) -> Value {
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn get_root_over_tcp() {
        let addr = start(Environment::Development).await;
        let res = exchange(addr, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
        assert!(res.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(res.contains("Content-Type: application/json\r\n"));
        assert!(res.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(res.ends_with(r#"{"message":"Welcome to my API"}"#));
    }

    #[tokio::test]
    async fn post_echo_over_tcp() {
        let addr = start(Environment::Development).await;
        let res = exchange(
            addr,
            "POST /post HTTP/1.1\r\nContent-Length: 7\r\nConnection: close\r\n\r\n{\"x\":5}",
        )
        .await;
        assert!(res.ends_with(r#"{"message":"Post request received","data":{"x":5}}"#));
    }

    #[tokio::test]
    async fn body_split_across_writes_is_awaited() {
        let addr = start(Environment::Development).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /post HTTP/1.1\r\nContent-Length: 7\r\nConnection: close\r\n\r\n{\"x\"")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b":5}").await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(json_body(&out)["data"], json!({ "x": 5 }));
    }

    #[tokio::test]
    async fn preflight_over_tcp() {
        let addr = start(Environment::Development).await;
        let res = exchange(addr, "OPTIONS /anything HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(res.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(res.contains(
            "Access-Control-Allow-Methods: GET, POST, OPTIONS, PUT, PATCH, DELETE\r\n"
        ));
        assert!(res.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn error_envelopes_use_transport_200() {
        let addr = start(Environment::Production).await;
        let res = exchange(addr, "GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(res.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(json_body(&res), json!({ "status": 404, "message": "Not Found" }));

        let res = exchange(addr, "GET /fail HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert_eq!(
            json_body(&res),
            json!({ "status": 500, "message": "Internal server error", "error": "boom" })
        );
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let addr = start(Environment::Development).await;
        let res = exchange(
            addr,
            "GET / HTTP/1.1\r\n\r\nGET /missing HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(res.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(res.contains("Connection: keep-alive\r\n"));
        assert!(res.contains(r#"{"status":404,"message":"Not Found"}"#));
    }

    #[tokio::test]
    async fn proxy_headers_resolve_client() {
        let addr = start(Environment::Development).await;
        let res = exchange(
            addr,
            "GET /whoami HTTP/1.1\r\nCF-Connecting-IP: 198.51.100.1\r\nX-Country: NL\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(json_body(&res), json!({ "ip": "198.51.100.1", "country": "NL" }));

        let res = exchange(addr, "GET /whoami HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert_eq!(json_body(&res), json!({ "ip": "127.0.0.1", "country": "XX" }));
    }

    #[tokio::test]
    async fn unframeable_body_answers_then_closes() {
        let addr = start(Environment::Production).await;
        // No `Connection: close`: the body error alone must end the connection.
        let res = exchange(addr, "POST /post HTTP/1.1\r\nContent-Length: -1\r\n\r\n").await;
        assert!(res.contains("Connection: close\r\n"));
        let env = json_body(&res);
        assert_eq!(env["status"], 400);
        assert_eq!(env["message"], "Bad Request");
        assert!(env.get("stack").is_none());
    }

    #[tokio::test]
    async fn silent_handler_closes_connection() {
        let addr = start(Environment::Development).await;
        let res = exchange(addr, "GET /silent HTTP/1.1\r\n\r\n").await;
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn garbage_head_gets_plain_400() {
        let addr = start(Environment::Development).await;
        let res = exchange(addr, "NOT A REQUEST\r\n\r\n").await;
        assert!(res.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(res.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn bind_failure_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = Server::with_environment(Environment::Development)
            .bind(&addr)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { addr: ref a, .. } if *a == addr));
    }

    #[tokio::test]
    async fn listen_reports_ready_address() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let server = Server::with_environment(Environment::Development);
        tokio::spawn(server.listen(0, "127.0.0.1", move |addr| {
            let _ = tx.send(addr);
        }));
        let addr = rx.await.unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn default_reads_environment_like_new() {
        assert_eq!(Server::default().environment, Environment::from_env());
        assert_eq!(Server::default().environment, Server::new().environment);
    }
}
