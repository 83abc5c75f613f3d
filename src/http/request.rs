//! HTTP/1.1 request framing using the [`httparse`] crate.
//!
//! A [`Request`] is produced once its head and its `Content-Length` body are
//! fully buffered. Problems with the body framing do not fail the parse: they
//! are recorded on the request as a [`BodyError`] so that only routes which
//! actually consume a body report them.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Largest body we will buffer for a single request (8 MiB).
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Errors that prevent a request head from being understood at all.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A transport failure while accumulating the request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error("invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),

    #[error("unsupported Transfer-Encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("request body exceeds maximum allowed size of {max_bytes} bytes")]
    TooLarge { max_bytes: usize },
}

/// A framed HTTP/1.1 request: method, target, headers, and body outcome.
///
/// # Examples
///
/// ```
/// use jsonroute::http::Request;
///
/// let raw = b"POST /post?debug=1 HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"x\":5}";
/// let (request, consumed) = Request::parse(raw).unwrap();
///
/// assert_eq!(consumed, raw.len());
/// assert_eq!(request.path(), "/post");
/// assert_eq!(request.query_string(), Some("debug=1"));
/// assert_eq!(request.body().unwrap().as_ref(), b"{\"x\":5}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Result<Bytes, BodyError>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses one request from the front of `buf`.
    ///
    /// Returns the request and the number of bytes it occupied. When the body
    /// framing is unusable the request is still returned, carrying the
    /// [`BodyError`], and the whole buffer is reported as consumed since the
    /// message boundary is unknown.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head or the announced body is not fully buffered.
    /// - [`RequestError::Parse`] — the head is malformed.
    /// - [`RequestError::MissingField`] — method, target, or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let head_len = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(token) => token.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let (body, consumed) = match body_length(&header_map) {
            Ok(len) => {
                let end = head_len + len;
                if buf.len() < end {
                    return Err(RequestError::Incomplete);
                }
                (Ok(Bytes::copy_from_slice(&buf[head_len..end])), end)
            }
            Err(e) => (Err(e), buf.len()),
        };

        Ok((
            Self {
                method,
                path,
                query,
                version,
                headers: header_map,
                body,
            },
            consumed,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path with the query string removed. No other normalization is applied.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The buffered body, or the framing error that prevented buffering it.
    pub fn body(&self) -> Result<&Bytes, &BodyError> {
        self.body.as_ref()
    }

    /// Whether the body framing failed. The connection cannot be reused after such a request.
    pub fn has_body_error(&self) -> bool {
        self.body.is_err()
    }

    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 only with an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }
}

// Resolve how many body bytes follow the head. Only `Content-Length` framing is supported.
fn body_length(headers: &Headers) -> Result<usize, BodyError> {
    if let Some(te) = headers.get("transfer-encoding") {
        if !te.trim().eq_ignore_ascii_case("identity") {
            return Err(BodyError::UnsupportedTransferEncoding(te.to_owned()));
        }
    }

    let Some(raw) = headers.get("content-length") else {
        return Ok(0);
    };

    let len: usize = raw
        .trim()
        .parse()
        .map_err(|_| BodyError::InvalidContentLength(raw.to_owned()))?;

    if len > MAX_BODY_SIZE {
        return Err(BodyError::TooLarge {
            max_bytes: MAX_BODY_SIZE,
        });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert!(req.body().unwrap().is_empty());
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn query_string_is_split_from_path() {
        let raw = b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust&page=2"));
    }

    #[test]
    fn path_is_not_normalized() {
        let raw = b"GET /Users/ HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/Users/");
        assert_eq!(req.query_string(), None);
    }

    #[test]
    fn incomplete_head() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn incomplete_body_waits_for_more_bytes() {
        let raw = b"POST /post HTTP/1.1\r\nContent-Length: 10\r\n\r\n{\"a\":";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn pipelined_requests_consume_only_the_first() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}GET /b HTTP/1.1\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(req.body().unwrap().as_ref(), b"{}");
        let (next, _) = Request::parse(&raw[consumed..]).unwrap();
        assert_eq!(next.path(), "/b");
    }

    #[test]
    fn invalid_content_length_is_a_body_error() {
        let raw = b"POST /post HTTP/1.1\r\nContent-Length: ten\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(
            req.body().unwrap_err(),
            &BodyError::InvalidContentLength("ten".to_owned())
        );
        assert!(req.has_body_error());
    }

    #[test]
    fn chunked_body_is_a_body_error() {
        let raw = b"POST /post HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\n{}\r\n0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(matches!(
            req.body(),
            Err(BodyError::UnsupportedTransferEncoding(te)) if te == "chunked"
        ));
    }

    #[test]
    fn oversized_body_is_rejected_without_buffering() {
        let raw = format!(
            "POST /post HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        assert!(matches!(req.body(), Err(BodyError::TooLarge { .. })));
    }

    #[test]
    fn keep_alive_defaults() {
        let (http11, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(http11.is_keep_alive());
        let (http10, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!http10.is_keep_alive());
        let (closing, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!closing.is_keep_alive());
    }
}
