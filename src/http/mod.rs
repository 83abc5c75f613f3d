//! HTTP/1.1 wire primitives.
//!
//! This module provides the types the dispatcher reads from and writes to the
//! socket: [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].
//! None of them know anything about routes or envelopes.

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{BodyError, Request, RequestError};
pub use response::Response;

/// A transport-level HTTP status code.
///
/// Only the codes this crate actually puts on a status line are listed: JSON
/// responses always go out as `200`, preflights as `204`, and unparsable heads
/// as `400`. The application-level `status` inside a JSON envelope is a plain
/// `u16` and is independent of this type.
///
/// # Examples
///
/// ```
/// use jsonroute::http::StatusCode;
///
/// let status = StatusCode::NoContent;
/// assert_eq!(status.as_u16(), 204);
/// assert_eq!(status.canonical_reason(), "No Content");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    NoContent = 204,
    BadRequest = 400,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// The method token of an incoming request.
///
/// This is the open, wire-side view: anything a client sends is representable.
/// Routes are registered with the closed [`RouteMethod`](crate::router::RouteMethod)
/// instead.
///
/// # Examples
///
/// ```
/// use jsonroute::http::Method;
///
/// let method: Method = "OPTIONS".parse().unwrap();
/// assert_eq!(method, Method::Options);
/// assert!(method.is_preflight());
///
/// let other: Method = "PROPFIND".parse().unwrap();
/// assert_eq!(other.as_str(), "PROPFIND");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    /// Any other token, kept verbatim.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns `true` for a CORS preflight (`OPTIONS`), which skips routing entirely.
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Options)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            other => Self::Custom(other.to_owned()),
        })
    }
}
