//! Per-request context handed to route handlers.
//!
//! A [`RequestContext`] is built by the dispatcher for exactly one request and
//! dropped once that request has been answered. It exposes the derived fields
//! handlers care about:
//!
//! | Field       | Source                                                              |
//! |-------------|---------------------------------------------------------------------|
//! | `ip`        | `cf-connecting-ip`, else `x-forwarded-for`, else the peer address    |
//! | `country`   | `cf-ipcountry`, else `x-country`, else [`UNKNOWN_COUNTRY`]           |
//! | `path_name` | request path without the query string                               |
//! | `query`     | parsed query string, `GET` routes only                              |
//! | `body`      | parsed JSON body, `POST` routes only                                |

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::{Headers, Method, Request};

/// Headers consulted, in order, to resolve the client address.
const IP_HEADERS: [&str; 2] = ["cf-connecting-ip", "x-forwarded-for"];

/// Headers consulted, in order, to resolve the client region.
const COUNTRY_HEADERS: [&str; 2] = ["cf-ipcountry", "x-country"];

/// Region tag used when no region header is present.
pub const UNKNOWN_COUNTRY: &str = "XX";

/// A query parameter value: a single string, or every value of a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// The first value given for the key.
    pub fn first(&self) -> &str {
        match self {
            Self::Single(v) => v,
            Self::Multiple(vs) => vs.first().map_or("", String::as_str),
        }
    }

    /// Every value given for the key, in order of appearance.
    pub fn all(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Multiple(vec![first, value]);
            }
            Self::Multiple(vs) => vs.push(value),
        }
    }
}

/// Parsed query string.
///
/// # Examples
///
/// ```
/// use jsonroute::context::{Query, QueryValue};
///
/// let query = Query::parse("tag=a&tag=b&name=J%C3%BCrgen+M&flag");
/// assert_eq!(query.get_str("name"), Some("Jürgen M"));
/// assert_eq!(query.get_str("flag"), Some(""));
/// assert_eq!(
///     query.get("tag"),
///     Some(&QueryValue::Multiple(vec!["a".into(), "b".into()]))
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query {
    params: BTreeMap<String, QueryValue>,
}

impl Query {
    /// Parses `key=value&key2=value2`.
    ///
    /// `+` decodes to a space and `%XX` escapes are percent-decoded; a sequence
    /// that does not decode to UTF-8 is kept verbatim. A key without `=` maps to
    /// an empty string, empty pairs are skipped, and a repeated key collects
    /// its values into [`QueryValue::Multiple`].
    pub fn parse(raw: &str) -> Self {
        let mut params: BTreeMap<String, QueryValue> = BTreeMap::new();

        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            let value = decode_component(value);

            match params.get_mut(&key) {
                Some(existing) => existing.push(value),
                None => {
                    params.insert(key, QueryValue::Single(value));
                }
            }
        }

        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.params.get(key)
    }

    /// The first value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(QueryValue::first)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Everything a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path_name: String,
    headers: Headers,
    ip: String,
    country: String,
    query: Option<Query>,
    body: Option<Value>,
}

impl RequestContext {
    /// Derives the client identity and path from `request`. Query and body are
    /// attached later, depending on the route's method.
    pub fn from_request(request: &Request, peer: SocketAddr) -> Self {
        let headers = request.headers().clone();

        let ip = headers
            .first_of(&IP_HEADERS)
            .map_or_else(|| peer.ip().to_string(), str::to_owned);
        let country = headers
            .first_of(&COUNTRY_HEADERS)
            .unwrap_or(UNKNOWN_COUNTRY)
            .to_owned();

        Self {
            method: request.method().clone(),
            path_name: request.path().to_owned(),
            headers,
            ip,
            country,
            query: None,
            body: None,
        }
    }

    pub(crate) fn attach_query(&mut self, query: Query) {
        self.query = Some(query);
    }

    pub(crate) fn attach_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Resolved client address.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Resolved region tag, [`UNKNOWN_COUNTRY`] when no region header was sent.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Path without the query string.
    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent")
    }

    /// Query parameters. Present for `GET` routes only.
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Parsed JSON body. Present for `POST` routes only.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Deserializes the parsed body into `T`. A missing body deserializes from `null`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.body.clone().unwrap_or(Value::Null))
    }
}
