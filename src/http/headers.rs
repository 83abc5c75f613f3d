//! Ordered header list with case-insensitive lookup.

use std::fmt;

/// Header fields of a request or response, in wire order.
///
/// Names compare case-insensitively (RFC 9110 §5.1). Duplicates are kept;
/// lookups return the first occurrence, which is what the proxy headers used
/// for client resolution expect.
///
/// # Examples
///
/// ```
/// use jsonroute::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("X-Forwarded-For", "203.0.113.7");
///
/// assert_eq!(headers.get("x-forwarded-for"), Some("203.0.113.7"));
/// assert_eq!(
///     headers.first_of(&["cf-connecting-ip", "x-forwarded-for"]),
///     Some("203.0.113.7"),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field. Existing fields with the same name are left in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first name in `names` that is present and non-empty.
    ///
    /// Precedence follows the order of `names`, not the order on the wire.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("User-Agent", "curl/8.4.0");
        assert_eq!(h.get("user-agent"), Some("curl/8.4.0"));
        assert_eq!(h.get("USER-AGENT"), Some("curl/8.4.0"));
        assert!(h.contains("user-agent"));
        assert!(!h.contains("referer"));
    }

    #[test]
    fn first_of_respects_name_precedence() {
        let mut h = Headers::new();
        h.insert("X-Forwarded-For", "10.0.0.1");
        h.insert("CF-Connecting-IP", "198.51.100.4");
        assert_eq!(
            h.first_of(&["cf-connecting-ip", "x-forwarded-for"]),
            Some("198.51.100.4")
        );
    }

    #[test]
    fn first_of_skips_empty_values() {
        let mut h = Headers::new();
        h.insert("CF-IPCountry", "");
        h.insert("X-Country", "DE");
        assert_eq!(h.first_of(&["cf-ipcountry", "x-country"]), Some("DE"));
        assert_eq!(h.first_of(&["x-missing"]), None);
    }

    #[test]
    fn display_writes_wire_lines() {
        let mut h = Headers::with_capacity(2);
        h.insert("A", "1");
        h.insert("B", "2");
        assert_eq!(h.to_string(), "A: 1\r\nB: 2\r\n");
        assert_eq!(h.len(), 2);
    }
}
