//! HTTP building blocks shared by every action: header maps and cookies.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// An ordered header map with case-insensitive lookup.
///
/// Names keep the casing they were first stored with; only comparisons
/// fold case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first header named `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace a header. An existing entry keeps its original name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Remove every header named `name`, returning the first removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.0.retain(|(key, value)| {
            if key.eq_ignore_ascii_case(name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

/// An HTTP cookie.
///
/// Equality only looks at `name` and `value`; the attributes are kept for
/// diagnostics and replay but never identify a cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samesite: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub httponly: Option<String>,
}

impl PartialEq for Cookie {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for Cookie {}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Parse one `Set-Cookie` style string: `name=value; attr=val; ...`.
    ///
    /// The value is percent-decoded. Unknown attributes are dropped.
    pub fn parse(data: &str) -> Self {
        let mut parts = data.split(';').map(str::trim);
        let (name, value) = parts
            .next()
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .unwrap_or(("", ""));
        let mut cookie = Cookie::new(name, percent_decode(value));

        for attribute in parts {
            let (key, val) = attribute.split_once('=').unwrap_or((attribute, ""));
            let val = Some(val.to_string());
            match key.to_ascii_lowercase().as_str() {
                "expires" => cookie.expires = val,
                "path" => cookie.path = val,
                "samesite" => cookie.samesite = val,
                "httponly" => cookie.httponly = val,
                _ => {}
            }
        }
        cookie
    }

    /// Split a request `Cookie:` header into its individual cookies.
    pub fn parse_request_header(header: &str) -> Vec<Cookie> {
        header
            .split(';')
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .map(Cookie::parse)
            .collect()
    }

    /// Parse a (possibly newline-joined) `Set-Cookie` header value.
    pub fn parse_set_cookie(header: &str) -> Vec<Cookie> {
        header
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Cookie::parse)
            .collect()
    }

    /// The `name -> value` projection used when sending the cookie.
    pub fn to_pair(&self) -> (&str, &str) {
        (&self.name, &self.value)
    }
}

/// Percent-decode a string, replacing invalid UTF-8 sequences.
pub fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("X-XSRF-Token", "abc");
        assert_eq!(headers.get("x-xsrf-token"), Some("abc"));
        assert!(headers.contains("X-XSRF-TOKEN"));
    }

    #[test]
    fn header_upsert_keeps_original_name() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/html");
        headers.insert("content-type", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().next(), Some(("Content-Type", "application/json")));
    }

    #[test]
    fn header_remove_drops_all_duplicates() {
        let mut headers: Headers = [("A", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(headers.remove("a"), Some("1".into()));
        assert!(!headers.contains("A"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn cookie_equality_ignores_metadata() {
        let mut a = Cookie::new("session1", "test23dsahj%3D");
        a.path = Some("test.com".into());
        a.samesite = Some("lax".into());
        assert_eq!(a, Cookie::new("session1", "test23dsahj%3D"));
        assert_eq!(a.to_pair(), ("session1", "test23dsahj%3D"));
    }

    #[test]
    fn parse_set_cookie_string() {
        let cookie = Cookie::parse(
            "XSRF-TOKEN=test12378; expires=Tue, 13 Feb 2024 13:25:32 GMT; Max-Age=7200; path=/; secure; samesite=lax",
        );
        assert_eq!(cookie.name, "XSRF-TOKEN");
        assert_eq!(cookie.value, "test12378");
        assert_eq!(cookie.expires.as_deref(), Some("Tue, 13 Feb 2024 13:25:32 GMT"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.samesite.as_deref(), Some("lax"));
        assert_eq!(cookie.httponly, None);
    }

    #[test]
    fn parse_cookie_decodes_value() {
        let cookie = Cookie::parse("token=a%2Bb%3D%3D");
        assert_eq!(cookie.value, "a+b==");
    }

    #[test]
    fn parse_request_cookie_header() {
        let cookies = Cookie::parse_request_header("test=a; B=c");
        assert_eq!(cookies, vec![Cookie::new("test", "a"), Cookie::new("B", "c")]);
    }

    #[test]
    fn parse_multi_line_set_cookie() {
        let cookies = Cookie::parse_set_cookie("a=1; path=/\nb=2; HttpOnly");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[1].name, "b");
        assert_eq!(cookies[1].httponly.as_deref(), Some(""));
    }
}
