//! Actions: the units of browser activity a session is rebuilt from.
//!
//! Reassembly produces them in replay order; discovery later appends
//! [`Target`]s to the requests.

use crate::http::{Cookie, Headers};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// One unit of browser activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Text the user typed into a page element
    Input(InputAction),

    /// An HTTP request sent by the page
    Request(RequestAction),

    /// An HTTP response received by the page
    Response(ResponseAction),
}

impl Action {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Input(_) => "input",
            Action::Request(_) => "request",
            Action::Response(_) => "response",
        }
    }

    pub fn as_request(&self) -> Option<&RequestAction> {
        match self {
            Action::Request(request) => Some(request),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseAction> {
        match self {
            Action::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&InputAction> {
        match self {
            Action::Input(input) => Some(input),
            _ => None,
        }
    }

    /// Header lookup on HTTP actions (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Action::Request(request) => request.headers.get(name),
            Action::Response(response) => response.headers.get(name),
            Action::Input(_) => None,
        }
    }

    /// Cookie lookup by exact name.
    ///
    /// Responses also expose the cookies assigned through `Set-Cookie`.
    pub fn cookie_value(&self, name: &str) -> Option<String> {
        match self {
            Action::Request(request) => request
                .cookies
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.value.clone()),
            Action::Response(response) => response.cookie(name).map(|c| c.value),
            Action::Input(_) => None,
        }
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Action::Request(request) => request.body.as_deref(),
            Action::Response(response) => response.body.as_deref(),
            Action::Input(_) => None,
        }
    }
}

/// Text typed by the user into a page element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAction {
    /// The full value of the element after the edit
    pub text: String,

    /// CSS selector of the element, from the document root
    pub selector: String,

    /// Page timestamp of the event, in milliseconds
    pub timestamp: f64,
}

impl InputAction {
    pub fn new(text: impl Into<String>, selector: impl Into<String>, timestamp: f64) -> Self {
        Self {
            text: text.into(),
            selector: selector.into(),
            timestamp,
        }
    }
}

/// An HTTP request as observed in the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAction {
    pub method: String,
    pub url: String,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub cookies: Vec<Cookie>,

    #[serde(default, with = "body_encoding", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,

    /// Whether a response was observed for this request
    #[serde(default)]
    pub has_response: bool,

    /// Resource type reported by the browser (diagnostics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Dynamic fields discovered by the analyser
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

impl RequestAction {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    /// Insert a cookie, replacing the value of one with the same name.
    pub fn upsert_cookie(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.cookies.iter_mut().find(|c| c.name == name) {
            Some(cookie) => cookie.value = value,
            None => self.cookies.push(Cookie::new(name, value)),
        }
    }
}

/// An HTTP response as observed in the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub cookies: Vec<Cookie>,

    #[serde(default, with = "body_encoding", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl ResponseAction {
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    /// Find a cookie by name, first in the cookie list, then in `Set-Cookie`.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        if let Some(cookie) = self.cookies.iter().find(|c| c.name == name) {
            return Some(cookie.clone());
        }
        self.set_cookies().into_iter().find(|c| c.name == name)
    }

    /// Every cookie assigned by the `Set-Cookie` headers of this response.
    pub fn set_cookies(&self) -> Vec<Cookie> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case("set-cookie"))
            .flat_map(|(_, value)| Cookie::parse_set_cookie(value))
            .collect()
    }
}

/// Bodies travel as base64 so binary payloads survive JSON.
mod body_encoding {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
