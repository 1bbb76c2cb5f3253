//! Partial actions built from single events, and how they merge.
//!
//! A request or response is spread over a primary event and an extra-info
//! sibling. Each event is turned into a fragment of the final action; the
//! fragments are folded together by [`Fragment::absorb`].

use crate::cdp::{CdpHeaders, CdpRequest, CdpResponse, RequestExtraInfo, ResponseExtraInfo};
use erpeto_core::{Cookie, Headers, RequestAction, ResponseAction};

/// An action that can take in the fields of another fragment of itself.
pub trait Fragment {
    /// Merge `other` into `self`. Headers and cookies are upserted, scalar
    /// fields overwritten when `other` carries them.
    fn absorb(&mut self, other: &Self);
}

/// Copy raw headers, dropping HTTP/2 pseudo-headers and splitting a
/// request `Cookie` header into cookies.
fn absorb_headers(raw: &CdpHeaders, headers: &mut Headers, cookies: &mut Vec<Cookie>) {
    for (key, value) in raw {
        if key.starts_with(':') {
            continue;
        }
        if key.eq_ignore_ascii_case("cookie") {
            cookies.extend(Cookie::parse_request_header(value));
            continue;
        }
        headers.insert(key.as_str(), value.as_str());
    }
}

fn merge_headers(from: &Headers, into: &mut Headers) {
    for (key, value) in from.iter() {
        into.insert(key, value);
    }
}

fn merge_cookies(from: &[Cookie], into: &mut Vec<Cookie>) {
    for cookie in from {
        match into.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie.clone(),
            None => into.push(cookie.clone()),
        }
    }
}

pub fn request_from_event(request: &CdpRequest, kind: Option<&str>) -> RequestAction {
    let mut action = RequestAction::new(request.method.as_str(), request.url.as_str());
    action.kind = kind.map(str::to_owned);
    absorb_headers(&request.headers, &mut action.headers, &mut action.cookies);
    if request.has_post_data
        && let Some(data) = request.post_data.as_ref().filter(|d| !d.is_empty())
    {
        action.body = Some(data.as_bytes().to_vec());
    }
    action
}

pub fn request_from_extra(extra: &RequestExtraInfo) -> RequestAction {
    let mut action = RequestAction::default();
    absorb_headers(&extra.headers, &mut action.headers, &mut action.cookies);
    action
}

pub fn response_from_event(response: &CdpResponse) -> ResponseAction {
    let mut action = ResponseAction {
        url: (!response.url.is_empty()).then(|| response.url.clone()),
        status: (response.status != 0).then_some(response.status),
        ..ResponseAction::default()
    };
    absorb_headers(&response.headers, &mut action.headers, &mut action.cookies);
    action
}

pub fn response_from_extra(extra: &ResponseExtraInfo) -> ResponseAction {
    let mut action = ResponseAction {
        status: extra.status_code,
        ..ResponseAction::default()
    };
    absorb_headers(&extra.headers, &mut action.headers, &mut action.cookies);
    action
}

impl Fragment for RequestAction {
    fn absorb(&mut self, other: &Self) {
        merge_headers(&other.headers, &mut self.headers);
        merge_cookies(&other.cookies, &mut self.cookies);
        if !other.url.is_empty() {
            self.url = other.url.clone();
        }
        if !other.method.is_empty() {
            self.method = other.method.clone();
        }
        if other.body.is_some() {
            self.body = other.body.clone();
        }
    }
}

impl Fragment for ResponseAction {
    fn absorb(&mut self, other: &Self) {
        merge_headers(&other.headers, &mut self.headers);
        merge_cookies(&other.cookies, &mut self.cookies);
        if other.url.is_some() {
            self.url = other.url.clone();
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.body.is_some() {
            self.body = other.body.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> CdpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn pseudo_headers_are_dropped_and_cookies_split() {
        let extra = RequestExtraInfo {
            request_id: "1".into(),
            headers: headers(&[
                (":authority", "a.test"),
                (":method", "POST"),
                ("Cookie", "sid=abc; theme=dark"),
                ("X-Token", "t"),
            ]),
        };
        let action = request_from_extra(&extra);
        assert_eq!(action.headers.len(), 1);
        assert_eq!(action.headers.get("x-token"), Some("t"));
        assert_eq!(
            action.cookies,
            vec![Cookie::new("sid", "abc"), Cookie::new("theme", "dark")]
        );
    }

    #[test]
    fn post_data_becomes_body() {
        let request = CdpRequest {
            url: "https://a.test/login".into(),
            method: "POST".into(),
            post_data: Some("user=a".into()),
            has_post_data: true,
            ..CdpRequest::default()
        };
        let action = request_from_event(&request, Some("Document"));
        assert_eq!(action.body.as_deref(), Some(b"user=a".as_slice()));
        assert_eq!(action.kind.as_deref(), Some("Document"));
    }

    #[test]
    fn extra_fields_override_primary_ones() {
        let mut response = response_from_event(&CdpResponse {
            url: "https://a.test/".into(),
            status: 200,
            headers: headers(&[("Content-Type", "text/html")]),
        });
        let extra = response_from_extra(&ResponseExtraInfo {
            request_id: "1".into(),
            headers: headers(&[("content-type", "text/html; charset=utf-8"), ("Set-Cookie", "a=1")]),
            status_code: Some(302),
        });
        response.absorb(&extra);

        assert_eq!(response.status, Some(302));
        assert_eq!(response.url.as_deref(), Some("https://a.test/"));
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.headers.get("Content-Type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn absorbing_twice_does_not_duplicate_cookies() {
        let extra = request_from_extra(&RequestExtraInfo {
            request_id: "1".into(),
            headers: headers(&[("cookie", "sid=abc")]),
        });
        let mut request = RequestAction::new("GET", "https://a.test/");
        request.absorb(&extra);
        request.absorb(&extra);
        assert_eq!(request.cookies, vec![Cookie::new("sid", "abc")]);
    }

    #[test]
    fn request_absorb_keeps_body_when_other_has_none() {
        let mut request = RequestAction::new("POST", "https://a.test/");
        request.body = Some(b"x".to_vec());
        request.absorb(&RequestAction::default());
        assert_eq!(request.body.as_deref(), Some(b"x".as_slice()));
        assert_eq!(request.method, "POST");
    }
}
