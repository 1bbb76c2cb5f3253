//! Chrome DevTools Protocol events, as received from the browser.
//!
//! Only the handful of `Network.*` and `Runtime.*` notifications the
//! recorder reacts to are decoded; every other method is skipped.

use erpeto_core::{DecodeError, InputAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CDP request identifier, shared by every event of one exchange.
pub type RequestId = String;

/// Raw CDP header object. Values are always strings on the wire.
pub type CdpHeaders = BTreeMap<String, String>;

/// A decoded browser notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrowserEvent {
    Network(NetworkEvent),
    Console(ConsoleEvent),
}

/// The network events an exchange is reassembled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkEvent {
    #[serde(rename = "Network.requestWillBeSent")]
    RequestWillBeSent(RequestWillBeSent),

    #[serde(rename = "Network.requestWillBeSentExtraInfo")]
    RequestExtraInfo(RequestExtraInfo),

    #[serde(rename = "Network.responseReceived")]
    ResponseReceived(ResponseReceived),

    #[serde(rename = "Network.responseReceivedExtraInfo")]
    ResponseExtraInfo(ResponseExtraInfo),

    #[serde(rename = "Network.loadingFinished")]
    LoadingFinished(LoadingFinished),
}

impl NetworkEvent {
    pub fn request_id(&self) -> &str {
        match self {
            NetworkEvent::RequestWillBeSent(e) => &e.request_id,
            NetworkEvent::RequestExtraInfo(e) => &e.request_id,
            NetworkEvent::ResponseReceived(e) => &e.request_id,
            NetworkEvent::ResponseExtraInfo(e) => &e.request_id,
            NetworkEvent::LoadingFinished(e) => &e.request_id,
        }
    }

    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            NetworkEvent::RequestWillBeSent(_) => "request-sent",
            NetworkEvent::RequestExtraInfo(_) => "request-extra",
            NetworkEvent::ResponseReceived(_) => "response-received",
            NetworkEvent::ResponseExtraInfo(_) => "response-extra",
            NetworkEvent::LoadingFinished(_) => "loading-finished",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpRequest {
    pub url: String,
    pub method: String,

    #[serde(default)]
    pub headers: CdpHeaders,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,

    #[serde(default)]
    pub has_post_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpResponse {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub status: u16,

    #[serde(default)]
    pub headers: CdpHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: RequestId,
    pub request: CdpRequest,

    /// Response of the previous hop when this request follows a redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_response: Option<CdpResponse>,

    #[serde(default)]
    pub redirect_has_extra_info: bool,

    /// Resource type ("Document", "XHR", ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestExtraInfo {
    pub request_id: RequestId,

    #[serde(default)]
    pub headers: CdpHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: RequestId,
    pub response: CdpResponse,

    #[serde(default)]
    pub has_extra_info: bool,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseExtraInfo {
    pub request_id: RequestId,

    #[serde(default)]
    pub headers: CdpHeaders,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: RequestId,

    #[serde(default)]
    pub encoded_data_length: f64,
}

/// A `Runtime.consoleAPICalled` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    /// Console call type ("log", "warning", ...)
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct InputCapture {
    event: String,
    selector: String,

    #[serde(default)]
    value: String,

    #[serde(default)]
    timestamp: f64,
}

impl ConsoleEvent {
    /// Decode an input capture logged by the page listener.
    ///
    /// Only `log` calls whose first argument starts with `key` belong to the
    /// recorder; of those, only `input` events become actions.
    pub fn input_capture(&self, key: &str) -> Option<InputAction> {
        if self.kind != "log" {
            return None;
        }
        let text = self.args.first()?.value.as_ref()?.as_str()?;
        let payload = text.strip_prefix(key)?;
        match serde_json::from_str::<InputCapture>(payload) {
            Ok(capture) if capture.event == "input" => Some(InputAction::new(
                capture.value,
                capture.selector,
                capture.timestamp,
            )),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed input capture in console log");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    method: Option<String>,

    #[serde(default)]
    params: serde_json::Value,
}

impl BrowserEvent {
    /// Decode one CDP notification (`{"method": ..., "params": {...}}`).
    ///
    /// Returns `Ok(None)` for methods the recorder does not handle.
    pub fn decode(raw: &serde_json::Value) -> Result<Option<BrowserEvent>, DecodeError> {
        let message = RawMessage::deserialize(raw).map_err(|e| DecodeError::Malformed {
            method: String::new(),
            reason: e.to_string(),
        })?;
        let method = message.method.ok_or(DecodeError::MissingMethod)?;

        let malformed = |e: serde_json::Error| DecodeError::Malformed {
            method: method.clone(),
            reason: e.to_string(),
        };

        match method.as_str() {
            "Runtime.consoleAPICalled" => serde_json::from_value(message.params)
                .map(|console| Some(BrowserEvent::Console(console)))
                .map_err(malformed),
            m if NETWORK_METHODS.contains(&m) => {
                let tagged = serde_json::json!({ "method": m, "params": message.params });
                serde_json::from_value(tagged)
                    .map(|event| Some(BrowserEvent::Network(event)))
                    .map_err(malformed)
            }
            _ => Ok(None),
        }
    }
}

const NETWORK_METHODS: [&str; 5] = [
    "Network.requestWillBeSent",
    "Network.requestWillBeSentExtraInfo",
    "Network.responseReceived",
    "Network.responseReceivedExtraInfo",
    "Network.loadingFinished",
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request_will_be_sent() {
        let raw = json!({
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": "1000.1",
                "type": "Document",
                "request": {
                    "url": "https://example.com/login",
                    "method": "POST",
                    "headers": {"Content-Type": "application/x-www-form-urlencoded"},
                    "postData": "user=a",
                    "hasPostData": true
                },
                "redirectHasExtraInfo": false
            }
        });
        let Some(BrowserEvent::Network(NetworkEvent::RequestWillBeSent(event))) =
            BrowserEvent::decode(&raw).unwrap()
        else {
            panic!("unexpected decode result");
        };
        assert_eq!(event.request_id, "1000.1");
        assert_eq!(event.kind.as_deref(), Some("Document"));
        assert_eq!(event.request.post_data.as_deref(), Some("user=a"));
        assert!(event.redirect_response.is_none());
    }

    #[test]
    fn decodes_loading_finished() {
        let raw = json!({
            "method": "Network.loadingFinished",
            "params": {"requestId": "7", "encodedDataLength": 120.0, "timestamp": 1.5}
        });
        let event = BrowserEvent::decode(&raw).unwrap().unwrap();
        match event {
            BrowserEvent::Network(network) => {
                assert_eq!(network.request_id(), "7");
                assert_eq!(network.label(), "loading-finished");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unhandled_methods_are_skipped() {
        let raw = json!({"method": "Network.dataReceived", "params": {"requestId": "1"}});
        assert_eq!(BrowserEvent::decode(&raw).unwrap(), None);
        let raw = json!({"method": "Page.frameNavigated", "params": {}});
        assert_eq!(BrowserEvent::decode(&raw).unwrap(), None);
    }

    #[test]
    fn missing_method_is_an_error() {
        let raw = json!({"id": 4, "result": {}});
        assert_eq!(BrowserEvent::decode(&raw), Err(DecodeError::MissingMethod));
    }

    #[test]
    fn malformed_params_are_an_error() {
        let raw = json!({"method": "Network.responseReceived", "params": {"requestId": 3}});
        assert!(matches!(
            BrowserEvent::decode(&raw),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn console_input_capture_requires_key() {
        let console = ConsoleEvent {
            kind: "log".into(),
            args: vec![RemoteObject {
                kind: "string".into(),
                value: Some(json!(
                    r#"_k_{"event":"input","timestamp":12.5,"selector":"input#q","value":"hello"}"#
                )),
            }],
        };
        let input = console.input_capture("_k_").unwrap();
        assert_eq!(input.text, "hello");
        assert_eq!(input.selector, "input#q");
        assert_eq!(input.timestamp, 12.5);
        assert!(console.input_capture("_other_").is_none());
    }

    #[test]
    fn console_clicks_are_ignored() {
        let console = ConsoleEvent {
            kind: "log".into(),
            args: vec![RemoteObject {
                kind: "string".into(),
                value: Some(json!(r#"_k_{"event":"click","timestamp":1,"selector":"a"}"#)),
            }],
        };
        assert!(console.input_capture("_k_").is_none());
    }
}
