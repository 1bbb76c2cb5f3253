//! Offline playback of a saved capture.
//!
//! A recording is a JSON document holding the raw CDP notifications in
//! arrival order, the bodies the browser returned for them and the session
//! key the page listener used:
//!
//! ```json
//! {
//!   "key": "_erpeto_3f2a..._",
//!   "events": [{"method": "Network.requestWillBeSent", "params": {...}}],
//!   "bodies": {"1000.1": {"body": "<html>...", "base64Encoded": false}}
//! }
//! ```

use crate::cdp::{BrowserEvent, RequestId};
use crate::session::{BodyFetcher, EventSource, ResponseBody, SessionKey};
use async_trait::async_trait;
use erpeto_core::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedSession {
    /// Prefix of console messages logged by the input listener
    #[serde(default)]
    pub key: String,

    /// Raw CDP notifications
    #[serde(default)]
    pub events: VecDeque<serde_json::Value>,

    /// Bodies by request id
    #[serde(default)]
    pub bodies: HashMap<RequestId, ResponseBody>,
}

impl RecordedSession {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey(self.key.clone())
    }
}

#[async_trait]
impl EventSource for RecordedSession {
    async fn next_event(&mut self) -> Option<BrowserEvent> {
        while let Some(raw) = self.events.pop_front() {
            match BrowserEvent::decode(&raw) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(e) => warn!(error = %e, "Skipping undecodable event"),
            }
        }
        None
    }
}

#[async_trait]
impl BodyFetcher for RecordedSession {
    async fn response_body(&self, request_id: &RequestId) -> std::result::Result<ResponseBody, BrowserError> {
        self.bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| BrowserError::NoResource(request_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::NetworkEvent;
    use erpeto_core::Error;

    const RECORDING: &str = r#"{
        "key": "_k_",
        "events": [
            {"method": "Page.loadEventFired", "params": {}},
            {"params": {}},
            {"method": "Network.loadingFinished", "params": {"requestId": "9"}}
        ],
        "bodies": {"9": {"body": "aGk=", "base64Encoded": true}}
    }"#;

    #[tokio::test]
    async fn playback_skips_unknown_and_broken_events() {
        let mut session = RecordedSession::from_json(RECORDING).unwrap();
        let event = session.next_event().await.unwrap();
        assert!(matches!(
            event,
            BrowserEvent::Network(NetworkEvent::LoadingFinished(ref finished)) if finished.request_id == "9"
        ));
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn bodies_are_served_by_request_id() {
        let session = RecordedSession::from_json(RECORDING).unwrap();
        let body = session.response_body(&"9".to_string()).await.unwrap();
        assert_eq!(body.into_bytes().unwrap(), b"hi");
        assert_eq!(
            session.response_body(&"10".to_string()).await,
            Err(BrowserError::NoResource("10".into()))
        );
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, RECORDING).unwrap();
        let session = RecordedSession::load(&path).unwrap();
        assert_eq!(session.session_key().as_str(), "_k_");
        assert_eq!(session.events.len(), 3);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RecordedSession::load(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
