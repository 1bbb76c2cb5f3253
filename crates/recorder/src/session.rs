//! Collaborator seams between the recorder and a live browser session.
//!
//! The recorder never speaks the DevTools transport itself. A session
//! hands it decoded events one at a time and answers body requests; the
//! bundled [`RecordedSession`](crate::recorded::RecordedSession) plays a
//! saved capture back through the same traits.

use crate::cdp::{BrowserEvent, RequestId};
use async_trait::async_trait;
use erpeto_core::BrowserError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An ordered source of browser events.
#[async_trait]
pub trait EventSource: Send {
    /// The next event, or `None` once the stream is closed.
    async fn next_event(&mut self) -> Option<BrowserEvent>;
}

/// One-shot body retrieval, keyed by request id.
#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn response_body(&self, request_id: &RequestId) -> Result<ResponseBody, BrowserError>;
}

/// A body as returned by `Network.getResponseBody`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub body: String,

    #[serde(default)]
    pub base64_encoded: bool,
}

impl ResponseBody {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            base64_encoded: false,
        }
    }

    /// The raw bytes, decoding base64 when flagged.
    pub fn into_bytes(self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine as _;
        if self.base64_encoded {
            base64::engine::general_purpose::STANDARD.decode(self.body)
        } else {
            Ok(self.body.into_bytes())
        }
    }
}

/// Marker prefixed to console messages emitted by the page input listener,
/// so they can be told apart from the page's own logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn generate() -> Self {
        Self(format!("_erpeto_{}_", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Out-of-band request to stop collecting.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        // Nobody listening means nobody to stop
        let _ = self.0.send(true);
    }
}

/// Receiving half of a [`StopHandle`].
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop was requested. Pends forever if the handle was
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.0.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}
