//! Collection: grouping the live event stream into exchanges.
//!
//! Events are read one at a time under a deadline. Network events are
//! grouped by request id; when a load finishes, the body is fetched right
//! away, while the browser still holds it. Input captures logged by the
//! page listener are kept in arrival order between the exchanges.

use crate::cdp::{BrowserEvent, NetworkEvent, RequestId};
use crate::filter::UrlFilter;
use crate::session::{BodyFetcher, EventSource, SessionKey, StopSignal};
use erpeto_config::{RecorderConfig, TimeoutMode};
use erpeto_core::InputAction;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Every network event sharing one request id, plus the bodies retrieved
/// for it (one per finished load, `None` when retrieval failed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub request_id: RequestId,
    pub ignored: bool,
    pub events: Vec<NetworkEvent>,
    pub bodies: VecDeque<Option<Vec<u8>>>,
}

impl Exchange {
    pub fn new(request_id: impl Into<RequestId>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}

/// One unit of collected activity, in the order it first appeared.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Exchange(Exchange),
    Input(InputAction),
}

/// Drives an [`EventSource`] until it closes, times out or is stopped.
pub struct Collector<'a> {
    filter: &'a dyn UrlFilter,
    key: SessionKey,
    timeout: Duration,
    timeout_mode: TimeoutMode,
    collect_all: bool,
    stop: StopSignal,
}

impl<'a> Collector<'a> {
    pub fn new(config: &RecorderConfig, filter: &'a dyn UrlFilter, key: SessionKey) -> Self {
        Self {
            filter,
            key,
            timeout: config.timeout(),
            timeout_mode: config.timeout_mode,
            collect_all: config.collect_all,
            stop: StopSignal::never(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Collect until the stream is exhausted.
    ///
    /// Never fails: a missing body degrades its exchange to "no body".
    pub async fn collect(
        &mut self,
        source: &mut dyn EventSource,
        fetcher: &dyn BodyFetcher,
    ) -> Vec<Capture> {
        let mut captures: Vec<Capture> = Vec::new();
        let mut by_id: HashMap<RequestId, usize> = HashMap::new();

        let mut deadline = Instant::now() + self.timeout;
        let mut first_event_seen = false;
        let mut event_count = 0usize;

        loop {
            if self.stop.is_stopped() {
                info!("Collection stopped");
                break;
            }
            if Instant::now() >= deadline {
                debug!(timeout = ?self.timeout, "Deadline passed");
                break;
            }

            let event = tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    info!("Collection stopped");
                    break;
                }
                next = tokio::time::timeout_at(deadline, source.next_event()) => match next {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        debug!("Event stream closed");
                        break;
                    }
                    Err(_) => {
                        debug!(timeout = ?self.timeout, "No more events before the deadline");
                        break;
                    }
                },
            };

            event_count += 1;
            if !first_event_seen {
                first_event_seen = true;
                if self.timeout_mode == TimeoutMode::FromFirstEvent {
                    deadline = Instant::now() + self.timeout;
                }
            }

            match event {
                BrowserEvent::Console(console) => {
                    if let Some(input) = console.input_capture(self.key.as_str()) {
                        debug!(selector = %input.selector, "Input captured");
                        captures.push(Capture::Input(input));
                    }
                }
                BrowserEvent::Network(event) => {
                    self.on_network_event(event, &mut captures, &mut by_id, fetcher, deadline)
                        .await;
                }
            }
        }

        info!(
            events = event_count,
            captures = captures.len(),
            "Collection finished"
        );
        captures
    }

    async fn on_network_event(
        &mut self,
        event: NetworkEvent,
        captures: &mut Vec<Capture>,
        by_id: &mut HashMap<RequestId, usize>,
        fetcher: &dyn BodyFetcher,
        deadline: Instant,
    ) {
        let request_id = event.request_id().to_string();

        if let NetworkEvent::LoadingFinished(_) = event {
            match exchange_mut(captures, by_id, &request_id) {
                Some(exchange) if !exchange.ignored => {}
                _ => return,
            }
            // The fetch is bounded by the same deadline and stop signal as
            // the event stream
            let body = tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    debug!(request_id = %request_id, "Body fetch abandoned on stop");
                    None
                }
                fetched = tokio::time::timeout_at(deadline, fetch_body(fetcher, &request_id)) => {
                    fetched.unwrap_or_else(|_| {
                        warn!(request_id = %request_id, "Body fetch outlived the deadline");
                        None
                    })
                }
            };
            let Some(exchange) = exchange_mut(captures, by_id, &request_id) else {
                return;
            };
            exchange.events.push(event);
            exchange.bodies.push_back(body);
            return;
        }

        let index = *by_id.entry(request_id.clone()).or_insert_with(|| {
            captures.push(Capture::Exchange(Exchange::new(request_id.clone())));
            captures.len() - 1
        });
        let Some(Capture::Exchange(exchange)) = captures.get_mut(index) else {
            return;
        };

        let sent_url = match &event {
            NetworkEvent::RequestWillBeSent(sent) => Some(sent.request.url.clone()),
            _ => None,
        };
        match sent_url {
            Some(url) => {
                exchange.events.push(event);
                if !self.collect_all && self.filter.should_block(&url) {
                    debug!(request_id = %request_id, url = %url, "Exchange ignored");
                    exchange.ignored = true;
                }
            }
            None if exchange.ignored => {}
            None => exchange.events.push(event),
        }
    }
}

fn exchange_mut<'c>(
    captures: &'c mut [Capture],
    by_id: &HashMap<RequestId, usize>,
    request_id: &str,
) -> Option<&'c mut Exchange> {
    match captures.get_mut(*by_id.get(request_id)?) {
        Some(Capture::Exchange(exchange)) => Some(exchange),
        _ => None,
    }
}

async fn fetch_body(fetcher: &dyn BodyFetcher, request_id: &RequestId) -> Option<Vec<u8>> {
    match fetcher.response_body(request_id).await {
        Ok(body) => match body.into_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Response body is not valid base64");
                None
            }
        },
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Response body unavailable");
            None
        }
    }
}
