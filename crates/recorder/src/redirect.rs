//! Redirect expansion.
//!
//! A redirect hop shows up as a `requestWillBeSent` whose
//! `redirectResponse` carries the response of the previous hop. Before an
//! exchange is reassembled, that embedded response is lifted out into its
//! own `responseReceived` event, emitted ahead of the request event. When
//! the browser announced extra-info siblings for the redirect, the request
//! event is held back until both siblings went by, so they attach to the
//! hop they describe.

use crate::cdp::{NetworkEvent, ResponseReceived};

#[derive(Debug, Default)]
struct Waiting {
    request_extra: bool,
    response_extra: bool,
}

impl Waiting {
    fn any(&self) -> bool {
        self.request_extra || self.response_extra
    }
}

/// Expand every embedded redirect response of one exchange.
pub fn expand_redirects(events: Vec<NetworkEvent>) -> Vec<NetworkEvent> {
    let mut expanded = Vec::with_capacity(events.len());
    let mut held: Vec<NetworkEvent> = Vec::new();
    let mut waiting = Waiting::default();

    for event in events {
        if waiting.any() {
            // A sibling nobody waits for any more belongs to the next hop
            let unexpected = match &event {
                NetworkEvent::RequestExtraInfo(_) => !waiting.request_extra,
                NetworkEvent::ResponseExtraInfo(_) => !waiting.response_extra,
                _ => false,
            };
            if unexpected {
                waiting = Waiting::default();
                expanded.append(&mut held);
            }
            match &event {
                NetworkEvent::RequestExtraInfo(_) => waiting.request_extra = false,
                NetworkEvent::ResponseExtraInfo(_) => waiting.response_extra = false,
                _ => {}
            }
            expanded.push(event);
            continue;
        }

        expanded.append(&mut held);

        let NetworkEvent::RequestWillBeSent(mut sent) = event else {
            expanded.push(event);
            continue;
        };

        match sent.redirect_response.take() {
            None => expanded.push(NetworkEvent::RequestWillBeSent(sent)),
            Some(response) => {
                if sent.redirect_has_extra_info {
                    waiting = Waiting {
                        request_extra: true,
                        response_extra: true,
                    };
                }
                expanded.push(NetworkEvent::ResponseReceived(ResponseReceived {
                    request_id: sent.request_id.clone(),
                    response,
                    has_extra_info: sent.redirect_has_extra_info,
                    kind: sent.kind.clone(),
                }));
                sent.redirect_has_extra_info = false;
                held.push(NetworkEvent::RequestWillBeSent(sent));
            }
        }
    }

    expanded.append(&mut held);
    expanded
}
