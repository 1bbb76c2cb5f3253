//! The per-exchange reassembly state machine.
//!
//! Consumes the (redirect-expanded) events of one exchange in order and
//! emits finished actions whenever a hop is complete. Actions come out in
//! completion order, which is a valid replay order.

use crate::cdp::{NetworkEvent, RequestId};
use crate::fragment::{
    Fragment, request_from_event, request_from_extra, response_from_event, response_from_extra,
};
use erpeto_core::{Action, ReassemblyError, RequestAction, ResponseAction};
use std::collections::VecDeque;
use tracing::debug;

pub struct ExchangeAssembler {
    request_id: RequestId,
    request: Option<RequestAction>,
    request_extra: Option<RequestAction>,
    response: Option<ResponseAction>,
    response_extra: Option<ResponseAction>,
    bodies: VecDeque<Option<Vec<u8>>>,
    completed: Vec<Action>,
}

impl ExchangeAssembler {
    /// `bodies` holds one entry per `loadingFinished`, consumed in order.
    pub fn new(request_id: impl Into<RequestId>, bodies: VecDeque<Option<Vec<u8>>>) -> Self {
        Self {
            request_id: request_id.into(),
            request: None,
            request_extra: None,
            response: None,
            response_extra: None,
            bodies,
            completed: Vec::new(),
        }
    }

    /// Actions finished so far.
    pub fn completed(&self) -> &[Action] {
        &self.completed
    }

    /// Move the finished actions out.
    pub fn take_completed(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.completed)
    }

    /// Feed the next event.
    pub fn push(&mut self, event: &NetworkEvent) -> Result<(), ReassemblyError> {
        debug!(request_id = %self.request_id, event = event.label(), "Reassembly step");

        match event {
            NetworkEvent::RequestWillBeSent(sent) => {
                // A new hop closes the previous one
                if self.request.is_some() {
                    let has_response = self.response.is_some();
                    self.flush_request(has_response);
                    self.flush_response();
                    self.request_extra = None;
                }

                let mut request = request_from_event(&sent.request, sent.kind.as_deref());
                if let Some(extra) = &self.request_extra {
                    request.absorb(extra);
                }
                self.request = Some(request);
            }

            NetworkEvent::RequestExtraInfo(extra) => {
                if self.request_extra.is_some()
                    && self.request.is_some()
                    && self.response.is_some()
                {
                    self.flush_request(true);
                    self.flush_response();
                    self.request_extra = None;
                }
                if self.request_extra.is_some() {
                    return Err(ReassemblyError::DuplicateRequestExtra {
                        request_id: self.request_id.clone(),
                    });
                }

                let extra = request_from_extra(extra);
                if let Some(request) = &mut self.request {
                    request.absorb(&extra);
                }
                self.request_extra = Some(extra);
            }

            NetworkEvent::ResponseReceived(received) => {
                if self.response.is_some() {
                    return Err(ReassemblyError::ResponseAlreadyPending {
                        request_id: self.request_id.clone(),
                    });
                }

                let mut response = response_from_event(&received.response);
                // The extra-info sibling always wins over the primary event
                if let Some(extra) = self.response_extra.take() {
                    response.absorb(&extra);
                }
                self.response = Some(response);
            }

            NetworkEvent::ResponseExtraInfo(extra) => {
                let extra = response_from_extra(extra);
                if let Some(response) = &mut self.response {
                    response.absorb(&extra);
                } else if self.response_extra.is_none() {
                    self.response_extra = Some(extra);
                } else {
                    return Err(ReassemblyError::DuplicateResponseExtra {
                        request_id: self.request_id.clone(),
                    });
                }
            }

            NetworkEvent::LoadingFinished(_) => {
                if let Some(body) = self.bodies.pop_front().flatten() {
                    if let Some(response) = &mut self.response {
                        response.body = Some(body);
                    } else if let Some(extra) = &mut self.response_extra {
                        extra.body = Some(body);
                    } else {
                        return Err(ReassemblyError::OrphanBody {
                            request_id: self.request_id.clone(),
                        });
                    }
                }

                let has_response = self.response.is_some() || self.response_extra.is_some();
                self.flush_request(has_response);
                if self.response.is_some() {
                    self.flush_response();
                } else if let Some(extra) = self.response_extra.take() {
                    self.completed.push(Action::Response(extra));
                }
            }
        }
        Ok(())
    }

    /// Flush whatever is still pending at the end of the stream.
    pub fn finish(mut self) -> Vec<Action> {
        if let Some(mut request) = self.request.take() {
            request.has_response = self.response.is_some();
            if let Some(extra) = &self.request_extra {
                request.absorb(extra);
            }
            self.completed.push(Action::Request(request));
        }
        if let Some(mut response) = self.response.take() {
            if let Some(extra) = &self.response_extra {
                response.absorb(extra);
            }
            self.completed.push(Action::Response(response));
        }
        self.completed
    }

    fn flush_request(&mut self, has_response: bool) {
        if let Some(mut request) = self.request.take() {
            request.has_response = has_response;
            self.completed.push(Action::Request(request));
        }
    }

    fn flush_response(&mut self) {
        if let Some(response) = self.response.take() {
            self.completed.push(Action::Response(response));
        }
    }
}
