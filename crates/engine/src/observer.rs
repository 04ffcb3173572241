//! Observer: the web UI broadcaster this core treats as an external
//! collaborator. Engines emit events on a best-effort, non-blocking basis:
//! a slow or absent observer must never stall recording.

use std::collections::HashMap;

use relaydeck_common::{Protocol, RequestId, SessionId};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub protocol: Protocol,
    pub method: String,
    pub endpoint: String,
    pub remote_addr: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseEvent {
    pub request_id: RequestId,
    pub status: i64,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub is_streaming: bool,
}

/// Implemented by whatever wants to watch live traffic (the embedded web
/// UI's broadcaster, in the full system). Both methods take `&self` and must
/// not block the calling engine on a slow or disconnected subscriber.
pub trait Observer: Send + Sync {
    fn broadcast_request(&self, event: RequestEvent);
    fn broadcast_response(&self, event: ResponseEvent);
}

/// An observer that discards every event; the default when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn broadcast_request(&self, _event: RequestEvent) {}
    fn broadcast_response(&self, _event: ResponseEvent) {}
}

/// A non-blocking broadcaster backed by an unbounded channel. Events are
/// dropped (with a debug log) if no receiver has been taken yet, matching
/// the spec's "drop under backpressure rather than stall recording".
pub struct ChannelObserver {
    requests: tokio::sync::mpsc::UnboundedSender<RequestEvent>,
    responses: tokio::sync::mpsc::UnboundedSender<ResponseEvent>,
}

impl ChannelObserver {
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<RequestEvent>,
        tokio::sync::mpsc::UnboundedReceiver<ResponseEvent>,
    ) {
        let (req_tx, req_rx) = tokio::sync::mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                requests: req_tx,
                responses: resp_tx,
            },
            req_rx,
            resp_rx,
        )
    }
}

impl Observer for ChannelObserver {
    fn broadcast_request(&self, event: RequestEvent) {
        if self.requests.send(event).is_err() {
            tracing::debug!("no subscriber for request events; dropping");
        }
    }

    fn broadcast_response(&self, event: ResponseEvent) {
        if self.responses.send(event).is_err() {
            tracing::debug!("no subscriber for response events; dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_observer_delivers_events_to_receiver() {
        let (observer, mut req_rx, _resp_rx) = ChannelObserver::new();
        observer.broadcast_request(RequestEvent {
            request_id: RequestId::new_rest(),
            session_id: SessionId(1),
            protocol: Protocol::Rest,
            method: "GET".to_string(),
            endpoint: "/v1/items".to_string(),
            remote_addr: None,
            headers: HashMap::new(),
            body: Vec::new(),
        });

        let event = req_rx.try_recv().unwrap();
        assert_eq!(event.endpoint, "/v1/items");
    }

    #[test]
    fn null_observer_accepts_events_without_panicking() {
        let observer = NullObserver;
        observer.broadcast_request(RequestEvent {
            request_id: RequestId::new_rest(),
            session_id: SessionId(1),
            protocol: Protocol::Rest,
            method: "GET".to_string(),
            endpoint: "/v1/items".to_string(),
            remote_addr: None,
            headers: HashMap::new(),
            body: Vec::new(),
        });
    }
}
