//! Record Engine: forwards each request upstream, captures the
//! request/response pair (including timed SSE chunks), and persists it
//! under the route's session.

use std::collections::HashMap;
use std::time::Duration;

use relaydeck_common::{CircuitBreaker, CircuitBreakerConfig, Protocol, RequestId, SessionId};
use relaydeck_rest::sse::SseDecoder;
use relaydeck_store::{Interaction, Store, StreamChunk};
use reqwest::Client;
use thiserror::Error;

use crate::observer::{Observer, RequestEvent, ResponseEvent};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("upstream unreachable: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] relaydeck_store::StoreError),
    #[error("circuit breaker open for upstream; refusing to dial")]
    CircuitOpen,
}

/// One forwarded call, ready to be dispatched upstream.
pub struct LiveRequest {
    pub method: String,
    pub endpoint: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub remote_addr: Option<String>,
}

/// What the dispatcher gets back: the upstream response, ready to forward
/// to the client. `chunks` is populated only for a captured SSE stream, and
/// is empty/ignored for regular bodies.
pub struct RecordedResponse {
    pub status: i64,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub is_streaming: bool,
    pub chunks: Vec<StreamChunk>,
}

pub struct RecordEngine {
    store: Store,
    client: Client,
    session_id: SessionId,
    target_base_url: String,
    enable_streaming: bool,
    upstream_timeout: Duration,
    circuit_breaker: CircuitBreaker,
}

impl RecordEngine {
    pub fn new(store: Store, client: Client, session_id: SessionId, target_base_url: String, enable_streaming: bool) -> Self {
        Self {
            store,
            client,
            session_id,
            target_base_url,
            enable_streaming,
            upstream_timeout: Duration::from_secs(30),
            circuit_breaker: CircuitBreaker::with_name(CircuitBreakerConfig::default(), "record-engine-upstream"),
        }
    }

    fn upstream_url(&self, endpoint: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.target_base_url, endpoint, q),
            _ => format!("{}{}", self.target_base_url, endpoint),
        }
    }

    /// Execute `request` upstream, capture the exchange, persist it, and
    /// return what to forward to the client. Observer events are emitted
    /// around the upstream call when `observer` is attached.
    pub async fn handle(
        &self,
        request: LiveRequest,
        observer: &dyn Observer,
    ) -> Result<RecordedResponse, RecordError> {
        if !self.circuit_breaker.is_closed() {
            return Err(RecordError::CircuitOpen);
        }

        let request_id = RequestId::new_rest();
        observer.broadcast_request(RequestEvent {
            request_id: request_id.clone(),
            session_id: self.session_id,
            protocol: Protocol::Rest,
            method: request.method.clone(),
            endpoint: request.endpoint.clone(),
            remote_addr: request.remote_addr.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        let url = self.upstream_url(&request.endpoint, request.query.as_deref());
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, &url).timeout(self.upstream_timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.body(request.body.clone());

        let upstream_response = match builder.send().await {
            Ok(resp) => {
                self.circuit_breaker.record_success();
                resp
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                return Err(RecordError::Upstream(e));
            }
        };

        let status = upstream_response.status().as_u16() as i64;
        let response_headers = serialize_response_headers(upstream_response.headers());
        let is_sse = self.enable_streaming && response_is_sse(upstream_response.headers());

        let mut interaction = Interaction::new_unrecorded(
            self.session_id,
            request_id,
            Protocol::Rest,
            request.method.clone(),
            request.endpoint.clone(),
            request.headers,
            request.body,
        );
        interaction.response_status = status;
        interaction.response_headers = response_headers.clone();

        if is_sse {
            let chunks = self.capture_sse(upstream_response, &mut interaction).await?;
            observer.broadcast_response(ResponseEvent {
                request_id: interaction.request_id.clone(),
                status,
                headers: response_headers.clone(),
                body: Vec::new(),
                is_streaming: true,
            });
            Ok(RecordedResponse {
                status,
                headers: response_headers,
                body: Vec::new(),
                is_streaming: true,
                chunks,
            })
        } else {
            let body = upstream_response.bytes().await?.to_vec();
            interaction.response_body = body.clone();
            self.store.record_interaction(&mut interaction).await?;

            observer.broadcast_response(ResponseEvent {
                request_id: interaction.request_id.clone(),
                status,
                headers: response_headers.clone(),
                body: body.clone(),
                is_streaming: false,
            });

            Ok(RecordedResponse {
                status,
                headers: response_headers,
                body,
                is_streaming: false,
                chunks: Vec::new(),
            })
        }
    }

    /// Persist the interaction row up front with `is_streaming=true` and an
    /// empty body, then stream+buffer chunks, and finally batch-persist the
    /// buffer. On a failed batch write the interaction is marked partial
    /// rather than reverted. The client already received whatever arrived.
    async fn capture_sse(
        &self,
        upstream_response: reqwest::Response,
        interaction: &mut Interaction,
    ) -> Result<Vec<StreamChunk>, RecordError> {
        interaction.is_streaming = true;
        interaction.response_body = Vec::new();
        self.store.record_interaction(interaction).await?;

        let mut decoder = SseDecoder::new();
        let mut stream = upstream_response;
        let mut buffered = Vec::new();
        let mut index: i64 = 0;

        loop {
            match stream.chunk().await {
                Ok(Some(bytes)) => {
                    decoder.feed(&bytes);
                    while let Some(chunk) = decoder.next_chunk() {
                        buffered.push(StreamChunk::new_unrecorded(
                            interaction.id,
                            index,
                            chunk.raw.to_vec(),
                            chrono::Utc::now(),
                            chunk.time_delta_ms,
                        ));
                        index += 1;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Client/upstream disconnect mid-stream: not fatal, persist
                    // whatever chunks were captured so far.
                    break;
                }
            }
        }

        decoder.mark_eof();
        while let Some(chunk) = decoder.next_chunk() {
            buffered.push(StreamChunk::new_unrecorded(
                interaction.id,
                index,
                chunk.raw.to_vec(),
                chrono::Utc::now(),
                chunk.time_delta_ms,
            ));
            index += 1;
        }

        match self.store.record_stream_chunks(&buffered).await {
            Ok(()) => Ok(buffered),
            Err(e) => {
                tracing::warn!(error = %e, interaction_id = interaction.id.0, "atomic chunk write failed; marking interaction partial");
                self.store.mark_interaction_as_partial(interaction.id, Vec::new()).await?;
                Ok(Vec::new())
            }
        }
    }
}

fn response_is_sse(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

fn serialize_response_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers.iter() {
        let value = value.to_str().unwrap_or("").to_string();
        result.entry(name.as_str().to_string()).or_default().push(value);
    }
    result.into_iter().map(|(k, v)| (k, v.join(", "))).collect()
}
