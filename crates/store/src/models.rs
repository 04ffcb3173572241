//! Data model: Session, Interaction, StreamChunk.
//!
//! Mirrors the `sessions`/`interactions`/`stream_chunks` tables verbatim;
//! header maps are stored pre-serialized as the "key→joined-value" JSON
//! object described in the REST handler's contract, not as native HTTP
//! header types (that keeps this crate protocol-agnostic; gRPC metadata
//! uses the same shape).

use chrono::{DateTime, Utc};
use relaydeck_common::{InteractionId, Protocol, RequestId, SessionId, StreamChunkId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named container of interactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// One recorded or replayed request/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub protocol: Protocol,
    pub method: String,
    /// HTTP path, or gRPC full method `/package.Service/Method`.
    pub endpoint: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: Vec<u8>,
    /// HTTP status code, or gRPC numeric status code (OK = 0).
    pub response_status: i64,
    pub response_headers: HashMap<String, String>,
    /// Empty when `is_streaming` is true.
    pub response_body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// 1-based, unique per `(session, endpoint)`.
    pub sequence_number: i64,
    pub metadata: serde_json::Value,
    pub is_streaming: bool,
}

impl Interaction {
    /// Build a skeleton for a not-yet-persisted interaction. `id` and
    /// `sequence_number` are assigned by the store on `record_interaction`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_unrecorded(
        session_id: SessionId,
        request_id: RequestId,
        protocol: Protocol,
        method: impl Into<String>,
        endpoint: impl Into<String>,
        request_headers: HashMap<String, String>,
        request_body: Vec<u8>,
    ) -> Self {
        Self {
            id: InteractionId(0),
            session_id,
            request_id,
            protocol,
            method: method.into(),
            endpoint: endpoint.into(),
            request_headers,
            request_body,
            response_status: 0,
            response_headers: HashMap::new(),
            response_body: Vec::new(),
            timestamp: Utc::now(),
            sequence_number: 0,
            metadata: serde_json::json!({}),
            is_streaming: false,
        }
    }

    /// Mark this interaction's metadata as partially recorded: the atomic
    /// stream-chunk write failed after the interaction row itself was
    /// already persisted. `failed_chunks` names the indices that did not
    /// make it in (empty means "the whole batch rolled back, zero persisted").
    pub fn mark_partial(&mut self, failed_chunks: Vec<i64>) {
        self.metadata = serde_json::json!({
            "status": "partial",
            "failed_chunks": failed_chunks,
        });
    }
}

/// One timed frame of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: StreamChunkId,
    pub interaction_id: InteractionId,
    /// 0-based, strictly increasing per interaction.
    pub chunk_index: i64,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the previous chunk of this interaction (0 for the first).
    pub time_delta_ms: i64,
}

impl StreamChunk {
    pub fn new_unrecorded(
        interaction_id: InteractionId,
        chunk_index: i64,
        data: Vec<u8>,
        timestamp: DateTime<Utc>,
        time_delta_ms: i64,
    ) -> Self {
        Self {
            id: StreamChunkId(0),
            interaction_id,
            chunk_index,
            data,
            timestamp,
            time_delta_ms,
        }
    }
}

/// Serialize a multi-value header map the way the REST handler does: values
/// for a repeated header are joined with `", "`.
pub fn join_header_values(headers: &HashMap<String, Vec<String>>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), v.join(", ")))
        .collect()
}
