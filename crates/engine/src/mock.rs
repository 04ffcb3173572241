//! Mock Engine: serves previously recorded responses without contacting
//! the upstream, matching live requests against recordings by method/
//! endpoint plus header/body equality or structural "fuzzy" equality.

use std::collections::HashMap;

use relaydeck_common::SessionId;
use relaydeck_rest::{matches, MatchCandidate, MatchStrategy, Redactor, SseChunk};
use relaydeck_store::{Interaction, Store, StreamChunk};

use crate::cursor::SequenceCursor;

#[derive(Debug, Clone)]
pub struct NotFoundResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// A live request shaped for matching and lookup.
pub struct MockRequest<'a> {
    pub method: &'a str,
    pub endpoint: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

/// What the mock engine hands back to the dispatcher: either a selected
/// recording (status/headers/body, plus chunks when streaming) or the
/// configured not-found response.
pub enum MockOutcome {
    Recorded {
        status: i64,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        chunks: Vec<StreamChunk>,
        respect_streaming_timing: bool,
    },
    NotFound(NotFoundResponse),
}

pub struct MockEngine {
    store: Store,
    redactor: Redactor,
    strategy: MatchStrategy,
    ignore_fields: Vec<String>,
    not_found: NotFoundResponse,
    respect_streaming_timing: bool,
    cursor: SequenceCursor,
}

impl MockEngine {
    pub fn new(
        store: Store,
        redactor: Redactor,
        strategy: MatchStrategy,
        ignore_fields: Vec<String>,
        not_found: NotFoundResponse,
        respect_streaming_timing: bool,
    ) -> Self {
        Self {
            store,
            redactor,
            strategy,
            ignore_fields,
            not_found,
            respect_streaming_timing,
            cursor: SequenceCursor::new(),
        }
    }

    /// `signature = "<method>:<path>:<redacted-headers-json>:<body-bytes>"`,
    /// used as the sequence cursor's key so repeated identical calls
    /// round-robin through their recorded candidates.
    fn signature(&self, request: &MockRequest) -> String {
        let redacted_headers = self.redactor.redact_headers(request.headers);
        let headers_json = serde_json::to_string(&redacted_headers).unwrap_or_default();
        format!(
            "{}:{}:{}:{}",
            request.method,
            request.endpoint,
            headers_json,
            String::from_utf8_lossy(request.body)
        )
    }

    pub async fn handle(
        &self,
        session_id: SessionId,
        request: &MockRequest<'_>,
    ) -> Result<MockOutcome, relaydeck_store::StoreError> {
        let candidates = self
            .store
            .find_matching_interactions(session_id, request.method, request.endpoint)
            .await?;

        let fine_matched = self.fine_match(&candidates, request);
        if fine_matched.is_empty() {
            return Ok(MockOutcome::NotFound(self.not_found.clone()));
        }

        let sequence_numbers: Vec<i64> = fine_matched.iter().map(|i| i.sequence_number).collect();
        let signature = self.signature(request);
        let selected_seq = self
            .cursor
            .select(&signature, &sequence_numbers)
            .expect("fine_matched is non-empty");

        let selected = fine_matched
            .into_iter()
            .find(|i| i.sequence_number == selected_seq)
            .expect("selected sequence number came from this candidate set");

        let chunks = if selected.is_streaming {
            self.store.get_stream_chunks(selected.id).await?
        } else {
            Vec::new()
        };

        Ok(MockOutcome::Recorded {
            status: selected.response_status,
            headers: selected.response_headers,
            body: selected.response_body,
            chunks,
            respect_streaming_timing: self.respect_streaming_timing,
        })
    }

    fn fine_match(&self, candidates: &[Interaction], request: &MockRequest) -> Vec<Interaction> {
        let live = MatchCandidate {
            method: request.method,
            endpoint: request.endpoint,
            headers: request.headers,
            body: request.body,
        };

        let mut matched: Vec<Interaction> = candidates
            .iter()
            .filter(|recorded| {
                let recorded_candidate = MatchCandidate {
                    method: &recorded.method,
                    endpoint: &recorded.endpoint,
                    headers: &recorded.request_headers,
                    body: &recorded.request_body,
                };
                matches(self.strategy, &recorded_candidate, &live, &self.redactor, &self.ignore_fields)
            })
            .cloned()
            .collect();

        matched.sort_by_key(|i| i.sequence_number);
        matched
    }
}

/// Replay timed SSE chunks to a sink, honoring `respect_streaming_timing`.
pub async fn replay_chunks<W>(chunks: &[StreamChunk], respect_timing: bool, mut write: W)
where
    W: FnMut(&[u8]),
{
    for chunk in chunks {
        if respect_timing {
            relaydeck_rest::sse::sleep_for_chunk_timing(chunk.time_delta_ms).await;
        }
        write(&chunk.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_common::{Protocol, RequestId};
    use relaydeck_store::create_pool;

    async fn seeded_store() -> (Store, SessionId) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = Store::new(pool);
        let session = store.create_session("s1", None).await.unwrap();
        (store, session.id)
    }

    fn interaction(session_id: SessionId, request_id: &str, status: i64, body: &str) -> Interaction {
        let mut interaction = Interaction::new_unrecorded(
            session_id,
            RequestId::from_string(request_id.to_string()),
            Protocol::Rest,
            "GET",
            "/v1/items",
            HashMap::new(),
            Vec::new(),
        );
        interaction.response_status = status;
        interaction.response_body = body.as_bytes().to_vec();
        interaction
    }

    #[tokio::test]
    async fn round_robins_through_candidates_by_sequence() {
        let (store, session_id) = seeded_store().await;
        for (i, body) in ["a", "b", "c"].iter().enumerate() {
            let mut interaction = interaction(session_id, &format!("req-{i}"), 200, body);
            store.record_interaction(&mut interaction).await.unwrap();
        }

        let engine = MockEngine::new(
            store,
            Redactor::empty(),
            MatchStrategy::Exact,
            Vec::new(),
            NotFoundResponse { status: 404, body: b"{}".to_vec() },
            false,
        );

        let headers = HashMap::new();
        let request = MockRequest { method: "GET", endpoint: "/v1/items", headers: &headers, body: b"" };

        let mut bodies = Vec::new();
        for _ in 0..4 {
            match engine.handle(session_id, &request).await.unwrap() {
                MockOutcome::Recorded { body, .. } => bodies.push(String::from_utf8(body).unwrap()),
                MockOutcome::NotFound(_) => panic!("expected a match"),
            }
        }
        assert_eq!(bodies, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn returns_not_found_response_when_nothing_matches() {
        let (store, session_id) = seeded_store().await;
        let engine = MockEngine::new(
            store,
            Redactor::empty(),
            MatchStrategy::Exact,
            Vec::new(),
            NotFoundResponse { status: 404, body: b"{\"error\":\"no match\"}".to_vec() },
            false,
        );

        let headers = HashMap::new();
        let request = MockRequest { method: "GET", endpoint: "/v1/missing", headers: &headers, body: b"" };
        match engine.handle(session_id, &request).await.unwrap() {
            MockOutcome::NotFound(nf) => assert_eq!(nf.status, 404),
            MockOutcome::Recorded { .. } => panic!("expected not-found"),
        }
    }
}
