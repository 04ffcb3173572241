//! Transactional store for the Relaydeck record/replay proxy: sessions,
//! interactions, and ordered stream chunks, backed by SQLite via `sqlx`'s
//! runtime query builders (no `sqlx::migrate!`, no `query!` macros; see
//! [`schema`] for why).

pub mod error;
pub mod models;
pub mod pool;
pub mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use models::{Interaction, Session, StreamChunk};
pub use pool::{apply_schema, create_pool};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_common::{Protocol, RequestId, SessionId};
    use std::collections::HashMap;

    async fn test_store() -> Store {
        let pool = create_pool("sqlite::memory:").await.expect("open in-memory db");
        Store::new(pool)
    }

    fn sample_interaction(session_id: SessionId, endpoint: &str, request_id: &str) -> Interaction {
        Interaction::new_unrecorded(
            session_id,
            RequestId::from_string(request_id.to_string()),
            Protocol::Rest,
            "GET",
            endpoint,
            HashMap::new(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn get_or_create_session_is_idempotent() {
        let store = test_store().await;
        let a = store.get_or_create_session("demo", Some("first")).await.unwrap();
        let b = store.get_or_create_session("demo", Some("ignored-second-call")).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn get_session_distinguishes_not_found() {
        let store = test_store().await;
        let err = store.get_session("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn record_interaction_assigns_sequential_numbers_per_endpoint() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();

        let mut first = sample_interaction(session.id, "/v1/items", "req-1");
        store.record_interaction(&mut first).await.unwrap();
        assert_eq!(first.sequence_number, 1);

        let mut second = sample_interaction(session.id, "/v1/items", "req-2");
        store.record_interaction(&mut second).await.unwrap();
        assert_eq!(second.sequence_number, 2);

        // A different endpoint gets its own sequence space.
        let mut other_endpoint = sample_interaction(session.id, "/v1/other", "req-3");
        store.record_interaction(&mut other_endpoint).await.unwrap();
        assert_eq!(other_endpoint.sequence_number, 1);
    }

    #[tokio::test]
    async fn record_interaction_rejects_duplicate_request_id() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();

        let mut first = sample_interaction(session.id, "/v1/items", "dup");
        store.record_interaction(&mut first).await.unwrap();

        let mut second = sample_interaction(session.id, "/v1/items", "dup");
        let err = store.record_interaction(&mut second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRequestId(_)));
    }

    #[tokio::test]
    async fn concurrent_recordings_against_same_endpoint_serialize_sequence_numbers() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let session_id = session.id;
            handles.push(tokio::spawn(async move {
                let mut interaction = sample_interaction(session_id, "/v1/items", &format!("req-{i}"));
                store.record_interaction(&mut interaction).await.unwrap();
                interaction.sequence_number
            }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap());
        }
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn record_stream_chunks_empty_slice_is_a_noop() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();
        let mut interaction = sample_interaction(session.id, "/v1/stream", "req-1");
        store.record_interaction(&mut interaction).await.unwrap();

        store.record_stream_chunks(&[]).await.unwrap();
        let chunks = store.get_stream_chunks(interaction.id).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn stream_chunks_round_trip_in_order() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();
        let mut interaction = sample_interaction(session.id, "/v1/stream", "req-1");
        store.record_interaction(&mut interaction).await.unwrap();

        let chunks = vec![
            StreamChunk::new_unrecorded(interaction.id, 0, b"chunk-0".to_vec(), chrono::Utc::now(), 0),
            StreamChunk::new_unrecorded(interaction.id, 1, b"chunk-1".to_vec(), chrono::Utc::now(), 42),
        ];
        store.record_stream_chunks(&chunks).await.unwrap();

        let fetched = store.get_stream_chunks(interaction.id).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].chunk_index, 0);
        assert_eq!(fetched[1].time_delta_ms, 42);
    }

    #[tokio::test]
    async fn clear_session_cascades_to_interactions_and_chunks() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();
        let mut interaction = sample_interaction(session.id, "/v1/stream", "req-1");
        store.record_interaction(&mut interaction).await.unwrap();
        store
            .record_stream_chunks(&[StreamChunk::new_unrecorded(
                interaction.id,
                0,
                b"x".to_vec(),
                chrono::Utc::now(),
                0,
            )])
            .await
            .unwrap();

        store.clear_session("s1").await.unwrap();

        assert!(matches!(
            store.get_session("s1").await.unwrap_err(),
            StoreError::SessionNotFound(_)
        ));
        let chunks = store.get_stream_chunks(interaction.id).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn find_matching_interactions_orders_by_sequence() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();
        for i in 0..3 {
            let mut interaction = sample_interaction(session.id, "/v1/items", &format!("req-{i}"));
            store.record_interaction(&mut interaction).await.unwrap();
        }

        let matches = store
            .find_matching_interactions(session.id, "GET", "/v1/items")
            .await
            .unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].sequence_number < w[1].sequence_number));
    }

    #[tokio::test]
    async fn mark_interaction_as_partial_does_not_revert_the_row() {
        let store = test_store().await;
        let session = store.create_session("s1", None).await.unwrap();
        let mut interaction = sample_interaction(session.id, "/v1/stream", "req-1");
        store.record_interaction(&mut interaction).await.unwrap();

        store
            .mark_interaction_as_partial(interaction.id, vec![2, 3])
            .await
            .unwrap();

        let fetched = store.get_interaction(interaction.id).await.unwrap();
        assert_eq!(fetched.metadata["status"], "partial");
        assert_eq!(fetched.metadata["failed_chunks"], serde_json::json!([2, 3]));
    }

    #[tokio::test]
    async fn import_interactions_preserves_original_sequence_numbers() {
        let store = test_store().await;
        let mut interaction = sample_interaction(SessionId(0), "/v1/items", "imported-1");
        interaction.sequence_number = 7;
        interaction.timestamp = chrono::Utc::now();

        store
            .import_interactions("imported-session", vec![interaction])
            .await
            .unwrap();

        let session = store.get_session("imported-session").await.unwrap();
        let rows = store.get_interactions_by_session(session.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence_number, 7);
    }
}
