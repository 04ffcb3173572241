//! Mock Engine, gRPC path: looks a call up by `(session, method=full_method,
//! endpoint=full_method)` and returns the first recorded interaction, with
//! no sequence cursor (this spec's scope, see the HTTP mock counterpart in
//! [`crate::mock`] for the cursor-backed behavior).

use std::collections::HashMap;

use relaydeck_common::SessionId;
use relaydeck_store::Store;

pub struct GrpcMockRequest<'a> {
    pub full_method: &'a str,
}

pub enum GrpcMockOutcome {
    Recorded { status_code: i64, metadata: HashMap<String, String>, body: Vec<u8> },
    NotFound,
}

pub struct GrpcMockEngine {
    store: Store,
}

impl GrpcMockEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        session_id: SessionId,
        request: &GrpcMockRequest<'_>,
    ) -> Result<GrpcMockOutcome, relaydeck_store::StoreError> {
        let candidates = self
            .store
            .find_matching_interactions(session_id, request.full_method, request.full_method)
            .await?;

        match candidates.into_iter().next() {
            Some(interaction) => Ok(GrpcMockOutcome::Recorded {
                status_code: interaction.response_status,
                metadata: interaction.response_headers,
                body: interaction.response_body,
            }),
            None => Ok(GrpcMockOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_common::{Protocol, RequestId};
    use relaydeck_store::{create_pool, Interaction};

    async fn seeded_store() -> (Store, SessionId) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = Store::new(pool);
        let session = store.create_session("grpc-s1", None).await.unwrap();
        (store, session.id)
    }

    #[tokio::test]
    async fn returns_first_recorded_interaction_for_full_method() {
        let (store, session_id) = seeded_store().await;
        let mut interaction = Interaction::new_unrecorded(
            session_id,
            RequestId::new_grpc(),
            Protocol::Grpc,
            "/pkg.Svc/Get",
            "/pkg.Svc/Get",
            HashMap::new(),
            b"req".to_vec(),
        );
        interaction.response_status = 0;
        interaction.response_body = b"resp".to_vec();
        store.record_interaction(&mut interaction).await.unwrap();

        let engine = GrpcMockEngine::new(store);
        let request = GrpcMockRequest { full_method: "/pkg.Svc/Get" };
        match engine.handle(session_id, &request).await.unwrap() {
            GrpcMockOutcome::Recorded { status_code, body, .. } => {
                assert_eq!(status_code, 0);
                assert_eq!(body, b"resp");
            }
            GrpcMockOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn not_found_when_no_recording_exists_for_method() {
        let (store, session_id) = seeded_store().await;
        let engine = GrpcMockEngine::new(store);
        let request = GrpcMockRequest { full_method: "/pkg.Svc/Missing" };
        match engine.handle(session_id, &request).await.unwrap() {
            GrpcMockOutcome::NotFound => {}
            GrpcMockOutcome::Recorded { .. } => panic!("expected not-found"),
        }
    }
}
