//! Session export/import: the JSON document format described for the CLI's
//! `export`/`import` subcommands. Bodies that parse as JSON are embedded as
//! JSON values; everything else is embedded as a string.

use chrono::{DateTime, Utc};
use relaydeck_common::{InteractionId, Protocol, RequestId, SessionId};
use relaydeck_store::{Interaction, Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ExportImportError {
    #[error("invalid export document: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Append,
    Replace,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedSession {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::HashMap<String, String>>,
    pub body: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedInteraction {
    pub request_id: String,
    pub protocol: Protocol,
    pub method: String,
    pub endpoint: String,
    pub request: ExportedBody,
    pub response: ExportedResponse,
    pub timestamp: DateTime<Utc>,
    pub sequence_number: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedResponse {
    pub status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::HashMap<String, String>>,
    pub body: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: String,
    pub session: ExportedSession,
    pub interactions: Vec<ExportedInteraction>,
}

fn body_to_json(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn json_to_body(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.clone().into_bytes(),
        other => serde_json::to_vec(other).unwrap_or_default(),
    }
}

pub async fn export_session(store: &Store, session_name: &str) -> Result<ExportDocument, ExportImportError> {
    let session = store.get_session(session_name).await?;
    let interactions = store.get_interactions_by_session(session.id).await?;

    let exported_interactions = interactions
        .into_iter()
        .map(|interaction| ExportedInteraction {
            request_id: interaction.request_id.as_str().to_string(),
            protocol: interaction.protocol,
            method: interaction.method,
            endpoint: interaction.endpoint,
            request: ExportedBody {
                headers: Some(interaction.request_headers),
                body: body_to_json(&interaction.request_body),
            },
            response: ExportedResponse {
                status: interaction.response_status,
                headers: Some(interaction.response_headers),
                body: body_to_json(&interaction.response_body),
            },
            timestamp: interaction.timestamp,
            sequence_number: interaction.sequence_number,
        })
        .collect();

    Ok(ExportDocument {
        version: FORMAT_VERSION.to_string(),
        session: ExportedSession {
            name: session.name,
            created_at: session.created_at,
            description: session.description,
        },
        interactions: exported_interactions,
    })
}

fn validate_document(doc: &ExportDocument) -> Result<(), ExportImportError> {
    if doc.version.is_empty() {
        return Err(ExportImportError::InvalidDocument("version must be non-empty".to_string()));
    }
    if doc.session.name.is_empty() {
        return Err(ExportImportError::InvalidDocument("session.name must be non-empty".to_string()));
    }
    for (index, interaction) in doc.interactions.iter().enumerate() {
        if interaction.request_id.is_empty() || interaction.method.is_empty() || interaction.endpoint.is_empty() {
            return Err(ExportImportError::InvalidDocument(format!(
                "interaction at index {index} is missing request_id, method, or endpoint"
            )));
        }
    }
    Ok(())
}

pub async fn import_document(
    store: &Store,
    doc: &ExportDocument,
    strategy: MergeStrategy,
) -> Result<SessionId, ExportImportError> {
    validate_document(doc)?;

    if strategy == MergeStrategy::Replace {
        match store.clear_session(&doc.session.name).await {
            Ok(()) | Err(StoreError::SessionNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let session = store
        .get_or_create_session(&doc.session.name, doc.session.description.as_deref())
        .await?;

    let interactions: Vec<Interaction> = doc
        .interactions
        .iter()
        .map(|exported| Interaction {
            id: InteractionId(0),
            session_id: session.id,
            request_id: RequestId::from_string(exported.request_id.clone()),
            protocol: exported.protocol,
            method: exported.method.clone(),
            endpoint: exported.endpoint.clone(),
            request_headers: exported.request.headers.clone().unwrap_or_default(),
            request_body: json_to_body(&exported.request.body),
            response_status: exported.response.status,
            response_headers: exported.response.headers.clone().unwrap_or_default(),
            response_body: json_to_body(&exported.response.body),
            timestamp: exported.timestamp,
            sequence_number: exported.sequence_number,
            metadata: serde_json::json!({}),
            is_streaming: false,
        })
        .collect();

    store.import_interactions(&doc.session.name, interactions).await?;
    Ok(session.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_store::create_pool;
    use std::collections::HashMap;

    async fn test_store() -> Store {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        Store::new(pool)
    }

    #[tokio::test]
    async fn exports_json_and_non_json_bodies_appropriately() {
        let store = test_store().await;
        let session = store.create_session("export-me", None).await.unwrap();
        let mut interaction = Interaction::new_unrecorded(
            session.id,
            RequestId::new_rest(),
            Protocol::Rest,
            "GET",
            "/v1/items",
            HashMap::new(),
            Vec::new(),
        );
        interaction.response_status = 200;
        interaction.response_body = br#"{"ok":true}"#.to_vec();
        store.record_interaction(&mut interaction).await.unwrap();

        let doc = export_session(&store, "export-me").await.unwrap();
        assert_eq!(doc.interactions.len(), 1);
        assert_eq!(doc.interactions[0].response.body, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn import_validates_required_fields() {
        let store = test_store().await;
        let doc = ExportDocument {
            version: "".to_string(),
            session: ExportedSession { name: "x".to_string(), created_at: Utc::now(), description: None },
            interactions: Vec::new(),
        };
        let result = import_document(&store, &doc, MergeStrategy::Append).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn round_trips_through_export_and_import() {
        let store = test_store().await;
        let session = store.create_session("round-trip", None).await.unwrap();
        let mut interaction = Interaction::new_unrecorded(
            session.id,
            RequestId::new_rest(),
            Protocol::Rest,
            "GET",
            "/v1/items",
            HashMap::new(),
            Vec::new(),
        );
        interaction.response_status = 200;
        interaction.response_body = b"plain text".to_vec();
        store.record_interaction(&mut interaction).await.unwrap();

        let doc = export_session(&store, "round-trip").await.unwrap();
        let other_store = test_store().await;
        import_document(&other_store, &doc, MergeStrategy::Append).await.unwrap();

        let imported_session = other_store.get_session("round-trip").await.unwrap();
        let interactions = other_store.get_interactions_by_session(imported_session.id).await.unwrap();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].response_body, b"plain text");
    }
}
