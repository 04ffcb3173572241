use std::collections::HashMap;

use chrono::Utc;
use relaydeck_common::{InteractionId, Protocol, SessionId, StreamChunkId};
use sqlx::{Row, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::models::{Interaction, Session, StreamChunk};

/// Transactional data plane: sessions, interactions, ordered stream chunks.
///
/// Cheaply cloneable: wraps a `SqlitePool`, which is itself an `Arc` of
/// connections, so handlers can hold an owned `Store` per request.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_session(&self, name: &str, desc: Option<&str>) -> StoreResult<Session> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sessions (name, created_at, description) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(created_at.to_rfc3339())
        .bind(desc)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => Ok(Session {
                id: SessionId(r.last_insert_rowid()),
                name: name.to_string(),
                created_at,
                description: desc.map(str::to_string),
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateSessionName(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_session(&self, name: &str) -> StoreResult<Session> {
        let row = sqlx::query("SELECT id, name, created_at, description FROM sessions WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or_else(|| StoreError::SessionNotFound(name.to_string()))?;
        Ok(session_from_row(&row)?)
    }

    pub async fn get_or_create_session(&self, name: &str, desc: Option<&str>) -> StoreResult<Session> {
        match self.get_session(name).await {
            Ok(session) => Ok(session),
            Err(StoreError::SessionNotFound(_)) => self.create_session(name, desc).await,
            Err(e) => Err(e),
        }
    }

    pub async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query("SELECT id, name, created_at, description FROM sessions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// Assigns `sequence_number` (1-based, unique per `(session_id, endpoint)`)
    /// and `timestamp`, then inserts. The `max(seq) + 1` read and the insert
    /// run in the same transaction, so sqlite's writer serialization makes
    /// concurrent recordings against the same `(session, endpoint)` queue
    /// rather than race.
    pub async fn record_interaction(&self, interaction: &mut Interaction) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM interactions WHERE session_id = ? AND endpoint = ?",
        )
        .bind(interaction.session_id.0)
        .bind(&interaction.endpoint)
        .fetch_one(&mut *tx)
        .await?;

        let timestamp = Utc::now();
        let request_headers = serde_json::to_string(&interaction.request_headers)?;
        let response_headers = serde_json::to_string(&interaction.response_headers)?;
        let metadata = serde_json::to_string(&interaction.metadata)?;

        let result = sqlx::query(
            "INSERT INTO interactions (
                session_id, request_id, protocol, method, endpoint,
                request_headers, request_body, response_status, response_headers,
                response_body, timestamp, sequence_number, metadata, is_streaming
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(interaction.session_id.0)
        .bind(interaction.request_id.as_str())
        .bind(interaction.protocol.as_db_str())
        .bind(&interaction.method)
        .bind(&interaction.endpoint)
        .bind(request_headers)
        .bind(&interaction.request_body)
        .bind(interaction.response_status)
        .bind(response_headers)
        .bind(&interaction.response_body)
        .bind(timestamp.to_rfc3339())
        .bind(next_seq)
        .bind(metadata)
        .bind(interaction.is_streaming as i64)
        .execute(&mut *tx)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateRequestId(
                    interaction.request_id.as_str().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        interaction.id = InteractionId(result.last_insert_rowid());
        interaction.sequence_number = next_seq;
        interaction.timestamp = timestamp;
        Ok(())
    }

    pub async fn find_matching_interactions(
        &self,
        session_id: SessionId,
        method: &str,
        endpoint: &str,
    ) -> StoreResult<Vec<Interaction>> {
        let rows = sqlx::query(interaction_select_sql("WHERE session_id = ? AND method = ? AND endpoint = ? ORDER BY sequence_number ASC"))
            .bind(session_id.0)
            .bind(method)
            .bind(endpoint)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(interaction_from_row).collect()
    }

    pub async fn get_interactions_by_session(&self, session_id: SessionId) -> StoreResult<Vec<Interaction>> {
        let rows = sqlx::query(interaction_select_sql("WHERE session_id = ? ORDER BY sequence_number ASC"))
            .bind(session_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(interaction_from_row).collect()
    }

    pub async fn get_interaction(&self, interaction_id: InteractionId) -> StoreResult<Interaction> {
        let row = sqlx::query(interaction_select_sql("WHERE id = ?"))
            .bind(interaction_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or_else(|| StoreError::InteractionNotFound(interaction_id.0.to_string()))?;
        interaction_from_row(&row)
    }

    /// All-or-nothing. An empty slice is a no-op that succeeds without
    /// opening a transaction.
    pub async fn record_stream_chunks(&self, chunks: &[StreamChunk]) -> StoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO stream_chunks (interaction_id, chunk_index, data, timestamp, time_delta_ms)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chunk.interaction_id.0)
            .bind(chunk.chunk_index)
            .bind(&chunk.data)
            .bind(chunk.timestamp.to_rfc3339())
            .bind(chunk.time_delta_ms)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_stream_chunks(&self, interaction_id: InteractionId) -> StoreResult<Vec<StreamChunk>> {
        let rows = sqlx::query(
            "SELECT id, interaction_id, chunk_index, data, timestamp, time_delta_ms
             FROM stream_chunks WHERE interaction_id = ? ORDER BY chunk_index ASC",
        )
        .bind(interaction_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StreamChunk {
                    id: StreamChunkId(row.try_get("id")?),
                    interaction_id: InteractionId(row.try_get("interaction_id")?),
                    chunk_index: row.try_get("chunk_index")?,
                    data: row.try_get("data")?,
                    timestamp: parse_timestamp(row.try_get("timestamp")?)?,
                    time_delta_ms: row.try_get("time_delta_ms")?,
                })
            })
            .collect()
    }

    /// Annotate `metadata.status="partial"` / `failed_chunks=[...]` without
    /// reverting the already-committed interaction row.
    pub async fn mark_interaction_as_partial(
        &self,
        interaction_id: InteractionId,
        failed_chunks: Vec<i64>,
    ) -> StoreResult<()> {
        let metadata = serde_json::json!({
            "status": "partial",
            "failed_chunks": failed_chunks,
        });
        sqlx::query("UPDATE interactions SET metadata = ? WHERE id = ?")
            .bind(metadata.to_string())
            .bind(interaction_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_session(&self, name: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let session_id: Option<i64> = sqlx::query_scalar("SELECT id FROM sessions WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        let session_id = session_id.ok_or_else(|| StoreError::SessionNotFound(name.to_string()))?;

        sqlx::query(
            "DELETE FROM stream_chunks WHERE interaction_id IN (SELECT id FROM interactions WHERE session_id = ?)",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM interactions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn clear_all(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM stream_chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM interactions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sessions").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn import_interactions(&self, session_name: &str, interactions: Vec<Interaction>) -> StoreResult<()> {
        let session = self.get_or_create_session(session_name, None).await?;
        let mut tx = self.pool.begin().await?;
        for interaction in &interactions {
            insert_interaction_verbatim(&mut tx, session.id, interaction).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn import_interaction_with_chunks(
        &self,
        session_name: &str,
        interaction: Interaction,
        chunks: Vec<StreamChunk>,
    ) -> StoreResult<InteractionId> {
        let session = self.get_or_create_session(session_name, None).await?;
        let mut tx = self.pool.begin().await?;
        let id = insert_interaction_verbatim(&mut tx, session.id, &interaction).await?;

        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO stream_chunks (interaction_id, chunk_index, data, timestamp, time_delta_ms)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id.0)
            .bind(chunk.chunk_index)
            .bind(&chunk.data)
            .bind(chunk.timestamp.to_rfc3339())
            .bind(chunk.time_delta_ms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }
}

/// Insert an interaction keeping its original `request_id`, `sequence_number`
/// and `timestamp` (used by import, which replays a previously-recorded
/// sequence rather than assigning a fresh one).
async fn insert_interaction_verbatim(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: SessionId,
    interaction: &Interaction,
) -> StoreResult<InteractionId> {
    let request_headers = serde_json::to_string(&interaction.request_headers)?;
    let response_headers = serde_json::to_string(&interaction.response_headers)?;
    let metadata = serde_json::to_string(&interaction.metadata)?;

    let result = sqlx::query(
        "INSERT INTO interactions (
            session_id, request_id, protocol, method, endpoint,
            request_headers, request_body, response_status, response_headers,
            response_body, timestamp, sequence_number, metadata, is_streaming
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session_id.0)
    .bind(interaction.request_id.as_str())
    .bind(interaction.protocol.as_db_str())
    .bind(&interaction.method)
    .bind(&interaction.endpoint)
    .bind(request_headers)
    .bind(&interaction.request_body)
    .bind(interaction.response_status)
    .bind(response_headers)
    .bind(&interaction.response_body)
    .bind(interaction.timestamp.to_rfc3339())
    .bind(interaction.sequence_number)
    .bind(metadata)
    .bind(interaction.is_streaming as i64)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(r) => Ok(InteractionId(r.last_insert_rowid())),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            StoreError::InvalidImport(format!("duplicate request_id: {}", interaction.request_id)),
        ),
        Err(e) => Err(e.into()),
    }
}

fn interaction_select_sql(clause: &str) -> String {
    format!(
        "SELECT id, session_id, request_id, protocol, method, endpoint,
                request_headers, request_body, response_status, response_headers,
                response_body, timestamp, sequence_number, metadata, is_streaming
         FROM interactions {clause}"
    )
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Session> {
    Ok(Session {
        id: SessionId(row.try_get("id")?),
        name: row.try_get("name")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        description: row.try_get("description")?,
    })
}

fn interaction_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Interaction> {
    let request_headers_raw: String = row.try_get("request_headers")?;
    let response_headers_raw: String = row.try_get("response_headers")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let protocol_raw: String = row.try_get("protocol")?;
    let request_id_raw: String = row.try_get("request_id")?;

    Ok(Interaction {
        id: InteractionId(row.try_get("id")?),
        session_id: SessionId(row.try_get("session_id")?),
        request_id: relaydeck_common::RequestId::from_string(request_id_raw),
        protocol: Protocol::from_db_str(&protocol_raw)
            .ok_or_else(|| StoreError::InvalidImport(format!("unknown protocol in row: {protocol_raw}")))?,
        method: row.try_get("method")?,
        endpoint: row.try_get("endpoint")?,
        request_headers: serde_json::from_str::<HashMap<String, String>>(&request_headers_raw)?,
        request_body: row.try_get("request_body")?,
        response_status: row.try_get("response_status")?,
        response_headers: serde_json::from_str::<HashMap<String, String>>(&response_headers_raw)?,
        response_body: row.try_get("response_body")?,
        timestamp: parse_timestamp(row.try_get("timestamp")?)?,
        sequence_number: row.try_get("sequence_number")?,
        metadata: serde_json::from_str(&metadata_raw)?,
        is_streaming: row.try_get::<i64, _>("is_streaming")? != 0,
    })
}

fn parse_timestamp(raw: String) -> StoreResult<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidImport(format!("bad timestamp {raw:?}: {e}")))
}
