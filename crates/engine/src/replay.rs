//! Replay Engine: re-issues a session's recorded requests against a live
//! target and validates each response against the recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use relaydeck_grpc::{RawCodec, RawMessage};
use relaydeck_store::Interaction;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    Exact,
    Fuzzy,
    StatusCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub request_id: String,
    pub endpoint: String,
    pub expected_status: i64,
    pub actual_status: Option<i64>,
    pub expected_body: Vec<u8>,
    pub actual_body: Vec<u8>,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub validation_error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReplayReport {
    pub session_name: String,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<ReplayResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
}

pub struct ReplayTarget {
    pub base_url: String,
}

/// A gRPC replay target: host and port of the upstream to dial.
pub struct GrpcReplayTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum GrpcReplayError {
    #[error("upstream channel error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub struct ReplayEngine {
    client: Client,
    strategy: ValidationStrategy,
    fail_fast: bool,
    max_concurrency: usize,
    ignore_timestamps: bool,
    timeout: Duration,
    grpc_max_message_size: usize,
}

impl ReplayEngine {
    pub fn new(
        client: Client,
        strategy: ValidationStrategy,
        fail_fast: bool,
        max_concurrency: usize,
        ignore_timestamps: bool,
        timeout: Duration,
        grpc_max_message_size: usize,
    ) -> Self {
        Self {
            client,
            strategy,
            fail_fast,
            max_concurrency,
            ignore_timestamps,
            timeout,
            grpc_max_message_size,
        }
    }

    pub async fn replay_session(
        &self,
        session_name: &str,
        target: &ReplayTarget,
        mut interactions: Vec<Interaction>,
    ) -> SessionReplayReport {
        interactions.sort_by_key(|i| i.timestamp);
        let start_time = Utc::now();
        let start = Instant::now();

        let results = if self.max_concurrency == 0 {
            self.replay_sequential(target, &interactions).await
        } else {
            self.replay_concurrent(target, interactions).await
        };

        let success_count = results.iter().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;

        SessionReplayReport {
            session_name: session_name.to_string(),
            total: results.len(),
            success_count,
            failure_count,
            results,
            start_time,
            end_time: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn replay_sequential(&self, target: &ReplayTarget, interactions: &[Interaction]) -> Vec<ReplayResult> {
        let mut results = Vec::with_capacity(interactions.len());
        let mut previous_timestamp: Option<DateTime<Utc>> = None;

        for interaction in interactions {
            if !self.ignore_timestamps {
                if let Some(prev) = previous_timestamp {
                    let gap = interaction.timestamp.signed_duration_since(prev);
                    if let Ok(gap) = gap.to_std() {
                        tokio::time::sleep(gap).await;
                    }
                }
            }
            previous_timestamp = Some(interaction.timestamp);

            let result = self.replay_one(target, interaction).await;
            let failed = !result.success;
            results.push(result);
            if failed && self.fail_fast {
                break;
            }
        }
        results
    }

    /// Spawns one task per interaction, but under `fail_fast` a shared flag
    /// stops new tasks from starting their call once any completed task has
    /// failed; already-spawned, in-flight calls are still awaited to
    /// completion rather than aborted.
    async fn replay_concurrent(&self, target: &ReplayTarget, interactions: Vec<Interaction>) -> Vec<ReplayResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let failed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut handles = Vec::with_capacity(interactions.len());

        for interaction in interactions {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let target_base_url = target.base_url.clone();
            let strategy = self.strategy;
            let timeout = self.timeout;
            let fail_fast = self.fail_fast;
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                if fail_fast && failed.load(std::sync::atomic::Ordering::Acquire) {
                    return None;
                }
                let result = replay_call(&client, &target_base_url, &interaction, strategy, timeout).await;
                if fail_fast && !result.success {
                    failed.store(true, std::sync::atomic::Ordering::Release);
                }
                Some(result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some(result)) = handle.await {
                results.push(result);
            }
        }
        results
    }

    async fn replay_one(&self, target: &ReplayTarget, interaction: &Interaction) -> ReplayResult {
        replay_call(&self.client, &target.base_url, interaction, self.strategy, self.timeout).await
    }

    /// Re-issues a session's gRPC interactions over one client connection
    /// held open for the whole session, using the raw codec and enlarged
    /// message-size limits. Validation compares numeric status codes only
    /// (OK = 0); body comparison does not apply to the opaque raw payload.
    pub async fn replay_grpc_session(
        &self,
        session_name: &str,
        target: &GrpcReplayTarget,
        mut interactions: Vec<Interaction>,
    ) -> Result<SessionReplayReport, GrpcReplayError> {
        interactions.sort_by_key(|i| i.timestamp);
        let start_time = Utc::now();
        let start = Instant::now();

        let endpoint = Endpoint::from_shared(format!("http://{}:{}", target.host, target.port))?;
        let channel = endpoint.connect().await?;

        let results = if self.max_concurrency == 0 {
            self.replay_grpc_sequential(channel, &interactions).await
        } else {
            self.replay_grpc_concurrent(channel, interactions).await
        };

        let success_count = results.iter().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;

        Ok(SessionReplayReport {
            session_name: session_name.to_string(),
            total: results.len(),
            success_count,
            failure_count,
            results,
            start_time,
            end_time: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn replay_grpc_sequential(&self, channel: Channel, interactions: &[Interaction]) -> Vec<ReplayResult> {
        let mut results = Vec::with_capacity(interactions.len());
        let mut previous_timestamp: Option<DateTime<Utc>> = None;

        for interaction in interactions {
            if !self.ignore_timestamps {
                if let Some(prev) = previous_timestamp {
                    let gap = interaction.timestamp.signed_duration_since(prev);
                    if let Ok(gap) = gap.to_std() {
                        tokio::time::sleep(gap).await;
                    }
                }
            }
            previous_timestamp = Some(interaction.timestamp);

            let result = grpc_replay_call(channel.clone(), interaction, self.grpc_max_message_size, self.timeout).await;
            let failed = !result.success;
            results.push(result);
            if failed && self.fail_fast {
                break;
            }
        }
        results
    }

    /// Mirrors [`ReplayEngine::replay_concurrent`]'s fail-fast gating: the
    /// same `Channel` (and thus the same underlying HTTP/2 connection) is
    /// cloned into every task rather than reconnecting per call.
    async fn replay_grpc_concurrent(&self, channel: Channel, interactions: Vec<Interaction>) -> Vec<ReplayResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let failed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut handles = Vec::with_capacity(interactions.len());

        for interaction in interactions {
            let semaphore = semaphore.clone();
            let channel = channel.clone();
            let max_message_size = self.grpc_max_message_size;
            let timeout = self.timeout;
            let fail_fast = self.fail_fast;
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                if fail_fast && failed.load(std::sync::atomic::Ordering::Acquire) {
                    return None;
                }
                let result = grpc_replay_call(channel, &interaction, max_message_size, timeout).await;
                if fail_fast && !result.success {
                    failed.store(true, std::sync::atomic::Ordering::Release);
                }
                Some(result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some(result)) = handle.await {
                results.push(result);
            }
        }
        results
    }
}

async fn grpc_replay_call(channel: Channel, interaction: &Interaction, max_message_size: usize, timeout: Duration) -> ReplayResult {
    let started = Instant::now();

    let mut client = tonic::client::Grpc::new(channel)
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);

    let call = async {
        client
            .ready()
            .await
            .map_err(|e| tonic::Status::unavailable(e.to_string()))?;

        let path = tonic::codegen::http::uri::PathAndQuery::try_from(interaction.endpoint.as_str())
            .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

        let mut request = tonic::Request::new(RawMessage::new(interaction.request_body.clone()));
        for (name, value) in &interaction.request_headers {
            if let (Ok(name), Ok(value)) = (
                tonic::metadata::MetadataKey::from_bytes(name.as_bytes()),
                tonic::metadata::MetadataValue::try_from(value.as_str()),
            ) {
                request.metadata_mut().insert(name, value);
            }
        }

        client.unary(request, path, RawCodec).await
    };

    let outcome = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(tonic::Status::deadline_exceeded("replay call timed out")),
    };

    let response_time_ms = started.elapsed().as_millis() as u64;

    let (actual_status, actual_body) = match outcome {
        Ok(response) => (0i64, response.into_inner().data.to_vec()),
        Err(status) => (status.code() as i64, Vec::new()),
    };
    let (success, validation_error) = validate_grpc(interaction.response_status, actual_status);

    ReplayResult {
        request_id: interaction.request_id.as_str().to_string(),
        endpoint: interaction.endpoint.clone(),
        expected_status: interaction.response_status,
        actual_status: Some(actual_status),
        expected_body: interaction.response_body.clone(),
        actual_body,
        response_time_ms,
        error: None,
        validation_error,
        success,
    }
}

/// gRPC replay validates numeric status codes only; the raw payload has no
/// schema to compare structurally the way `validate` compares REST bodies.
fn validate_grpc(expected_status: i64, actual_status: i64) -> (bool, Option<String>) {
    if expected_status == actual_status {
        (true, None)
    } else {
        (false, Some(format!("status mismatch: expected {expected_status}, got {actual_status}")))
    }
}

async fn replay_call(
    client: &Client,
    target_base_url: &str,
    interaction: &Interaction,
    strategy: ValidationStrategy,
    timeout: Duration,
) -> ReplayResult {
    let url = format!("{target_base_url}{}", interaction.endpoint);
    let method = reqwest::Method::from_bytes(interaction.method.as_bytes()).unwrap_or(reqwest::Method::GET);

    let mut builder = client.request(method, &url).timeout(timeout);
    for (name, value) in &interaction.request_headers {
        builder = builder.header(name, value);
    }
    builder = builder.body(interaction.request_body.clone());

    let started = Instant::now();
    let send_result = builder.send().await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    match send_result {
        Ok(response) => {
            let actual_status = response.status().as_u16() as i64;
            let actual_body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            let (success, validation_error) =
                validate(strategy, interaction.response_status, actual_status, &interaction.response_body, &actual_body);

            ReplayResult {
                request_id: interaction.request_id.as_str().to_string(),
                endpoint: interaction.endpoint.clone(),
                expected_status: interaction.response_status,
                actual_status: Some(actual_status),
                expected_body: interaction.response_body.clone(),
                actual_body,
                response_time_ms,
                error: None,
                validation_error,
                success,
            }
        }
        Err(e) => ReplayResult {
            request_id: interaction.request_id.as_str().to_string(),
            endpoint: interaction.endpoint.clone(),
            expected_status: interaction.response_status,
            actual_status: None,
            expected_body: interaction.response_body.clone(),
            actual_body: Vec::new(),
            response_time_ms,
            error: Some(e.to_string()),
            validation_error: None,
            success: false,
        },
    }
}

fn validate(
    strategy: ValidationStrategy,
    expected_status: i64,
    actual_status: i64,
    expected_body: &[u8],
    actual_body: &[u8],
) -> (bool, Option<String>) {
    if expected_status != actual_status {
        return (
            false,
            Some(format!("status mismatch: expected {expected_status}, got {actual_status}")),
        );
    }

    match strategy {
        ValidationStrategy::StatusCode => (true, None),
        ValidationStrategy::Exact => {
            if expected_body == actual_body {
                (true, None)
            } else {
                (false, Some("body mismatch".to_string()))
            }
        }
        ValidationStrategy::Fuzzy => {
            let expected_json = serde_json::from_slice::<Value>(expected_body);
            let actual_json = serde_json::from_slice::<Value>(actual_body);
            match (expected_json, actual_json) {
                (Ok(e), Ok(a)) if json_kind(&e) == json_kind(&a) => (true, None),
                (Ok(_), Ok(_)) => (false, Some("body top-level JSON kind mismatch".to_string())),
                _ => (true, None),
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_requires_status_and_body_equality() {
        let (success, _) = validate(ValidationStrategy::Exact, 200, 200, b"abc", b"abc");
        assert!(success);
        let (success, _) = validate(ValidationStrategy::Exact, 200, 200, b"abc", b"def");
        assert!(!success);
    }

    #[test]
    fn status_code_strategy_ignores_body() {
        let (success, _) = validate(ValidationStrategy::StatusCode, 200, 200, b"abc", b"totally different");
        assert!(success);
    }

    #[test]
    fn fuzzy_passes_when_json_kinds_match() {
        let (success, _) = validate(ValidationStrategy::Fuzzy, 200, 200, br#"{"a":1}"#, br#"{"b":2}"#);
        assert!(success);
    }

    #[test]
    fn fuzzy_fails_when_json_kinds_differ() {
        let (success, _) = validate(ValidationStrategy::Fuzzy, 200, 200, br#"{"a":1}"#, br#"[1,2,3]"#);
        assert!(!success);
    }

    #[test]
    fn any_strategy_fails_on_status_mismatch() {
        let (success, err) = validate(ValidationStrategy::StatusCode, 200, 404, b"", b"");
        assert!(!success);
        assert!(err.unwrap().contains("status mismatch"));
    }
}
