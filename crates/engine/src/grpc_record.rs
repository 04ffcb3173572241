//! Record Engine, gRPC unary path: forwards one raw request frame upstream
//! over a plain `tonic` channel and persists the exchange as an
//! interaction. Streaming gRPC calls are out of scope; the dispatcher
//! rejects them before reaching this engine.

use relaydeck_common::{Protocol, RequestId, SessionId};
use relaydeck_grpc::RawMessage;
use relaydeck_store::{Interaction, Store};
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::observer::{Observer, RequestEvent, ResponseEvent};

#[derive(Debug, Error)]
pub enum GrpcRecordError {
    #[error("upstream channel error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("upstream call failed: {0}")]
    Call(Status),
    #[error(transparent)]
    Store(#[from] relaydeck_store::StoreError),
}

pub struct GrpcLiveCall {
    pub full_method: String,
    pub metadata: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
    pub remote_addr: Option<String>,
}

pub struct GrpcRecordedCall {
    pub status_code: i64,
    pub metadata: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
}

pub struct GrpcRecordEngine {
    store: Store,
    session_id: SessionId,
    upstream_endpoint: Endpoint,
}

impl GrpcRecordEngine {
    pub fn new(store: Store, session_id: SessionId, upstream_endpoint: Endpoint) -> Self {
        Self { store, session_id, upstream_endpoint }
    }

    /// Record a single unary call: dial, forward the one request frame
    /// through the raw codec, persist, return what to write back.
    pub async fn handle_unary(
        &self,
        call: GrpcLiveCall,
        observer: &dyn Observer,
    ) -> Result<GrpcRecordedCall, GrpcRecordError> {
        let request_id = RequestId::new_grpc();
        observer.broadcast_request(RequestEvent {
            request_id: request_id.clone(),
            session_id: self.session_id,
            protocol: Protocol::Grpc,
            method: call.full_method.clone(),
            endpoint: call.full_method.clone(),
            remote_addr: call.remote_addr.clone(),
            headers: call.metadata.clone(),
            body: call.body.clone(),
        });

        let channel = self.upstream_endpoint.connect().await?;
        let (status_code, response_metadata, response_body) =
            self.forward_raw(channel, &call).await?;

        let mut interaction = Interaction::new_unrecorded(
            self.session_id,
            request_id,
            Protocol::Grpc,
            call.full_method.clone(),
            call.full_method.clone(),
            call.metadata,
            call.body,
        );
        interaction.response_status = status_code;
        interaction.response_headers = response_metadata.clone();
        interaction.response_body = response_body.clone();
        self.store.record_interaction(&mut interaction).await?;

        observer.broadcast_response(ResponseEvent {
            request_id: interaction.request_id.clone(),
            status: status_code,
            headers: response_metadata.clone(),
            body: response_body.clone(),
            is_streaming: false,
        });

        Ok(GrpcRecordedCall { status_code, metadata: response_metadata, body: response_body })
    }

    /// Forwards the one request frame and returns `(status_code, metadata,
    /// body)` for both outcomes: a non-OK status from the upstream is
    /// translated to its numeric code and message rather than bubbled as an
    /// error, so `handle_unary` records it like any other response (§4.6).
    /// `Err` is reserved for failures that happen before a status comes
    /// back at all (the channel never becoming ready, or an unparseable path).
    async fn forward_raw(
        &self,
        channel: Channel,
        call: &GrpcLiveCall,
    ) -> Result<(i64, std::collections::HashMap<String, String>, Vec<u8>), GrpcRecordError> {
        let mut client =
            tonic::client::Grpc::new(channel);
        client.ready().await.map_err(|e| GrpcRecordError::Call(Status::unavailable(e.to_string())))?;

        let path = tonic::codegen::http::uri::PathAndQuery::try_from(call.full_method.as_str())
            .map_err(|e| GrpcRecordError::Call(Status::invalid_argument(e.to_string())))?;

        let mut request = Request::new(RawMessage::new(call.body.clone()));
        for (name, value) in &call.metadata {
            if let (Ok(name), Ok(value)) = (
                tonic::metadata::MetadataKey::from_bytes(name.as_bytes()),
                tonic::metadata::MetadataValue::try_from(value.as_str()),
            ) {
                request.metadata_mut().insert(name, value);
            }
        }

        match client.unary(request, path, relaydeck_grpc::RawCodec).await {
            Ok(response) => {
                let mut metadata = std::collections::HashMap::new();
                for key_and_value in response.metadata().clone().into_headers().iter() {
                    let (name, value) = key_and_value;
                    if let Ok(value) = value.to_str() {
                        metadata.insert(name.as_str().to_string(), value.to_string());
                    }
                }
                let body = response.into_inner().data.to_vec();
                Ok((0i64, metadata, body))
            }
            Err(status) => {
                let mut metadata = std::collections::HashMap::new();
                for key_and_value in status.metadata().clone().into_headers().iter() {
                    let (name, value) = key_and_value;
                    if let Ok(value) = value.to_str() {
                        metadata.insert(name.as_str().to_string(), value.to_string());
                    }
                }
                Ok((status_to_code(&status), metadata, status.message().as_bytes().to_vec()))
            }
        }
    }
}

/// Numeric gRPC status code, the form interactions are persisted with.
pub fn status_to_code(status: &Status) -> i64 {
    status.code() as i64
}
