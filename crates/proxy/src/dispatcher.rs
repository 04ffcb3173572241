//! Multi-Proxy Dispatcher: mounts every configured HTTP route under
//! `/proxy/<name>/…` (ahead of the UI catch-all) on one shared HTTP
//! listener, and every gRPC route behind the router on a separate
//! listener.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::{combinators::BoxBody, BodyExt, Full, StreamBody};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use regex::Regex;
use relaydeck_common::SessionId;
use relaydeck_config::{Config, MatchingStrategy as ConfigMatchingStrategy, UpstreamProtocol};
use relaydeck_engine::{
    replay_chunks, GrpcMockEngine, GrpcMockOutcome, GrpcMockRequest, GrpcRecordEngine, LiveRequest,
    MockEngine, MockOutcome, MockRequest, NotFoundResponse, NullObserver, Observer, RecordEngine,
};
use relaydeck_grpc::{decode_frame, encode_frame, GrpcRoute, GrpcRouter};
use relaydeck_rest::{MatchStrategy, Redactor};
use relaydeck_store::{Store, StreamChunk};
use tokio::net::TcpListener;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

/// HTTP response body: either a fully buffered payload or a stream of
/// timed chunks replayed from a recorded SSE interaction.
type ResponseBody = BoxBody<Bytes, Infallible>;

use crate::metrics::Metrics;
use crate::reload::GracefulReloadCoordinator;

fn convert_strategy(strategy: &ConfigMatchingStrategy) -> MatchStrategy {
    match strategy {
        ConfigMatchingStrategy::Exact => MatchStrategy::Exact,
        ConfigMatchingStrategy::Pattern => MatchStrategy::Pattern,
        ConfigMatchingStrategy::Fuzzy => MatchStrategy::Fuzzy,
        ConfigMatchingStrategy::FuzzyUnordered => MatchStrategy::FuzzyUnordered,
    }
}

enum HttpRouteEngine {
    Record(RecordEngine),
    Mock(MockEngine),
}

struct HttpRoute {
    session_id: SessionId,
    engine: HttpRouteEngine,
}

enum GrpcRouteEngine {
    Record(GrpcRecordEngine),
    Mock { session_id: SessionId, engine: GrpcMockEngine },
}

pub struct Dispatcher {
    http_routes: HashMap<String, HttpRoute>,
    grpc_router: GrpcRouter<GrpcRouteEngine>,
    observer: Arc<dyn Observer>,
    grpc_addr: SocketAddr,
    store: Store,
    pub reload: GracefulReloadCoordinator,
    pub metrics: Metrics,
}

impl Dispatcher {
    pub async fn build(
        config: &Config,
        store: Store,
        grpc_addr: SocketAddr,
        drain_timeout: std::time::Duration,
    ) -> anyhow::Result<Arc<Self>> {
        let mut http_routes = HashMap::new();
        let mut grpc_router = GrpcRouter::new();

        for (name, proxy) in &config.proxies {
            let session = store.get_or_create_session(&proxy.session_name, None).await?;

            match proxy.protocol {
                UpstreamProtocol::Grpc => {
                    let service_pattern = proxy.service_pattern.as_deref().map(Regex::new).transpose()?;
                    let method_pattern = proxy.method_pattern.as_deref().map(Regex::new).transpose()?;
                    let destination = match config.mode {
                        relaydeck_config::Mode::Mock => {
                            GrpcRouteEngine::Mock { session_id: session.id, engine: GrpcMockEngine::new(store.clone()) }
                        }
                        _ => {
                            let endpoint = tonic::transport::Endpoint::from_shared(format!(
                                "http://{}:{}",
                                proxy.target_host, proxy.target_port
                            ))?;
                            GrpcRouteEngine::Record(GrpcRecordEngine::new(store.clone(), session.id, endpoint))
                        }
                    };
                    grpc_router.register(GrpcRoute {
                        name: name.clone(),
                        service_pattern,
                        method_pattern,
                        is_default: proxy.is_default,
                        destination,
                    });
                }
                UpstreamProtocol::Http | UpstreamProtocol::Https => {
                    let scheme = if matches!(proxy.protocol, UpstreamProtocol::Https) { "https" } else { "http" };
                    let base_url = format!("{scheme}://{}:{}", proxy.target_host, proxy.target_port);

                    let engine = match config.mode {
                        relaydeck_config::Mode::Mock => {
                            let redactor = Redactor::new(&config.recording.redact_patterns)?;
                            let not_found = NotFoundResponse {
                                status: config.mock.not_found_response.status,
                                body: config.mock.not_found_response.body.clone().into_bytes(),
                            };
                            HttpRouteEngine::Mock(MockEngine::new(
                                store.clone(),
                                redactor,
                                convert_strategy(&config.mock.matching_strategy),
                                config.mock.fuzzy_ignore_fields.clone(),
                                not_found,
                                config.mock.respect_streaming_timing,
                            ))
                        }
                        _ => {
                            // No gzip/deflate/brotli cargo features are enabled for `reqwest` in
                            // this workspace, so responses are never auto-decompressed: bodies are
                            // captured exactly as the upstream sent them over the wire.
                            let client = reqwest::Client::builder().build()?;
                            HttpRouteEngine::Record(RecordEngine::new(
                                store.clone(),
                                client,
                                session.id,
                                base_url,
                                proxy.enable_streaming,
                            ))
                        }
                    };

                    http_routes.insert(name.clone(), HttpRoute { session_id: session.id, engine });
                }
            }
        }

        Ok(Arc::new(Self {
            http_routes,
            grpc_router,
            observer: Arc::new(NullObserver),
            grpc_addr,
            store,
            reload: GracefulReloadCoordinator::new(drain_timeout),
            metrics: Metrics::new(),
        }))
    }

    pub async fn serve_http(self: Arc<Self>, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "HTTP listener started");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to accept HTTP connection");
                    continue;
                }
            };
            let dispatcher = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                    let dispatcher = dispatcher.clone();
                    async move { handle_http(dispatcher, req, peer).await }
                });
                if let Err(e) = auto::Builder::new(TokioExecutor::new()).serve_connection(io, service).await {
                    warn!(error = %e, %peer, "HTTP connection error");
                }
            });
        }
    }

    pub async fn serve_grpc(self: Arc<Self>, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "gRPC listener started");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to accept gRPC connection");
                    continue;
                }
            };
            let dispatcher = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                    let dispatcher = dispatcher.clone();
                    async move { handle_grpc(dispatcher, req).await }
                });
                if let Err(e) = auto::Builder::new(TokioExecutor::new()).serve_connection(io, service).await {
                    warn!(error = %e, %peer, "gRPC connection error");
                }
            });
        }
    }
}

fn full_body(bytes: Bytes) -> ResponseBody {
    Full::new(bytes).boxed()
}

/// Replay `chunks` as a streaming body: each chunk is pushed to the client
/// as soon as [`replay_chunks`] releases it, honoring `respect_timing`.
fn streaming_body(chunks: Vec<StreamChunk>, respect_timing: bool) -> ResponseBody {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Frame<Bytes>, Infallible>>();
    tokio::spawn(async move {
        replay_chunks(&chunks, respect_timing, |data: &[u8]| {
            let _ = tx.send(Ok(Frame::data(Bytes::copy_from_slice(data))));
        })
        .await;
    });
    StreamBody::new(UnboundedReceiverStream::new(rx)).boxed()
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(Bytes::from(body.to_string())))
        .expect("static response parts are always valid")
}

async fn handle_http(
    dispatcher: Arc<Dispatcher>,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    dispatcher.reload.inc_requests();
    let result = handle_http_inner(&dispatcher, req, peer).await;
    dispatcher.reload.dec_requests();
    result
}

async fn handle_http_inner(
    dispatcher: &Dispatcher,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let path = parts.uri.path().to_string();

    if let Some(rest) = path.strip_prefix("/proxy/") {
        let mut segments = rest.splitn(2, '/');
        let name = segments.next().unwrap_or_default();
        let inner_path = format!("/{}", segments.next().unwrap_or_default());

        if let Some(route) = dispatcher.http_routes.get(name) {
            return Ok(forward_to_route(
                route,
                &parts,
                inner_path,
                body_bytes,
                peer,
                dispatcher.observer.as_ref(),
                &dispatcher.metrics,
            )
            .await);
        }
        return Ok(json_response(StatusCode::NOT_FOUND, serde_json::json!({"error": "unknown proxy route"})));
    }

    if let Some(id) = path.strip_prefix("/api/sessions/") {
        return Ok(handle_api_session_interactions(&dispatcher, id).await);
    }

    match (parts.method.clone(), path.as_str()) {
        (Method::GET, "/grpc/info") => json_response_ok(serde_json::json!({ "address": dispatcher.grpc_addr.to_string() })),
        (Method::GET, "/api/sessions") => Ok(handle_api_sessions(&dispatcher).await),
        (Method::GET, "/api/interactions/") => Ok(handle_api_interactions(&dispatcher).await),
        (Method::POST, "/api/clear") => Ok(handle_api_clear(&dispatcher).await),
        (Method::GET, "/healthz") => json_response_ok(serde_json::json!({ "status": "ok" })),
        (Method::GET, "/api/version") => json_response_ok(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })),
        (Method::GET, "/metrics") => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4")
            .body(full_body(Bytes::from(dispatcher.metrics.encode())))
            .unwrap()),
        (Method::GET, "/") => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(full_body(Bytes::from_static(b"relaydeck\n")))
            .unwrap()),
        _ => Ok(json_response(StatusCode::NOT_FOUND, serde_json::json!({"error": "not found"}))),
    }
}

async fn handle_api_sessions(dispatcher: &Dispatcher) -> Response<ResponseBody> {
    match dispatcher.store.list_sessions().await {
        Ok(sessions) => json_response(StatusCode::OK, serde_json::json!(sessions)),
        Err(e) => json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
    }
}

async fn handle_api_session_interactions(dispatcher: &Dispatcher, id: &str) -> Response<ResponseBody> {
    let Ok(session_id) = id.parse::<i64>() else {
        return json_response(StatusCode::BAD_REQUEST, serde_json::json!({"error": "invalid session id"}));
    };
    match dispatcher.store.get_interactions_by_session(SessionId(session_id)).await {
        Ok(interactions) => json_response(StatusCode::OK, serde_json::json!(interactions)),
        Err(e) => json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
    }
}

async fn handle_api_interactions(dispatcher: &Dispatcher) -> Response<ResponseBody> {
    let sessions = match dispatcher.store.list_sessions().await {
        Ok(sessions) => sessions,
        Err(e) => return json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
    };

    let mut all = Vec::new();
    for session in sessions {
        match dispatcher.store.get_interactions_by_session(session.id).await {
            Ok(interactions) => all.extend(interactions),
            Err(e) => return json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
        }
    }
    json_response(StatusCode::OK, serde_json::json!(all))
}

async fn handle_api_clear(dispatcher: &Dispatcher) -> Response<ResponseBody> {
    match dispatcher.store.clear_all().await {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({"cleared": true})),
        Err(e) => json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
    }
}

fn json_response_ok(value: serde_json::Value) -> Result<Response<ResponseBody>, Infallible> {
    Ok(json_response(StatusCode::OK, value))
}

async fn forward_to_route(
    route: &HttpRoute,
    parts: &http::request::Parts,
    inner_path: String,
    body_bytes: Bytes,
    peer: SocketAddr,
    observer: &dyn Observer,
    metrics: &Metrics,
) -> Response<ResponseBody> {
    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        headers.insert(name.as_str().to_string(), value.to_str().unwrap_or("").to_string());
    }

    match &route.engine {
        HttpRouteEngine::Record(engine) => {
            let live_request = LiveRequest {
                method: parts.method.as_str().to_string(),
                endpoint: inner_path,
                query: parts.uri.query().map(str::to_string),
                headers,
                body: body_bytes.to_vec(),
                remote_addr: Some(peer.to_string()),
            };
            match engine.handle(live_request, observer).await {
                Ok(recorded) => {
                    metrics.interactions_recorded.inc();
                    if recorded.is_streaming {
                        // Already fully buffered by capture_sse; forward without
                        // re-pacing since this is a live call, not a replay.
                        build_streaming_response(recorded.status, &recorded.headers, recorded.chunks, false)
                    } else {
                        build_response(recorded.status, &recorded.headers, &recorded.body)
                    }
                }
                Err(e) => {
                    error!(error = %e, "upstream call failed in record mode");
                    json_response(StatusCode::BAD_GATEWAY, serde_json::json!({"error": e.to_string()}))
                }
            }
        }
        HttpRouteEngine::Mock(engine) => {
            let request = MockRequest { method: parts.method.as_str(), endpoint: &inner_path, headers: &headers, body: &body_bytes };
            match engine.handle(route.session_id, &request).await {
                Ok(MockOutcome::Recorded { status, headers, body, chunks, respect_streaming_timing }) => {
                    metrics.mock_hits.inc();
                    if chunks.is_empty() {
                        build_response(status, &headers, &body)
                    } else {
                        build_streaming_response(status, &headers, chunks, respect_streaming_timing)
                    }
                }
                Ok(MockOutcome::NotFound(nf)) => {
                    metrics.mock_misses.inc();
                    build_response(nf.status as i64, &HashMap::new(), &nf.body)
                }
                Err(e) => json_response(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": e.to_string()})),
            }
        }
    }
}

fn build_response(status: i64, headers: &HashMap<String, String>, body: &[u8]) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(status as u16);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(full_body(Bytes::copy_from_slice(body))).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(full_body(Bytes::new()))
            .expect("fallback response is always valid")
    })
}

fn build_streaming_response(
    status: i64,
    headers: &HashMap<String, String>,
    chunks: Vec<StreamChunk>,
    respect_timing: bool,
) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(status as u16);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(streaming_body(chunks, respect_timing)).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(full_body(Bytes::new()))
            .expect("fallback response is always valid")
    })
}

async fn handle_grpc(dispatcher: Arc<Dispatcher>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    dispatcher.reload.inc_requests();
    let result = handle_grpc_inner(&dispatcher, req).await;
    dispatcher.reload.dec_requests();
    result
}

async fn handle_grpc_inner(dispatcher: &Dispatcher, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let full_method = req.uri().path().to_string();
    let (_, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(grpc_status_response(tonic::Code::Internal, "failed to read request body")),
    };

    let Some((message, _rest)) = decode_frame(&body_bytes) else {
        return Ok(grpc_status_response(tonic::Code::InvalidArgument, "malformed gRPC frame"));
    };

    let method_name = GrpcRouter::<GrpcRouteEngine>::parse_full_method(&full_method)
        .map(|(_, method)| method)
        .unwrap_or(&full_method);
    if relaydeck_grpc::classify(method_name) == relaydeck_grpc::CallKind::Streaming {
        return Ok(grpc_status_response(
            tonic::Code::Unimplemented,
            "streaming gRPC is not recorded, mocked, or proxied",
        ));
    }

    let destination = match dispatcher.grpc_router.route(&full_method) {
        Ok(destination) => destination,
        Err(_) => return Ok(grpc_status_response(tonic::Code::Unimplemented, "no route for this method")),
    };

    match destination {
        GrpcRouteEngine::Record(engine) => {
            let call = relaydeck_engine::GrpcLiveCall {
                full_method: full_method.clone(),
                metadata: HashMap::new(),
                body: message.to_vec(),
                remote_addr: None,
            };
            match engine.handle_unary(call, dispatcher.observer.as_ref()).await {
                Ok(recorded) => {
                    dispatcher.metrics.grpc_interactions_recorded.inc();
                    Ok(grpc_success_response(recorded.status_code, &recorded.body))
                }
                Err(e) => Ok(grpc_status_response(tonic::Code::Unavailable, &e.to_string())),
            }
        }
        GrpcRouteEngine::Mock { session_id, engine } => {
            let request = GrpcMockRequest { full_method: &full_method };
            match engine.handle(*session_id, &request).await {
                Ok(GrpcMockOutcome::Recorded { status_code, body, .. }) => {
                    dispatcher.metrics.grpc_mock_hits.inc();
                    Ok(grpc_success_response(status_code, &body))
                }
                Ok(GrpcMockOutcome::NotFound) => {
                    dispatcher.metrics.grpc_mock_misses.inc();
                    Ok(grpc_status_response(tonic::Code::NotFound, "recording not found"))
                }
                Err(e) => Ok(grpc_status_response(tonic::Code::Internal, &e.to_string())),
            }
        }
    }
}

fn grpc_success_response(status_code: i64, body: &[u8]) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/grpc")
        .header("grpc-status", status_code.to_string())
        .body(Full::new(encode_frame(body)))
        .expect("static response parts are always valid")
}

fn grpc_status_response(code: tonic::Code, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/grpc")
        .header("grpc-status", (code as i32).to_string())
        .header("grpc-message", message)
        .body(Full::new(Bytes::new()))
        .expect("static response parts are always valid")
}
