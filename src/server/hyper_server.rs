//! Hyper-based HTTP Server
//!
//! Plain hyper service with a hand-written router; there are only a handful
//! of routes so no framework is involved.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use tokio::net::TcpSocket;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::IntentAnalyzer;
use crate::protocol::http::{AnalyzeRequest, AnalyzeResponse, HealthResponse, HttpErrorResponse};
use crate::server::config::ServerConfig;

/// Shared state for the hyper service
#[derive(Clone)]
pub(crate) struct ServerState {
    analyzer: Arc<IntentAnalyzer>,
    config: Arc<ServerConfig>,
    allow_origin: HeaderValue,
}

impl ServerState {
    pub(crate) fn new(
        config: Arc<ServerConfig>,
        analyzer: Arc<IntentAnalyzer>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let allow_origin = HeaderValue::from_str(&config.network.allowed_origin)?;
        Ok(Self {
            analyzer,
            config,
            allow_origin,
        })
    }
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_hyper_http_server<F>(
    config: Arc<ServerConfig>,
    analyzer: Arc<IntentAnalyzer>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()>,
{
    let addr = config.bind_addr()?;
    let state = ServerState::new(config, analyzer)?;

    info!("Starting HTTP server");
    info!("Binding to {}", addr);

    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    // Responses are small; don't let Nagle hold them back
    socket.set_nodelay(true)?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    let server = Server::from_tcp(listener.into_std()?)?
        .http1_keepalive(true)
        .tcp_nodelay(true)
        .tcp_sleep_on_accept_errors(true)
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    info!("HTTP server listening on {}", addr);
    info!("Endpoints:");
    info!("   POST /analyze    - Classify intent and embed text");
    info!("   GET  /health     - Health check");
    info!("   GET  /           - Server info");

    server.await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Route a request and attach CORS headers to whatever comes back
pub(crate) async fn handle_request(
    req: Request<Body>,
    state: ServerState,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = match (&method, path.as_str()) {
        (&Method::POST, "/analyze") => {
            let span = info_span!("analyze", request_id = %Uuid::new_v4());
            handle_analyze(req, &state).instrument(span).await
        }
        (&Method::GET, "/health") => handle_health(&state).await,
        (&Method::GET, "/") => handle_root(&state),
        (&Method::OPTIONS, _) => handle_options(),
        _ => {
            debug!("No route for {} {}", method, path);
            json_response(StatusCode::NOT_FOUND, &HttpErrorResponse::not_found())
        }
    };

    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", state.allow_origin.clone());
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );

    Ok(response)
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Root endpoint - server info
fn handle_root(state: &ServerState) -> Response<Body> {
    let info = serde_json::json!({
        "name": "Intent Analysis Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": {
                "method": "POST",
                "path": "/analyze",
                "description": "Classify the intent of a text and return its embedding"
            },
            "health": {
                "method": "GET",
                "path": "/health",
                "description": "Health check endpoint"
            }
        },
        "classifier": state.analyzer.classifier().info().name,
        "encoder": state.analyzer.encoder().info().name,
        "candidate_labels": state.analyzer.candidate_labels(),
    });

    json_response(StatusCode::OK, &info)
}

/// Health check endpoint
async fn handle_health(state: &ServerState) -> Response<Body> {
    debug!("Health check requested");

    match state.analyzer.probe().await {
        Ok(dimension) => {
            let response = HealthResponse::healthy(
                &state.analyzer.classifier().info().name,
                &state.analyzer.encoder().info().name,
                dimension,
            );
            json_response(StatusCode::OK, &response)
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            json_response(StatusCode::SERVICE_UNAVAILABLE, &HttpErrorResponse::model_not_ready())
        }
    }
}

/// Analysis endpoint
async fn handle_analyze(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let start_time = Instant::now();
    let limit = state.config.network.max_body_bytes;

    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.map_or(false, |len| len > limit) {
        warn!("Rejecting body of {:?} bytes (limit {})", declared_len, limit);
        return json_response(StatusCode::PAYLOAD_TOO_LARGE, &HttpErrorResponse::body_too_large(limit));
    }

    let body_bytes = match read_body_limited(req.into_body(), limit).await {
        Ok(bytes) => bytes,
        Err(BodyReadError::TooLarge(read)) => {
            warn!("Rejecting body after {} bytes (limit {})", read, limit);
            return json_response(StatusCode::PAYLOAD_TOO_LARGE, &HttpErrorResponse::body_too_large(limit));
        }
        Err(BodyReadError::Failed(e)) => {
            warn!("Failed to read request body: {}", e);
            return json_response(
                StatusCode::BAD_REQUEST,
                &HttpErrorResponse::new("Failed to read request body"),
            );
        }
    };

    let request: AnalyzeRequest = match serde_json::from_slice(&body_bytes) {
        Ok(req) => req,
        Err(e) => {
            debug!("Invalid JSON: {}", e);
            return json_response(StatusCode::BAD_REQUEST, &HttpErrorResponse::invalid_json());
        }
    };

    if state.config.monitoring.enable_detailed_logging {
        info!("Received text for analysis: '{}'", request.text.as_deref().unwrap_or_default());
    }

    let text = match request.text() {
        Some(text) => text,
        None => return json_response(StatusCode::BAD_REQUEST, &HttpErrorResponse::no_text()),
    };

    match state.analyzer.analyze(text).await {
        Ok(analysis) => {
            info!("Analysis result: {}", analysis.intent);
            if state.config.monitoring.enable_detailed_logging {
                info!("TOTAL request took: {:?}", start_time.elapsed());
            }
            json_response(StatusCode::OK, &AnalyzeResponse::from(analysis))
        }
        Err(e) if e.is_client_error() => {
            json_response(StatusCode::BAD_REQUEST, &HttpErrorResponse::no_text())
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &HttpErrorResponse::internal_error(e.to_string()),
            )
        }
    }
}

#[derive(Debug)]
enum BodyReadError {
    /// Bytes received when the limit was crossed
    TooLarge(usize),
    Failed(hyper::Error),
}

/// Collect `body`, giving up as soon as it grows past `limit` bytes.
///
/// Chunked bodies carry no Content-Length, so the limit is enforced while
/// streaming rather than after buffering.
async fn read_body_limited(mut body: Body, limit: usize) -> Result<Vec<u8>, BodyReadError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyReadError::Failed)?;
        if bytes.len() + chunk.len() > limit {
            return Err(BodyReadError::TooLarge(bytes.len() + chunk.len()));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Serialise `body` into a JSON response
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let body = serde_json::to_vec(body).unwrap_or_else(|e| {
        error!("Failed to serialize response: {}", e);
        br#"{"error":"Internal server error"}"#.to_vec()
    });

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
