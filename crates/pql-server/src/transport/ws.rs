//! HTTP transport — WebSocket sessions, schema dump, session creation, and /health.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use crate::protocol::{OnDisconnect, Outbound, ProtocolHandler};
use crate::session::AccessMode;
use crate::types::{error_codes, RequestId, ServerEnvelope, ServerError, ServerResult};

use super::framing;

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub handler: ProtocolHandler,
    pub token: Option<String>,
}

/// WebSocket + HTTP transport for browser and network clients.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(handler: ProtocolHandler, token: Option<String>) -> Self {
        Self {
            state: Arc::new(ServerState { handler, token }),
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve on `addr` until the process exits. Also runs the session reaper.
    pub async fn run(&self, addr: &str) -> ServerResult<()> {
        let handler = &self.state.handler;
        let _reaper = handler
            .sessions()
            .spawn_reaper(handler.config().sweep_interval);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(format!("HTTP server failed: {e}")))?;

        Ok(())
    }
}

/// All routes. `/health` bypasses the bearer-token check.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/ws", get(handle_ws))
        .route("/schema", get(handle_schema))
        .route("/sessions", post(handle_create_session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        AxumJson(serde_json::json!({
            "type": "error",
            "id": null,
            "code": code,
            "message": message,
        })),
    )
        .into_response()
}

/// Auth middleware — checks the bearer token if one is configured.
async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.token {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected);

        if !authorized {
            tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
            return error_body(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid bearer token",
            );
        }
    }

    next.run(request).await
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    session: Option<String>,
    mode: Option<AccessMode>,
}

async fn handle_ws(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state, params))
}

async fn serve_socket(socket: WebSocket, state: Arc<ServerState>, params: WsParams) {
    let handler = &state.handler;
    let config = handler.config();
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEnvelope>(config.outbound_capacity);

    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let text = match framing::encode(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("failed to encode frame: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let outbound = Outbound::new(tx, config.send_timeout);
    let requested = params.mode.unwrap_or_default();
    match handler
        .connect(params.session.as_deref(), requested, outbound.clone())
        .await
    {
        Ok(connection) => {
            tracing::info!(session = %connection.session_id(), "WebSocket connected");
            let inbound = Box::pin(
                stream
                    .scan((), |_, message| {
                        future::ready(match message {
                            Ok(Message::Text(text)) => Some(Some(text)),
                            Ok(Message::Close(_)) | Err(_) => None,
                            Ok(_) => Some(None),
                        })
                    })
                    .filter_map(future::ready),
            );
            connection.run(inbound, OnDisconnect::Cancel).await;
        }
        Err(e) => {
            tracing::warn!("WebSocket rejected: {e}");
            outbound.send(e.to_frame(RequestId::Null)).await;
        }
    }

    drop(outbound);
    let _ = writer.await;
}

/// Full registry dump.
async fn handle_schema(State(state): State<Arc<ServerState>>) -> Response {
    match serde_json::to_value(state.handler.registry().as_ref()) {
        Ok(value) => AxumJson(value).into_response(),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL,
            &e.to_string(),
        ),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateSession {
    #[serde(default)]
    mode: Option<AccessMode>,
}

/// Create a session a WebSocket can later resume with `/ws?session=<id>`.
async fn handle_create_session(
    State(state): State<Arc<ServerState>>,
    body: Option<AxumJson<CreateSession>>,
) -> Response {
    let requested = body.and_then(|b| b.0.mode).unwrap_or_default();
    let handler = &state.handler;
    let session = handler
        .sessions()
        .create(handler.config().effective_mode(requested))
        .await;
    (
        StatusCode::CREATED,
        AxumJson(serde_json::json!({
            "session_id": session.id,
            "mode": session.mode,
        })),
    )
        .into_response()
}

/// Health check endpoint — no auth required.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "entities": state.handler.registry().len(),
        "sessions": state.handler.sessions().len().await,
    }))
}
