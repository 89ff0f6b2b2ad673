//! axum server exposing the tool catalog and agent loop over the
//! session-addressed streaming transport: a long-lived SSE push stream plus
//! a per-connection POST channel.

use autoapply_agent::{AgentOutcome, AgentRunner, TaskKind};
use autoapply_browser::SessionRegistry;
use autoapply_core::{Config, Error, Paths, Result};
use autoapply_providers::Provider;
use autoapply_tools::{ContentBlock, ToolContext, ToolRegistry, ToolResult};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::connection::{Connection, ConnectionRegistry};
use crate::protocol::{ProtocolRequest, StreamEvent};

#[derive(Clone)]
pub struct GatewayState {
    pub connections: Arc<ConnectionRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub tools: Arc<ToolRegistry>,
    /// Absent when no provider is configured; agent/run is then rejected.
    pub provider: Option<Arc<dyn Provider>>,
    pub paths: Paths,
    pub config: Config,
}

impl GatewayState {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        tools: Arc<ToolRegistry>,
        provider: Option<Arc<dyn Provider>>,
        paths: Paths,
        config: Config,
    ) -> Self {
        Self {
            connections: Arc::new(ConnectionRegistry::new()),
            sessions,
            tools,
            provider,
            paths,
            config,
        }
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            sessions: self.sessions.clone(),
            paths: self.paths.clone(),
            config: self.config.clone(),
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/sse", get(handle_sse_open))
        .route("/messages/:connection_id", post(handle_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until a termination signal arrives, then drain every live
/// browser session before returning.
pub async fn serve(state: GatewayState) -> Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let sessions = state.sessions.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind {}: {}", addr, e)))?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Transport(format!("Server error: {}", e)))?;

    sessions.drain().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Termination signal received, shutting down");
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);

    Json(json!({
        "status": "ok",
        "model": state.config.agent.model,
        "live_sessions": state.sessions.len().await,
        "live_connections": state.connections.len().await,
        "uptime_secs": start.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct SseQuery {
    connection_id: Option<String>,
}

/// Everything the SSE stream owns; dropping it (client disconnect, network
/// failure, server shutdown) triggers the connection's close hooks — unless
/// a newer stream has reattached to the same connection id.
struct SseStreamState {
    rx: tokio::sync::mpsc::Receiver<StreamEvent>,
    pending: Option<StreamEvent>,
    _guard: StreamGuard,
}

struct StreamGuard {
    connection: Arc<Connection>,
    epoch: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.connection.epoch.load(std::sync::atomic::Ordering::SeqCst) == self.epoch {
            self.connection.close_hooks.fire();
        }
    }
}

async fn handle_sse_open(
    State(state): State<GatewayState>,
    Query(query): Query<SseQuery>,
) -> Response {
    // Admission control happens before any transport is allocated.
    let live = state.sessions.len().await;
    if live >= state.config.browser.max_sessions {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "capacity_exceeded", "live_sessions": live})),
        )
            .into_response();
    }

    let requested = query.connection_id.filter(|s| !s.is_empty());
    let opened = state.connections.open(requested).await;
    let connection = opened.connection.clone();

    if opened.is_new {
        register_close_cleanup(&state, &connection);
    }

    let endpoint = StreamEvent::Endpoint {
        connection_id: connection.connection_id.clone(),
        post_path: format!("/messages/{}", connection.connection_id),
    };

    let stream_state = SseStreamState {
        rx: opened.rx,
        pending: Some(endpoint),
        _guard: StreamGuard {
            connection,
            epoch: opened.epoch,
        },
    };
    let stream = futures::stream::unfold(stream_state, |mut st| async move {
        if let Some(event) = st.pending.take() {
            return Some((sse_event(&event), st));
        }
        st.rx.recv().await.map(|event| (sse_event(&event), st))
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Couple the connection's close to registry cleanup: when the push stream
/// closes — whichever side initiated it — the connection is removed and any
/// bound session destroyed. The hook list fires exactly once, and destroy is
/// idempotent, so racing an explicit close_session is harmless.
fn register_close_cleanup(state: &GatewayState, connection: &Arc<Connection>) {
    let connection_id = connection.connection_id.clone();
    let bound = connection.bound_session_handle();
    let connections = state.connections.clone();
    let sessions = state.sessions.clone();
    connection.close_hooks.push(move || {
        let bound_session = bound.lock().unwrap_or_else(|e| e.into_inner()).clone();
        tokio::spawn(async move {
            connections.remove(&connection_id).await;
            if let Some(session_id) = bound_session {
                info!(
                    connection = %connection_id,
                    session = %session_id,
                    "Connection closed, destroying bound session"
                );
                sessions.destroy(&session_id).await;
            }
        });
    });
}

fn sse_event(event: &StreamEvent) -> std::result::Result<Event, Infallible> {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().event(event.event_name()).data(data))
}

async fn handle_message(
    State(state): State<GatewayState>,
    AxumPath(connection_id): AxumPath<String>,
    Json(request): Json<ProtocolRequest>,
) -> Response {
    let connection = match state.connections.get(&connection_id).await {
        Some(c) => c,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "connection_not_found",
                    "connection_id": connection_id,
                })),
            )
                .into_response();
        }
    };

    // The request is answered over the push stream; the POST is only an
    // acceptance receipt.
    let id = request.id().to_string();
    tokio::spawn(async move {
        process_request(&state, &connection, request).await;
    });
    (StatusCode::ACCEPTED, Json(json!({"status": "accepted", "id": id}))).into_response()
}

/// Dispatch one protocol message and push its correlated result.
pub async fn process_request(
    state: &GatewayState,
    connection: &Arc<Connection>,
    request: ProtocolRequest,
) {
    match request {
        ProtocolRequest::ToolsList { id } => {
            let tools = state.tools.get_tool_schemas();
            connection
                .send(StreamEvent::Result {
                    id,
                    result: json!({"tools": tools}),
                })
                .await;
        }
        ProtocolRequest::ToolsCall { id, params } => {
            match state
                .tools
                .execute(&params.name, state.tool_context(), params.arguments.clone())
                .await
            {
                Ok(result) => {
                    // The first session opened through this connection is
                    // tied to its lifecycle.
                    if params.name == "open_session" && result.is_ok() {
                        if let Some(session_id) = extract_session_id(&result) {
                            connection.bind_session(&session_id);
                        }
                    }
                    let value = serde_json::to_value(&result).unwrap_or(Value::Null);
                    connection.send(StreamEvent::Result { id, result: value }).await;
                }
                Err(e) => {
                    // Infrastructure failure: tear down the affected session
                    // and report; the transport itself stays up.
                    if let Some(session_id) =
                        params.arguments.get("session_id").and_then(|v| v.as_str())
                    {
                        warn!(session = session_id, error = %e, "Infrastructure failure, destroying session");
                        state.sessions.destroy(session_id).await;
                    }
                    connection
                        .send(StreamEvent::Error {
                            id: Some(id),
                            code: e.code().to_string(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        }
        ProtocolRequest::AgentRun { id, params } => {
            let provider = match &state.provider {
                Some(p) => p.clone(),
                None => {
                    connection
                        .send(StreamEvent::Error {
                            id: Some(id),
                            code: "provider_not_configured".to_string(),
                            message: "No text-generation provider is configured".to_string(),
                        })
                        .await;
                    return;
                }
            };
            let kind = match params.task_kind.as_deref() {
                None => TaskKind::Extract,
                Some(raw) => match TaskKind::parse(raw) {
                    Some(k) => k,
                    None => {
                        connection
                            .send(StreamEvent::Error {
                                id: Some(id),
                                code: "invalid_arguments".to_string(),
                                message: format!(
                                    "Unknown task_kind '{}' (expected extract or fill-form)",
                                    raw
                                ),
                            })
                            .await;
                        return;
                    }
                },
            };

            // Connection close cancels an in-flight run at its next step.
            let (cancel_tx, cancel_rx) = watch::channel(false);
            connection.close_hooks.push(move || {
                let _ = cancel_tx.send(true);
            });

            let runner = AgentRunner::new(provider, (*state.tools).clone(), state.tool_context());
            match runner.run(&params.goal, &params.url, kind, cancel_rx).await {
                Ok(outcome) => {
                    let result = match outcome {
                        AgentOutcome::Completed(text) => {
                            json!({"outcome": "completed", "content": text})
                        }
                        AgentOutcome::BudgetExhausted => json!({"outcome": "budget_exhausted"}),
                        AgentOutcome::Cancelled => json!({"outcome": "cancelled"}),
                    };
                    connection.send(StreamEvent::Result { id, result }).await;
                }
                Err(e) => {
                    connection
                        .send(StreamEvent::Error {
                            id: Some(id),
                            code: e.code().to_string(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        }
    }
}

fn extract_session_id(result: &ToolResult) -> Option<String> {
    result.content.iter().find_map(|block| match block {
        ContentBlock::Structured { value } => value
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(max_sessions: usize) -> GatewayState {
        let base = std::env::temp_dir().join("autoapply-gateway-test");
        let mut config = Config::default();
        config.browser.max_sessions = max_sessions;
        GatewayState::new(
            Arc::new(SessionRegistry::new(base.clone(), max_sessions, true)),
            Arc::new(ToolRegistry::with_defaults()),
            None,
            Paths::with_base(base),
            config,
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_post_to_unknown_connection_is_not_found() {
        let app = router(test_state(10));
        let response = app
            .oneshot(
                Request::post("/messages/never-opened")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"method": "tools/list", "id": "r1"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "connection_not_found");
    }

    #[tokio::test]
    async fn test_stream_open_rejected_at_capacity() {
        let app = router(test_state(0));
        let response = app
            .oneshot(Request::get("/sse").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "capacity_exceeded");
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let app = router(test_state(10));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["live_sessions"], 0);
    }

    #[tokio::test]
    async fn test_tools_list_result_pushed_over_stream() {
        let state = test_state(10);
        let mut opened = state.connections.open(None).await;

        process_request(
            &state,
            &opened.connection,
            ProtocolRequest::ToolsList { id: "r1".to_string() },
        )
        .await;

        match opened.rx.recv().await.expect("event") {
            StreamEvent::Result { id, result } => {
                assert_eq!(id, "r1");
                assert_eq!(result["tools"].as_array().map(|a| a.len()), Some(10));
            }
            other => panic!("expected result event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_diagnostic_still_a_result_event() {
        let state = test_state(10);
        let mut opened = state.connections.open(None).await;

        process_request(
            &state,
            &opened.connection,
            ProtocolRequest::ToolsCall {
                id: "r2".to_string(),
                params: crate::protocol::ToolCallParams {
                    name: "navigate".to_string(),
                    arguments: json!({"session_id": "ghost", "url": "https://example.com"}),
                },
            },
        )
        .await;

        // Routing succeeded and the tool executed; its failure is carried
        // inside the envelope, not as a transport error.
        match opened.rx.recv().await.expect("event") {
            StreamEvent::Result { id, result } => {
                assert_eq!(id, "r2");
                assert_eq!(result["status"]["ok"], false);
            }
            other => panic!("expected result event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_run_without_provider_is_error_event() {
        let state = test_state(10);
        let mut opened = state.connections.open(None).await;

        process_request(
            &state,
            &opened.connection,
            ProtocolRequest::AgentRun {
                id: "r3".to_string(),
                params: crate::protocol::AgentRunParams {
                    goal: "extract".to_string(),
                    url: "https://example.com".to_string(),
                    task_kind: None,
                },
            },
        )
        .await;

        match opened.rx.recv().await.expect("event") {
            StreamEvent::Error { id, code, .. } => {
                assert_eq!(id.as_deref(), Some("r3"));
                assert_eq!(code, "provider_not_configured");
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_close_removes_it_from_registry() {
        let state = test_state(10);
        let opened = state.connections.open(None).await;
        register_close_cleanup(&state, &opened.connection);
        opened.connection.bind_session("s1");
        assert_eq!(state.connections.len().await, 1);

        opened.connection.close_hooks.fire();
        // Cleanup runs on a spawned task; yield until it lands.
        for _ in 0..50 {
            if state.connections.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(state.connections.is_empty().await);
        // The bound session was handed to destroy, which is idempotent even
        // though "s1" never actually launched.
        assert!(!state.sessions.contains("s1").await);
    }

    #[tokio::test]
    async fn test_stream_guard_only_fires_for_latest_epoch() {
        let state = test_state(10);
        let first = state.connections.open(Some("c1".to_string())).await;
        let second = state.connections.open(Some("c1".to_string())).await;

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let f = fired.clone();
        second.connection.close_hooks.push(move || {
            f.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        // The stale stream's guard must not tear down the reattached
        // connection.
        drop(StreamGuard {
            connection: first.connection.clone(),
            epoch: first.epoch,
        });
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(StreamGuard {
            connection: second.connection.clone(),
            epoch: second.epoch,
        });
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
