//! API Server module
//!
//! This module exposes a [`Core`] over HTTP so a host UI (or the CLI) can feed it
//! host events and drive drag-and-drop operations.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::models::{ContextId, HierarchyError, ItemDescriptor, NodeId};
use crate::session::{Core, HostEvent};

/// Host item list for activate and sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsRequest {
    pub items: Vec<ItemDescriptor>,
}

/// Request to move a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub node: NodeId,
    #[serde(default)]
    pub from_index: usize,
    pub to_index: usize,
    /// Destination parent, `None` for the top level
    #[serde(default)]
    pub parent: Option<NodeId>,
}

/// Request to drop a node onto another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestRequest {
    pub node: NodeId,
    pub target: NodeId,
}

/// Request to flip a node's collapsed flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub node: NodeId,
    pub collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextsResponse {
    pub active: Option<ContextId>,
    pub contexts: Vec<ContextId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    /// Only stream changes for this context
    pub context: Option<ContextId>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// HTTP status for a rejected tree operation
pub fn status_for(error: &HierarchyError) -> StatusCode {
    match error {
        HierarchyError::NotFound(_) => StatusCode::NOT_FOUND,
        HierarchyError::Cycle { .. } | HierarchyError::Duplicate(_) => StatusCode::CONFLICT,
        HierarchyError::NestingTooDeep { .. } | HierarchyError::ReservedIdentifier(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        HierarchyError::MalformedTree(_) => StatusCode::BAD_REQUEST,
        HierarchyError::CorruptionDetected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Helper function to map Core results to Axum responses
fn map_core_result_to_response<T: Serialize>(result: Result<T, HierarchyError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => (status_for(&e), Json(ApiResponse::<T>::error(e.to_string()))).into_response(),
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    map_core_result_to_response(Ok(data))
}

/// Builds the application router over `core`
pub fn router(core: Core) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/contexts", get(list_contexts_handler))
        .route("/api/contexts/:ctx", axum::routing::delete(evict_handler))
        .route("/api/contexts/:ctx/activate", post(activate_handler))
        .route("/api/contexts/:ctx/items", post(sync_handler))
        .route("/api/contexts/:ctx/tree", get(tree_handler))
        .route(
            "/api/contexts/:ctx/projection",
            get(projection_handler).post(arrange_handler),
        )
        .route("/api/contexts/:ctx/move", post(move_handler))
        .route("/api/contexts/:ctx/nest", post(nest_handler))
        .route("/api/contexts/:ctx/toggle", post(toggle_handler))
        .route("/api/settings", get(settings_handler))
        .route("/api/history", get(history_handler))
        .route("/api/events", get(events_handler))
        .layer(cors)
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(core);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Context Handlers --- //

async fn list_contexts_handler(State(core): State<Core>) -> impl IntoResponse {
    ok(ContextsResponse {
        active: core.active_context(),
        contexts: core.contexts(),
    })
}

async fn activate_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<ItemsRequest>,
) -> impl IntoResponse {
    ok(core.handle(HostEvent::ContextSwitched {
        context: ctx,
        items: payload.items,
    }))
}

async fn sync_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<ItemsRequest>,
) -> impl IntoResponse {
    ok(core.handle(HostEvent::ListChanged {
        context: ctx,
        items: payload.items,
    }))
}

async fn evict_handler(State(core): State<Core>, Path(ctx): Path<ContextId>) -> impl IntoResponse {
    if core.evict(&ctx) {
        ok(ctx)
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<ContextId>::error(format!(
                "Context '{}' not found",
                ctx
            ))),
        )
            .into_response()
    }
}

// --- Tree Handlers --- //

async fn tree_handler(State(core): State<Core>, Path(ctx): Path<ContextId>) -> impl IntoResponse {
    ok(core.persisted(&ctx))
}

async fn projection_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
) -> impl IntoResponse {
    ok(core.project(&ctx))
}

async fn arrange_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<ItemsRequest>,
) -> impl IntoResponse {
    ok(core.arrange(&ctx, &payload.items))
}

async fn move_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<MoveRequest>,
) -> impl IntoResponse {
    let result = core.move_node(
        &ctx,
        &payload.node,
        payload.from_index,
        payload.to_index,
        payload.parent.as_deref(),
    );
    map_core_result_to_response(result)
}

async fn nest_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<NestRequest>,
) -> impl IntoResponse {
    map_core_result_to_response(core.nest_node(&ctx, &payload.node, &payload.target))
}

async fn toggle_handler(
    State(core): State<Core>,
    Path(ctx): Path<ContextId>,
    Json(payload): Json<ToggleRequest>,
) -> impl IntoResponse {
    let result = core
        .toggle_collapse(&ctx, &payload.node)
        .map(|collapsed| ToggleResponse {
            node: payload.node.clone(),
            collapsed,
        });
    map_core_result_to_response(result)
}

// --- Session Handlers --- //

async fn settings_handler(State(core): State<Core>) -> impl IntoResponse {
    ok(core.settings())
}

async fn history_handler(State(core): State<Core>) -> impl IntoResponse {
    ok(core.history())
}

// --- Event Handlers --- //

async fn events_handler(
    State(core): State<Core>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let receiver = core.subscribe();
    let stream = EventStream::new(receiver, query.context);

    // Set headers for event stream
    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

/// Server-sent events, one `update` per changed context
struct EventStream {
    receiver: tokio::sync::broadcast::Receiver<ContextId>,
    context: Option<ContextId>,
}

impl EventStream {
    fn new(
        receiver: tokio::sync::broadcast::Receiver<ContextId>,
        context: Option<ContextId>,
    ) -> Self {
        Self { receiver, context }
    }

    fn wants(&self, changed: &str) -> bool {
        self.context.as_deref().map_or(true, |ctx| ctx == changed)
    }
}

fn update_event(context: &str) -> String {
    format!("event: update\ndata: {}\n\n", context)
}

/// Tells an unfiltered subscriber it missed updates and should refetch everything
fn resync_event(skipped: u64) -> String {
    format!("event: resync\ndata: {}\n\n", skipped)
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.receiver.try_recv() {
                Ok(changed) if self.wants(&changed) => {
                    return Poll::Ready(Some(Ok(update_event(&changed))));
                }
                // Someone else's context, keep draining
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {
                    // Nothing yet; wake again shortly
                    let waker = cx.waker().clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        waker.wake();
                    });
                    return Poll::Pending;
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged by {} messages", skipped);
                    let event = match &self.context {
                        Some(context) => update_event(context),
                        None => resync_event(skipped),
                    };
                    return Poll::Ready(Some(Ok(event)));
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Closed) => {
                    return Poll::Ready(None);
                }
            }
        }
    }
}
