//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{debug, error, info};

use super::chat::{self, ChatIntent};
use super::streaming::{
    chat_stream_response, deferred_event_response, named_event, single_event_response,
};
use crate::auth::AuthManager;
use crate::cluster::ClusterRegistry;
use crate::config::Config;
use crate::protocol::{
    ApiErrorResponse, CallToolParams, ChatCompletion, ChatCompletionRequest, CompletionPayload,
    HealthResponse, LIST_TOOLS, ToolDescriptor, ToolsListResult,
};
use crate::tool::builtin::register_builtin_tools;
use crate::tool::{
    FilterPolicy, ToolContext, ToolDefinition, ToolError, ToolErrorKind, ToolRegistry, ToolResult,
};
use crate::upstream::UpstreamClient;
use crate::upstream::pool::ConnectionPool;
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Tool catalogue
    pub registry: Arc<ToolRegistry>,
    /// Admission policy
    pub filter: Arc<FilterPolicy>,
    /// Handler dependencies
    pub ctx: ToolContext,
    /// Request timeout
    pub request_timeout: Duration,
    /// Maximum inbound body size in bytes
    pub max_body_size: usize,
    /// SSE keep-alive interval
    pub sse_keep_alive: Duration,
}

impl AppState {
    /// Build the full component graph from configuration.
    ///
    /// `extra_tools` are registered after the built-in catalogue; a name
    /// collision fails startup.
    pub fn from_config(config: &Config, extra_tools: Vec<ToolDefinition>) -> Result<Self> {
        let clusters = Arc::new(ClusterRegistry::new(config.clusters.clone())?);
        let pool = Arc::new(ConnectionPool::new(&clusters)?);
        let auth = Arc::new(AuthManager::new(
            Arc::clone(&clusters),
            Arc::clone(&pool),
            &config.auth,
        ));
        let upstream = Arc::new(UpstreamClient::new(
            Arc::clone(&clusters),
            pool,
            Arc::clone(&auth),
        ));
        let filter = FilterPolicy::from_config(&config.filter)?;

        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry)?;
        for tool in extra_tools {
            registry.register(tool)?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            filter: Arc::new(filter),
            ctx: ToolContext {
                clusters,
                auth,
                upstream,
                output: config.output.clone(),
            },
            request_timeout: config.server.request_timeout,
            max_body_size: config.server.max_body_size,
            sse_keep_alive: config.server.sse_keep_alive,
        })
    }

    /// Tools that pass the filter, in registration order
    #[must_use]
    pub fn visible_tools(&self) -> Vec<ToolDescriptor> {
        self.registry
            .list()
            .filter(|t| self.filter.is_visible(t))
            .map(ToolDescriptor::from)
            .collect()
    }

    /// Filter check, then validated invocation.
    ///
    /// Denied and unknown tools come back as failed results; `Err` is
    /// reserved for failures outside the invocation taxonomy.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        if let Ok(tool) = self.registry.get(name) {
            if let Err(e) = self.filter.check(tool) {
                return Ok(ToolResult::failure(ToolError::new(
                    ToolErrorKind::FilterDenied,
                    e.to_string(),
                )));
            }
        }
        self.registry.invoke(name, arguments, &self.ctx).await
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = state.request_timeout;
    let max_body_size = state.max_body_size;

    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/call", post(call_tool_handler))
        .route("/messages", post(messages_handler))
        .route("/sse", get(sse_handler))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler. Never probes upstream clusters.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

async fn list_tools_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tools = state.visible_tools();
    debug!(visible = tools.len(), total = state.registry.len(), "Tool discovery");
    Json(ToolsListResult { tools })
}

async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CallToolParams>, JsonRejection>,
) -> Response {
    let Json(params) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    info!(tool = %params.name, "Tool call");
    match state.call_tool(&params.name, params.arguments).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => server_error(&e),
    }
}

/// POST /messages, OpenAI chat-completions framing
async fn messages_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    let intent = match chat::resolve(&request) {
        Ok(intent) => intent,
        Err(e) => return invalid_request(e.to_string()),
    };

    let payload = match intent {
        ChatIntent::ListTools => CompletionPayload::Tools(state.visible_tools()),
        ChatIntent::Call { name, arguments } => {
            info!(tool = %name, stream = request.stream, "Chat tool call");
            match state.call_tool(&name, arguments).await {
                Ok(result) => CompletionPayload::Result(result),
                Err(e) => return server_error(&e),
            }
        }
    };

    let completion = ChatCompletion::new(request.model.as_deref(), payload);
    if request.stream {
        chat_stream_response(completion.into_chunk(), state.sse_keep_alive).into_response()
    } else {
        Json(completion).into_response()
    }
}

/// Query string of `GET /sse`
#[derive(Debug, Default, Deserialize)]
pub struct SseParams {
    /// Tool to invoke; discovery when absent
    pub tool: Option<String>,
    /// JSON-encoded arguments object
    pub arguments: Option<String>,
    /// `list_tools` forces discovery
    pub message: Option<String>,
}

/// GET /sse, one terminal event per request
async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SseParams>,
) -> Response {
    let keep_alive = state.sse_keep_alive;

    let tool = match params.tool {
        Some(tool) if params.message.as_deref() != Some(LIST_TOOLS) => tool,
        _ => {
            let tools = ToolsListResult {
                tools: state.visible_tools(),
            };
            return single_event_response("tools", &tools, keep_alive).into_response();
        }
    };

    let arguments = match params.arguments.as_deref().map(str::trim) {
        None | Some("") => json!({}),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => return invalid_request(format!("Invalid 'arguments' JSON: {e}")),
        },
    };

    info!(tool = %tool, "SSE tool call");
    let pending = async move {
        match state.call_tool(&tool, arguments).await {
            Ok(result) => named_event("result", &result),
            Err(e) => {
                error!(tool = %tool, error = %e, "SSE tool call failed");
                named_event("error", &ApiErrorResponse::server_error(e.to_string()))
            }
        }
    };

    deferred_event_response(pending, keep_alive).into_response()
}

fn invalid_request(message: impl Into<String>) -> Response {
    let message = message.into();
    debug!(error = %message, "Rejected request");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::invalid_request(message)),
    )
        .into_response()
}

fn server_error(err: &Error) -> Response {
    error!(error = %err, "Request failed");
    (
        err.status_code(),
        Json(ApiErrorResponse::server_error(err.to_string())),
    )
        .into_response()
}
