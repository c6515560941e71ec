//! HTTP routes for install and authorization

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};

use crate::error::error_kind;
use crate::mcp::auth::flow::CallbackParams;
use crate::mcp::auth::store::SessionId;
use crate::server::session::session_layer;
use crate::server::AppState;

const NDJSON: &str = "application/x-ndjson";

/// Create the installer router.
///
/// Routes under `/auth` are bound to a session cookie; `/health` and
/// `/api/servers` are not.
pub fn create_router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/auth/discover", post(discover))
        .route("/auth/install", post(install))
        .route("/auth/start", get(start))
        .route("/auth/callback", get(callback))
        .route("/auth/status", get(status))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_layer));

    Router::new()
        .merge(auth)
        .route("/health", get(health))
        .route("/api/servers", get(list_servers))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                        info!(status = %response.status(), latency = ?latency, "response");
                    },
                ),
        )
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = std::result::Result<T, (StatusCode, Json<ApiError>)>;

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "bad_request")))
    }

    /// Maps an installer error to its status and body.
    fn from_error(err: &anyhow::Error) -> (StatusCode, Json<Self>) {
        let code = error_kind(err);
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!("{} ({}): {:#}", status, code, err);
        } else {
            tracing::debug!("{} ({}): {}", status, code, err);
        }
        (status, Json(Self::new(err.to_string(), code)))
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "validation" | "no_transaction" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "not_authorized" => StatusCode::UNAUTHORIZED,
        "metadata_fetch" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// Global endpoints
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.catalog.clone())
}

// =============================================================================
// Install endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
    #[serde(default)]
    address: Option<String>,
}

/// Streams discovery and registration progress as NDJSON.
///
/// Surrounding whitespace is stripped from `address`; the trimmed value is
/// then compared exactly against the metadata `resource`.
async fn discover(
    State(state): State<AppState>,
    Json(req): Json<DiscoverRequest>,
) -> ApiResult<Response> {
    let address = req
        .address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing address"))?;

    let lines = state.manager.discover(&address).map(|event| {
        serde_json::to_vec(&event).map(|mut line| {
            line.push(b'\n');
            Bytes::from(line)
        })
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON), (header::CACHE_CONTROL, "no-cache")],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Stores the registration the browser chose to install.
async fn install(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    state
        .manager
        .install(&session, payload)
        .await
        .map_err(|e| ApiError::from_error(&e))?;
    Ok(Json(serde_json::json!({ "message": "ok" })))
}

// =============================================================================
// Authorization endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    #[serde(default)]
    resource: Option<String>,
}

impl ResourceQuery {
    fn required(self) -> ApiResult<String> {
        self.resource
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing resource parameter"))
    }
}

async fn start(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<Redirect> {
    let resource = query.required()?;
    let url = state
        .manager
        .begin_authorization(&session, &resource)
        .await
        .map_err(|e| ApiError::from_error(&e))?;
    Ok(Redirect::to(url.as_str()))
}

async fn callback(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Redirect> {
    let (resource, _) = state
        .manager
        .complete_authorization(&session, params)
        .await
        .map_err(|e| ApiError::from_error(&e))?;
    info!("Authorized {} in session {}", resource, session);
    Ok(Redirect::to(&state.config.server.home_path))
}

async fn status(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<impl IntoResponse> {
    let resource = query.required()?;
    let status = state
        .manager
        .status(&session, &resource)
        .await
        .map_err(|e| ApiError::from_error(&e))?;
    Ok(Json(status))
}
