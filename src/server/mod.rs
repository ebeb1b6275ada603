//! HTTP and WebSocket surface of the strideOS backend.
//!
//! - `GET /health`: health check (no auth)
//! - `PUT /sections/{section_id}/content`: replace a section's content
//! - `GET /sections/{section_id}/content`: read a section's content
//! - `GET /collab/{document_id}`: WebSocket relay between a document's peers

pub mod auth;
pub mod collab;
pub mod storage;

pub use auth::{ApiKeyStore, AuthClient, KeyConfigError};
pub use collab::{CollabFrame, CollabHub};
pub use storage::{SectionStore, SectionStoreError, StoredSection};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use auth::{auth_middleware, ErrorBody};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: SectionStore,
    pub hub: Arc<CollabHub>,
    pub api_keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(store: SectionStore, api_keys: ApiKeyStore) -> Self {
        Self {
            store,
            hub: Arc::new(CollabHub::new()),
            api_keys: Arc::new(api_keys),
        }
    }
}

/// Builds the router. Section routes require a key when any are configured.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/collab/{document_id}", get(collab_socket));

    let protected_routes = Router::new()
        .route(
            "/sections/{section_id}/content",
            put(put_content).get(get_content),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Errors
// ============================================================================

/// Handler error mapped to a JSON response
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Store(SectionStoreError),
}

impl From<SectionStoreError> for ApiError {
    fn from(e: SectionStoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(section_id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No content stored for section {}", section_id),
            ),
            ApiError::Store(e @ SectionStoreError::InvalidSectionId(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_section_id", e.to_string())
            }
            ApiError::Store(e) => {
                tracing::error!("Section store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    e.to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct UpdateContentRequest {
    content: Value,
}

#[derive(Debug, Serialize)]
struct UpdateContentResponse {
    section_id: String,
    updated_at: DateTime<Utc>,
    digest: String,
}

#[derive(Debug, Serialize)]
struct SectionContentResponse {
    section_id: String,
    content: Value,
    updated_at: DateTime<Utc>,
    digest: String,
}

async fn put_content(
    State(state): State<AppState>,
    Path(section_id): Path<String>,
    client: Option<Extension<AuthClient>>,
    Json(body): Json<UpdateContentRequest>,
) -> Result<Json<UpdateContentResponse>, ApiError> {
    let stored = state.store.upsert(&section_id, &body.content).await?;

    let client = client.map_or_else(|| "anonymous".to_string(), |Extension(c)| c.client);
    tracing::debug!(
        section_id = %stored.section_id,
        digest = %stored.digest,
        %client,
        "section content updated"
    );

    Ok(Json(UpdateContentResponse {
        section_id: stored.section_id,
        updated_at: stored.updated_at,
        digest: stored.digest,
    }))
}

async fn get_content(
    State(state): State<AppState>,
    Path(section_id): Path<String>,
) -> Result<Json<SectionContentResponse>, ApiError> {
    let Some(stored) = state.store.get(&section_id).await? else {
        return Err(ApiError::NotFound(section_id));
    };

    Ok(Json(SectionContentResponse {
        section_id: stored.section_id,
        content: stored.content,
        updated_at: stored.updated_at,
        digest: stored.digest,
    }))
}

async fn collab_socket(
    ws: WebSocketUpgrade,
    Path(document_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| collab::handle_socket(socket, state.hub, document_id))
}

#[cfg(test)]
mod tests;
