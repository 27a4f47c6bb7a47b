//! Entity API endpoints
//!
//! Provides REST API endpoints for schema extraction and storage:
//! - POST /api/gpt/parse-entity - Extract a candidate schema from a query (not saved)
//! - GET /api/entities - List stored tables
//! - POST /api/entities - Merge tables into the store
//! - GET /api/entities/{name} - Get one stored table
//! - DELETE /api/entities/{name} - Delete a stored table
//! - GET /api/graph - Layout of the stored schema
//! - POST /api/graph - Layout of a posted schema

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::ai_api::{ParseError, ParseOrchestrator};
use crate::core::auto_layout::{LayoutGraph, layout_schema};
use crate::core::schema::{Entity, Schema};
use crate::core::store::{EntityStore, StoreError};

/// Entity API state containing the store and the parse orchestrator
#[derive(Clone)]
pub struct EntityApiState {
    pub store: EntityStore,
    pub parser: ParseOrchestrator,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Entity API error types
#[derive(Debug, thiserror::Error)]
pub enum EntityApiError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Entity with name \"{0}\" not found")]
    NotFound(String),

    #[error("Schema extraction failed: {0}")]
    UpstreamParse(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Storage(String),
}

impl From<StoreError> for EntityApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(_) => EntityApiError::Validation(err.to_string()),
            StoreError::NotFound(name) => EntityApiError::NotFound(name),
            other => {
                tracing::error!("Entity store failure: {}", other);
                EntityApiError::Storage(other.to_string())
            }
        }
    }
}

impl From<ParseError> for EntityApiError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MissingApiKey => EntityApiError::Unavailable(err.to_string()),
            other => {
                tracing::warn!("Schema extraction failed: {}", other);
                EntityApiError::UpstreamParse(other.to_string())
            }
        }
    }
}

impl IntoResponse for EntityApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            EntityApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            EntityApiError::NotFound(_) => (StatusCode::NOT_FOUND, "ENTITY_NOT_FOUND"),
            EntityApiError::UpstreamParse(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_PARSE_ERROR"),
            EntityApiError::Unavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "LLM_NOT_CONFIGURED")
            }
            EntityApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        let body = ApiError::new(self.to_string(), code);

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request for extracting a schema
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Response for a save
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub message: String,
    pub tables: Vec<Entity>,
}

/// Generic message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Pull the `tables` array out of a request body and check each entry's shape
///
/// Nothing is processed when any entry is malformed.
pub fn tables_from_body(body: &Value) -> Result<Vec<Entity>, EntityApiError> {
    let tables = body
        .get("tables")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EntityApiError::Validation("Tables data is required and should be an array.".into())
        })?;

    tables
        .iter()
        .enumerate()
        .map(|(i, table)| {
            serde_json::from_value(table.clone())
                .map_err(|e| EntityApiError::Validation(format!("tables[{}]: {}", i, e)))
        })
        .collect()
}

// ============================================================================
// Router
// ============================================================================

/// Create the entity API router
pub fn entity_api_router(state: EntityApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/gpt/parse-entity", post(parse_entity_handler))
        .route(
            "/api/entities",
            get(list_entities_handler).post(save_entities_handler),
        )
        .route(
            "/api/entities/{name}",
            get(get_entity_handler).delete(delete_entity_handler),
        )
        .route(
            "/api/graph",
            get(stored_graph_handler).post(layout_graph_handler),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/gpt/parse-entity
/// Extract a candidate schema; the result is returned for review, not saved
async fn parse_entity_handler(
    State(state): State<Arc<EntityApiState>>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<Schema>, EntityApiError> {
    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| EntityApiError::Validation("Prompt is required".into()))?;

    let schema = state.parser.parse(&prompt).await?;

    Ok(Json(schema))
}

/// GET /api/entities
async fn list_entities_handler(
    State(state): State<Arc<EntityApiState>>,
) -> Result<Json<Vec<Entity>>, EntityApiError> {
    let tables = state.store.get_all().await?;

    tracing::debug!("Listing {} stored table(s)", tables.len());

    Ok(Json(tables))
}

/// POST /api/entities
/// Merge every posted table into its stored record
async fn save_entities_handler(
    State(state): State<Arc<EntityApiState>>,
    Json(body): Json<Value>,
) -> Result<Json<SaveResponse>, EntityApiError> {
    let tables = tables_from_body(&body)?;

    tracing::info!("Saving {} table(s)", tables.len());

    let saved = state.store.upsert_all(&tables).await?;

    Ok(Json(SaveResponse {
        message: "Entity saved successfully.".to_string(),
        tables: saved,
    }))
}

/// GET /api/entities/{name}
async fn get_entity_handler(
    State(state): State<Arc<EntityApiState>>,
    Path(name): Path<String>,
) -> Result<Json<Entity>, EntityApiError> {
    Ok(Json(state.store.get(&name).await?))
}

/// DELETE /api/entities/{name}
async fn delete_entity_handler(
    State(state): State<Arc<EntityApiState>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, EntityApiError> {
    state.store.delete(&name).await?;

    Ok(Json(MessageResponse {
        message: format!("Entity \"{}\" deleted successfully.", name),
    }))
}

/// GET /api/graph
/// Layout of everything currently stored
async fn stored_graph_handler(
    State(state): State<Arc<EntityApiState>>,
) -> Result<Json<LayoutGraph>, EntityApiError> {
    let schema = Schema::new(state.store.get_all().await?);

    Ok(Json(layout_schema(&schema)))
}

/// POST /api/graph
/// Layout of a posted schema, e.g. a candidate that has not been saved yet
async fn layout_graph_handler(Json(body): Json<Value>) -> Result<Json<LayoutGraph>, EntityApiError> {
    let schema = Schema::new(tables_from_body(&body)?);

    Ok(Json(layout_schema(&schema)))
}
