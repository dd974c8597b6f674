// 🌐 HTTP API - axum router over the classification engine and memory store
//
// POST /api/classify            multipart: prev, curr (CSV files), client_id; ?format=csv
// POST /api/memory/update       JSON MemoryMapping
// GET  /api/memory/:client_id
// GET  /api/config
// GET  /api/health
//
// Mutating/expensive routes require `Authorization: ApiKey <key>` when a key is configured.

use crate::classifier::ClassificationEngine;
use crate::ingest::{classification_results_csv, read_trial_balance_from_reader};
use crate::models::{ClassificationResult, ClassificationSummary, MemoryMapping};
use crate::normalize::{normalize_name, normalize_optional};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ClassificationEngine>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: ClassificationEngine, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("no API key configured, authentication disabled");
        }
        AppState {
            engine: Arc::new(engine),
            api_key: api_key.map(Arc::from),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return true;
        };

        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("ApiKey "))
            .map(|key| key == expected)
            .unwrap_or(false)
    }
}

/// API Response wrapper
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

#[derive(Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub summary: ClassificationSummary,
    pub results: Vec<ClassificationResult>,
}

#[derive(Serialize, Deserialize)]
pub struct MemoryResponse {
    pub client_id: String,
    pub count: usize,
    pub mappings: Vec<MemoryMapping>,
}

#[derive(Deserialize)]
pub struct ClassifyQuery {
    format: Option<String>,
}

/// Memory update payload; `source` and `updated_at` are filled in when absent
#[derive(Deserialize)]
pub struct MemoryUpdateRequest {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    name_norm: String,
    #[serde(default)]
    parent_norm: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/classify", post(classify))
        .route("/memory/update", post(update_memory))
        .route("/memory/:client_id", get(get_memory))
        .route("/config", get(get_config))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/classify - Classify current-only accounts from two uploaded trial balances
async fn classify(
    State(state): State<AppState>,
    Query(query): Query<ClassifyQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !state.authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
    }

    let mut prev: Option<Vec<u8>> = None;
    let mut curr: Option<Vec<u8>> = None;
    let mut client_id = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid form data: {}", e)),
        };

        let name = field.name().unwrap_or_default().to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid form field '{}': {}", name, e)),
        };

        match name.as_str() {
            "prev" => prev = Some(bytes.to_vec()),
            "curr" => curr = Some(bytes.to_vec()),
            "client_id" => client_id = String::from_utf8_lossy(&bytes).trim().to_string(),
            _ => {}
        }
    }

    let (Some(prev), Some(curr)) = (prev, curr) else {
        return failure(StatusCode::BAD_REQUEST, "Missing required fields: prev, curr, client_id");
    };
    if client_id.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing required fields: prev, curr, client_id");
    }

    let engine = Arc::clone(&state.engine);
    let task_client = client_id.clone();
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ClassificationResult>> {
        let previous = read_trial_balance_from_reader(prev.as_slice(), "prev")?;
        let current = read_trial_balance_from_reader(curr.as_slice(), "curr")?;
        Ok(engine.classify(&previous, &current, &task_client))
    })
    .await;

    let results = match outcome {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => return failure(StatusCode::BAD_REQUEST, format!("{:#}", e)),
        Err(e) => {
            error!("classification task failed: {}", e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Classification failed");
        }
    };

    let summary = state.engine.summarize(&client_id, &results);
    info!(
        client_id = %client_id,
        run_id = %summary.run_id,
        total = summary.total,
        "classify request served"
    );

    if query.format.as_deref() == Some("csv") {
        return match classification_results_csv(&results) {
            Ok(bytes) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"NewAccounts.csv\""),
                ],
                bytes,
            )
                .into_response(),
            Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        };
    }

    (StatusCode::OK, Json(ApiResponse::ok(ClassifyResponse { summary, results }))).into_response()
}

/// POST /api/memory/update - Record a confirmed mapping
async fn update_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MemoryUpdateRequest>,
) -> Response {
    if !state.authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
    }

    // Callers may send display names; keys are always stored normalized
    let name_norm = normalize_name(&request.name_norm);
    let parent_norm = normalize_optional(request.parent_norm.as_deref());

    if request.client_id.is_empty() || name_norm.is_empty() || request.category.is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing required fields: client_id, name_norm, category",
        );
    }

    let mut mapping = MemoryMapping::new(
        &request.client_id,
        &name_norm,
        parent_norm.as_deref(),
        &request.category,
        request.source.as_deref().filter(|s| !s.is_empty()).unwrap_or("api"),
    );
    if let Some(updated_at) = request.updated_at {
        mapping.updated_at = updated_at;
    }

    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || engine.memory().upsert(mapping)).await;

    match outcome {
        Ok(Ok(())) => (StatusCode::OK, Json(ApiResponse::ok("Memory updated successfully"))).into_response(),
        Ok(Err(e)) => {
            error!("memory update failed: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
        Err(e) => {
            error!("memory update task failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Memory update failed")
        }
    }
}

/// GET /api/memory/:client_id - All mappings for a client
async fn get_memory(State(state): State<AppState>, Path(client_id): Path<String>) -> Response {
    let engine = Arc::clone(&state.engine);
    let lookup_client = client_id.clone();
    let mappings = tokio::task::spawn_blocking(move || engine.memory().load(&lookup_client))
        .await
        .unwrap_or_default();

    let response = MemoryResponse {
        client_id,
        count: mappings.len(),
        mappings,
    };
    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// GET /api/config - Effective classification config
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.engine.config().clone()))
}

// ============================================================================
// TESTS
// ============================================================================
