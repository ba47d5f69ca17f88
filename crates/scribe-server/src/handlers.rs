//! Route handlers for the HTTP API.
//!
//! Validation failures come back as `{"error": ...}` bodies with a 4xx
//! status; engine failures map to 404 (unknown dataset) or 500.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use scribe_core::{QueryRequest, SessionId};
use scribe_engine::EngineError;
use scribe_store::{describe_database, table_counts, StoreError};

use crate::server::AppState;

/// Body accepted by `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    tenant_id: Option<i64>,
    #[serde(default)]
    dataset_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// `POST /query`: run one question through the agent workflow.
pub async fn run_query(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let question = match body.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return bad_request("Question is required"),
    };
    let tenant_id = match body.tenant_id {
        None => return bad_request("Tenant ID is required"),
        Some(id) if id <= 0 => return bad_request("Tenant ID must be a positive integer"),
        Some(id) => id,
    };

    // A missing session id starts a fresh conversation.
    let session_id = match body.session_id {
        Some(raw) if !raw.trim().is_empty() => SessionId::from_raw(raw),
        _ => SessionId::new(),
    };

    let mut request = QueryRequest::new(question, session_id, tenant_id);
    if let Some(dataset_id) = body.dataset_id {
        request = request.with_dataset(dataset_id);
    }

    match state.engine.run(request).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(EngineError::Store(StoreError::NotFound(what))) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Not found: {what}") })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "query run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /health`: database connectivity, row counts, and provider status.
pub async fn health(State(state): State<AppState>) -> Response {
    let catalog = state.engine.catalog();

    let mut datasets = serde_json::Map::new();
    let mut healthy = true;
    for id in catalog.ids() {
        let entry = match catalog.get(Some(&id)).and_then(|d| table_counts(d.db())) {
            Ok(counts) => json!({ "database": "connected", "tables": counts }),
            Err(e) => {
                healthy = false;
                json!({ "database": "error", "error": e.to_string() })
            }
        };
        datasets.insert(id, entry);
    }

    let mut body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "provider": {
            "name": state.engine.provider_name(),
            "model": state.engine.provider_model(),
        },
        "sessions": state.engine.sessions().len(),
        "datasets": datasets,
    });
    if let Some(metrics) = &state.metrics {
        if let Ok(report) = serde_json::to_value(metrics.report()) {
            body["metrics"] = report;
        }
    }

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// Query parameters for `GET /schema`.
#[derive(Debug, Deserialize)]
pub struct SchemaParams {
    #[serde(default)]
    dataset: Option<String>,
}

/// `GET /schema`: the introspected schema text for one dataset.
pub async fn schema(State(state): State<AppState>, Query(params): Query<SchemaParams>) -> Response {
    let dataset = match state.engine.catalog().get(params.dataset.as_deref()) {
        Ok(dataset) => dataset,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    match describe_database(dataset.db()) {
        Ok(text) => (
            StatusCode::OK,
            Json(json!({ "dataset": dataset.config().id, "schema": text })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "schema introspection failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /datasets`: catalog listing.
pub async fn datasets(State(state): State<AppState>) -> Response {
    let catalog = state.engine.catalog();
    let list = catalog.list();
    let count = list.len();
    (
        StatusCode::OK,
        Json(json!({
            "datasets": list,
            "count": count,
            "default": catalog.default_id(),
        })),
    )
        .into_response()
}

/// `DELETE /sessions/{id}`: drop one session and its history.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session_id = SessionId::from_raw(id);
    let deleted = state.engine.sessions().remove(&session_id);
    let code = if deleted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (code, Json(json!({ "deleted": deleted }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}
