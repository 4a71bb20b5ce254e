//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        ErrorResponse, HealthResponse, HistoryResponse, MergeResponse, SegmentResponse,
        StatusResponse, SummaryJson, status_for,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use neuroproof_core::{
    BodyId, GraphView, HistoryForest, MergeEngine, NeuroError, Segment, SummaryRecord,
    model::{connections_of, synapses_of},
};
use std::sync::Arc;

fn error_response(error: &NeuroError) -> Response {
    (status_for(error), Json(ErrorResponse::from(error))).into_response()
}

fn not_found(what: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::not_found(what))).into_response()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Store version, graph size and the dataset's summary counters.
pub async fn status_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> impl IntoResponse {
    let version = state.store.version();
    let graph = state.store.snapshot();
    let summary = SummaryRecord::load(&*graph, &dataset);

    let response = StatusResponse {
        dataset,
        version,
        node_count: graph.node_count(),
        relationship_count: graph.relationship_count(),
        summary: summary.as_ref().map(SummaryJson::from),
    };

    (StatusCode::OK, Json(response))
}

// =============================================================================
// SEGMENT HANDLER
// =============================================================================

/// A live segment by body id.
pub async fn segment_handler(
    State(state): State<AppState>,
    Path((dataset, body_id)): Path<(String, i64)>,
) -> Response {
    let graph = state.store.snapshot();
    match Segment::load(&*graph, &dataset, BodyId(body_id)) {
        Ok(Some(segment)) => {
            let response = SegmentResponse {
                last_modified: segment.time_stamp.map(|t| t.to_rfc3339()),
                synapses: synapses_of(&*graph, segment.id),
                connections: connections_of(&*graph, segment.id),
                segment,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => not_found(format!("no live segment {} in '{}'", body_id, dataset)),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// HISTORY HANDLER
// =============================================================================

/// Merge provenance of a live segment.
pub async fn history_handler(
    State(state): State<AppState>,
    Path((dataset, body_id)): Path<(String, i64)>,
) -> Response {
    let graph = state.store.snapshot();
    let body_id = BodyId(body_id);
    if graph.segment(&dataset, body_id).is_none() {
        return not_found(format!("no live segment {} in '{}'", body_id, dataset));
    }
    let forest = HistoryForest::for_body(&*graph, &dataset, body_id);
    (StatusCode::OK, Json(HistoryResponse::new(body_id, &forest))).into_response()
}

// =============================================================================
// MERGE HANDLER
// =============================================================================

/// Apply a merge instruction. The body is the instruction JSON.
pub async fn merge_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    body: String,
) -> Response {
    let store = Arc::clone(&state.store);
    let result = tokio::task::spawn_blocking(move || {
        let segment = MergeEngine::merge_from_json(&store, &dataset, &body)?;
        Ok::<_, NeuroError>((segment, store.version()))
    })
    .await
    .map_err(|e| NeuroError::IoError(format!("Merge task failed: {}", e)))
    .and_then(|r| r);

    match result {
        Ok((segment, version)) => (
            StatusCode::OK,
            Json(MergeResponse {
                success: true,
                version,
                segment,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "merge rejected");
            error_response(&e)
        }
    }
}
