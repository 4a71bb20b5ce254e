//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use axum::http::StatusCode;
use neuroproof_core::{
    BodyId, ConnectionView, HistoryForest, HistoryRecord, NeuroError, Segment, SummaryRecord,
    SynapseView,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable error kind, e.g. `already_merged`.
    pub kind: String,
    pub retryable: bool,
}

impl ErrorResponse {
    #[must_use]
    pub fn not_found(what: String) -> Self {
        Self {
            error: what,
            kind: "not_found".to_string(),
            retryable: false,
        }
    }
}

impl From<&NeuroError> for ErrorResponse {
    fn from(error: &NeuroError) -> Self {
        Self {
            error: error.to_string(),
            kind: error.kind().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// HTTP status of a failed core operation.
#[must_use]
pub fn status_for(error: &NeuroError) -> StatusCode {
    match error {
        NeuroError::InvalidMergeInstruction(_) => StatusCode::BAD_REQUEST,
        NeuroError::AlreadyMerged(_) | NeuroError::ConcurrentModification(_) => {
            StatusCode::CONFLICT
        }
        NeuroError::MalformedAggregate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        NeuroError::NodeNotFound(_) | NeuroError::RelationshipNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        NeuroError::ConstraintViolation(_)
        | NeuroError::SerializationError(_)
        | NeuroError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Dataset summary counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryJson {
    pub total_synapse_count: i64,
    pub total_pre_count: i64,
    pub total_post_count: i64,
    pub total_connection_count: i64,
    /// RFC 3339.
    pub last_database_edit: Option<String>,
    pub pre_hp_threshold: f64,
    pub post_hp_threshold: f64,
}

impl From<&SummaryRecord> for SummaryJson {
    fn from(summary: &SummaryRecord) -> Self {
        Self {
            total_synapse_count: summary.total_synapse_count,
            total_pre_count: summary.total_pre_count,
            total_post_count: summary.total_post_count,
            total_connection_count: summary.total_connection_count,
            last_database_edit: summary.last_database_edit.map(|t| t.to_rfc3339()),
            pre_hp_threshold: summary.thresholds.pre,
            post_hp_threshold: summary.thresholds.post,
        }
    }
}

/// Store and dataset status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub dataset: String,
    pub version: u64,
    pub node_count: usize,
    pub relationship_count: usize,
    pub summary: Option<SummaryJson>,
}

// =============================================================================
// SEGMENT RESPONSE
// =============================================================================

/// A live segment with its synapses and connections.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentResponse {
    pub segment: Segment,
    /// RFC 3339 rendering of `segment.time_stamp`.
    pub last_modified: Option<String>,
    pub synapses: Vec<SynapseView>,
    pub connections: Vec<ConnectionView>,
}

// =============================================================================
// HISTORY RESPONSE
// =============================================================================

/// Merge provenance of a body.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub body_id: BodyId,
    pub depth: usize,
    pub merged_body_ids: Vec<BodyId>,
    /// Latest event first.
    pub events: Vec<HistoryRecord>,
}

impl HistoryResponse {
    #[must_use]
    pub fn new(body_id: BodyId, forest: &HistoryForest) -> Self {
        Self {
            body_id,
            depth: forest.depth(),
            merged_body_ids: forest.merged_body_ids().into_iter().collect(),
            events: forest.records().cloned().collect(),
        }
    }
}

// =============================================================================
// MERGE RESPONSE
// =============================================================================

/// Result of an applied merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResponse {
    pub success: bool,
    pub version: u64,
    pub segment: Segment,
}
