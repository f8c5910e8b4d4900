//! Evaluator session endpoints: seating, next sample, progress

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::engine::{NextSample, ProductTypeProgress};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub event_id: Uuid,
    pub evaluator_id: Uuid,
    pub position: u8,
}

/// POST /api/events/:event_id/evaluators/:evaluator_id
pub async fn register_evaluator(
    State(state): State<AppState>,
    Path((event_id, evaluator_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let position = state
        .engine
        .register_evaluator(event_id, evaluator_id)
        .await?;
    Ok(Json(RegisterResponse {
        event_id,
        evaluator_id,
        position: position.get(),
    }))
}

/// Query parameters for the next-sample lookup
#[derive(Debug, Deserialize)]
pub struct NextQuery {
    /// Restrict resolution to one product type
    pub product_type: Option<Uuid>,
}

/// GET /api/events/:event_id/evaluators/:evaluator_id/next
///
/// The completed set is always read from the store, so a retried request
/// never serves a sample that was accepted in the meantime.
pub async fn next_sample(
    State(state): State<AppState>,
    Path((event_id, evaluator_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<NextQuery>,
) -> Result<Json<NextSample>, ApiError> {
    let next = state
        .engine
        .resolve_next_sample(evaluator_id, event_id, query.product_type, None)
        .await?;
    Ok(Json(next))
}

/// GET /api/events/:event_id/evaluators/:evaluator_id/progress
pub async fn evaluator_progress(
    State(state): State<AppState>,
    Path((event_id, evaluator_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<ProductTypeProgress>>, ApiError> {
    let progress = state
        .engine
        .evaluator_progress(event_id, evaluator_id)
        .await?;
    Ok(Json(progress))
}
