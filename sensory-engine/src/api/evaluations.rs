//! Evaluation submission endpoint

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiError;
use crate::engine::SubmissionOutcome;
use crate::submission::EvaluationPayload;
use crate::AppState;

/// Body of POST /api/events/:event_id/evaluations
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub evaluator_id: Uuid,
    pub sample_id: Uuid,
    pub product_type_id: Uuid,
    #[serde(flatten)]
    pub payload: EvaluationPayload,
}

/// POST /api/events/:event_id/evaluations
///
/// Responds 200 with `status = "accepted"` or, for a sample that was
/// already stored, `status = "already_evaluated"`; both carry the next
/// sample to rate. A body that is not valid JSON for this shape is a 400
/// `invalid_input`.
pub async fn submit_evaluation(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let Json(request) = body?;
    let outcome = state
        .engine
        .submit_and_advance(
            request.evaluator_id,
            request.sample_id,
            request.product_type_id,
            event_id,
            &request.payload,
        )
        .await?;
    Ok(Json(outcome))
}
