//! Report endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::ApiError;
use crate::report::{HedonicReport, JarReport};
use crate::AppState;

/// GET /api/product-types/:id/reports/hedonic
pub async fn hedonic_report(
    State(state): State<AppState>,
    Path(product_type_id): Path<Uuid>,
) -> Result<Json<HedonicReport>, ApiError> {
    Ok(Json(state.engine.generate_hedonic_report(product_type_id).await?))
}

/// GET /api/product-types/:id/reports/jar
pub async fn jar_report(
    State(state): State<AppState>,
    Path(product_type_id): Path<Uuid>,
) -> Result<Json<JarReport>, ApiError> {
    Ok(Json(state.engine.generate_jar_report(product_type_id).await?))
}
