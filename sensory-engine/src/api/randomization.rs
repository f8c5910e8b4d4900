//! Randomization endpoints (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sensory_common::{Error, RandomizationTable};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// Body of POST /api/product-types/:id/randomization
#[derive(Debug, Default, Deserialize)]
pub struct BuildRequest {
    /// Replace an existing table; deletes the product type's evaluations
    #[serde(default)]
    pub replace: bool,
}

/// POST /api/product-types/:id/randomization
pub async fn build_randomization(
    State(state): State<AppState>,
    Path(product_type_id): Path<Uuid>,
    body: Option<Json<BuildRequest>>,
) -> Result<(StatusCode, Json<RandomizationTable>), ApiError> {
    let replace = body.map(|Json(b)| b.replace).unwrap_or(false);
    let table = state
        .engine
        .build_randomization(product_type_id, replace)
        .await?;
    Ok((StatusCode::CREATED, Json(table)))
}

/// GET /api/product-types/:id/randomization
pub async fn get_randomization(
    State(state): State<AppState>,
    Path(product_type_id): Path<Uuid>,
) -> Result<Json<RandomizationTable>, ApiError> {
    state
        .engine
        .get_randomization(product_type_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError(Error::NotFound(format!(
                "randomization for product type {}",
                product_type_id
            )))
        })
}
