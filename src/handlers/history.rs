//! Prediction history handlers

use axum::{extract::State, Json};

use crate::{AppResult, AppState};
use crate::models::ClearHistoryResponse;

/// Delete every stored prediction
pub async fn clear(State(state): State<AppState>) -> AppResult<Json<ClearHistoryResponse>> {
    let deleted_count = state.log.clear().await?;

    tracing::info!("Prediction history cleared ({} records)", deleted_count);

    Ok(Json(ClearHistoryResponse {
        success: true,
        deleted_count,
    }))
}
