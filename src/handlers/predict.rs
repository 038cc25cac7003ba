//! Prediction handler

use axum::{extract::State, Json};

use crate::{AppResult, AppState};
use crate::handlers::AppJson;
use crate::models::{PredictRequest, PredictResponse};
use crate::prediction;

/// Classify a feature vector and record the prediction
pub async fn predict(
    State(state): State<AppState>,
    AppJson(req): AppJson<PredictRequest>,
) -> AppResult<Json<PredictResponse>> {
    let response = prediction::predict(&state.models, state.log.as_ref(), req).await?;
    Ok(Json(response))
}
