//! Stats handler

use axum::{extract::State, Json};

use crate::{AppResult, AppState};
use crate::stats::{self, StatsResponse};

/// Aggregate prediction statistics for the dashboard
pub async fn get(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let stats = stats::get_stats(state.log.as_ref()).await?;
    Ok(Json(stats))
}
