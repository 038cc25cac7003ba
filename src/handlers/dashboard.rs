//! Dashboard page handler

use axum::{extract::State, response::Html};

use crate::{AppError, AppResult, AppState};

/// Serve the dashboard HTML page
pub async fn index(State(state): State<AppState>) -> AppResult<Html<String>> {
    let page = tokio::fs::read_to_string(&state.config.dashboard_path)
        .await
        .map_err(|e| {
            AppError::InternalError(format!(
                "Dashboard unavailable ({}): {}",
                state.config.dashboard_path.display(),
                e
            ))
        })?;

    Ok(Html(page))
}
