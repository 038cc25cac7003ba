//! HTTP handlers

use axum::extract::FromRequest;

use crate::AppError;

pub mod health;
pub mod dashboard;
pub mod predict;
pub mod stats;
pub mod history;

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
