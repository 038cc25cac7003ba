//! Stats Aggregator - dashboard summary over the prediction log

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{GroupKey, GroupRow, PredictionRecord, Reduction};
use crate::prediction_log::PredictionLog;

pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupCount {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupAverage {
    #[serde(rename = "_id")]
    pub id: String,
    pub avg_confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_predictions: i64,
    pub predictions_by_class: Vec<GroupCount>,
    pub predictions_by_model: Vec<GroupCount>,
    pub avg_confidence_by_model: Vec<GroupAverage>,
    pub recent_predictions: Vec<PredictionRecord>,
    pub confidence_distribution: Vec<GroupCount>,
}

fn counts(rows: Vec<GroupRow>) -> Vec<GroupCount> {
    rows.into_iter()
        .map(|r| GroupCount { id: r.id, count: r.value.round() as i64 })
        .collect()
}

fn averages(rows: Vec<GroupRow>) -> Vec<GroupAverage> {
    rows.into_iter()
        .map(|r| GroupAverage { id: r.id, avg_confidence: r.value })
        .collect()
}

pub async fn get_stats(log: &dyn PredictionLog) -> AppResult<StatsResponse> {
    let total_predictions = log.count().await?;
    let predictions_by_class = counts(log.aggregate(GroupKey::Prediction, Reduction::Count).await?);
    let predictions_by_model = counts(log.aggregate(GroupKey::Model, Reduction::Count).await?);
    let avg_confidence_by_model =
        averages(log.aggregate(GroupKey::Model, Reduction::AverageConfidence).await?);
    let recent_predictions = log.recent(RECENT_LIMIT).await?;
    let confidence_distribution =
        counts(log.aggregate(GroupKey::ConfidenceBucket, Reduction::Count).await?);

    Ok(StatsResponse {
        total_predictions,
        predictions_by_class,
        predictions_by_model,
        avg_confidence_by_model,
        recent_predictions,
        confidence_distribution,
    })
}
