//! Prediction record model

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::classifier::FEATURE_COUNT;
use crate::model_store::ModelVariant;

pub const EXPECTED_FEATURES_MESSAGE: &str = "Expected 4 features";
pub const INVALID_MODEL_MESSAGE: &str = "Invalid model name";

/// One persisted prediction event. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PredictionRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub features: Json<BTreeMap<String, f64>>,
    pub prediction: String,
    pub prediction_index: i32,
    pub probabilities: Json<BTreeMap<String, f64>>,
    pub confidence: f64,
}

/// Record contents before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub timestamp: DateTime<Utc>,
    pub model: ModelVariant,
    pub features: BTreeMap<String, f64>,
    pub prediction: String,
    pub prediction_index: i32,
    pub probabilities: BTreeMap<String, f64>,
    pub confidence: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(custom(function = "validate_feature_count"))]
    pub features: Vec<f64>,
    /// Non-string values (including `null`) become an empty name that no
    /// variant matches.
    #[serde(default = "default_model", deserialize_with = "string_or_empty")]
    pub model: String,
}

fn default_model() -> String {
    ModelVariant::default().as_str().to_string()
}

fn validate_feature_count(features: &[f64]) -> Result<(), ValidationError> {
    if features.len() == FEATURE_COUNT {
        return Ok(());
    }
    let mut err = ValidationError::new("length");
    err.message = Some(Cow::Borrowed(EXPECTED_FEATURES_MESSAGE));
    Err(err)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<f64>>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(name) => name,
        _ => String::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_used: String,
    pub prediction: String,
    pub prediction_index: i32,
    pub probabilities: BTreeMap<String, f64>,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub deleted_count: u64,
}

/// Confidence histogram buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    pub const HIGH_THRESHOLD: f64 = 0.9;
    pub const MEDIUM_THRESHOLD: f64 = 0.7;

    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= Self::HIGH_THRESHOLD {
            ConfidenceBucket::High
        } else if confidence >= Self::MEDIUM_THRESHOLD {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceBucket::High => "High (>90%)",
            ConfidenceBucket::Medium => "Medium (70-90%)",
            ConfidenceBucket::Low => "Low (<70%)",
        }
    }
}

/// Field (or derived bucket) records are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Prediction,
    Model,
    ConfidenceBucket,
}

impl GroupKey {
    fn sql_expr(&self) -> String {
        match self {
            GroupKey::Prediction => "prediction".to_string(),
            GroupKey::Model => "model".to_string(),
            GroupKey::ConfidenceBucket => format!(
                "CASE WHEN confidence >= {} THEN '{}' WHEN confidence >= {} THEN '{}' ELSE '{}' END",
                ConfidenceBucket::HIGH_THRESHOLD,
                ConfidenceBucket::High.label(),
                ConfidenceBucket::MEDIUM_THRESHOLD,
                ConfidenceBucket::Medium.label(),
                ConfidenceBucket::Low.label(),
            ),
        }
    }
}

/// Per-group reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Count,
    AverageConfidence,
}

impl Reduction {
    fn sql_expr(&self) -> &'static str {
        match self {
            Reduction::Count => "COUNT(*)::DOUBLE PRECISION",
            Reduction::AverageConfidence => "AVG(confidence)",
        }
    }
}

/// One aggregate row: group id and reduced value
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub id: String,
    pub value: f64,
}

impl PredictionRecord {
    pub async fn insert(pool: &PgPool, data: &NewPrediction) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            r#"
            INSERT INTO predictions (timestamp, model, features, prediction, prediction_index, probabilities, confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#
        )
        .bind(data.timestamp)
        .bind(data.model.as_str())
        .bind(Json(&data.features))
        .bind(&data.prediction)
        .bind(data.prediction_index)
        .bind(Json(&data.probabilities))
        .bind(data.confidence)
        .fetch_one(pool)
        .await
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            "SELECT * FROM predictions ORDER BY timestamp DESC LIMIT $1"
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM predictions")
            .fetch_one(pool)
            .await?;
        Ok(row.get("total"))
    }

    pub async fn delete_all(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM predictions")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn aggregate(
        pool: &PgPool,
        key: GroupKey,
        reduction: Reduction,
    ) -> Result<Vec<GroupRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {} AS id, {} AS value FROM predictions GROUP BY 1 ORDER BY 1",
            key.sql_expr(),
            reduction.sql_expr(),
        );

        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        Ok(rows.into_iter().map(|r| GroupRow {
            id: r.get::<String, _>("id"),
            value: r.get::<f64, _>("value"),
        }).collect())
    }
}
