//! Prediction Log - append-only history of prediction records

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{GroupKey, GroupRow, NewPrediction, PredictionRecord, Reduction};

/// Storage for prediction records. Records are only ever appended or
/// bulk-cleared.
#[async_trait]
pub trait PredictionLog: Send + Sync {
    async fn append(&self, record: &NewPrediction) -> AppResult<PredictionRecord>;

    /// Delete every record, returning how many were removed.
    async fn clear(&self) -> AppResult<u64>;

    /// Up to `n` records, newest first.
    async fn recent(&self, n: usize) -> AppResult<Vec<PredictionRecord>>;

    async fn count(&self) -> AppResult<i64>;

    /// Group all records by `key` and reduce each group, ordered by group id.
    async fn aggregate(&self, key: GroupKey, reduction: Reduction) -> AppResult<Vec<GroupRow>>;
}

/// PostgreSQL-backed log
#[derive(Clone)]
pub struct PgPredictionLog {
    pool: PgPool,
}

impl PgPredictionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PredictionLog for PgPredictionLog {
    async fn append(&self, record: &NewPrediction) -> AppResult<PredictionRecord> {
        Ok(PredictionRecord::insert(&self.pool, record).await?)
    }

    async fn clear(&self) -> AppResult<u64> {
        Ok(PredictionRecord::delete_all(&self.pool).await?)
    }

    async fn recent(&self, n: usize) -> AppResult<Vec<PredictionRecord>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        Ok(PredictionRecord::recent(&self.pool, limit).await?)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(PredictionRecord::count(&self.pool).await?)
    }

    async fn aggregate(&self, key: GroupKey, reduction: Reduction) -> AppResult<Vec<GroupRow>> {
        Ok(PredictionRecord::aggregate(&self.pool, key, reduction).await?)
    }
}
