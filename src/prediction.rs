//! Prediction Service

use std::collections::BTreeMap;

use chrono::Utc;
use validator::Validate;

use crate::classifier::FeatureVector;
use crate::error::{AppError, AppResult};
use crate::model_store::{ModelStore, ModelVariant, UnknownModel};
use crate::models::{
    ConfidenceBucket, NewPrediction, PredictRequest, PredictResponse, EXPECTED_FEATURES_MESSAGE,
    INVALID_MODEL_MESSAGE,
};
use crate::prediction_log::PredictionLog;

/// Validate the request, run the chosen classifier and log the result.
pub async fn predict(
    models: &ModelStore,
    log: &dyn PredictionLog,
    req: PredictRequest,
) -> AppResult<PredictResponse> {
    req.validate()?;
    let features = FeatureVector::try_from(req.features.as_slice())
        .map_err(|_| AppError::ValidationError(EXPECTED_FEATURES_MESSAGE.to_string()))?;

    let variant = req
        .model
        .parse::<ModelVariant>()
        .map_err(|UnknownModel(name)| {
            tracing::debug!("Unknown model requested: {}", name);
            AppError::ValidationError(INVALID_MODEL_MESSAGE.to_string())
        })?;

    let (index, probabilities) = models.classify(variant, &features)?;

    let class_names = models.class_names();
    if probabilities.len() != class_names.len() {
        return Err(AppError::ModelError(format!(
            "classifier returned {} probabilities for {} classes",
            probabilities.len(),
            class_names.len()
        )));
    }
    let prediction = class_names
        .get(index)
        .cloned()
        .ok_or_else(|| AppError::ModelError(format!("class index {} out of range", index)))?;
    let prediction_index = i32::try_from(index)
        .map_err(|_| AppError::ModelError(format!("class index {} out of range", index)))?;

    let prob_map: BTreeMap<String, f64> = class_names
        .iter()
        .cloned()
        .zip(probabilities.iter().copied())
        .collect();
    let confidence = probabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let feature_map: BTreeMap<String, f64> = models
        .feature_names()
        .iter()
        .cloned()
        .zip(features)
        .collect();

    let record = NewPrediction {
        timestamp: Utc::now(),
        model: variant,
        features: feature_map,
        prediction: prediction.clone(),
        prediction_index,
        probabilities: prob_map.clone(),
        confidence,
    };
    let stored = log.append(&record).await?;

    tracing::debug!(
        id = %stored.id,
        model = %variant,
        prediction = %prediction,
        confidence,
        bucket = ConfidenceBucket::from_confidence(confidence).label(),
        "Prediction recorded"
    );

    Ok(PredictResponse {
        model_used: variant.as_str().to_string(),
        prediction,
        prediction_index,
        probabilities: prob_map,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_store::tests::iris_store;
    use crate::prediction_log::memory::MemoryPredictionLog;

    fn request(features: Vec<f64>, model: &str) -> PredictRequest {
        PredictRequest { features, model: model.to_string() }
    }

    #[tokio::test]
    async fn valid_prediction_is_logged() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let resp = predict(&models, &log, request(vec![5.1, 3.5, 1.4, 0.2], "logistic_regression"))
            .await
            .unwrap();

        assert_eq!(resp.model_used, "logistic_regression");
        assert_eq!(resp.prediction, "setosa");
        assert_eq!(resp.prediction_index, 0);

        let sum: f64 = resp.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let max = resp.probabilities.values().copied().fold(f64::MIN, f64::max);
        assert_eq!(resp.confidence, max);
        assert_eq!(resp.probabilities[&resp.prediction], resp.confidence);

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        let record = &recent[0];
        assert_eq!(record.model, resp.model_used);
        assert_eq!(record.prediction, resp.prediction);
        assert_eq!(record.prediction_index, resp.prediction_index);
        assert_eq!(record.probabilities.0, resp.probabilities);
        assert_eq!(record.confidence, resp.confidence);
        assert_eq!(record.features.len(), 4);
        assert_eq!(record.features["petal length (cm)"], 1.4);
    }

    #[tokio::test]
    async fn naive_bayes_variant_is_accepted() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let resp = predict(&models, &log, request(vec![6.7, 3.0, 5.2, 2.3], "naive_bayes"))
            .await
            .unwrap();

        assert_eq!(resp.model_used, "naive_bayes");
        assert_eq!(resp.prediction, "virginica");
    }

    #[tokio::test]
    async fn wrong_feature_count_is_validation_error() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        for features in [vec![], vec![1.0, 2.0, 3.0], vec![1.0; 5]] {
            let err = predict(&models, &log, request(features, "logistic_regression"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ValidationError(ref m) if m == EXPECTED_FEATURES_MESSAGE));
        }
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_model_is_validation_error() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let err = predict(&models, &log, request(vec![1.0, 2.0, 3.0, 4.0], "unknown_model"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(ref m) if m == INVALID_MODEL_MESSAGE));
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn feature_count_is_checked_before_model_name() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let err = predict(&models, &log, request(vec![1.0], "unknown_model"))
            .await
            .unwrap_err();

        assert_eq!(err.message(), EXPECTED_FEATURES_MESSAGE);
    }

    #[tokio::test]
    async fn empty_model_name_is_validation_error() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let err = predict(&models, &log, request(vec![1.0, 2.0, 3.0, 4.0], ""))
            .await
            .unwrap_err();

        assert_eq!(err.message(), INVALID_MODEL_MESSAGE);
    }

    #[tokio::test]
    async fn overflowing_features_still_produce_a_record() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();

        let resp = predict(&models, &log, request(vec![1e308; 4], "logistic_regression"))
            .await
            .unwrap();

        assert_eq!(resp.prediction, "virginica");
        assert_eq!(resp.confidence, 1.0);
        assert!(resp.probabilities.values().all(|p| p.is_finite()));
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_is_server_error() {
        let models = iris_store();
        let log = MemoryPredictionLog::default();
        log.set_unavailable(true);

        let err = predict(&models, &log, request(vec![5.1, 3.5, 1.4, 0.2], "logistic_regression"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
