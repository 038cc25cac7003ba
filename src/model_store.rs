//! Model Store - artifacts loaded once at startup and shared read-only
//!
//! Loads the trained classifier plus the feature-name and class-name lists
//! from `MODEL_DIR`. Any failure here is fatal to the process.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::classifier::{
    Classifier, ClassifierError, FeatureVector, LogisticRegression, LogisticRegressionArtifact,
    FEATURE_COUNT,
};

pub const LOGISTIC_REGRESSION_FILE: &str = "iris_logistic_regression.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const TARGET_NAMES_FILE: &str = "target_names.json";

#[derive(Debug, Error)]
pub enum ModelStoreError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid classifier in {}: {source}", path.display())]
    Classifier {
        path: PathBuf,
        #[source]
        source: ClassifierError,
    },

    #[error("invalid artifacts: {0}")]
    Invalid(String),
}

/// Model variants a client may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVariant {
    #[default]
    LogisticRegression,
    NaiveBayes,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::LogisticRegression, ModelVariant::NaiveBayes];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::LogisticRegression => "logistic_regression",
            ModelVariant::NaiveBayes => "naive_bayes",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModel(pub String);

impl FromStr for ModelVariant {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

/// Read-only model state shared by every request
pub struct ModelStore {
    logistic_regression: Arc<dyn Classifier>,
    naive_bayes: Arc<dyn Classifier>,
    feature_names: Vec<String>,
    class_names: Vec<String>,
}

impl fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("feature_names", &self.feature_names)
            .field("class_names", &self.class_names)
            .finish_non_exhaustive()
    }
}

impl ModelStore {
    /// Load all artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ModelStoreError> {
        let model_path = dir.join(LOGISTIC_REGRESSION_FILE);
        let artifact: LogisticRegressionArtifact = read_json(&model_path)?;
        let logistic = LogisticRegression::from_artifact(artifact)
            .map_err(|source| ModelStoreError::Classifier { path: model_path, source })?;

        let feature_names: Vec<String> = read_json(&dir.join(FEATURE_NAMES_FILE))?;
        let class_names: Vec<String> = read_json(&dir.join(TARGET_NAMES_FILE))?;

        Self::new(Arc::new(logistic), feature_names, class_names)
    }

    /// Build a store around an existing classifier. Both variants share it
    /// until a separately trained naive Bayes artifact exists.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        feature_names: Vec<String>,
        class_names: Vec<String>,
    ) -> Result<Self, ModelStoreError> {
        if feature_names.len() != FEATURE_COUNT {
            return Err(ModelStoreError::Invalid(format!(
                "expected {} feature names, found {}",
                FEATURE_COUNT,
                feature_names.len()
            )));
        }
        if class_names.len() != classifier.n_classes() {
            return Err(ModelStoreError::Invalid(format!(
                "classifier has {} classes but {} class names were given",
                classifier.n_classes(),
                class_names.len()
            )));
        }
        if let Some(name) = first_duplicate(&feature_names) {
            return Err(ModelStoreError::Invalid(format!("duplicate feature name {:?}", name)));
        }
        if let Some(name) = first_duplicate(&class_names) {
            return Err(ModelStoreError::Invalid(format!("duplicate class name {:?}", name)));
        }

        Ok(Self {
            naive_bayes: Arc::clone(&classifier),
            logistic_regression: classifier,
            feature_names,
            class_names,
        })
    }

    pub fn classifier(&self, variant: ModelVariant) -> &dyn Classifier {
        match variant {
            ModelVariant::LogisticRegression => self.logistic_regression.as_ref(),
            ModelVariant::NaiveBayes => self.naive_bayes.as_ref(),
        }
    }

    pub fn classify(
        &self,
        variant: ModelVariant,
        features: &FeatureVector,
    ) -> Result<(usize, Vec<f64>), ClassifierError> {
        self.classifier(variant).classify(features)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names.iter().map(String::as_str).find(|name| !seen.insert(*name))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelStoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ModelStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ModelStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
