//! Per model type training thresholds.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTrainThreshold {
    /// Minimum `features_count` for a first training.
    pub train_threshold: u64,
    /// Minimum unused features for a fine-tune.
    pub tune_threshold: u64,
}

impl ModelTrainThreshold {
    /// Largest threshold the model store can compare against.
    pub const MAX: u64 = i64::MAX as u64;

    fn check_range(self, model_type: &str) -> Result<()> {
        for (name, value) in [("train_threshold", self.train_threshold), ("tune_threshold", self.tune_threshold)] {
            if value > Self::MAX {
                return Err(OrchestratorError::Thresholds(format!(
                    "{name} {value} of '{model_type}' exceeds {}",
                    Self::MAX
                )));
            }
        }
        Ok(())
    }
}

/// Thresholds keyed by model type. Iteration order is by model type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thresholds(BTreeMap<String, ModelTrainThreshold>);

impl Thresholds {
    /// Parses a JSON object mapping model type to thresholds.
    ///
    /// # Errors
    /// * `OrchestratorError::Json` - If the document is malformed
    /// * `OrchestratorError::Thresholds` - If no model type is configured, or
    ///   a threshold does not fit the store's signed 64-bit counters
    pub fn from_json(raw: &str) -> Result<Self> {
        let thresholds: Self = serde_json::from_str(raw)?;
        if thresholds.is_empty() {
            return Err(OrchestratorError::Thresholds("no model types configured".to_string()));
        }
        if let Some(model_type) = thresholds.0.keys().find(|name| name.trim().is_empty()) {
            return Err(OrchestratorError::Thresholds(format!("invalid model type name '{model_type}'")));
        }
        for (model_type, threshold) in thresholds.iter() {
            threshold.check_range(model_type)?;
        }
        Ok(thresholds)
    }

    /// Reads thresholds from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let thresholds = Self::from_json(&raw)?;
        info!(path = %path.display(), model_types = thresholds.len(), "Loaded train thresholds");
        Ok(thresholds)
    }

    pub fn get(&self, model_type: &str) -> Option<ModelTrainThreshold> {
        self.0.get(model_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ModelTrainThreshold)> {
        self.0.iter().map(|(name, threshold)| (name.as_str(), *threshold))
    }

    /// Names of the dispatch queues, one per model type.
    pub fn model_types(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ModelTrainThreshold)> for Thresholds {
    fn from_iter<I: IntoIterator<Item = (String, ModelTrainThreshold)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parses_threshold_file_layout() {
        let thresholds = Thresholds::from_json(
            r#"{
                "face_model": {"train_threshold": 8000, "tune_threshold": 2000},
                "voice_model": {"train_threshold": 100, "tune_threshold": 20}
            }"#,
        )
        .unwrap();

        assert_eq!(thresholds.len(), 2);
        assert_eq!(
            thresholds.get("face_model"),
            Some(ModelTrainThreshold { train_threshold: 8000, tune_threshold: 2000 })
        );
        assert_eq!(thresholds.model_types(), vec!["face_model".to_string(), "voice_model".to_string()]);
    }

    #[test]
    fn test_empty_thresholds_rejected() {
        let result = Thresholds::from_json("{}");
        assert!(matches!(result, Err(OrchestratorError::Thresholds(_))));
    }

    #[test]
    fn test_blank_model_type_rejected() {
        let result = Thresholds::from_json(r#"{" ": {"train_threshold": 1, "tune_threshold": 1}}"#);
        assert!(matches!(result, Err(OrchestratorError::Thresholds(_))));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let result = Thresholds::from_json(r#"{"face_model": {"train_threshold": -1, "tune_threshold": 1}}"#);
        assert!(matches!(result, Err(OrchestratorError::Json(_))));
    }

    #[test]
    fn test_train_threshold_beyond_store_range_rejected() {
        let raw = format!(r#"{{"face_model": {{"train_threshold": {}, "tune_threshold": 1}}}}"#, u64::MAX);
        let result = Thresholds::from_json(&raw);
        assert!(matches!(result, Err(OrchestratorError::Thresholds(ref m)) if m.contains("train_threshold")));
    }

    #[test]
    fn test_tune_threshold_beyond_store_range_rejected() {
        let raw = format!(
            r#"{{"face_model": {{"train_threshold": 1, "tune_threshold": {}}}}}"#,
            ModelTrainThreshold::MAX + 1
        );
        let result = Thresholds::from_json(&raw);
        assert!(matches!(result, Err(OrchestratorError::Thresholds(ref m)) if m.contains("tune_threshold")));
    }

    #[test]
    fn test_threshold_at_store_range_limit_accepted() {
        let raw = format!(
            r#"{{"face_model": {{"train_threshold": {max}, "tune_threshold": {max}}}}}"#,
            max = ModelTrainThreshold::MAX
        );
        let thresholds = Thresholds::from_json(&raw).unwrap();
        assert_eq!(thresholds.get("face_model").unwrap().train_threshold, ModelTrainThreshold::MAX);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"face_model": {{"train_threshold": 100, "tune_threshold": 20}}}}"#).unwrap();

        let thresholds = Thresholds::load(file.path()).unwrap();
        assert_eq!(thresholds.get("face_model").unwrap().train_threshold, 100);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Thresholds::load(Path::new("/nonexistent/thresholds.json"));
        assert!(matches!(result, Err(OrchestratorError::Io(_))));
    }
}
