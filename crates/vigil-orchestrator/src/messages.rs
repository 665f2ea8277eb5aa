//! Wire formats exchanged with the external trainer.

use serde::{Deserialize, Serialize};

/// Job description published to the queue named after the model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobMessage {
    /// First training of a model.
    Train { user_id: String, model_type: String },
    /// Fine-tuning of an already trained model.
    Tune {
        user_id: String,
        model_type: String,
        /// Features accumulated so far, sent as a decimal string.
        #[serde(with = "u64_string")]
        model_features: u64,
        /// Presigned download URL of the current artifact.
        model_url: String,
    },
}

impl JobMessage {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Train { user_id, .. } | Self::Tune { user_id, .. } => user_id,
        }
    }

    pub fn model_type(&self) -> &str {
        match self {
            Self::Train { model_type, .. } | Self::Tune { model_type, .. } => model_type,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Train { .. } => "train",
            Self::Tune { .. } => "tune",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Completion signal published by the trainer to the result queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub model_type: String,
    pub user_id: String,
    /// Storage key of the newly produced artifact.
    pub model_url: String,
    /// Features consumed by this training run.
    pub features_count: u64,
}

impl ResultMessage {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_train_job_wire_format() {
        let job = JobMessage::Train { user_id: "a".to_string(), model_type: "face_model".to_string() };
        let value: Value = serde_json::from_slice(&job.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "train", "user_id": "a", "model_type": "face_model"}));
    }

    #[test]
    fn test_tune_job_sends_features_as_string() {
        let job = JobMessage::Tune {
            user_id: "a".to_string(),
            model_type: "face_model".to_string(),
            model_features: 145,
            model_url: "https://s3.local/models/m1?sig=x".to_string(),
        };
        let value: Value = serde_json::from_slice(&job.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tune",
                "user_id": "a",
                "model_type": "face_model",
                "model_features": "145",
                "model_url": "https://s3.local/models/m1?sig=x"
            })
        );
        assert_eq!(job.kind(), "tune");
        assert_eq!(job.user_id(), "a");
        assert_eq!(job.model_type(), "face_model");
    }

    #[test]
    fn test_tune_job_parses_back() {
        let raw = r#"{"type":"tune","user_id":"b","model_type":"face_model","model_features":"18446744073709551615","model_url":"u"}"#;
        let job: JobMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(job, JobMessage::Tune { model_features: u64::MAX, .. }));
    }

    #[test]
    fn test_result_message_decodes() {
        let raw = br#"{"model_type":"face_model","user_id":"a","model_url":"m1","features_count":120}"#;
        let result = ResultMessage::from_slice(raw).unwrap();
        assert_eq!(result.features_count, 120);
        assert_eq!(result.model_url, "m1");
    }

    #[test]
    fn test_result_message_rejects_negative_count() {
        let raw = br#"{"model_type":"face_model","user_id":"a","model_url":"m1","features_count":-1}"#;
        assert!(ResultMessage::from_slice(raw).is_err());
    }

    #[test]
    fn test_result_message_rejects_missing_fields() {
        assert!(ResultMessage::from_slice(br#"{"user_id":"a"}"#).is_err());
        assert!(ResultMessage::from_slice(b"not json").is_err());
    }
}
