//! Configuration for the two models
//!
//! Both sections are read from the `[classifier]` and `[encoder]` tables of the
//! server configuration file. Every field has a default so a partial table is
//! enough.

use serde::{Deserialize, Serialize};

use crate::models::{AnalysisError, AnalysisResult};

/// Labels the classifier chooses between unless configured otherwise
pub const DEFAULT_CANDIDATE_LABELS: [&str; 3] =
    ["constructive argument", "critical challenge", "question"];

/// Hypothesis template used to turn a label into an NLI hypothesis
pub const DEFAULT_HYPOTHESIS_TEMPLATE: &str = "This example is {}.";

/// Zero-shot classifier settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Display name
    pub name: String,

    /// File paths
    pub model_path: String,
    pub tokenizer_path: String,
    /// Hugging Face `config.json`, read for the entailment/contradiction ids
    pub config_path: Option<String>,

    /// Labels offered to the classifier
    pub candidate_labels: Vec<String>,
    /// Must contain `{}`, replaced by each label
    pub hypothesis_template: String,
    /// Score every label independently instead of normalising across labels
    pub multi_label: bool,

    /// Model parameters
    pub max_sequence_length: usize,
    pub output_name: String,

    /// Performance settings
    pub num_threads: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            name: "bart-large-mnli".to_string(),
            model_path: "ml_models/onnx/bart-large-mnli/model.onnx".to_string(),
            tokenizer_path: "ml_models/onnx/bart-large-mnli/tokenizer.json".to_string(),
            config_path: Some("ml_models/onnx/bart-large-mnli/config.json".to_string()),
            candidate_labels: DEFAULT_CANDIDATE_LABELS.iter().map(|l| l.to_string()).collect(),
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            multi_label: false,
            max_sequence_length: 1024,
            output_name: "logits".to_string(),
            num_threads: 4,
        }
    }
}

impl ClassifierConfig {
    /// Validate the classifier settings
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.candidate_labels.is_empty() {
            return Err(AnalysisError::ConfigError {
                message: "classifier.candidate_labels must not be empty".to_string(),
            });
        }

        for (idx, label) in self.candidate_labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(AnalysisError::ConfigError {
                    message: format!("classifier.candidate_labels[{}] is blank", idx),
                });
            }
            if self.candidate_labels[..idx].contains(label) {
                return Err(AnalysisError::ConfigError {
                    message: format!("Duplicate candidate label '{}'", label),
                });
            }
        }

        if !self.hypothesis_template.contains("{}") {
            return Err(AnalysisError::ConfigError {
                message: format!(
                    "classifier.hypothesis_template '{}' has no '{{}}' placeholder",
                    self.hypothesis_template
                ),
            });
        }

        if self.max_sequence_length == 0 {
            return Err(AnalysisError::ConfigError {
                message: "classifier.max_sequence_length must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Sentence encoder settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Display name
    pub name: String,

    /// File paths
    pub model_path: String,
    pub tokenizer_path: String,

    /// Model parameters
    pub max_sequence_length: usize,
    pub embedding_dimension: usize,
    pub output_name: String,
    /// L2-normalise the pooled vector
    pub normalize: bool,

    /// Performance settings
    pub num_threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            name: "all-MiniLM-L6-v2".to_string(),
            model_path: "ml_models/onnx/all-MiniLM-L6-v2/model.onnx".to_string(),
            tokenizer_path: "ml_models/onnx/all-MiniLM-L6-v2/tokenizer.json".to_string(),
            max_sequence_length: 256,
            embedding_dimension: 384,
            output_name: "last_hidden_state".to_string(),
            normalize: true,
            num_threads: 4,
        }
    }
}

impl EncoderConfig {
    /// Validate the encoder settings
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.embedding_dimension == 0 {
            return Err(AnalysisError::ConfigError {
                message: "encoder.embedding_dimension must be greater than zero".to_string(),
            });
        }
        if self.max_sequence_length == 0 {
            return Err(AnalysisError::ConfigError {
                message: "encoder.max_sequence_length must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ClassifierConfig::default().validate().is_ok());
        assert!(EncoderConfig::default().validate().is_ok());
        assert_eq!(ClassifierConfig::default().candidate_labels.len(), 3);
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: ClassifierConfig = toml::from_str(
            r#"
            model_path = "custom/model.onnx"
            multi_label = true
            "#,
        )
        .unwrap();

        assert_eq!(config.model_path, "custom/model.onnx");
        assert!(config.multi_label);
        assert_eq!(config.hypothesis_template, DEFAULT_HYPOTHESIS_TEMPLATE);
        assert_eq!(config.candidate_labels, DEFAULT_CANDIDATE_LABELS);
    }

    #[test]
    fn test_rejects_bad_labels() {
        let mut config = ClassifierConfig::default();
        config.candidate_labels.clear();
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.candidate_labels.push("question".to_string());
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.candidate_labels[1] = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let config = ClassifierConfig {
            hypothesis_template: "This example is about something.".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_dimension() {
        let config = EncoderConfig {
            embedding_dimension: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
