//! Models used by the analysis service
//!
//! Holds the error type, the model traits, model configuration and the
//! analyzer that runs a text through both models.

pub mod config;
pub mod manager;
pub mod model;

// Re-exports
pub use config::{ClassifierConfig, EncoderConfig};
pub use manager::{Analysis, IntentAnalyzer};
pub use model::{IntentClassifier, LabelScore, ModelInfo, TextEncoder};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors that can occur while loading or running the models
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Model load failed: {error}")]
    ModelLoadFailed { error: String },

    #[error("Inference failed: {model_name} - {error}")]
    InferenceError { model_name: String, error: String },

    #[error("No text provided")]
    EmptyText,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {error}")]
    IoError { error: std::io::Error },

    #[error("TOML parsing error: {error}")]
    TomlError { error: toml::de::Error },
}

impl AnalysisError {
    /// Whether the error was caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::EmptyText)
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(error: std::io::Error) -> Self {
        AnalysisError::IoError { error }
    }
}

impl From<toml::de::Error> for AnalysisError {
    fn from(error: toml::de::Error) -> Self {
        AnalysisError::TomlError { error }
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for AnalysisError {
    fn from(error: ort::Error) -> Self {
        AnalysisError::ModelLoadFailed { error: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_message() {
        assert_eq!(AnalysisError::EmptyText.to_string(), "No text provided");
        assert!(AnalysisError::EmptyText.is_client_error());
    }

    #[test]
    fn test_inference_error_is_server_side() {
        let err = AnalysisError::InferenceError {
            model_name: "encoder".to_string(),
            error: "boom".to_string(),
        };
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Inference failed: encoder - boom");
    }
}
