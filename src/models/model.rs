//! Model definitions and traits
//!
//! The analyzer only sees two traits: a zero-shot [`IntentClassifier`] and a
//! [`TextEncoder`]. The ONNX-backed implementations live in [`onnx`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisResult, Embedding};

/// Information about a loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Model file path
    pub model_path: String,
    /// Tokenizer path
    pub tokenizer_path: String,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
    /// Output dimension, encoders only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

/// A candidate label and its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Zero-shot classifier over a caller-supplied label set
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Score `text` against `candidate_labels`, best label first
    async fn classify(&self, text: &str, candidate_labels: &[String]) -> AnalysisResult<Vec<LabelScore>>;
}

/// Sentence encoder producing fixed-length vectors
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Embed a single text
    async fn encode(&self, text: &str) -> AnalysisResult<Embedding>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize {
        self.info().dimension.unwrap_or(0)
    }
}

/// ONNX-based model implementations
#[cfg(feature = "onnx")]
pub mod onnx {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};

    use crate::models::config::{ClassifierConfig, EncoderConfig};
    use crate::models::AnalysisError;
    use crate::onnx::{OnnxEmbeddingEngine, OnnxZeroShotEngine};

    /// Run `f` on the blocking pool with exclusive access to `engine`.
    ///
    /// A panic inside `f` fails that call only. Engines hold no state between
    /// runs, so the next call takes the lock back from the poisoned mutex.
    pub(crate) async fn run_blocking<E, T, F>(model_name: &str, engine: &Arc<Mutex<E>>, f: F) -> AnalysisResult<T>
    where
        E: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&mut E) -> AnalysisResult<T> + Send + 'static,
    {
        let engine = Arc::clone(engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut engine)
        })
        .await
        .map_err(|e| AnalysisError::InferenceError {
            model_name: model_name.to_string(),
            error: format!("Inference task failed: {}", e),
        })?
    }

    /// ONNX zero-shot classifier
    pub struct OnnxIntentClassifier {
        info: ModelInfo,
        engine: Arc<Mutex<OnnxZeroShotEngine>>,
    }

    impl OnnxIntentClassifier {
        /// Load the classifier. Blocks while the model is read.
        pub fn load(config: &ClassifierConfig) -> AnalysisResult<Self> {
            let engine = OnnxZeroShotEngine::new(config)?;
            Ok(Self {
                info: ModelInfo {
                    name: config.name.clone(),
                    model_path: config.model_path.clone(),
                    tokenizer_path: config.tokenizer_path.clone(),
                    max_sequence_length: config.max_sequence_length,
                    dimension: None,
                },
                engine: Arc::new(Mutex::new(engine)),
            })
        }
    }

    #[async_trait]
    impl IntentClassifier for OnnxIntentClassifier {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn classify(&self, text: &str, candidate_labels: &[String]) -> AnalysisResult<Vec<LabelScore>> {
            let text = text.to_string();
            let candidate_labels = candidate_labels.to_vec();
            run_blocking(&self.info.name, &self.engine, move |engine| {
                engine.classify(&text, &candidate_labels)
            })
            .await
        }
    }

    /// ONNX sentence encoder
    pub struct OnnxTextEncoder {
        info: ModelInfo,
        engine: Arc<Mutex<OnnxEmbeddingEngine>>,
    }

    impl OnnxTextEncoder {
        /// Load the encoder. Blocks while the model is read and probed.
        pub fn load(config: &EncoderConfig) -> AnalysisResult<Self> {
            let engine = OnnxEmbeddingEngine::new(config)?;
            Ok(Self {
                info: ModelInfo {
                    name: config.name.clone(),
                    model_path: config.model_path.clone(),
                    tokenizer_path: config.tokenizer_path.clone(),
                    max_sequence_length: config.max_sequence_length,
                    dimension: Some(engine.dimension()),
                },
                engine: Arc::new(Mutex::new(engine)),
            })
        }
    }

    #[async_trait]
    impl TextEncoder for OnnxTextEncoder {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn encode(&self, text: &str) -> AnalysisResult<Embedding> {
            let text = text.to_string();
            run_blocking(&self.info.name, &self.engine, move |engine| engine.embed(&text)).await
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_encoder_dimension_from_info() {
        let encoder = HashEncoder::new(16);
        assert_eq!(encoder.dimension(), 16);
        assert_eq!(encoder.encode("hello").await.unwrap().len(), 16);
    }

    #[test]
    fn test_classifier_info_omits_dimension() {
        let classifier = KeywordClassifier::new();
        let json = serde_json::to_value(classifier.info()).unwrap();
        assert!(json.get("dimension").is_none());
        assert_eq!(json["name"], "keyword-classifier");
    }

    #[cfg(feature = "onnx")]
    #[tokio::test]
    async fn test_engine_usable_after_panicked_run() {
        use crate::models::AnalysisError;
        use std::sync::{Arc, Mutex};

        let engine = Arc::new(Mutex::new(0u32));

        let result: AnalysisResult<()> = onnx::run_blocking("counter", &engine, |_| panic!("engine crashed")).await;
        match result {
            Err(AnalysisError::InferenceError { model_name, error }) => {
                assert_eq!(model_name, "counter");
                assert!(error.contains("Inference task failed"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(engine.is_poisoned());

        for expected in 1..=2 {
            let count = onnx::run_blocking("counter", &engine, |n| {
                *n += 1;
                Ok(*n)
            })
            .await
            .unwrap();
            assert_eq!(count, expected);
        }
    }
}
