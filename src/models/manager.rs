//! Intent Analyzer
//!
//! Runs one text through the classifier and the encoder, in that order, and
//! merges both outputs. Both models are loaded once and never replaced, so
//! the analyzer is shared across requests behind an `Arc`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::models::config::{ClassifierConfig, EncoderConfig};
use crate::models::model::{IntentClassifier, LabelScore, TextEncoder};
use crate::models::{AnalysisError, AnalysisResult, Embedding};

/// Result of analysing one text
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Best-scoring candidate label
    pub intent: String,
    /// Every candidate label, best first
    pub scores: Vec<LabelScore>,
    /// Sentence embedding
    pub vector: Embedding,
}

/// Main entry point for analysis
pub struct IntentAnalyzer {
    classifier: Arc<dyn IntentClassifier>,
    encoder: Arc<dyn TextEncoder>,
    candidate_labels: Vec<String>,
}

impl IntentAnalyzer {
    /// Create an analyzer from already loaded models
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        encoder: Arc<dyn TextEncoder>,
        candidate_labels: Vec<String>,
    ) -> AnalysisResult<Self> {
        if candidate_labels.is_empty() {
            return Err(AnalysisError::ConfigError {
                message: "At least one candidate label is required".to_string(),
            });
        }

        Ok(Self {
            classifier,
            encoder,
            candidate_labels,
        })
    }

    /// Load both ONNX models described by the configuration.
    ///
    /// Loading reads several hundred megabytes, so it runs on the blocking pool.
    #[cfg(feature = "onnx")]
    pub async fn load(classifier_config: &ClassifierConfig, encoder_config: &EncoderConfig) -> AnalysisResult<Self> {
        use crate::models::model::onnx::{OnnxIntentClassifier, OnnxTextEncoder};

        classifier_config.validate()?;
        encoder_config.validate()?;

        info!("Loading AI models, this may take a moment...");
        let start = Instant::now();

        let classifier = {
            let config = classifier_config.clone();
            tokio::task::spawn_blocking(move || OnnxIntentClassifier::load(&config))
                .await
                .map_err(|e| AnalysisError::ModelLoadFailed { error: e.to_string() })??
        };
        info!("Classifier '{}' loaded", classifier_config.name);

        let encoder = {
            let config = encoder_config.clone();
            tokio::task::spawn_blocking(move || OnnxTextEncoder::load(&config))
                .await
                .map_err(|e| AnalysisError::ModelLoadFailed { error: e.to_string() })??
        };
        info!("Encoder '{}' loaded", encoder_config.name);

        info!("Models loaded successfully in {:?}", start.elapsed());

        Self::new(
            Arc::new(classifier),
            Arc::new(encoder),
            classifier_config.candidate_labels.clone(),
        )
    }

    #[cfg(not(feature = "onnx"))]
    pub async fn load(_classifier_config: &ClassifierConfig, _encoder_config: &EncoderConfig) -> AnalysisResult<Self> {
        Err(AnalysisError::ConfigError {
            message: "intent_server was built without the 'onnx' feature".to_string(),
        })
    }

    /// Classify the intent of `text` and embed it
    pub async fn analyze(&self, text: &str) -> AnalysisResult<Analysis> {
        if text.is_empty() {
            return Err(AnalysisError::EmptyText);
        }

        let classify_start = Instant::now();
        let scores = self.classifier.classify(text, &self.candidate_labels).await?;
        debug!("Classification took: {:?}", classify_start.elapsed());

        let intent = scores
            .first()
            .map(|s| s.label.clone())
            .ok_or_else(|| AnalysisError::InferenceError {
                model_name: self.classifier.info().name.clone(),
                error: "Classifier returned no labels".to_string(),
            })?;

        if !self.candidate_labels.contains(&intent) {
            return Err(AnalysisError::InferenceError {
                model_name: self.classifier.info().name.clone(),
                error: format!("Classifier returned unknown label '{}'", intent),
            });
        }

        let encode_start = Instant::now();
        let vector = self.encoder.encode(text).await?;
        debug!("Embedding took: {:?}", encode_start.elapsed());

        let expected = self.encoder.dimension();
        if vector.len() != expected {
            return Err(AnalysisError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        Ok(Analysis { intent, scores, vector })
    }

    /// Embed a probe text, used by health checks
    pub async fn probe(&self) -> AnalysisResult<usize> {
        Ok(self.encoder.encode("test").await?.len())
    }

    /// Labels the classifier chooses between
    pub fn candidate_labels(&self) -> &[String] {
        &self.candidate_labels
    }

    pub fn classifier(&self) -> &dyn IntentClassifier {
        self.classifier.as_ref()
    }

    pub fn encoder(&self) -> &dyn TextEncoder {
        self.encoder.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::DEFAULT_CANDIDATE_LABELS;
    use crate::models::model::testing::{FailingEncoder, HashEncoder, KeywordClassifier};

    fn labels() -> Vec<String> {
        DEFAULT_CANDIDATE_LABELS.iter().map(|l| l.to_string()).collect()
    }

    fn analyzer() -> IntentAnalyzer {
        IntentAnalyzer::new(
            Arc::new(KeywordClassifier::new()),
            Arc::new(HashEncoder::new(384)),
            labels(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_returns_candidate_label_and_fixed_vector() {
        let analyzer = analyzer();

        for text in ["We should build more bike lanes.", "Why would that work?", " "] {
            let analysis = analyzer.analyze(text).await.unwrap();
            assert!(analyzer.candidate_labels().contains(&analysis.intent));
            assert_eq!(analysis.vector.len(), 384);
            assert_eq!(analysis.scores.len(), 3);
            assert_eq!(analysis.scores[0].label, analysis.intent);
        }
    }

    #[tokio::test]
    async fn test_analyze_picks_top_label() {
        let analysis = analyzer().analyze("Is this a question?").await.unwrap();
        assert_eq!(analysis.intent, "question");

        let analysis = analyzer().analyze("This is a claim.").await.unwrap();
        assert_eq!(analysis.intent, "constructive argument");
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_text() {
        let err = analyzer().analyze("").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyText));
    }

    #[tokio::test]
    async fn test_encoder_failure_propagates() {
        let analyzer = IntentAnalyzer::new(
            Arc::new(KeywordClassifier::new()),
            Arc::new(FailingEncoder::new()),
            labels(),
        )
        .unwrap();

        let err = analyzer.analyze("hello").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InferenceError { .. }));
        assert!(analyzer.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_reports_dimension() {
        assert_eq!(analyzer().probe().await.unwrap(), 384);
    }

    #[test]
    fn test_requires_labels() {
        let result = IntentAnalyzer::new(
            Arc::new(KeywordClassifier::new()),
            Arc::new(HashEncoder::new(8)),
            Vec::new(),
        );
        assert!(result.is_err());
    }
}
