//! HTTP REST API Protocol
//!
//! - Endpoint: POST /analyze
//! - Request body: {"text": "..."}
//! - Response body: {"intent": "question", "vector": [0.1, 0.2, ...]}
//! - Missing or empty text: 400 {"error": "No text provided"}

use serde::{Deserialize, Serialize};

use crate::models::Analysis;

/// HTTP analysis request
///
/// `text` is optional on the wire so that a missing field and an empty string
/// both produce the same "No text provided" error instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }

    /// The text to analyse, or `None` when it is missing or empty
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// HTTP analysis response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Winning candidate label
    pub intent: String,
    /// Sentence embedding
    pub vector: Vec<f32>,
}

impl From<Analysis> for AnalyzeResponse {
    fn from(analysis: Analysis) -> Self {
        Self {
            intent: analysis.intent,
            vector: analysis.vector,
        }
    }
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
        }
    }

    /// Create error with code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Create error with details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Missing or empty text. Serialises to exactly `{"error":"No text provided"}`.
    pub fn no_text() -> Self {
        Self::new("No text provided")
    }

    pub fn invalid_json() -> Self {
        Self::new("Invalid JSON")
    }

    pub fn body_too_large(limit: usize) -> Self {
        Self::new(format!("Request body exceeds {} bytes", limit)).with_code("BODY_TOO_LARGE")
    }

    pub fn not_found() -> Self {
        Self::new("Not Found")
    }

    /// Create model not ready error
    pub fn model_not_ready() -> Self {
        Self::new("Models are not ready, please try again later").with_code("MODEL_NOT_READY")
    }

    /// Create internal error
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::new("Internal server error occurred during analysis")
            .with_code("INTERNAL_ERROR")
            .with_details(details)
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub classifier: String,
    pub encoder: String,
    pub version: String,
    pub embedding_dimension: usize,
}

impl HealthResponse {
    pub fn healthy(classifier: impl Into<String>, encoder: impl Into<String>, dimension: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            classifier: classifier.into(),
            encoder: encoder.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            embedding_dimension: dimension,
        }
    }
}
