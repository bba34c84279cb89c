//! ONNX Runtime engines
//!
//! One engine per model: a sentence encoder and a zero-shot NLI classifier.
//! Both own their `Session` and `Tokenizer` and are driven synchronously;
//! the async wrappers in `models::model` move them onto the blocking pool.

pub mod onnx_engine;
pub mod zero_shot;

pub use onnx_engine::OnnxEmbeddingEngine;
pub use zero_shot::{NliLabels, OnnxZeroShotEngine};

use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};

use crate::models::{AnalysisError, AnalysisResult};

pub(crate) fn load_error(error: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::ModelLoadFailed { error: error.to_string() }
}

/// Load a tokenizer and truncate its encodings to `max_length` tokens.
///
/// For sentence pairs only the first sequence (the premise) is cut.
pub(crate) fn load_tokenizer(path: &str, max_length: usize) -> AnalysisResult<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| load_error(format!("Failed to load tokenizer {}: {}", path, e)))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            strategy: TruncationStrategy::OnlyFirst,
            ..Default::default()
        }))
        .map_err(|e| load_error(format!("Failed to configure truncation: {}", e)))?;

    Ok(tokenizer)
}

/// Fail unless `name` is one of the model's output names
pub(crate) fn require_output<'a>(
    available: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> AnalysisResult<()> {
    let available: Vec<&str> = available.into_iter().collect();
    if available.contains(&name) {
        Ok(())
    } else {
        Err(AnalysisError::ConfigError {
            message: format!(
                "Model has no output named '{}' (available: {})",
                name,
                available.join(", ")
            ),
        })
    }
}

/// Build a `[rows, cols]` i64 tensor from row-major data
pub(crate) fn i64_tensor(rows: usize, cols: usize, data: Vec<i64>) -> Result<Tensor<i64>, String> {
    Tensor::from_array(([rows as i64, cols as i64], data)).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_output() {
        assert!(require_output(["logits"], "logits").is_ok());

        let err = require_output(["last_hidden_state", "pooler_output"], "logits").unwrap_err();
        match err {
            AnalysisError::ConfigError { message } => {
                assert!(message.contains("'logits'"));
                assert!(message.contains("last_hidden_state, pooler_output"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
