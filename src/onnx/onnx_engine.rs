//! # ONNX Embedding Engine
//!
//! Sentence embeddings with ONNX Runtime and a sentence-transformers export
//! such as all-MiniLM-L6-v2.
//!
//! The model's token embeddings are mean-pooled over the attention mask and,
//! unless disabled, L2-normalised. The resulting vector always has the
//! configured dimension; anything else is reported as an error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intent_server::onnx::OnnxEmbeddingEngine;
//!
//! let mut engine = OnnxEmbeddingEngine::new(&EncoderConfig::default())?;
//! let vector = engine.embed("Hello world")?;
//! assert_eq!(vector.len(), 384);
//! ```

use ndarray::ArrayViewD;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

use crate::models::{AnalysisError, AnalysisResult, Embedding, EncoderConfig};
use crate::onnx::{i64_tensor, load_error, load_tokenizer, require_output};

/// ONNX-based engine turning a text into a fixed-length vector
#[derive(Debug)]
pub struct OnnxEmbeddingEngine {
    /// ONNX Runtime session for model inference
    session: Session,
    /// HuggingFace tokenizer for text preprocessing
    tokenizer: Tokenizer,
    /// Some exports take `token_type_ids`, some don't
    uses_token_type_ids: bool,
    output_name: String,
    dimension: usize,
    normalize: bool,
    name: String,
}

impl OnnxEmbeddingEngine {
    /// Load the encoder described by `config` and check its output dimension
    /// with a probe inference.
    pub fn new(config: &EncoderConfig) -> AnalysisResult<Self> {
        info!("Initializing ONNX embedding engine with model: {}", config.model_path);

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(config.num_threads)
            .map_err(load_error)?
            .commit_from_file(&config.model_path)
            .map_err(|e| load_error(format!("Failed to load ONNX model {}: {}", config.model_path, e)))?;

        require_output(session.outputs.iter().map(|o| o.name.as_str()), &config.output_name)?;

        let tokenizer = load_tokenizer(&config.tokenizer_path, config.max_sequence_length)?;

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");
        debug!("Encoder inputs take token_type_ids: {}", uses_token_type_ids);

        let mut engine = Self {
            session,
            tokenizer,
            uses_token_type_ids,
            output_name: config.output_name.clone(),
            dimension: config.embedding_dimension,
            normalize: config.normalize,
            name: config.name.clone(),
        };

        // Probe run so a wrong export fails at startup rather than per request
        let probe = engine.embed("validation test")?;
        info!(
            "ONNX embedding engine ready: {} ({} dimensions, {} threads)",
            engine.name,
            probe.len(),
            config.num_threads
        );

        Ok(engine)
    }

    /// Output dimension of the encoder
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate the embedding for one text
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn embed(&mut self, text: &str) -> AnalysisResult<Embedding> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| self.inference_error(format!("Tokenization failed: {}", e)))?;

        let attention_mask = encoding.get_attention_mask().to_vec();
        let seq_len = encoding.get_ids().len();

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = attention_mask.iter().map(|&x| x as i64).collect();

        let mut inputs = vec![
            ("input_ids", i64_tensor(1, seq_len, input_ids).map_err(|e| self.inference_error(e))?),
            ("attention_mask", i64_tensor(1, seq_len, mask).map_err(|e| self.inference_error(e))?),
        ];
        if self.uses_token_type_ids {
            // Single sequence, all segment ids are zero
            let token_type_ids = vec![0i64; seq_len];
            inputs.push((
                "token_type_ids",
                i64_tensor(1, seq_len, token_type_ids).map_err(|e| self.inference_error(e))?,
            ));
        }

        let (dims, data) = {
            let outputs = self
                .session
                .run(inputs)
                .map_err(|e| AnalysisError::InferenceError {
                    model_name: self.name.clone(),
                    error: format!("ONNX inference failed: {}", e),
                })?;

            let output = outputs
                .get(self.output_name.as_str())
                .ok_or_else(|| AnalysisError::InferenceError {
                    model_name: self.name.clone(),
                    error: format!("Model produced no '{}' output", self.output_name),
                })?;
            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| AnalysisError::InferenceError {
                    model_name: self.name.clone(),
                    error: format!("Failed to extract output tensor: {}", e),
                })?;

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, data.to_vec())
        };

        let output_array = ArrayViewD::from_shape(dims.as_slice(), data.as_slice())
            .map_err(|e| self.inference_error(format!("Failed to create output array view: {:?}", e)))?;

        let pooled = mean_pooling(&output_array, &attention_mask)
            .map_err(|e| self.inference_error(e))?;

        let embedding = if self.normalize {
            normalize_embedding(&pooled).map_err(|e| self.inference_error(e))?
        } else {
            pooled
        };

        if embedding.len() != self.dimension {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn inference_error(&self, error: impl Into<String>) -> AnalysisError {
        AnalysisError::InferenceError {
            model_name: self.name.clone(),
            error: error.into(),
        }
    }
}

/// Mean-pool token embeddings `[1, seq_len, hidden]` over the tokens whose
/// attention mask is 1.
pub fn mean_pooling(output: &ArrayViewD<f32>, attention_mask: &[u32]) -> Result<Vec<f32>, String> {
    let shape = output.shape();
    if shape.len() != 3 {
        return Err(format!("Expected 3D output tensor, got {}D", shape.len()));
    }

    let seq_len = shape[1];
    let hidden_size = shape[2];

    if attention_mask.len() != seq_len {
        return Err(format!(
            "Attention mask length {} doesn't match sequence length {}",
            attention_mask.len(),
            seq_len
        ));
    }

    let mut pooled = vec![0.0f32; hidden_size];
    let mut valid_tokens = 0usize;

    for (seq_idx, &mask) in attention_mask.iter().enumerate() {
        if mask == 1 {
            for (hidden_idx, value) in pooled.iter_mut().enumerate() {
                *value += output[[0, seq_idx, hidden_idx]];
            }
            valid_tokens += 1;
        }
    }

    if valid_tokens == 0 {
        return Err("No valid tokens found in attention mask".to_string());
    }

    for value in &mut pooled {
        *value /= valid_tokens as f32;
    }

    Ok(pooled)
}

/// L2-normalise a vector
pub fn normalize_embedding(embedding: &[f32]) -> Result<Vec<f32>, String> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm == 0.0 {
        return Err("Cannot normalize zero vector".to_string());
    }

    Ok(embedding.iter().map(|x| x / norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, IxDyn};

    fn hidden_states() -> ndarray::ArrayD<f32> {
        // 3 tokens, hidden size 2
        Array3::from_shape_vec((1, 3, 2), vec![1.0, 2.0, 3.0, 4.0, 100.0, 100.0])
            .unwrap()
            .into_dyn()
    }

    #[test]
    fn test_mean_pooling_skips_padding() {
        let states = hidden_states();
        let pooled = mean_pooling(&states.view(), &[1, 1, 0]).unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling_rejects_bad_shapes() {
        let states = hidden_states();
        assert!(mean_pooling(&states.view(), &[1, 1]).is_err());
        assert!(mean_pooling(&states.view(), &[0, 0, 0]).is_err());

        let flat = ndarray::ArrayD::<f32>::zeros(IxDyn(&[3, 2]));
        assert!(mean_pooling(&flat.view(), &[1, 1, 1]).is_err());
    }

    #[test]
    fn test_normalize_embedding() {
        let normalized = normalize_embedding(&[3.0, 4.0]).unwrap();
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);

        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert!(normalize_embedding(&[0.0, 0.0, 0.0]).is_err());
    }
}
