//! # ONNX Zero-Shot Engine
//!
//! Zero-shot classification on top of an NLI model (bart-large-mnli by
//! default). Every candidate label becomes a hypothesis, the text is the
//! premise, and the entailment logits decide the ranking.

use ndarray::{ArrayView2, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info, instrument};

use crate::models::{AnalysisError, AnalysisResult, ClassifierConfig, LabelScore};
use crate::onnx::{i64_tensor, load_error, load_tokenizer, require_output};

/// Output indices of an NLI head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NliLabels {
    pub entailment: usize,
    pub contradiction: usize,
    pub num_labels: usize,
}

impl Default for NliLabels {
    /// bart-large-mnli: contradiction, neutral, entailment
    fn default() -> Self {
        Self {
            entailment: 2,
            contradiction: 0,
            num_labels: 3,
        }
    }
}

impl NliLabels {
    /// Read the label mapping from a Hugging Face `config.json`.
    ///
    /// `label2id` is preferred; `id2label` is used when it is absent. Label
    /// names are matched case-insensitively on their `entail` / `contradict`
    /// prefix.
    pub fn from_config_json(content: &str) -> AnalysisResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| {
            AnalysisError::ConfigError {
                message: format!("Invalid model config.json: {}", e),
            }
        })?;

        let mut pairs: Vec<(String, usize)> = Vec::new();

        if let Some(label2id) = value.get("label2id").and_then(|v| v.as_object()) {
            for (name, id) in label2id {
                if let Some(id) = id.as_u64() {
                    pairs.push((name.to_lowercase(), id as usize));
                }
            }
        } else if let Some(id2label) = value.get("id2label").and_then(|v| v.as_object()) {
            for (id, name) in id2label {
                if let (Ok(id), Some(name)) = (id.parse::<usize>(), name.as_str()) {
                    pairs.push((name.to_lowercase(), id));
                }
            }
        }

        let find = |prefix: &str| {
            pairs
                .iter()
                .find(|(name, _)| name.starts_with(prefix))
                .map(|(_, id)| *id)
        };

        let entailment = find("entail").ok_or_else(|| AnalysisError::ConfigError {
            message: "Model config has no 'entailment' label".to_string(),
        })?;
        let contradiction = find("contradict").ok_or_else(|| AnalysisError::ConfigError {
            message: "Model config has no 'contradiction' label".to_string(),
        })?;

        let num_labels = pairs.iter().map(|(_, id)| id + 1).max().unwrap_or(0);

        Ok(Self {
            entailment,
            contradiction,
            num_labels,
        })
    }
}

/// ONNX-based zero-shot classifier
#[derive(Debug)]
pub struct OnnxZeroShotEngine {
    session: Session,
    tokenizer: Tokenizer,
    labels: NliLabels,
    pad_id: u32,
    uses_token_type_ids: bool,
    output_name: String,
    hypothesis_template: String,
    multi_label: bool,
    name: String,
}

impl OnnxZeroShotEngine {
    /// Load the NLI model described by `config`
    pub fn new(config: &ClassifierConfig) -> AnalysisResult<Self> {
        info!("Initializing ONNX zero-shot engine with model: {}", config.model_path);

        let labels = match &config.config_path {
            Some(path) => NliLabels::from_config_json(&std::fs::read_to_string(path)?)?,
            None => NliLabels::default(),
        };
        debug!("NLI label mapping: {:?}", labels);

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(config.num_threads)
            .map_err(load_error)?
            .commit_from_file(&config.model_path)
            .map_err(|e| load_error(format!("Failed to load ONNX model {}: {}", config.model_path, e)))?;

        require_output(session.outputs.iter().map(|o| o.name.as_str()), &config.output_name)?;

        let mut tokenizer = load_tokenizer(&config.tokenizer_path, config.max_sequence_length)?;

        let pad_id = pad_token_id(&tokenizer);
        // Padding is done per batch by `pad_batch`
        tokenizer.with_padding(None);

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut engine = Self {
            session,
            tokenizer,
            labels,
            pad_id,
            uses_token_type_ids,
            output_name: config.output_name.clone(),
            hypothesis_template: config.hypothesis_template.clone(),
            multi_label: config.multi_label,
            name: config.name.clone(),
        };

        // Catch a wrong label mapping or logits layout before serving
        engine
            .classify("validation test", &config.candidate_labels)
            .map_err(|e| load_error(format!("Zero-shot model validation failed: {}", e)))?;

        info!(
            "ONNX zero-shot engine ready: {} ({} threads, multi_label={})",
            config.name, config.num_threads, config.multi_label
        );

        Ok(engine)
    }

    /// Score `text` against every candidate label, best first
    #[instrument(skip(self, text, candidate_labels), fields(text_len = text.len(), labels = candidate_labels.len()))]
    pub fn classify(&mut self, text: &str, candidate_labels: &[String]) -> AnalysisResult<Vec<LabelScore>> {
        if candidate_labels.is_empty() {
            return Ok(Vec::new());
        }

        let mut encodings = Vec::with_capacity(candidate_labels.len());
        for label in candidate_labels {
            let hypothesis = hypothesis_for(&self.hypothesis_template, label);
            let encoding = self
                .tokenizer
                .encode((text, hypothesis.as_str()), true)
                .map_err(|e| self.inference_error(format!("Tokenization failed: {}", e)))?;
            encodings.push(encoding);
        }

        let PaddedBatch {
            rows,
            max_len,
            input_ids,
            attention_mask,
            token_type_ids,
        } = pad_batch(&encodings, self.pad_id);

        let mut inputs = vec![
            ("input_ids", i64_tensor(rows, max_len, input_ids).map_err(|e| self.inference_error(e))?),
            ("attention_mask", i64_tensor(rows, max_len, attention_mask).map_err(|e| self.inference_error(e))?),
        ];
        if self.uses_token_type_ids {
            inputs.push((
                "token_type_ids",
                i64_tensor(rows, max_len, token_type_ids).map_err(|e| self.inference_error(e))?,
            ));
        }

        let (dims, logits) = {
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
                    error: format!("Failed to extract logits: {}", e),
                })?;

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, data.to_vec())
        };

        if dims.len() != 2 || dims[0] != rows {
            return Err(self.inference_error(format!(
                "Expected logits of shape [{}, num_labels], got {:?}",
                rows, dims
            )));
        }

        let logits = ArrayView2::from_shape((dims[0], dims[1]), logits.as_slice())
            .map_err(|e| self.inference_error(format!("Failed to view logits: {:?}", e)))?;

        let scores = score_candidates(logits, self.labels, candidate_labels, self.multi_label)
            .map_err(|e| self.inference_error(e))?;

        debug!("Top label: {:?}", scores.first());
        Ok(scores)
    }

    fn inference_error(&self, error: impl Into<String>) -> AnalysisError {
        AnalysisError::InferenceError {
            model_name: self.name.clone(),
            error: error.into(),
        }
    }
}

/// Row-major `[rows, max_len]` model inputs for a batch of encodings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBatch {
    pub rows: usize,
    pub max_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

/// Right-pad every encoding to the longest one in the batch.
///
/// Padding uses `pad_id` for the ids and 0 for the mask and type ids.
pub fn pad_batch(encodings: &[Encoding], pad_id: u32) -> PaddedBatch {
    let rows = encodings.len();
    let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

    let mut input_ids = Vec::with_capacity(rows * max_len);
    let mut attention_mask = Vec::with_capacity(rows * max_len);
    let mut token_type_ids = Vec::with_capacity(rows * max_len);
    for encoding in encodings {
        let pad = max_len - encoding.len();
        input_ids.extend(encoding.get_ids().iter().map(|&x| x as i64));
        input_ids.extend(std::iter::repeat(pad_id as i64).take(pad));
        attention_mask.extend(encoding.get_attention_mask().iter().map(|&x| x as i64));
        attention_mask.extend(std::iter::repeat(0i64).take(pad));
        token_type_ids.extend(encoding.get_type_ids().iter().map(|&x| x as i64));
        token_type_ids.extend(std::iter::repeat(0i64).take(pad));
    }

    PaddedBatch {
        rows,
        max_len,
        input_ids,
        attention_mask,
        token_type_ids,
    }
}

/// Pad token of `tokenizer`: its padding config, then `<pad>`, then `[PAD]`, else 0
pub fn pad_token_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0)
}

/// Fill the `{}` placeholder of a hypothesis template
pub fn hypothesis_for(template: &str, label: &str) -> String {
    template.replacen("{}", label, 1)
}

/// Numerically stable softmax
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Turn `[candidates, nli_labels]` logits into ranked label scores.
///
/// Single-label: softmax of the entailment logits across candidates.
/// Multi-label: per candidate softmax over `[contradiction, entailment]`.
/// Equal scores keep candidate order.
pub fn score_candidates(
    logits: ArrayView2<f32>,
    labels: NliLabels,
    candidate_labels: &[String],
    multi_label: bool,
) -> Result<Vec<LabelScore>, String> {
    let (rows, cols) = logits.dim();
    if rows != candidate_labels.len() {
        return Err(format!(
            "Got {} logit rows for {} candidate labels",
            rows,
            candidate_labels.len()
        ));
    }
    if cols != labels.num_labels {
        return Err(format!(
            "Got {} logits per candidate, the NLI head has {} labels",
            cols, labels.num_labels
        ));
    }
    if labels.entailment >= cols || labels.contradiction >= cols {
        return Err(format!(
            "NLI label ids ({}, {}) out of range for {} logits",
            labels.entailment, labels.contradiction, cols
        ));
    }

    let probabilities: Vec<f32> = if multi_label {
        logits
            .axis_iter(Axis(0))
            .map(|row| softmax(&[row[labels.contradiction], row[labels.entailment]])[1])
            .collect()
    } else {
        let entailment: Vec<f32> = logits.column(labels.entailment).to_vec();
        softmax(&entailment)
    };

    let mut scores: Vec<LabelScore> = candidate_labels
        .iter()
        .zip(probabilities)
        .map(|(label, score)| LabelScore {
            label: label.clone(),
            score,
        })
        .collect();
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    Ok(scores)
}
