//! Intent Analysis Server Library
//!
//! HTTP service that classifies the rhetorical intent of a short text with a
//! zero-shot NLI model and returns it together with a sentence embedding.

pub mod models;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use models::{Analysis, AnalysisError, Embedding, IntentAnalyzer};
pub use protocol::{AnalyzeRequest, AnalyzeResponse};
pub use server::{start_hyper_http_server, AnalysisServer, ServerConfig};
