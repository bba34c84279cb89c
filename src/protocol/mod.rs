//! Wire types for the analysis service

pub mod http;

pub use http::{AnalyzeRequest, AnalyzeResponse, HealthResponse, HttpErrorResponse};
