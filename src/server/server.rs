//! Analysis Server
//!
//! Owns the configuration and the loaded models, and runs the HTTP server
//! until Ctrl+C.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::IntentAnalyzer;
use crate::server::config::ServerConfig;
use crate::server::hyper_server::start_hyper_http_server;

pub struct AnalysisServer {
    config: Arc<ServerConfig>,
    analyzer: Arc<IntentAnalyzer>,
    server_id: Uuid,
}

impl AnalysisServer {
    /// Validate the configuration and load both models
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        info!("Initializing Intent Analysis Server");

        config.validate()?;
        let analyzer = IntentAnalyzer::load(&config.classifier, &config.encoder).await?;

        Ok(Self::with_analyzer(config, analyzer))
    }

    /// Build a server around an analyzer that is already loaded
    pub fn with_analyzer(config: ServerConfig, analyzer: IntentAnalyzer) -> Self {
        let server_id = Uuid::new_v4();
        info!("Server ID: {}", server_id);

        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
            server_id,
        }
    }

    pub fn analyzer(&self) -> Arc<IntentAnalyzer> {
        Arc::clone(&self.analyzer)
    }

    /// Serve HTTP until Ctrl+C
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Server {} starting", self.server_id);

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };

        start_hyper_http_server(Arc::clone(&self.config), Arc::clone(&self.analyzer), shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::model::testing::{HashEncoder, KeywordClassifier};

    #[tokio::test]
    async fn test_with_analyzer_shares_models() {
        let analyzer = IntentAnalyzer::new(
            Arc::new(KeywordClassifier::new()),
            Arc::new(HashEncoder::new(384)),
            vec!["question".to_string(), "statement".to_string()],
        )
        .unwrap();

        let server = AnalysisServer::with_analyzer(ServerConfig::default(), analyzer);
        let analysis = server.analyzer().analyze("Really?").await.unwrap();
        assert_eq!(analysis.intent, "statement");
        assert_eq!(analysis.vector.len(), 384);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = ServerConfig::default();
        config.classifier.candidate_labels.clear();
        assert!(AnalysisServer::new(config).await.is_err());
    }
}
