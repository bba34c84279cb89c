//! Analysis Server Configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::models::{AnalysisError, AnalysisResult, ClassifierConfig, EncoderConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub classifier: ClassifierConfig,
    pub encoder: EncoderConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    /// Value of `Access-Control-Allow-Origin`
    pub allowed_origin: String,
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5001".to_string(),
            allowed_origin: "*".to_string(),
            max_body_bytes: 65536,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// Log the received text and per-step timings at info level
    pub enable_detailed_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_detailed_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> AnalysisResult<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to the defaults.
    ///
    /// Returns whether the file was found alongside the config.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AnalysisResult<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::from_file(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    pub fn bind_addr(&self) -> AnalysisResult<SocketAddr> {
        self.network
            .bind_address
            .parse()
            .map_err(|e| AnalysisError::ConfigError {
                message: format!("Invalid bind_address '{}': {}", self.network.bind_address, e),
            })
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        self.bind_addr()?;
        if self.network.max_body_bytes == 0 {
            return Err(AnalysisError::ConfigError {
                message: "network.max_body_bytes must be greater than zero".to_string(),
            });
        }
        self.classifier.validate()?;
        self.encoder.validate()?;
        Ok(())
    }

    /// `tracing` filter directive for the configured level
    pub fn log_filter(&self) -> String {
        match self.monitoring.log_level.to_lowercase().as_str() {
            "trace" => "intent_server=trace,info".to_string(),
            "debug" => "intent_server=debug,info".to_string(),
            "warn" => "intent_server=warn,warn".to_string(),
            "error" => "intent_server=error,error".to_string(),
            _ => "intent_server=info,info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_network_and_labels() {
        let config = ServerConfig::default();
        assert_eq!(config.network.bind_address, "0.0.0.0:5001");
        assert_eq!(config.network.allowed_origin, "*");
        assert_eq!(
            config.classifier.candidate_labels,
            vec!["constructive argument", "critical challenge", "question"]
        );
        assert_eq!(config.encoder.embedding_dimension, 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config = ServerConfig::from_str(
            r#"
            [network]
            bind_address = "127.0.0.1:9000"

            [encoder]
            model_path = "models/minilm.onnx"

            [monitoring]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.bind_address, "127.0.0.1:9000");
        assert_eq!(config.network.max_body_bytes, 65536);
        assert_eq!(config.encoder.model_path, "models/minilm.onnx");
        assert_eq!(config.encoder.max_sequence_length, 256);
        assert_eq!(config.log_filter(), "intent_server=debug,info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = ServerConfig::from_str(include_str!("../../config.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.output_name, "logits");
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = ServerConfig::default();
        config.network.bind_address = "not-an-address".to_string();
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            ServerConfig::from_str("[network\nbind_address = 1"),
            Err(AnalysisError::TomlError { .. })
        ));
    }

    #[test]
    fn test_load_or_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[classifier]\nmulti_label = true").unwrap();

        let (config, found) = ServerConfig::load_or_default(file.path()).unwrap();
        assert!(found);
        assert!(config.classifier.multi_label);

        let dir = tempfile::tempdir().unwrap();
        let (config, found) = ServerConfig::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert!(!found);
        assert!(!config.classifier.multi_label);
    }
}
