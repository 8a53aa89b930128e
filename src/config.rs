//! Configuration management for the fraud case engine

use crate::types::case::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// How a case risk score is scaled
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskNormalization {
    /// Divide by the largest anomaly score in the current batch
    #[default]
    Batch,
    /// Use the mean anomaly score as-is (already in [0, 1])
    Absolute,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub detection: DetectionConfig,
    pub summarizer: SummarizerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject carrying JSON arrays of transactions
    pub batch_subject: String,
    /// Subject detected cases are published to
    pub case_subject: String,
    /// Request/reply subject for case summaries
    pub summary_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            batch_subject: "transactions.batch".to_string(),
            case_subject: "fraud.cases".to_string(),
            summary_subject: "fraud.cases.summarize".to_string(),
        }
    }
}

/// Anomaly detection and clustering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Number of isolation trees
    pub n_trees: usize,
    /// Expected outlier fraction; the flagging quantile is `1 - contamination`
    pub contamination: f64,
    /// Seed for tree construction
    pub seed: u64,
    /// Upper bound on the per-tree sub-sample size
    pub max_samples: usize,
    /// Added to the risk normalizer to avoid division by zero
    pub risk_epsilon: f64,
    /// Risk score scaling
    pub normalization: RiskNormalization,
    /// Recognized channels; anything else lands in the `other` column
    pub channels: Vec<String>,
    /// Risk level classification thresholds
    pub risk_levels: RiskLevelThresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            contamination: 0.02,
            seed: 42,
            max_samples: 256,
            risk_epsilon: 1e-6,
            normalization: RiskNormalization::Batch,
            channels: default_channels(),
            risk_levels: RiskLevelThresholds::default(),
        }
    }
}

fn default_channels() -> Vec<String> {
    ["POS", "WEB", "MOBILE", "ATM"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// Generative summarization backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// API key; when absent the rule-based narrative is used
    pub api_key: Option<String>,
    /// Model name sent to the backend
    pub model: String,
    /// Base URL of the Responses API
    pub base_url: String,
    /// Upper bound on a single backend call
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-5-mini-2025-08-07".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrently processed messages
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/config.toml` (optional) and the environment.
    ///
    /// Environment variables use the `FRAUD_` prefix and `__` between keys,
    /// e.g. `FRAUD_NATS__URL` or `FRAUD_DETECTION__CHANNELS=POS,WEB`.
    pub fn load() -> Result<Self> {
        let config = Self::from_builder(
            Config::builder()
                .add_source(File::with_name("config/config").required(false))
                .add_source(env_source()),
        )?;

        Ok(config.with_api_key_fallback(std::env::var("OPENAI_API_KEY").ok()))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::from_builder(Config::builder().add_source(File::from(path.as_ref())))?;

        Ok(config.with_api_key_fallback(std::env::var("OPENAI_API_KEY").ok()))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Blank keys count as unset; `fallback` only fills an unset key
    fn with_api_key_fallback(mut self, fallback: Option<String>) -> Self {
        let usable = |key: &String| !key.trim().is_empty();
        self.summarizer.api_key = self
            .summarizer
            .api_key
            .filter(usable)
            .or_else(|| fallback.filter(usable));
        self
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("FRAUD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("detection.channels")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.detection.n_trees, 200);
        assert_eq!(config.detection.seed, 42);
        assert_eq!(config.detection.channels.len(), 4);
        assert_eq!(config.detection.normalization, RiskNormalization::Batch);
        assert!(config.summarizer.api_key.is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let path =
            std::env::temp_dir().join(format!("fraud-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[detection]\nn_trees = 50\nnormalization = \"absolute\"\n\n\
             [summarizer]\napi_key = \"sk-test\""
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.detection.n_trees, 50);
        assert_eq!(config.detection.contamination, 0.02);
        assert_eq!(config.detection.normalization, RiskNormalization::Absolute);
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.nats.case_subject, "fraud.cases");
    }

    fn from_env(vars: &[(&str, &str)]) -> AppConfig {
        let vars: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_builder(Config::builder().add_source(env_source().source(Some(vars))))
            .unwrap()
    }

    #[test]
    fn test_env_overrides() {
        let config = from_env(&[
            ("FRAUD_NATS__URL", "nats://bus:4222"),
            ("FRAUD_DETECTION__N_TREES", "50"),
            ("FRAUD_DETECTION__CHANNELS", "POS,WEB"),
            ("FRAUD_DETECTION__NORMALIZATION", "absolute"),
        ]);

        assert_eq!(config.nats.url, "nats://bus:4222");
        assert_eq!(config.detection.n_trees, 50);
        assert_eq!(config.detection.channels, vec!["POS", "WEB"]);
        assert_eq!(config.detection.normalization, RiskNormalization::Absolute);
        assert_eq!(config.nats.batch_subject, "transactions.batch");
    }

    #[test]
    fn test_unprefixed_env_is_ignored() {
        let config = from_env(&[("NATS__URL", "nats://elsewhere:4222")]);
        assert_eq!(config.nats.url, "nats://localhost:4222");
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = from_env(&[("FRAUD_SUMMARIZER__API_KEY", "   ")]);

        assert!(config.clone().with_api_key_fallback(None).summarizer.api_key.is_none());
        assert_eq!(
            config
                .with_api_key_fallback(Some("sk-env".to_string()))
                .summarizer
                .api_key
                .as_deref(),
            Some("sk-env")
        );
    }

    #[test]
    fn test_configured_api_key_wins_over_fallback() {
        let config = from_env(&[("FRAUD_SUMMARIZER__API_KEY", "sk-configured")])
            .with_api_key_fallback(Some("sk-env".to_string()));
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-configured"));

        let config = AppConfig::default().with_api_key_fallback(Some(" ".to_string()));
        assert!(config.summarizer.api_key.is_none());
    }
}
