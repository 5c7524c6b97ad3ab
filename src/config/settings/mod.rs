#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub explainer: ExplainerConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Embedding model used to turn product text into vectors at ingestion time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Text-generation service used for recommendation explanations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplainerConfig {
    pub enabled: bool,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub temperature: f32,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3.2:latest".to_string(),
            timeout_ms: 8000,
            cache_ttl_seconds: 300,
            temperature: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownUserPolicy {
    /// Fail the request with `UnknownUser`
    #[default]
    Reject,
    /// Rank against the mean of all catalog embeddings
    CatalogCentroid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    pub alpha: f64,
    pub default_k: u32,
    pub exclude_consumed: bool,
    pub unknown_user_policy: UnknownUserPolicy,
    pub half_life_days: f64,
    pub saturation: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            default_k: 5,
            exclude_consumed: false,
            unknown_user_policy: UnknownUserPolicy::Reject,
            half_life_days: 30.0,
            saturation: 1.0,
        }
    }
}

/// Offline evaluation figures reported alongside every response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub evaluated_k: u32,
    pub hit_rate_at_k: Option<f64>,
    pub ndcg_at_k: Option<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            evaluated_k: 10,
            hit_rate_at_k: None,
            ndcg_at_k: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid explainer timeout: {0}ms (must be between 100 and 120000)")]
    InvalidExplainerTimeout(u64),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid alpha: {0} (must be between 0 and 1)")]
    InvalidAlpha(f64),
    #[error("Invalid default k: {0} (must be between 1 and 100)")]
    InvalidDefaultK(u32),
    #[error("Invalid half-life: {0} days (must be greater than 0)")]
    InvalidHalfLife(f64),
    #[error("Invalid saturation: {0} (must be greater than 0)")]
    InvalidSaturation(f64),
    #[error("Invalid evaluated k: {0} (must be between 1 and 1000)")]
    InvalidEvaluatedK(u32),
    #[error("Invalid metric {name}: {value} (must be between 0 and 1)")]
    InvalidMetric { name: &'static str, value: f64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default data directory, `~/.hybrid-rec`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".hybrid-rec"))
            .or_else(|| dirs::data_dir().map(|data| data.join("hybrid-rec")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.explainer.validate()?;
        self.ranking.validate()?;
        self.metrics.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Path of the SQLite database holding the catalog and interaction log
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("recommender.db")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

fn validate_endpoint(protocol: &str, host: &str, port: u16) -> Result<Url, ConfigError> {
    if protocol != "http" && protocol != "https" {
        return Err(ConfigError::InvalidProtocol(protocol.to_string()));
    }

    let url_str = format!("{}://{}:{}", protocol, host, port);
    let url = Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }

    Ok(url)
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.protocol, &self.host, self.port)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(2..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(2..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl ExplainerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.protocol, &self.host, self.port)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(100..=120_000).contains(&self.timeout_ms) {
            return Err(ConfigError::InvalidExplainerTimeout(self.timeout_ms));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }

    #[inline]
    pub fn explainer_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), ConfigError> {
        if !(100..=120_000).contains(&timeout_ms) {
            return Err(ConfigError::InvalidExplainerTimeout(timeout_ms));
        }
        self.timeout_ms = timeout_ms;
        Ok(())
    }
}

impl RankingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN fails every check
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }

        if !(1..=100).contains(&self.default_k) {
            return Err(ConfigError::InvalidDefaultK(self.default_k));
        }

        if !(self.half_life_days > 0.0 && self.half_life_days.is_finite()) {
            return Err(ConfigError::InvalidHalfLife(self.half_life_days));
        }

        if !(self.saturation > 0.0 && self.saturation.is_finite()) {
            return Err(ConfigError::InvalidSaturation(self.saturation));
        }

        Ok(())
    }

    #[inline]
    pub fn set_alpha(&mut self, alpha: f64) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        self.alpha = alpha;
        Ok(())
    }

    #[inline]
    pub fn set_default_k(&mut self, default_k: u32) -> Result<(), ConfigError> {
        if !(1..=100).contains(&default_k) {
            return Err(ConfigError::InvalidDefaultK(default_k));
        }
        self.default_k = default_k;
        Ok(())
    }
}

impl MetricsConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.evaluated_k) {
            return Err(ConfigError::InvalidEvaluatedK(self.evaluated_k));
        }

        for (name, value) in [
            ("hit_rate_at_k", self.hit_rate_at_k),
            ("ndcg_at_k", self.ndcg_at_k),
        ] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::InvalidMetric { name, value });
                }
            }
        }

        Ok(())
    }
}
