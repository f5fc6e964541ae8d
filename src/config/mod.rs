
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::chunker::ChunkerConfig;

/// Crate configuration, loadable from a TOML file. Every field has a
/// working default for a local Ollama setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub chunking: ChunkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub generation_model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.2:latest".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: 0")]
    InvalidPort,
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name (cannot be empty)")]
    InvalidModel,
    #[error("Invalid chunk size: 0 (must be positive)")]
    InvalidChunkSize,
    #[error("Overlap ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

impl OllamaConfig {
    /// Base URL of the Ollama server.
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&format!("{}://{}:{}", self.protocol, self.host, self.port))
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))
    }
}

impl Config {
    /// Load and validate a TOML config file.
    #[inline]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when no
    /// config file exists.
    #[inline]
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<platform config dir>/pagechat/config.toml`, if resolvable.
    #[inline]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pagechat").join("config.toml"))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.protocol != "http" && self.ollama.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.ollama.protocol.clone()));
        }
        if self.ollama.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.ollama.batch_size == 0 || self.ollama.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.ollama.batch_size));
        }
        if self.ollama.embedding_model.trim().is_empty()
            || self.ollama.generation_model.trim().is_empty()
        {
            return Err(ConfigError::InvalidModel);
        }
        if self.chunking.max_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.chunking.overlap >= self.chunking.max_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunking.overlap,
                self.chunking.max_size,
            ));
        }
        self.ollama.base_url()?;
        Ok(())
    }
}
