//! Configuration loading for vecmem.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/vecmem/config.{toml,yaml,json}.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::memory::DEFAULT_TOP_K;

/// Embedding dimension of all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;

/// Name of the durable index file inside the data directory.
pub const INDEX_FILE_NAME: &str = "index.flat";

/// Name of the metadata database directory inside the data directory.
pub const METADATA_DIR_NAME: &str = "memory.db";

/// Which embedding backend turns text into vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderProvider {
    /// Local all-MiniLM-L6-v2 via Candle (downloads the model on first use)
    #[default]
    Candle,
    /// Feature-hashing bag of words; offline and deterministic, not semantic
    Hashing,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default)]
    pub provider: EmbedderProvider,

    /// HuggingFace repository of the sentence-transformer model
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    /// Directory for downloaded model files (defaults to the user cache dir)
    #[serde(default)]
    pub cache_dir: Option<String>,
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            model_repo: default_model_repo(),
            cache_dir: None,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the index file and the metadata database
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Embedding dimension baked into the index
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Matches returned by `search` when the caller gives no `top_k`
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default)]
    pub embedder: EmbedderSettings,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "vecmem")
        .map(|p| p.data_local_dir().join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dimension: default_dimension(),
            log_level: default_log_level(),
            default_top_k: default_top_k(),
            embedder: EmbedderSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/vecmem/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (VECMEM_DATA_DIR, VECMEM_EMBEDDER__PROVIDER, ...)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "vecmem")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())?
            .set_default("dimension", default_dimension() as i64)?
            .set_default("log_level", default_log_level())?
            .set_default("default_top_k", default_top_k() as i64)?
            .set_default("embedder.provider", "candle")?
            .set_default("embedder.model_repo", default_model_repo())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Nested keys use a double underscore: VECMEM_EMBEDDER__CACHE_DIR
        builder = builder.add_source(
            Environment::with_prefix("VECMEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the store cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::Invalid {
                key: "dimension",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.default_top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "default_top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Expand ~ in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    /// Model cache directory with ~ expanded, if one is configured
    pub fn expanded_cache_dir(&self) -> Option<PathBuf> {
        self.embedder.cache_dir.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
