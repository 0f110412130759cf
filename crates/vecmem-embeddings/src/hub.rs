//! Model files from HuggingFace Hub.
//!
//! hf-hub keeps its own content-addressed cache; a file that is already there
//! is returned without touching the network.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Default sentence-transformer repository
pub const DEFAULT_MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Where a model comes from and where its files are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    repo_id: String,
    cache_dir: PathBuf,
}

/// Local paths of the files a BERT embedder needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// `<user cache dir>/vecmem/models`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("vecmem")
        .join("models")
}

impl ModelSource {
    /// `cache_dir` of `None` uses [`default_cache_dir`].
    pub fn new(repo_id: impl Into<String>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            repo_id: repo_id.into(),
            cache_dir: cache_dir.unwrap_or_else(default_cache_dir),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Last segment of the repository id, e.g. `all-MiniLM-L6-v2`.
    pub fn model_name(&self) -> &str {
        self.repo_id.rsplit('/').next().unwrap_or(&self.repo_id)
    }

    /// Resolve the model files, downloading whatever the cache lacks.
    pub fn fetch(&self) -> Result<ModelFiles, EmbeddingError> {
        info!(repo = %self.repo_id, cache_dir = ?self.cache_dir, "Resolving model files");

        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(false)
            .build()
            .map_err(|e| EmbeddingError::Download {
                file: self.repo_id.clone(),
                reason: e.to_string(),
            })?;
        let repo = api.model(self.repo_id.clone());

        let get = |file: &str| -> Result<PathBuf, EmbeddingError> {
            let path = repo.get(file).map_err(|e| EmbeddingError::Download {
                file: file.to_string(),
                reason: e.to_string(),
            })?;
            debug!(file, path = ?path, "Model file ready");
            Ok(path)
        };

        Ok(ModelFiles {
            config: get(CONFIG_FILE)?,
            tokenizer: get(TOKENIZER_FILE)?,
            weights: get(WEIGHTS_FILE)?,
        })
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_REPO, None)
    }
}
