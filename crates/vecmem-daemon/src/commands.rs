//! Command implementations for vecmem.
//!
//! Handles:
//! - serve: bootstrap the store and run the stdio tool server
//! - add / search / reset / status: one-shot operations printing JSON

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

use vecmem_embeddings::{CandleEmbedder, EmbeddingModel, HashingEmbedder, ModelSource};
use vecmem_service::run_stdio_server;
use vecmem_store::{MemoryConfig, MemoryService};
use vecmem_types::{EmbedderProvider, Settings};

use crate::cli::Commands;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }

    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr: stdout is reserved for protocol frames and command
/// output. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Build the embedder selected in settings. May download model files.
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingModel>> {
    match settings.embedder.provider {
        EmbedderProvider::Candle => {
            let source = ModelSource::new(
                settings.embedder.model_repo.clone(),
                settings.expanded_cache_dir(),
            );
            let embedder =
                CandleEmbedder::load(&source).context("Failed to load embedding model")?;
            Ok(Arc::new(embedder))
        }
        EmbedderProvider::Hashing => {
            warn!("Using feature-hashing embedder: matches are lexical, not semantic");
            Ok(Arc::new(HashingEmbedder::new(settings.dimension)))
        }
    }
}

/// Open the memory store described by `settings`.
///
/// Creates the data directory when absent. A corrupt or incompatible index
/// file aborts here.
pub fn bootstrap(settings: &Settings) -> Result<Arc<MemoryService>> {
    let config = MemoryConfig::from_settings(settings);
    info!(data_dir = ?config.data_dir, dimension = config.dimension, "Opening memory store");

    let embedder = build_embedder(settings)?;
    let service = MemoryService::open(config, embedder).context("Failed to open memory store")?;
    Ok(Arc::new(service))
}

/// Result of a one-shot command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub value: Value,
    /// False when the operation reported `ok: false`
    pub success: bool,
}

/// Run a one-shot command against an open service.
pub fn run_command(
    service: &MemoryService,
    command: &Commands,
    default_top_k: usize,
) -> Result<CommandOutput> {
    let output = match command {
        Commands::Add { text } => {
            let result = service.add_text(text);
            CommandOutput {
                success: result.ok,
                value: serde_json::to_value(result)?,
            }
        }
        Commands::Search { query, top_k } => {
            let response = service
                .search(query, top_k.unwrap_or(default_top_k))
                .context("Search failed")?;
            CommandOutput {
                value: serde_json::to_value(response)?,
                success: true,
            }
        }
        Commands::Reset => {
            let result = service.reset_memory();
            CommandOutput {
                success: result.ok,
                value: serde_json::to_value(result)?,
            }
        }
        Commands::Status => {
            let status = service.status().context("Failed to read status")?;
            CommandOutput {
                value: serde_json::to_value(status)?,
                success: true,
            }
        }
        Commands::Serve => anyhow::bail!("serve is not a one-shot command"),
    };
    Ok(output)
}

/// Bootstrap, then serve the tool protocol on stdio until EOF or a signal.
pub async fn serve(settings: Settings) -> Result<()> {
    let default_top_k = settings.default_top_k;

    // Model loading is blocking and may hit the network
    let service = tokio::task::spawn_blocking(move || bootstrap(&settings))
        .await
        .context("Bootstrap task failed")??;

    run_stdio_server(service, default_top_k, shutdown_signal())
        .await
        .context("Tool server error")?;

    info!("vecmem stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run a one-shot command from settings and print its JSON output.
pub fn run_oneshot(settings: &Settings, command: &Commands) -> Result<()> {
    let service = bootstrap(settings)?;
    let output = run_command(&service, command, settings.default_top_k)?;

    println!("{}", serde_json::to_string_pretty(&output.value)?);
    if !output.success {
        anyhow::bail!("Operation failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vecmem_types::EmbedderSettings;

    fn hashing_settings(temp: &TempDir) -> Settings {
        Settings {
            data_dir: temp.path().join("data").to_string_lossy().to_string(),
            dimension: 64,
            embedder: EmbedderSettings {
                provider: EmbedderProvider::Hashing,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_build_hashing_embedder() {
        let temp = TempDir::new().unwrap();
        let embedder = build_embedder(&hashing_settings(&temp)).unwrap();
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn test_bootstrap_creates_data_dir() {
        let temp = TempDir::new().unwrap();
        let settings = hashing_settings(&temp);
        let service = bootstrap(&settings).unwrap();
        assert!(settings.expanded_data_dir().is_dir());
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_run_commands() {
        let temp = TempDir::new().unwrap();
        let service = bootstrap(&hashing_settings(&temp)).unwrap();

        let add = Commands::Add {
            text: "remember the milk".to_string(),
        };
        let output = run_command(&service, &add, 5).unwrap();
        assert!(output.success);
        assert_eq!(output.value["message"], "Stored 17 chars.");

        let search = Commands::Search {
            query: "milk".to_string(),
            top_k: None,
        };
        let output = run_command(&service, &search, 5).unwrap();
        assert_eq!(output.value["matches"][0]["text"], "remember the milk");

        let output = run_command(&service, &Commands::Status, 5).unwrap();
        assert_eq!(output.value["records"], 1);
        assert_eq!(output.value["vectors"], 1);

        let output = run_command(&service, &Commands::Reset, 5).unwrap();
        assert_eq!(output.value["message"], "All memory cleared.");

        assert!(run_command(&service, &Commands::Serve, 5).is_err());
    }

    #[test]
    fn test_load_settings_overrides() {
        let settings = load_settings(None, Some("/tmp/vecmem-override"), Some("debug")).unwrap();
        assert_eq!(settings.data_dir, "/tmp/vecmem-override");
        assert_eq!(settings.log_level, "debug");
    }
}
