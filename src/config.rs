/// Configuration module for codepilot.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "codepilot.json";

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_search_top_k() -> usize {
    5
}

fn default_index_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codepilot")
        .join("data")
}

fn default_index_file() -> String {
    "vectors.bin".to_string()
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_skip_dirs() -> Vec<String> {
    vec!["env".to_string(), "venv".to_string()]
}

fn default_dimensions() -> usize {
    768
}

fn default_batch_size() -> usize {
    8
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Upper bound on chunk length, in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Accepted for compatibility; no splitting path applies it.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Directory holding both index artifacts.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    #[serde(default = "default_index_file")]
    pub index_file: String,

    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Persist chunk text inside each metadata record.
    #[serde(default = "default_true")]
    pub store_content: bool,

    /// Directory names pruned during a recursive scan (exact segment match).
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            index_dir: default_index_dir(),
            index_file: default_index_file(),
            metadata_file: default_metadata_file(),
            store_content: default_true(),
            skip_dirs: default_skip_dirs(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the working directory.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        if self.chunk_overlap > 0 {
            warn!(
                "chunk_overlap = {} is accepted but not applied when splitting",
                self.chunk_overlap
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(&self.index_file)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.index_dir.join(&self.metadata_file)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
