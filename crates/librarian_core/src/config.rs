//! Configuration for a Librarian-managed workspace.

use crate::error::{LibrarianError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Comprehensive configuration for a Librarian workspace.
///
/// Loaded from `<workspace>/.librarian/config.toml`. Every field has a
/// default so an absent file is equivalent to `Config::default()`, and
/// every section can be overridden by an environment variable via
/// [`Config::apply_env_overrides`] (env beats file; CLI flags beat env).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage engine configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding service configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retriever and pack assembler configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// File watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Embedding/LLM provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Evidence ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Config {
    /// Loads configuration from `<librarian_dir>/config.toml`, applying
    /// environment overrides afterward. Returns defaults if the file is
    /// absent.
    pub fn load(librarian_dir: &Path) -> Result<Self> {
        let path = librarian_dir.join("config.toml");
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                LibrarianError::ConfigError(format!("failed to read config: {}", e))
            })?;
            toml::from_str(&content)
                .map_err(|e| LibrarianError::ConfigError(format!("failed to parse config: {}", e)))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Saves configuration to `<librarian_dir>/config.toml`.
    pub fn save(&self, librarian_dir: &Path) -> Result<()> {
        let path = librarian_dir.join("config.toml");
        let content = toml::to_string_pretty(self).map_err(|e| {
            LibrarianError::ConfigError(format!("failed to serialize config: {}", e))
        })?;
        fs::write(&path, content)
            .map_err(|e| LibrarianError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Applies `LIBRARIAN_*` environment variable overrides on top of
    /// whatever was loaded from the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LIBRARIAN_OFFLINE") {
            self.provider.offline = parse_bool_env(&v, self.provider.offline);
        }
        if let Ok(v) = std::env::var("LIBRARIAN_PROVIDER") {
            self.provider.name = v;
        }
        if let Ok(v) = std::env::var("LIBRARIAN_EMBEDDING_DIMENSION") {
            if let Ok(dim) = v.parse() {
                self.embedding.dimension = dim;
            }
        }
        if let Ok(v) = std::env::var("LIBRARIAN_TOKEN_BUDGET") {
            if let Ok(budget) = v.parse() {
                self.retrieval.default_token_budget = budget;
            }
        }
        if let Ok(v) = std::env::var("LIBRARIAN_WATCHER_DEBOUNCE_MS") {
            if let Ok(ms) = v.parse() {
                self.watcher.debounce_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("LIBRARIAN_NO_TELEMETRY") {
            self.provider.telemetry_enabled = !parse_bool_env(&v, !self.provider.telemetry_enabled);
        }
        if let Ok(v) = std::env::var("LIBRARIAN_MIN_STALENESS_CONFIDENCE") {
            if let Ok(threshold) = v.parse() {
                self.ledger.min_staleness_confidence = threshold;
            }
        }
    }
}

fn parse_bool_env(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Storage engine configuration (see the `Store` type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Compression level for zstd blobs (1-22, default: 3).
    pub compression_level: i32,

    /// Maximum allowed blob size in bytes before a write is rejected.
    pub max_blob_size: usize,

    /// Maximum nesting depth accepted by payload validation.
    pub max_payload_depth: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            max_blob_size: 64 * 1024 * 1024,
            max_payload_depth: 64,
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Whether the embedding service is enabled. When false, retrieval
    /// falls back to structural and term-match signals only.
    pub enabled: bool,

    /// Fixed dimension every embedding vector in the store must match.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dimension: 256,
        }
    }
}

/// Retriever and pack assembler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default token budget for an assembled context pack.
    pub default_token_budget: usize,

    /// Maximum graph-expansion depth (L0/L1/L2 escalation ceiling).
    pub max_depth: u32,

    /// Minimum confidence score before the Retriever returns a result.
    pub min_confidence: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_token_budget: 4000,
            max_depth: 2,
            min_confidence: 0.1,
        }
    }
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Whether the watcher is enabled at all.
    pub enabled: bool,

    /// Per-path debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
        }
    }
}

/// Embedding/LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the currently selected provider (e.g. "local-hashing").
    pub name: String,

    /// When true, no network calls are attempted and provider-backed
    /// features degrade gracefully.
    pub offline: bool,

    /// Whether usage telemetry may be emitted.
    pub telemetry_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "local-hashing".to_string(),
            offline: false,
            telemetry_enabled: true,
        }
    }
}

/// Evidence ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Minimum confidence a Contradiction-kind defeater must carry for a
    /// claim to count as stale. HumanOverride entries always defeat a
    /// claim regardless of this threshold.
    pub min_staleness_confidence: f32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_staleness_confidence: 0.5,
        }
    }
}
