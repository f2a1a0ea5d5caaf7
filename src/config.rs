//! Configuration management with layered sources.
//!
//! Settings are resolved in precedence order: built-in defaults, then the
//! project's `.semdex/config.toml`, then `SEMDEX_`-prefixed environment
//! variables (double underscore separates nesting levels, e.g.
//! `SEMDEX_SEARCH__MAX_THREADS=4`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::IndexError;
use crate::vector::{VectorError, VectorPrecision};

/// Name of the per-project data directory.
pub const DATA_DIR: &str = ".semdex";

/// Top-level settings, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the project being indexed. Detected when not configured.
    pub workspace_root: Option<PathBuf>,

    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub watch: WatchConfig,
}

/// File discovery and chunking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Chunks per provider batch.
    pub batch_size: usize,
    /// Files larger than this are skipped.
    pub max_file_size_bytes: u64,
    /// Extensions considered indexable.
    pub extensions: Vec<String>,
    /// Glob patterns excluded on top of gitignore rules.
    pub ignore_patterns: Vec<String>,
    /// Upper bound on lines per chunk.
    pub chunk_max_lines: usize,
}

/// Query-time knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Worker threads for the parallel scan. 0 means all cores.
    pub max_threads: usize,
    /// Result count when the caller does not specify one.
    pub default_limit: usize,
}

/// Embedding provider selection and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider backend. Currently only "fastembed".
    pub provider: String,
    /// Model identifier, part of every cache key.
    pub model: String,
    /// Stored vector precision.
    pub precision: VectorPrecision,
    pub retry: RetryConfig,
}

/// Backoff parameters for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Overall deadline for one batch, including retries.
    pub timeout_secs: u64,
}

/// Embedding cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bounded capacity of the in-memory hot tier.
    pub hot_capacity: usize,
}

/// How filesystem changes are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS-native change notifications.
    Native,
    /// Periodic directory re-scan, for filesystems where native
    /// notifications are unreliable (network mounts, some containers).
    Polling,
}

/// Change monitoring knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub mode: WatchMode,
    /// Quiet period after the last change before reindexing starts.
    pub debounce_secs: u64,
    /// Scan interval when `mode` is polling.
    pub poll_interval_secs: u64,
}

fn default_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "rb", "php",
        "md", "toml", "yaml", "yml", "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_file_size_bytes: 1024 * 1024,
            extensions: default_extensions(),
            ignore_patterns: vec!["target/**".to_string(), "node_modules/**".to_string()],
            chunk_max_lines: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            default_limit: 10,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
            model: "all-minilm-l6-v2".to_string(),
            precision: VectorPrecision::Full,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_secs: 300,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { hot_capacity: 4096 }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Native,
            debounce_secs: 60,
            poll_interval_secs: 30,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace_root: None,
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Settings {
    /// Load configuration from defaults, the project config file, and
    /// `SEMDEX_` environment variables, then validate.
    pub fn load() -> Result<Self, IndexError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(DATA_DIR).join("config.toml"));

        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting: SEMDEX_WATCH__DEBOUNCE_SECS
            .merge(Env::prefixed("SEMDEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| IndexError::ConfigError {
                reason: e.to_string(),
            })?;

        if settings.workspace_root.is_none() {
            settings.workspace_root = Self::detect_workspace_root();
        }

        settings.check()?;
        Ok(settings)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn check(&self) -> Result<(), IndexError> {
        if self.embedding.precision == VectorPrecision::Half {
            return Err(VectorError::HalfPrecisionUnsupported.into());
        }
        if self.indexing.batch_size == 0 {
            return Err(IndexError::ConfigError {
                reason: "indexing.batch_size must be at least 1".to_string(),
            });
        }
        if self.indexing.chunk_max_lines == 0 {
            return Err(IndexError::ConfigError {
                reason: "indexing.chunk_max_lines must be at least 1".to_string(),
            });
        }
        if self.watch.debounce_secs == 0 {
            return Err(IndexError::ConfigError {
                reason: "watch.debounce_secs must be at least 1".to_string(),
            });
        }
        if self.watch.mode == WatchMode::Polling && self.watch.poll_interval_secs == 0 {
            return Err(IndexError::ConfigError {
                reason: "watch.poll_interval_secs must be at least 1 in polling mode".to_string(),
            });
        }
        if self.embedding.retry.max_attempts == 0 {
            return Err(IndexError::ConfigError {
                reason: "embedding.retry.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Walk ancestors of the current directory looking for a data dir.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let data_dir = ancestor.join(DATA_DIR);
            if data_dir.is_dir() {
                return Some(data_dir.join("config.toml"));
            }
        }
        None
    }

    fn detect_workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            if ancestor.join(DATA_DIR).is_dir() || ancestor.join(".git").is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }
        Some(current)
    }

    /// The project root, falling back to the current directory.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Per-project data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root().join(DATA_DIR)
    }

    /// Embedding cache directory inside the data dir.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    /// Download directory for local embedding models.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir().join("models")
    }

    /// Data dir for an explicit root, used when watching several projects.
    #[must_use]
    pub fn data_dir_for(root: &Path) -> PathBuf {
        root.join(DATA_DIR)
    }
}

impl RetryConfig {
    /// Convert the millisecond fields into durations for the retry policy.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    #[must_use]
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
