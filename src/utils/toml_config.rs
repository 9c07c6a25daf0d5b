//! TOML-based configuration for SAGE
//!
//! All runtime knobs live in a single `sage.toml`. Every field has a default,
//! so an empty file (or no file at all) yields a working local setup with the
//! deterministic agents and in-memory stores.
//!
//! # Hot Reloading
//!
//! `SageConfigManager` watches the file and swaps the parsed config in place.
//! A `ResearchService` built from a manager re-reads `[retrieval]` at the
//! start of every run, so weights, strategy and budgets follow the file.
//! Every other section is fixed when the service is built.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from sage.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SageConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional LLM backing for planning, extraction and synthesis
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `SAGE_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LlmProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
    },
    OpenAI {
        /// Environment variable holding the API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Option<LlmProviderConfig>,

    /// Use the LLM to decompose research queries
    #[serde(default)]
    pub planning: bool,

    /// Use the LLM to write the final report
    #[serde(default)]
    pub synthesis: bool,

    /// Use the LLM for entity extraction during ingestion
    #[serde(default)]
    pub extraction: bool,
}

// ============= Retrieval Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    /// Min-max normalized weighted sum
    Weighted,
    /// Reciprocal rank fusion
    Rrf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_weight")]
    pub vector_weight: f32,

    #[serde(default = "default_weight")]
    pub graph_weight: f32,

    #[serde(default = "default_fusion_strategy")]
    pub strategy: FusionStrategy,

    /// Candidates requested from each backend before fusion
    #[serde(default = "default_candidates")]
    pub candidates_per_backend: usize,

    /// Evidence items kept per retrieval call (K)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_weight() -> f32 {
    0.5
}

fn default_fusion_strategy() -> FusionStrategy {
    FusionStrategy::Weighted
}

fn default_candidates() -> usize {
    10
}

fn default_top_k() -> usize {
    5
}

fn default_max_hops() -> usize {
    2
}

fn default_backend_timeout_ms() -> u64 {
    5_000
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_weight(),
            graph_weight: default_weight(),
            strategy: default_fusion_strategy(),
            candidates_per_backend: default_candidates(),
            top_k: default_top_k(),
            max_hops: default_max_hops(),
            backend_timeout_ms: default_backend_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

// ============= Orchestrator Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently running tasks within one run
    #[serde(default = "default_max_parallel")]
    pub max_parallel_tasks: usize,

    #[serde(default = "default_max_plan_tasks")]
    pub max_plan_tasks: usize,

    /// How long in-flight tasks may drain after cancellation
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_max_parallel() -> usize {
    4
}

fn default_max_plan_tasks() -> usize {
    6
}

fn default_cancel_grace_ms() -> u64 {
    2_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel(),
            max_plan_tasks: default_max_plan_tasks(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

// ============= Tools Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_tool_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_base_url: String,

    #[serde(default = "default_arxiv_url")]
    pub arxiv_base_url: String,

    /// Register the DuckDuckGo web search tool
    #[serde(default = "default_true")]
    pub web_search: bool,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_tool_backoff_ms() -> u64 {
    500
}

fn default_max_results() -> usize {
    5
}

fn default_user_agent() -> String {
    format!("sage-research/{} (research assistant)", env!("CARGO_PKG_VERSION"))
}

fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org".to_string()
}

fn default_arxiv_url() -> String {
    "https://export.arxiv.org".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            retry_backoff_ms: default_tool_backoff_ms(),
            max_results: default_max_results(),
            user_agent: default_user_agent(),
            wikipedia_base_url: default_wikipedia_url(),
            arxiv_base_url: default_arxiv_url(),
            web_search: default_true(),
        }
    }
}

// ============= Ingestion Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Feature-hashing embedder, no model download
    Hashing,
    /// fastembed ONNX model (requires the `local-embeddings` feature)
    FastEmbed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_embedding_backend")]
    pub embedding: EmbeddingBackend,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Prefix prepended to documents before embedding
    #[serde(default)]
    pub document_prefix: String,

    /// Prefix prepended to queries before embedding
    #[serde(default)]
    pub query_prefix: String,

    #[serde(default = "default_query_cache")]
    pub query_cache_size: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Hashing
}

fn default_dimensions() -> usize {
    384
}

fn default_query_cache() -> usize {
    256
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding: default_embedding_backend(),
            dimensions: default_dimensions(),
            document_prefix: String::new(),
            query_prefix: String::new(),
            query_cache_size: default_query_cache(),
        }
    }
}

// ============= History & Storage Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum HistoryConfig {
    Memory,
    Sqlite {
        #[serde(default = "default_history_path")]
        path: PathBuf,
    },
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./data/sage.db")
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig::Sqlite {
            path: default_history_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where vector and graph snapshots are written
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ============= Errors =============

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl SageConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;

        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::FileNotFound(p)) => {
                warn!("No config at {:?}, using defaults", p);
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SageConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.vector_weight < 0.0 || r.graph_weight < 0.0 {
            return Err(ConfigError::ValidationError(
                "retrieval weights must be non-negative".to_string(),
            ));
        }
        if r.vector_weight + r.graph_weight <= f32::EPSILON {
            return Err(ConfigError::ValidationError(
                "at least one retrieval weight must be positive".to_string(),
            ));
        }
        if r.top_k == 0 || r.candidates_per_backend == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k and retrieval.candidates_per_backend must be at least 1"
                    .to_string(),
            ));
        }
        if r.max_hops == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.max_hops must be at least 1".to_string(),
            ));
        }

        let o = &self.orchestrator;
        if o.max_parallel_tasks == 0 || o.max_plan_tasks == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator limits must be at least 1".to_string(),
            ));
        }

        if self.tools.max_results == 0 || self.tools.max_results > 10 {
            return Err(ConfigError::ValidationError(
                "tools.max_results must be between 1 and 10".to_string(),
            ));
        }

        let i = &self.ingestion;
        if i.chunk_size == 0 || i.chunk_overlap >= i.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "ingestion.chunk_overlap ({}) must be smaller than chunk_size ({})",
                i.chunk_overlap, i.chunk_size
            )));
        }
        if i.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "ingestion.dimensions must be at least 1".to_string(),
            ));
        }

        if let Some(LlmProviderConfig::OpenAI { api_key_env, .. }) = &self.llm.provider {
            self.validate_env_var(api_key_env)?;
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Read an env var referenced by the config
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct SageConfigManager {
    config: Arc<ArcSwap<SageConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl SageConfigManager {
    /// Load the config (or defaults when the file is missing) and wrap it
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = SageConfig::load_or_default(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Wrap an in-memory config. No file watching.
    pub fn from_config(config: SageConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("sage.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Current configuration (lockless read)
    pub fn config(&self) -> Arc<SageConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);
        let new_config = SageConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));
        Ok(())
    }

    /// Watch the config file and reload on change. Needs a tokio runtime.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!("Config watcher error: {:?}", e),
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }
        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|at| at.elapsed() < debounce) {
                    continue;
                }
                // let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match SageConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => warn!("Failed to hot-reload config: {}. Keeping previous config.", e),
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
    }
}
