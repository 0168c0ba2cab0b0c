use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// All engine-wide settings. Every field is optional except where the
/// retrieval engine cannot function without it (an LLM key for the
/// LLM-using strategies). Loaded from an optional `config.toml` overlaid
/// by environment variables, matching the teacher's config layering.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Required only when a strategy that calls the LLM (multi_query,
    /// rerank, ensemble, the evaluator) is actually invoked; absence is a
    /// `config_error` surfaced lazily rather than checked eagerly at
    /// startup, so read-only resource paths that never touch the LLM keep
    /// working without one.
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    pub vector_store_url: Option<String>,
    pub vector_store_api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection_name: String,

    pub cache_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub enable_tracing_spans: bool,
    #[serde(default)]
    pub enable_performance_logging: bool,

    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub transport: TransportKind,

    /// Deadline enforced around every strategy invocation by the pipeline
    /// wrapper, independent of any per-call HTTP timeout.
    #[serde(default = "default_strategy_timeout_secs")]
    pub strategy_timeout_secs: u64,

    /// Path to a golden dataset JSONL file (one `EvalSample` per line).
    /// `None` makes `evaluate_rag` return a `config_error` instead of
    /// silently falling back to a hard-coded sample set — see
    /// DESIGN.md's "golden dataset" decision.
    pub golden_dataset_path: Option<String>,
}

impl AppConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    /// Minimal config for unit tests: no external services configured, short
    /// timeouts, nothing read from the environment.
    pub fn for_tests() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: default_base_url(),
            llm_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            vector_store_url: None,
            vector_store_api_key: None,
            collection_name: default_collection(),
            cache_url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            default_k: default_k(),
            max_concurrency: default_concurrency(),
            log_level: None,
            enable_tracing_spans: false,
            enable_performance_logging: false,
            http_port: default_http_port(),
            transport: TransportKind::default(),
            strategy_timeout_secs: default_strategy_timeout_secs(),
            golden_dataset_path: None,
        }
    }
}

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_owned()
}

fn default_collection() -> String {
    "documents".to_owned()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_k() -> usize {
    5
}

fn default_concurrency() -> usize {
    8
}

fn default_http_port() -> u16 {
    8008
}

fn default_strategy_timeout_secs() -> u64 {
    30
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
