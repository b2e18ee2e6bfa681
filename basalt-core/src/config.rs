//! Knowledge engine configuration types.
//!
//! These are the resolved (non-optional) settings consumed by
//! `basalt-knowledge`. Callers embedding the engine fill them from their own
//! configuration surface; every field has a serde default so a partial TOML
//! or JSON fragment deserializes into a usable value.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolved knowledge engine settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Expected embedding dimension. When unset, the dimension is learned
    /// from the first vector the provider returns.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_embedding_retries")]
    pub embedding_retries: u32,
    /// Window length for excerpt chunking, in tokens.
    #[serde(default = "default_excerpt_size")]
    pub excerpt_size: usize,
    /// Overlap between consecutive excerpt windows, in tokens. Must stay
    /// strictly below `excerpt_size`.
    #[serde(default = "default_excerpt_overlap")]
    pub excerpt_overlap: usize,
    /// Override for the index database location. Defaults to
    /// `.basalt/index.sqlite3` inside the vault root.
    #[serde(default)]
    pub index_db_path_override: Option<PathBuf>,
    #[serde(default = "default_watch_debounce_secs")]
    pub watch_debounce_secs: u64,
    #[serde(default)]
    pub search: SearchDefaults,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_dim: None,
            embedding_batch: default_embedding_batch(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            embedding_retries: default_embedding_retries(),
            excerpt_size: default_excerpt_size(),
            excerpt_overlap: default_excerpt_overlap(),
            index_db_path_override: None,
            watch_debounce_secs: default_watch_debounce_secs(),
            search: SearchDefaults::default(),
        }
    }
}

/// Resolved search tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Results farther than this from the query vector are dropped.
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// KNN overfetch multiplier applied before distance filtering and
    /// tie-break sorting.
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_hub_count")]
    pub hub_count: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_distance: default_max_distance(),
            overfetch: default_overfetch(),
            max_hops: default_max_hops(),
            hub_count: default_hub_count(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "qwen3-embedding:8b".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_embedding_retries() -> u32 {
    3
}

fn default_excerpt_size() -> usize {
    500
}

fn default_excerpt_overlap() -> usize {
    100
}

fn default_watch_debounce_secs() -> u64 {
    2
}

fn default_max_results() -> usize {
    8
}

fn default_max_distance() -> f32 {
    f32::MAX
}

fn default_overfetch() -> usize {
    4
}

fn default_max_hops() -> usize {
    6
}

fn default_hub_count() -> usize {
    5
}
