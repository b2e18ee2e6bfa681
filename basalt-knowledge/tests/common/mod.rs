#![allow(dead_code)]

use std::path::Path;

use basalt_knowledge::embeddings::EmbeddingProvider;
use basalt_knowledge::engine::KnowledgeEngine;
use basalt_knowledge::errors::{VaultError, VaultResult};
use basalt_knowledge::models::{Document, WriteMode};
use basalt_knowledge::store::DocumentStore;
use basalt_core::config::KnowledgeSettings;

pub const DIM: usize = 8;

/// Deterministic in-process embedding provider: a normalized bag-of-words
/// vector hashed into `DIM` buckets. Identical token multisets embed to
/// identical vectors, so an exact-text query lands at distance zero.
#[derive(Debug, Clone, Default)]
pub struct StubProvider;

impl EmbeddingProvider for StubProvider {
    async fn embed(&self, inputs: &[String]) -> VaultResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| bag_vector(text)).collect())
    }
}

pub fn bag_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for token in text.split_whitespace() {
        let mut hash = 0usize;
        for byte in token.to_lowercase().bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
        }
        vector[hash % DIM] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

/// Provider that fails for any input containing `needle`, delegating to
/// [`StubProvider`] otherwise.
#[derive(Debug, Clone)]
pub struct FailFor {
    pub needle: String,
}

impl EmbeddingProvider for FailFor {
    async fn embed(&self, inputs: &[String]) -> VaultResult<Vec<Vec<f32>>> {
        if inputs.iter().any(|text| text.contains(&self.needle)) {
            return Err(VaultError::EmbeddingProvider {
                attempts: 1,
                message: "provider poisoned".to_string(),
            });
        }
        StubProvider.embed(inputs).await
    }
}

/// Route engine tracing through `RUST_LOG` when debugging a test run.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn test_settings() -> KnowledgeSettings {
    KnowledgeSettings {
        embedding_dim: Some(DIM),
        embedding_retries: 1,
        embedding_timeout_secs: 5,
        excerpt_size: 32,
        excerpt_overlap: 8,
        ..Default::default()
    }
}

pub async fn open_engine(root: &Path) -> KnowledgeEngine<StubProvider> {
    init_tracing();
    KnowledgeEngine::open_with_provider(root, test_settings(), StubProvider)
        .await
        .expect("open engine")
}

pub async fn seed(store: &DocumentStore, path: &str, body: &str) {
    store
        .write(&Document::new(path, body), WriteMode::Overwrite)
        .await
        .expect("seed document");
}
