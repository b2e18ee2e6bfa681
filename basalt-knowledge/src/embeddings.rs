use std::future::Future;
use std::time::Duration;

use basalt_core::config::KnowledgeSettings;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{VaultError, VaultResult};

/// Converts text to fixed-dimension vectors. Injected into the vector
/// index service; may be slow or fail, so every call site goes through
/// [`embed_with_retry`].
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, inputs: &[String]) -> impl Future<Output = VaultResult<Vec<Vec<f32>>>> + Send;
}

/// Production provider: posts to an Ollama-style `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(settings: &KnowledgeSettings) -> Self {
        Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, inputs: &[String]) -> VaultResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VaultError::EmbeddingProvider {
                attempts: 1,
                message: format!("embedding request failed: {status} {text}"),
            });
        }

        let payload: EmbedResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }
        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(VaultError::EmbeddingProvider {
            attempts: 1,
            message: "embedding response missing vectors".to_string(),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

/// Call the provider with a timeout per attempt and a bounded retry count.
/// Exhaustion surfaces `EmbeddingProvider`; a dimension mismatch is a
/// configuration problem and fails immediately.
pub(crate) async fn embed_with_retry<P: EmbeddingProvider>(
    provider: &P,
    settings: &KnowledgeSettings,
    inputs: &[String],
) -> VaultResult<Vec<Vec<f32>>> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let attempts = settings.embedding_retries.max(1);
    let timeout = Duration::from_secs(settings.embedding_timeout_secs.max(1));
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, provider.embed(inputs)).await {
            Ok(Ok(vectors)) => {
                if vectors.len() != inputs.len() {
                    return Err(VaultError::EmbeddingProvider {
                        attempts: attempt,
                        message: format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            inputs.len()
                        ),
                    });
                }
                if let Some(expected) = settings.embedding_dim
                    && let Some(first) = vectors.first()
                    && first.len() != expected
                {
                    return Err(VaultError::EmbeddingDimMismatch {
                        expected,
                        actual: first.len(),
                    });
                }
                return Ok(vectors);
            }
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_) => last_error = format!("timed out after {}s", timeout.as_secs()),
        }
        if attempt < attempts {
            debug!(attempt, "embedding attempt failed: {last_error}");
        }
    }

    Err(VaultError::EmbeddingProvider {
        attempts,
        message: last_error,
    })
}
