use std::collections::BTreeSet;

use basalt_core::config::KnowledgeSettings;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::chunker;
use crate::embeddings::{EmbeddingProvider, embed_with_retry};
use crate::errors::{VaultError, VaultResult};
use crate::models::{IndexProgress, IndexReport, IndexStats};
use crate::paths;
use crate::search;
use crate::storage::{
    self, IndexStore, META_LAST_REBUILD, META_LAST_SWEEP, ensure_vec_tables_dim,
};
use crate::store::DocumentStore;

/// Progress callback invoked between documents during batch operations.
/// Returning `false` requests cancellation before the next document.
pub type ProgressFn<'a> = dyn FnMut(&IndexProgress) -> bool + Send + 'a;

enum IndexOutcome {
    Indexed,
    Skipped,
}

/// Maintains the per-excerpt and per-document vector indexes. Depends on
/// the document store and an injected embedding provider.
///
/// Locking: a full `reindex` holds the write half of the rebuild gate;
/// incremental operations and queries hold the read half, so reads proceed
/// concurrently with an in-progress `update` but queue behind a rebuild.
pub struct VectorIndexService<P> {
    settings: KnowledgeSettings,
    store: DocumentStore,
    index: IndexStore,
    provider: P,
    rebuild_gate: RwLock<()>,
}

impl<P: EmbeddingProvider> VectorIndexService<P> {
    pub fn new(
        settings: KnowledgeSettings,
        store: DocumentStore,
        index: IndexStore,
        provider: P,
    ) -> Self {
        Self {
            settings,
            store,
            index,
            provider,
            rebuild_gate: RwLock::new(()),
        }
    }

    /// Full rebuild: drops both indexes and re-chunks and re-embeds every
    /// document. Per-document failures are recorded in the report; the
    /// batch continues.
    pub async fn reindex(
        &self,
        excerpt_size: usize,
        excerpt_overlap: usize,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> VaultResult<IndexReport> {
        chunker::validate_window(excerpt_size, excerpt_overlap)?;
        let _gate = self.rebuild_gate.write().await;

        let started = Utc::now();
        let paths = self.store.list().await?;
        storage::clear_all(self.index.pool()).await?;

        let mut report = IndexReport::default();
        for (pos, path) in paths.iter().enumerate() {
            if !notify_progress(&mut progress, pos + 1, paths.len(), path) {
                report.cancelled = true;
                break;
            }
            match self
                .index_document(path, excerpt_size, excerpt_overlap, true)
                .await
            {
                Ok(_) => {
                    report.indexed += 1;
                    report.touched.push(path.clone());
                }
                Err(VaultError::NotFound(_)) => {}
                Err(err) => record_failure(&mut report, path, err),
            }
        }

        if !report.cancelled {
            let stamp = started.to_rfc3339();
            storage::meta_set(self.index.pool(), META_LAST_REBUILD, &stamp).await?;
            storage::meta_set(self.index.pool(), META_LAST_SWEEP, &stamp).await?;
        }

        Ok(report)
    }

    /// Incremental rebuild: re-indexes documents modified at or after
    /// `since`, removes stale entries for documents no longer in the vault,
    /// and leaves everything else untouched.
    pub async fn update(
        &self,
        since: DateTime<Utc>,
        excerpt_size: usize,
        excerpt_overlap: usize,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> VaultResult<IndexReport> {
        chunker::validate_window(excerpt_size, excerpt_overlap)?;
        let _gate = self.rebuild_gate.read().await;

        let started = Utc::now();
        let paths = self.store.list().await?;
        let mut report = IndexReport::default();

        let known = storage::indexed_paths(self.index.pool()).await?;
        let live: BTreeSet<&String> = paths.iter().collect();
        for stale in known.iter().filter(|path| !live.contains(path)) {
            if storage::remove_document(self.index.pool(), stale).await? {
                report.removed += 1;
                report.touched.push(stale.clone());
            }
        }
        let known: BTreeSet<String> = known.into_iter().collect();

        for (pos, path) in paths.iter().enumerate() {
            if !notify_progress(&mut progress, pos + 1, paths.len(), path) {
                report.cancelled = true;
                break;
            }

            match self.store.modified(path).await {
                Ok(modified) if modified < since && known.contains(path) => continue,
                Ok(_) => {}
                Err(VaultError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }

            match self
                .index_document(path, excerpt_size, excerpt_overlap, false)
                .await
            {
                Ok(IndexOutcome::Indexed) => {
                    report.indexed += 1;
                    report.touched.push(path.clone());
                }
                Ok(IndexOutcome::Skipped) => report.skipped += 1,
                Err(VaultError::NotFound(_)) => {}
                Err(err) => record_failure(&mut report, path, err),
            }
        }

        if !report.cancelled {
            storage::meta_set(self.index.pool(), META_LAST_SWEEP, &started.to_rfc3339()).await?;
        }

        Ok(report)
    }

    /// Single-document (re)index, used by the facade on create/update.
    pub async fn index_one(
        &self,
        path: &str,
        excerpt_size: usize,
        excerpt_overlap: usize,
    ) -> VaultResult<()> {
        chunker::validate_window(excerpt_size, excerpt_overlap)?;
        let _gate = self.rebuild_gate.read().await;
        self.index_document(path, excerpt_size, excerpt_overlap, true)
            .await?;
        Ok(())
    }

    /// Delete every index entry owned by `path`. Idempotent.
    pub async fn remove(&self, path: &str) -> VaultResult<()> {
        let path = paths::normalize(path)?;
        let _gate = self.rebuild_gate.read().await;
        storage::remove_document(self.index.pool(), &path).await?;
        Ok(())
    }

    /// Move index rows from one path to another without re-embedding;
    /// content is unchanged by a rename.
    pub async fn rename(&self, from: &str, to: &str) -> VaultResult<()> {
        let from = paths::normalize(from)?;
        let to = paths::normalize(to)?;
        let _gate = self.rebuild_gate.read().await;
        storage::rename_document(self.index.pool(), &from, &to, paths::title_of(&to)).await
    }

    /// Ranked excerpt-granularity semantic query, ascending by distance.
    pub async fn query_excerpts(
        &self,
        query: &str,
        k: usize,
        max_distance: f32,
    ) -> VaultResult<Vec<crate::models::SearchHit>> {
        let _gate = self.rebuild_gate.read().await;
        search::query_excerpts(
            &self.settings,
            &self.provider,
            self.index.pool(),
            query,
            k,
            max_distance,
        )
        .await
    }

    /// Ranked document-granularity semantic query.
    pub async fn query_documents(
        &self,
        query: &str,
        k: usize,
        max_distance: f32,
    ) -> VaultResult<Vec<crate::models::SearchHit>> {
        let _gate = self.rebuild_gate.read().await;
        search::query_documents(
            &self.settings,
            &self.provider,
            self.index.pool(),
            query,
            k,
            max_distance,
        )
        .await
    }

    pub async fn stats(&self) -> VaultResult<IndexStats> {
        let (documents, excerpts) = storage::counts(self.index.pool()).await?;
        let last_rebuild = storage::meta_timestamp(self.index.pool(), META_LAST_REBUILD).await?;
        Ok(IndexStats {
            documents,
            excerpts,
            last_rebuild,
        })
    }

    pub(crate) async fn last_sweep(&self) -> VaultResult<Option<DateTime<Utc>>> {
        storage::meta_timestamp(self.index.pool(), META_LAST_SWEEP).await
    }

    /// Chunk, embed, and atomically replace one document's index entries.
    /// With `force` unset, an unchanged content hash short-circuits.
    async fn index_document(
        &self,
        path: &str,
        excerpt_size: usize,
        excerpt_overlap: usize,
        force: bool,
    ) -> VaultResult<IndexOutcome> {
        let doc = self.store.read(path).await?;
        let content_hash = hash_content(&doc.content);

        if !force
            && storage::stored_hash(self.index.pool(), &doc.path).await? == Some(content_hash.clone())
        {
            return Ok(IndexOutcome::Skipped);
        }

        let excerpts = chunker::chunk_text(&doc.content, excerpt_size, excerpt_overlap)?;

        let (excerpt_vectors, document_vector) = if excerpts.is_empty() {
            (Vec::new(), None)
        } else {
            let texts: Vec<String> = excerpts.iter().map(|e| e.text.clone()).collect();
            let excerpt_vectors = self.embed_texts(&texts).await?;
            let document_vector = self
                .embed_texts(std::slice::from_ref(&doc.content))
                .await?
                .into_iter()
                .next();

            if let Some(first) = excerpt_vectors.first() {
                ensure_vec_tables_dim(self.index.pool(), first.len()).await?;
            }
            (excerpt_vectors, document_vector)
        };

        storage::replace_document_entries(
            self.index.pool(),
            &doc.path,
            paths::title_of(&doc.path),
            &content_hash,
            doc.modified_at,
            &excerpts,
            &excerpt_vectors,
            document_vector.as_deref(),
        )
        .await?;

        debug!(path = %doc.path, excerpts = excerpts.len(), "indexed document");
        Ok(IndexOutcome::Indexed)
    }

    /// Embed a slice of texts in provider-sized batches.
    async fn embed_texts(&self, texts: &[String]) -> VaultResult<Vec<Vec<f32>>> {
        let batch = self.settings.embedding_batch.max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch) {
            vectors.extend(embed_with_retry(&self.provider, &self.settings, chunk).await?);
        }
        Ok(vectors)
    }
}

fn notify_progress(
    progress: &mut Option<&mut ProgressFn<'_>>,
    current: usize,
    total: usize,
    path: &str,
) -> bool {
    match progress {
        Some(callback) => callback(&IndexProgress {
            current,
            total,
            path: path.to_string(),
        }),
        None => true,
    }
}

fn record_failure(report: &mut IndexReport, path: &str, err: VaultError) {
    warn!(path = %path, "indexing failed: {err}");
    report.failed.push(crate::models::IndexFailure {
        path: path.to_string(),
        message: err.to_string(),
    });
}

pub(crate) fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
