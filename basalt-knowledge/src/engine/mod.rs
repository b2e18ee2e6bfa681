use std::path::PathBuf;

use basalt_core::config::KnowledgeSettings;
use chrono::DateTime;
use tracing::info;

use crate::embeddings::{EmbeddingProvider, HttpEmbeddingClient};
use crate::errors::{VaultError, VaultResult};
use crate::graph::LinkGraphService;
use crate::index::{ProgressFn, VectorIndexService};
use crate::models::{
    DegreeReport, Document, GraphMetrics, IndexStats, LinkDirection, LinkReference,
    SearchGranularity, SearchHit, WriteMode,
};
use crate::paths;
use crate::storage::IndexStore;
use crate::store::DocumentStore;

pub(crate) mod mutate;

/// Composes the document store, vector index, and link graph, and sequences
/// cross-service updates on document mutation. The only component exposed
/// to external collaborators; services never reach back into it.
pub struct KnowledgeEngine<P: EmbeddingProvider> {
    settings: KnowledgeSettings,
    store: DocumentStore,
    index: VectorIndexService<P>,
    graph: LinkGraphService,
}

impl KnowledgeEngine<HttpEmbeddingClient> {
    /// Open an engine over `vault_root` using the HTTP embedding provider
    /// configured in the settings.
    pub async fn open(
        vault_root: impl Into<PathBuf>,
        settings: KnowledgeSettings,
    ) -> VaultResult<Self> {
        let provider = HttpEmbeddingClient::new(&settings);
        Self::open_with_provider(vault_root, settings, provider).await
    }
}

impl<P: EmbeddingProvider> KnowledgeEngine<P> {
    /// Open an engine with an injected embedding provider.
    pub async fn open_with_provider(
        vault_root: impl Into<PathBuf>,
        settings: KnowledgeSettings,
        provider: P,
    ) -> VaultResult<Self> {
        let store = DocumentStore::open(vault_root).await?;
        let db_path = settings
            .index_db_path_override
            .clone()
            .unwrap_or_else(|| paths::default_index_db_path(store.root()));
        let index_store = IndexStore::open(&db_path, settings.embedding_dim).await?;
        let index =
            VectorIndexService::new(settings.clone(), store.clone(), index_store, provider);
        let graph = LinkGraphService::new(store.clone());

        Ok(Self {
            settings,
            store,
            index,
            graph,
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn settings(&self) -> &KnowledgeSettings {
        &self.settings
    }

    pub fn vector_index(&self) -> &VectorIndexService<P> {
        &self.index
    }

    pub fn graph(&self) -> &LinkGraphService {
        &self.graph
    }

    pub async fn status(&self) -> VaultResult<IndexStats> {
        self.index.stats().await
    }

    /// Rebuild the derived indexes: `full` drops and re-embeds everything,
    /// otherwise only documents modified since the last sweep are visited.
    pub async fn rebuild(
        &self,
        full: bool,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> VaultResult<IndexStats> {
        let size = self.settings.excerpt_size;
        let overlap = self.settings.excerpt_overlap;

        let report = if full {
            let report = self.index.reindex(size, overlap, progress).await?;
            self.graph.rebuild().await?;
            report
        } else {
            let since = self
                .index
                .last_sweep()
                .await?
                .unwrap_or(DateTime::UNIX_EPOCH);
            let report = self.index.update(since, size, overlap, progress).await?;
            for path in &report.touched {
                self.graph.invalidate(path).await?;
            }
            report
        };

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            removed = report.removed,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            full,
            "vault rebuild finished"
        );

        self.index.stats().await
    }

    /// Ranked semantic search at excerpt or document granularity.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        max_distance: f32,
        granularity: SearchGranularity,
    ) -> VaultResult<Vec<SearchHit>> {
        match granularity {
            SearchGranularity::Excerpt => self.index.query_excerpts(query, k, max_distance).await,
            SearchGranularity::Document => self.index.query_documents(query, k, max_distance).await,
        }
    }

    pub async fn links(
        &self,
        document: &str,
        direction: LinkDirection,
    ) -> VaultResult<Vec<LinkReference>> {
        match direction {
            LinkDirection::Backlinks => self.graph.backlinks(document).await,
            LinkDirection::Forward => self.graph.forward_links(document).await,
        }
    }

    /// Shortest link path between two documents, `NotFound` when
    /// unreachable within `max_hops`.
    pub async fn find_path(
        &self,
        from: &str,
        to: &str,
        max_hops: usize,
    ) -> VaultResult<Vec<String>> {
        match self.graph.find_path(from, to, max_hops).await? {
            Some(path) => Ok(path),
            None => Err(VaultError::NotFound(format!(
                "no path from {from} to {to} within {max_hops} hops"
            ))),
        }
    }

    pub async fn metrics(&self) -> VaultResult<GraphMetrics> {
        self.graph.metrics(self.settings.search.hub_count).await
    }

    pub async fn document_metrics(&self, path: &str) -> VaultResult<DegreeReport> {
        self.graph.document_metrics(path).await
    }

    pub async fn read_document(&self, path: &str) -> VaultResult<Document> {
        self.store.read(path).await
    }

    /// Write a document, then update the vector index and invalidate the
    /// graph node, in that order. See [`crate::errors::VaultError::PartialFailure`].
    pub async fn write_document(&self, doc: &Document, mode: WriteMode) -> VaultResult<()> {
        mutate::write_document(self, doc, mode).await
    }

    pub async fn rename_document(&self, from: &str, to: &str) -> VaultResult<()> {
        mutate::rename_document(self, from, to).await
    }

    pub async fn delete_document(&self, path: &str) -> VaultResult<()> {
        mutate::delete_document(self, path).await
    }
}
