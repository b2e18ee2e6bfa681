//! Knowledge engine core for basalt vaults: document store, incremental
//! vector indexes, and the wikilink graph.

pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod index;
pub mod models;
pub mod parser;
pub mod paths;
mod search;
pub mod storage;
pub mod store;
pub mod watcher;

pub use basalt_core::config::{KnowledgeSettings, SearchDefaults};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingClient};
pub use engine::KnowledgeEngine;
pub use errors::{MutationStage, VaultError, VaultResult};
pub use graph::LinkGraphService;
pub use index::{ProgressFn, VectorIndexService};
pub use models::{
    DegreeReport, Document, ExcerptSpan, GraphMetrics, IndexProgress, IndexReport, IndexStats,
    LinkDirection, LinkReference, ResolutionWarning, SearchGranularity, SearchHit, WriteMode,
};
pub use store::{DocumentIter, DocumentStore};
