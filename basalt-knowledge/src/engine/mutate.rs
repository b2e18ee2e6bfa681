//! Mutation sequencing: store write first, then vector index, then link
//! graph. A failure after a successful store write surfaces as
//! `PartialFailure` naming the failed stage; the write is never rolled
//! back.

use crate::embeddings::EmbeddingProvider;
use crate::errors::{MutationStage, VaultError, VaultResult};
use crate::models::{Document, WriteMode};

use super::KnowledgeEngine;

pub(crate) async fn write_document<P: EmbeddingProvider>(
    engine: &KnowledgeEngine<P>,
    doc: &Document,
    mode: WriteMode,
) -> VaultResult<()> {
    engine.store.write(doc, mode).await?;

    engine
        .index
        .index_one(
            &doc.path,
            engine.settings.excerpt_size,
            engine.settings.excerpt_overlap,
        )
        .await
        .map_err(|err| partial(vec![MutationStage::Store], MutationStage::VectorIndex, err))?;

    engine.graph.invalidate(&doc.path).await.map_err(|err| {
        partial(
            vec![MutationStage::Store, MutationStage::VectorIndex],
            MutationStage::LinkGraph,
            err,
        )
    })?;

    Ok(())
}

pub(crate) async fn delete_document<P: EmbeddingProvider>(
    engine: &KnowledgeEngine<P>,
    path: &str,
) -> VaultResult<()> {
    engine.store.delete(path).await?;

    engine
        .index
        .remove(path)
        .await
        .map_err(|err| partial(vec![MutationStage::Store], MutationStage::VectorIndex, err))?;

    engine.graph.invalidate(path).await.map_err(|err| {
        partial(
            vec![MutationStage::Store, MutationStage::VectorIndex],
            MutationStage::LinkGraph,
            err,
        )
    })?;

    Ok(())
}

/// Rename is the one mutation allowed a full graph rebuild: title-based
/// resolution is not indexed by target, so every inbound reference to the
/// old title must be re-resolved. Index rows move without re-embedding.
pub(crate) async fn rename_document<P: EmbeddingProvider>(
    engine: &KnowledgeEngine<P>,
    from: &str,
    to: &str,
) -> VaultResult<()> {
    engine.store.rename(from, to).await?;

    engine
        .index
        .rename(from, to)
        .await
        .map_err(|err| partial(vec![MutationStage::Store], MutationStage::VectorIndex, err))?;

    engine.graph.rebuild().await.map_err(|err| {
        partial(
            vec![MutationStage::Store, MutationStage::VectorIndex],
            MutationStage::LinkGraph,
            err,
        )
    })?;

    Ok(())
}

fn partial(completed: Vec<MutationStage>, failed: MutationStage, source: VaultError) -> VaultError {
    VaultError::PartialFailure {
        completed,
        failed,
        source: Box::new(source),
    }
}
