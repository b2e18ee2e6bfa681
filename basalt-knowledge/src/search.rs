use basalt_core::config::KnowledgeSettings;
use sqlx::SqlitePool;

use crate::embeddings::{EmbeddingProvider, embed_with_retry};
use crate::errors::{VaultError, VaultResult};
use crate::models::{ExcerptSpan, SearchHit};
use crate::storage;

/// KNN over the excerpt index. Ascending by distance; entries farther than
/// `max_distance` are dropped; ties break by document path then offset.
pub(crate) async fn query_excerpts<P: EmbeddingProvider>(
    settings: &KnowledgeSettings,
    provider: &P,
    pool: &SqlitePool,
    query: &str,
    k: usize,
    max_distance: f32,
) -> VaultResult<Vec<SearchHit>> {
    if k == 0 || !storage::vec_tables_ready(pool).await? {
        return Ok(Vec::new());
    }

    let payload = query_payload(settings, provider, query).await?;

    let rows = sqlx::query_as::<_, (String, String, i64, i64, f32)>(&format!(
        r#"WITH knn AS (
               SELECT rowid, distance
               FROM excerpt_vec
               WHERE embedding MATCH ?
               ORDER BY distance ASC
               LIMIT {}
           )
           SELECT d.path, e.content, e.start_offset, e.end_offset, knn.distance
           FROM knn
           JOIN excerpts e ON e.id = knn.rowid
           JOIN documents d ON d.id = e.document_id
           ORDER BY knn.distance ASC"#,
        fetch_limit(settings, k)
    ))
    .bind(payload)
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter(|(_, _, _, _, distance)| *distance <= max_distance)
        .map(|(path, content, start, end, distance)| SearchHit {
            path,
            distance,
            excerpt: Some(ExcerptSpan {
                text: content,
                start: start as usize,
                end: end as usize,
            }),
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| offset_of(a).cmp(&offset_of(b)))
    });
    hits.truncate(k);

    Ok(hits)
}

/// KNN over the document index; same semantics at document granularity.
pub(crate) async fn query_documents<P: EmbeddingProvider>(
    settings: &KnowledgeSettings,
    provider: &P,
    pool: &SqlitePool,
    query: &str,
    k: usize,
    max_distance: f32,
) -> VaultResult<Vec<SearchHit>> {
    if k == 0 || !storage::vec_tables_ready(pool).await? {
        return Ok(Vec::new());
    }

    let payload = query_payload(settings, provider, query).await?;

    let rows = sqlx::query_as::<_, (String, f32)>(&format!(
        r#"WITH knn AS (
               SELECT rowid, distance
               FROM document_vec
               WHERE embedding MATCH ?
               ORDER BY distance ASC
               LIMIT {}
           )
           SELECT d.path, knn.distance
           FROM knn
           JOIN documents d ON d.id = knn.rowid
           ORDER BY knn.distance ASC"#,
        fetch_limit(settings, k)
    ))
    .bind(payload)
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter(|(_, distance)| *distance <= max_distance)
        .map(|(path, distance)| SearchHit {
            path,
            distance,
            excerpt: None,
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    hits.truncate(k);

    Ok(hits)
}

async fn query_payload<P: EmbeddingProvider>(
    settings: &KnowledgeSettings,
    provider: &P,
    query: &str,
) -> VaultResult<String> {
    let vectors = embed_with_retry(provider, settings, &[query.to_string()]).await?;
    let Some(vector) = vectors.first() else {
        return Err(VaultError::EmbeddingProvider {
            attempts: 1,
            message: "provider returned no vector for query".to_string(),
        });
    };
    serde_json::to_string(vector).map_err(|e| VaultError::EmbeddingProvider {
        attempts: 1,
        message: format!("embedding serialize failed: {e}"),
    })
}

/// Overfetch before distance filtering so equal-distance entries sort by
/// the documented tie-break instead of KNN insertion order.
fn fetch_limit(settings: &KnowledgeSettings, k: usize) -> i64 {
    let factor = settings.search.overfetch.max(1);
    k.saturating_mul(factor).max(16) as i64
}

fn offset_of(hit: &SearchHit) -> usize {
    hit.excerpt.as_ref().map(|e| e.start).unwrap_or(0)
}
