mod common;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use basalt_knowledge::errors::VaultError;
use basalt_knowledge::index::VectorIndexService;
use basalt_knowledge::models::IndexProgress;
use basalt_knowledge::storage::IndexStore;
use basalt_knowledge::store::DocumentStore;

use common::{DIM, FailFor, StubProvider, seed, test_settings};

const SIZE: usize = 32;
const OVERLAP: usize = 8;

async fn service_over(
    temp: &TempDir,
) -> (DocumentStore, VectorIndexService<StubProvider>) {
    let store = DocumentStore::open(temp.path()).await.expect("open store");
    let index_store = IndexStore::open(
        &temp.path().join(".basalt/index.sqlite3"),
        Some(DIM),
    )
    .await
    .expect("open index store");
    let service =
        VectorIndexService::new(test_settings(), store.clone(), index_store, StubProvider);
    (store, service)
}

async fn seed_trio(store: &DocumentStore) {
    seed(store, "alpha.md", "solar panels convert sunlight into power\n").await;
    seed(store, "beta.md", "sourdough starters need daily feeding\n").await;
    seed(store, "gamma.md", "tidal forces stretch orbiting moons\n").await;
}

#[tokio::test]
async fn reindex_is_idempotent() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    let first = service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    assert_eq!(first.indexed, 3);
    let stats_first = service.stats().await.expect("stats");

    let second = service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    assert_eq!(second.indexed, 3);
    let stats_second = service.stats().await.expect("stats");

    assert_eq!(stats_first.documents, stats_second.documents);
    assert_eq!(stats_first.excerpts, stats_second.excerpts);
    assert!(stats_second.last_rebuild.is_some());
}

#[tokio::test]
async fn quiet_update_changes_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = service
        .update(Utc::now(), SIZE, OVERLAP, None)
        .await
        .expect("update");
    assert_eq!(report.indexed, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.skipped, 0);
    assert!(report.touched.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn update_revisits_modified_documents() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    let since = Utc::now();
    // Cross a second boundary so coarse filesystem mtimes stay comparable.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    seed(&store, "alpha.md", "wind turbines harvest moving air\n").await;

    let report = service
        .update(since, SIZE, OVERLAP, None)
        .await
        .expect("update");
    assert_eq!(report.indexed, 1);
    assert_eq!(report.touched, vec!["alpha.md"]);

    let hits = service
        .query_excerpts("wind turbines harvest moving air", 3, f32::MAX)
        .await
        .expect("query");
    assert_eq!(hits.first().map(|h| h.path.as_str()), Some("alpha.md"));
    assert!(hits[0].distance < 1e-3);
}

#[tokio::test]
async fn touch_without_change_short_circuits() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    let since = Utc::now();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Rewrite with identical content: mtime moves, hash does not.
    seed(&store, "beta.md", "sourdough starters need daily feeding\n").await;

    let report = service
        .update(since, SIZE, OVERLAP, None)
        .await
        .expect("update");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.indexed, 0);
}

#[tokio::test]
async fn stale_rows_are_swept_for_deleted_documents() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    store.delete("beta.md").await.expect("delete");

    let report = service
        .update(DateTime::UNIX_EPOCH, SIZE, OVERLAP, None)
        .await
        .expect("update");
    assert_eq!(report.removed, 1);

    let stats = service.stats().await.expect("stats");
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.excerpts, 2);

    let hits = service
        .query_documents("sourdough starters need daily feeding", 5, f32::MAX)
        .await
        .expect("query");
    assert!(hits.iter().all(|hit| hit.path != "beta.md"));
}

#[tokio::test]
async fn remove_deletes_both_index_kinds() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    service.remove("gamma.md").await.expect("remove");

    let stats = service.stats().await.expect("stats");
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.excerpts, 2);

    // Removing again is a no-op.
    service.remove("gamma.md").await.expect("remove again");
}

#[tokio::test]
async fn provider_failure_aborts_one_document_only() {
    let temp = TempDir::new().expect("tempdir");
    let store = DocumentStore::open(temp.path()).await.expect("open store");
    let index_store = IndexStore::open(
        &temp.path().join(".basalt/index.sqlite3"),
        Some(DIM),
    )
    .await
    .expect("open index store");
    let service = VectorIndexService::new(
        test_settings(),
        store.clone(),
        index_store,
        FailFor {
            needle: "POISON".to_string(),
        },
    );

    seed(&store, "good.md", "perfectly ordinary prose\n").await;
    seed(&store, "toxic.md", "this one contains POISON inline\n").await;

    let report = service.reindex(SIZE, OVERLAP, None).await.expect("reindex");
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "toxic.md");

    let stats = service.stats().await.expect("stats");
    assert_eq!(stats.documents, 1);
}

#[tokio::test]
async fn invalid_window_fails_before_io() {
    let temp = TempDir::new().expect("tempdir");
    let (_store, service) = service_over(&temp).await;

    assert!(matches!(
        service.reindex(10, 10, None).await,
        Err(VaultError::InvalidConfiguration { .. })
    ));
    assert!(matches!(
        service.update(Utc::now(), 0, 0, None).await,
        Err(VaultError::InvalidConfiguration { .. })
    ));
    assert!(matches!(
        service.index_one("alpha.md", 5, 9).await,
        Err(VaultError::InvalidConfiguration { .. })
    ));
}

#[tokio::test]
async fn progress_callback_cancels_between_documents() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    let mut seen = Vec::new();
    let mut callback = |progress: &IndexProgress| {
        seen.push(progress.path.clone());
        progress.current < 2
    };
    let report = service
        .reindex(SIZE, OVERLAP, Some(&mut callback))
        .await
        .expect("reindex");

    assert!(report.cancelled);
    assert_eq!(report.indexed, 1);
    assert_eq!(seen.len(), 2);

    // A cancelled rebuild must not claim completion.
    let stats = service.stats().await.expect("stats");
    assert!(stats.last_rebuild.is_none());
}

#[tokio::test]
async fn equal_distance_ties_break_by_path() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;

    seed(&store, "zeta.md", "identical twin content here\n").await;
    seed(&store, "eta.md", "identical twin content here\n").await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");

    let hits = service
        .query_documents("identical twin content here", 5, f32::MAX)
        .await
        .expect("query");
    assert_eq!(hits.len(), 2);
    assert!(hits[0].distance < 1e-3 && hits[1].distance < 1e-3);
    assert_eq!(hits[0].path, "eta.md");
    assert_eq!(hits[1].path, "zeta.md");
}

#[tokio::test]
async fn max_distance_excludes_far_entries() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");

    let hits = service
        .query_documents("solar panels convert sunlight into power", 5, 1e-4)
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "alpha.md");
}

#[tokio::test]
async fn excerpt_offsets_slice_into_the_body() {
    let temp = TempDir::new().expect("tempdir");
    let (store, service) = service_over(&temp).await;
    seed_trio(&store).await;

    service.reindex(SIZE, OVERLAP, None).await.expect("reindex");

    let hits = service
        .query_excerpts("tidal forces stretch orbiting moons", 1, f32::MAX)
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    let excerpt = hit.excerpt.as_ref().expect("excerpt span");

    let doc = store.read(&hit.path).await.expect("read");
    assert_eq!(&doc.content[excerpt.start..excerpt.end], excerpt.text);
}
