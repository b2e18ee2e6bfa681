use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::chunker::Excerpt;
use crate::errors::{VaultError, VaultResult};

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

pub(crate) const META_EMBEDDING_DIM: &str = "embedding_dim";
pub(crate) const META_LAST_REBUILD: &str = "last_rebuild";
pub(crate) const META_LAST_SWEEP: &str = "last_sweep";

/// SQLite-backed storage for both derived vector indexes (per-excerpt and
/// per-document). Never authoritative for document existence.
#[derive(Debug, Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    pub async fn open(db_path: &Path, embedding_dim: Option<usize>) -> VaultResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        ensure_vec_tables(&pool, embedding_dim).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn init_sqlite_vec_once() -> VaultResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(VaultError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

async fn run_migrations(pool: &SqlitePool) -> VaultResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn ensure_vec_tables(pool: &SqlitePool, embedding_dim: Option<usize>) -> VaultResult<()> {
    let stored = meta_get(pool, META_EMBEDDING_DIM).await?;
    let dim = match stored {
        Some(value) => value.parse::<usize>().ok(),
        None => embedding_dim,
    };

    if let Some(dimension) = dim {
        ensure_vec_tables_dim(pool, dimension).await?;
    }

    Ok(())
}

/// Create both vec0 virtual tables once the embedding dimension is known.
pub(crate) async fn ensure_vec_tables_dim(pool: &SqlitePool, dimension: usize) -> VaultResult<()> {
    for table in ["excerpt_vec", "document_vec"] {
        if !has_table(pool, table).await? {
            let create_sql = format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(embedding float[{dimension}])"
            );
            sqlx::query(&create_sql).execute(pool).await?;
        }
    }

    meta_set(pool, META_EMBEDDING_DIM, &dimension.to_string()).await?;
    Ok(())
}

pub(crate) async fn vec_tables_ready(pool: &SqlitePool) -> VaultResult<bool> {
    Ok(has_table(pool, "excerpt_vec").await? && has_table(pool, "document_vec").await?)
}

async fn has_table(pool: &SqlitePool, name: &str) -> VaultResult<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

pub(crate) async fn meta_get(pool: &SqlitePool, key: &str) -> VaultResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM meta WHERE key = ? LIMIT 1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(value,)| value))
}

pub(crate) async fn meta_set(pool: &SqlitePool, key: &str, value: &str) -> VaultResult<()> {
    sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn meta_timestamp(
    pool: &SqlitePool,
    key: &str,
) -> VaultResult<Option<DateTime<Utc>>> {
    Ok(meta_get(pool, key)
        .await?
        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

pub(crate) async fn stored_hash(pool: &SqlitePool, path: &str) -> VaultResult<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT content_hash FROM documents WHERE path = ? LIMIT 1")
            .bind(path)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(hash,)| hash))
}

pub(crate) async fn indexed_paths(pool: &SqlitePool) -> VaultResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(path,)| path).collect())
}

/// Replace every index entry owned by one document, atomically with respect
/// to that document. Readers never observe a half-updated excerpt set.
pub(crate) async fn replace_document_entries(
    pool: &SqlitePool,
    path: &str,
    title: &str,
    content_hash: &str,
    modified_at: DateTime<Utc>,
    excerpts: &[Excerpt],
    excerpt_vectors: &[Vec<f32>],
    document_vector: Option<&[f32]>,
) -> VaultResult<()> {
    let vec_ready = vec_tables_ready(pool).await?;
    let mut tx = pool.begin().await?;

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some((doc_id,)) = existing {
        if vec_ready {
            delete_vec_rows(&mut tx, doc_id).await?;
        }
        sqlx::query("DELETE FROM excerpts WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query(
        r#"INSERT INTO documents (path, title, content_hash, modified_at, indexed_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(path)
    .bind(title)
    .bind(content_hash)
    .bind(modified_at.to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;
    let doc_id = result.last_insert_rowid();

    if let Some(vector) = document_vector {
        sqlx::query("INSERT OR REPLACE INTO document_vec(rowid, embedding) VALUES (?, ?)")
            .bind(doc_id)
            .bind(vec_payload(vector)?)
            .execute(&mut *tx)
            .await?;
    }

    for (excerpt, vector) in excerpts.iter().zip(excerpt_vectors) {
        let result = sqlx::query(
            r#"INSERT INTO excerpts (document_id, start_offset, end_offset, content)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(doc_id)
        .bind(excerpt.start as i64)
        .bind(excerpt.end as i64)
        .bind(&excerpt.text)
        .execute(&mut *tx)
        .await?;
        let excerpt_id = result.last_insert_rowid();

        sqlx::query("INSERT OR REPLACE INTO excerpt_vec(rowid, embedding) VALUES (?, ?)")
            .bind(excerpt_id)
            .bind(vec_payload(vector)?)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete every index entry owned by `path`. Returns whether anything was
/// removed.
pub(crate) async fn remove_document(pool: &SqlitePool, path: &str) -> VaultResult<bool> {
    let vec_ready = vec_tables_ready(pool).await?;
    let mut tx = pool.begin().await?;

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut *tx)
        .await?;

    let Some((doc_id,)) = existing else {
        return Ok(false);
    };

    if vec_ready {
        delete_vec_rows(&mut tx, doc_id).await?;
    }
    sqlx::query("DELETE FROM excerpts WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Rename index rows in place. Content is unchanged by a rename, so the
/// vectors stay.
pub(crate) async fn rename_document(
    pool: &SqlitePool,
    from: &str,
    to: &str,
    title: &str,
) -> VaultResult<()> {
    sqlx::query("UPDATE documents SET path = ?, title = ? WHERE path = ?")
        .bind(to)
        .bind(title)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every entry from both indexes.
pub(crate) async fn clear_all(pool: &SqlitePool) -> VaultResult<()> {
    let vec_ready = vec_tables_ready(pool).await?;
    let mut tx = pool.begin().await?;

    if vec_ready {
        sqlx::query("DELETE FROM excerpt_vec")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_vec")
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM excerpts").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(())
}

pub(crate) async fn counts(pool: &SqlitePool) -> VaultResult<(usize, usize)> {
    let (documents,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let (excerpts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM excerpts")
        .fetch_one(pool)
        .await?;
    Ok((documents as usize, excerpts as usize))
}

async fn delete_vec_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: i64,
) -> VaultResult<()> {
    let excerpt_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM excerpts WHERE document_id = ?")
        .bind(doc_id)
        .fetch_all(&mut **tx)
        .await?;

    if !excerpt_ids.is_empty() {
        let placeholders = excerpt_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("DELETE FROM excerpt_vec WHERE rowid IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for (excerpt_id,) in &excerpt_ids {
            query = query.bind(excerpt_id);
        }
        query.execute(&mut **tx).await?;
    }

    sqlx::query("DELETE FROM document_vec WHERE rowid = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn vec_payload(vector: &[f32]) -> VaultResult<String> {
    serde_json::to_string(vector).map_err(|e| {
        VaultError::EmbeddingProvider {
            attempts: 1,
            message: format!("embedding serialize failed: {e}"),
        }
    })
}
