use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::errors::{VaultError, VaultResult};
use crate::models::{Document, WriteMode};
use crate::parser;
use crate::paths;

/// Filesystem-backed store for the vault's markdown documents. The single
/// source of truth: the vector index and link graph are derived caches and
/// never authoritative for document existence.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open a vault rooted at `root`, creating the directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> VaultResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read and parse one document.
    pub async fn read(&self, path: &str) -> VaultResult<Document> {
        let path = paths::normalize(path)?;
        let file = paths::resolve(&self.root, &path)?;

        let raw = tokio::fs::read_to_string(&file)
            .await
            .map_err(|err| not_found(err, &path))?;
        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|err| not_found(err, &path))?;
        let modified_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let (front_matter, content) = parser::split_front_matter(&raw)?;

        Ok(Document {
            path,
            content,
            front_matter,
            modified_at,
        })
    }

    /// Last-modified timestamp without materializing the document.
    pub async fn modified(&self, path: &str) -> VaultResult<DateTime<Utc>> {
        let path = paths::normalize(path)?;
        let file = paths::resolve(&self.root, &path)?;
        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|err| not_found(err, &path))?;
        Ok(meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now()))
    }

    pub async fn exists(&self, path: &str) -> VaultResult<bool> {
        let file = paths::resolve(&self.root, path)?;
        Ok(tokio::fs::try_exists(&file).await?)
    }

    /// Write a document. `Overwrite` replaces content and front matter
    /// wholesale; `Append` keeps the on-disk front-matter block and appends
    /// to the body. Writes go through a tmp file then rename.
    pub async fn write(&self, doc: &Document, mode: WriteMode) -> VaultResult<()> {
        let path = paths::normalize(&doc.path)?;
        let file = paths::resolve(&self.root, &path)?;

        let rendered = match mode {
            WriteMode::Overwrite => {
                parser::render_document(doc.front_matter.as_ref(), &doc.content)?
            }
            WriteMode::Append => match tokio::fs::read_to_string(&file).await {
                Ok(mut existing) => {
                    if !existing.is_empty() && !existing.ends_with('\n') {
                        existing.push('\n');
                    }
                    existing.push_str(&doc.content);
                    existing
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    parser::render_document(doc.front_matter.as_ref(), &doc.content)?
                }
                Err(err) => return Err(err.into()),
            },
        };

        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: tmp file then rename.
        let tmp = file.with_extension("md.tmp");
        tokio::fs::write(&tmp, &rendered).await?;
        tokio::fs::rename(&tmp, &file).await?;

        Ok(())
    }

    /// Rename a document, failing with `Conflict` when the target exists.
    pub async fn rename(&self, from: &str, to: &str) -> VaultResult<()> {
        let from_norm = paths::normalize(from)?;
        let to_norm = paths::normalize(to)?;
        let source = paths::resolve(&self.root, &from_norm)?;
        let target = paths::resolve(&self.root, &to_norm)?;

        if !self.exists(&from_norm).await? {
            return Err(VaultError::NotFound(from_norm));
        }
        if self.exists(&to_norm).await? {
            return Err(VaultError::Conflict(to_norm));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;

        Ok(())
    }

    pub async fn delete(&self, path: &str) -> VaultResult<()> {
        let path = paths::normalize(path)?;
        let file = paths::resolve(&self.root, &path)?;
        tokio::fs::remove_file(&file)
            .await
            .map_err(|err| not_found(err, &path))?;
        Ok(())
    }

    /// Sorted vault-relative paths of every markdown document. Hidden
    /// directories (including the engine's own data dir) are skipped.
    pub async fn list(&self) -> VaultResult<Vec<String>> {
        let mut found = Vec::new();

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|v| v.to_str()) != Some("md") {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Vec<&str> = relative
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect();
            if parts.len() == relative.components().count() {
                found.push(parts.join("/"));
            }
        }

        found.sort();
        Ok(found)
    }

    /// Restartable cursor over every document in the vault, materializing
    /// one at a time.
    pub async fn iterate(&self) -> VaultResult<DocumentIter> {
        Ok(DocumentIter {
            store: self.clone(),
            paths: self.list().await?,
            next: 0,
        })
    }
}

/// Lazy, finite, restartable document cursor. Documents deleted between
/// listing and materialization are skipped.
pub struct DocumentIter {
    store: DocumentStore,
    paths: Vec<String>,
    next: usize,
}

impl DocumentIter {
    pub async fn next_document(&mut self) -> VaultResult<Option<Document>> {
        while self.next < self.paths.len() {
            let path = &self.paths[self.next];
            self.next += 1;
            match self.store.read(path).await {
                Ok(doc) => return Ok(Some(doc)),
                Err(VaultError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn restart(&mut self) {
        self.next = 0;
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn not_found(err: std::io::Error, path: &str) -> VaultError {
    if err.kind() == std::io::ErrorKind::NotFound {
        VaultError::NotFound(path.to_string())
    } else {
        VaultError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");
        assert!(matches!(
            store.read("missing.md").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_io() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");
        assert!(matches!(
            store.read("../escape.md").await,
            Err(VaultError::PathTraversal(_))
        ));
        assert!(matches!(
            store.delete("a/../../escape.md").await,
            Err(VaultError::PathTraversal(_))
        ));
    }

    #[tokio::test]
    async fn write_read_round_trip() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");

        let mut front = toml::Table::new();
        front.insert("title".into(), toml::Value::String("A Note".into()));
        let doc = Document {
            path: "notes/a.md".to_string(),
            content: "Hello [[B]].\n".to_string(),
            front_matter: Some(front),
            modified_at: Utc::now(),
        };
        store.write(&doc, WriteMode::Overwrite).await.expect("write");

        let back = store.read("notes/a.md").await.expect("read");
        assert_eq!(back.content, "Hello [[B]].\n");
        let front = back.front_matter.expect("front matter");
        assert_eq!(front["title"].as_str(), Some("A Note"));
    }

    #[tokio::test]
    async fn append_preserves_front_matter() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");

        let mut front = toml::Table::new();
        front.insert("title".into(), toml::Value::String("Log".into()));
        let doc = Document {
            path: "log.md".to_string(),
            content: "first entry\n".to_string(),
            front_matter: Some(front.clone()),
            modified_at: Utc::now(),
        };
        store.write(&doc, WriteMode::Overwrite).await.expect("write");

        let appended = Document::new("log.md", "second entry\n");
        store
            .write(&appended, WriteMode::Append)
            .await
            .expect("append");

        let back = store.read("log.md").await.expect("read");
        assert_eq!(back.front_matter, Some(front));
        assert_eq!(back.content, "first entry\nsecond entry\n");
    }

    #[tokio::test]
    async fn rename_conflict_leaves_both_files() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");

        store
            .write(&Document::new("a.md", "a"), WriteMode::Overwrite)
            .await
            .expect("write a");
        store
            .write(&Document::new("b.md", "b"), WriteMode::Overwrite)
            .await
            .expect("write b");

        assert!(matches!(
            store.rename("a.md", "b.md").await,
            Err(VaultError::Conflict(_))
        ));
        assert_eq!(store.read("a.md").await.expect("a").content, "a");
        assert_eq!(store.read("b.md").await.expect("b").content, "b");
    }

    #[tokio::test]
    async fn iterate_is_restartable() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");

        store
            .write(&Document::new("one.md", "1"), WriteMode::Overwrite)
            .await
            .expect("write");
        store
            .write(&Document::new("two.md", "2"), WriteMode::Overwrite)
            .await
            .expect("write");

        let mut iter = store.iterate().await.expect("iterate");
        assert_eq!(iter.len(), 2);

        let mut seen = Vec::new();
        while let Some(doc) = iter.next_document().await.expect("next") {
            seen.push(doc.path);
        }
        assert_eq!(seen, vec!["one.md", "two.md"]);

        iter.restart();
        let first_again = iter.next_document().await.expect("next").expect("doc");
        assert_eq!(first_again.path, "one.md");
    }

    #[tokio::test]
    async fn list_skips_hidden_and_non_markdown() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let store = DocumentStore::open(temp.path()).await.expect("open");

        store
            .write(&Document::new("b.md", "b"), WriteMode::Overwrite)
            .await
            .expect("write");
        store
            .write(&Document::new("sub/a.md", "a"), WriteMode::Overwrite)
            .await
            .expect("write");
        tokio::fs::create_dir_all(temp.path().join(".basalt"))
            .await
            .expect("mkdir");
        tokio::fs::write(temp.path().join(".basalt/index.sqlite3"), b"")
            .await
            .expect("db file");
        tokio::fs::write(temp.path().join("notes.txt"), b"txt")
            .await
            .expect("txt");

        assert_eq!(store.list().await.expect("list"), vec!["b.md", "sub/a.md"]);
    }
}
