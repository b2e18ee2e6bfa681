use std::path::PathBuf;

/// Stages of the facade's mutation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    Store,
    VectorIndex,
    LinkGraph,
}

impl MutationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::VectorIndex => "vector-index",
            Self::LinkGraph => "link-graph",
        }
    }
}

impl std::fmt::Display for MutationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("path escapes vault root: {0}")]
    PathTraversal(PathBuf),
    #[error("rename target already exists: {0}")]
    Conflict(String),
    #[error("invalid excerpt window: size {size}, overlap {overlap}")]
    InvalidConfiguration { size: usize, overlap: usize },
    #[error("embedding provider failed after {attempts} attempt(s): {message}")]
    EmbeddingProvider { attempts: u32, message: String },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("{failed} stage failed, completed stages: {completed:?}: {source}")]
    PartialFailure {
        completed: Vec<MutationStage>,
        failed: MutationStage,
        #[source]
        source: Box<VaultError>,
    },
    #[error("invalid front matter: {0}")]
    InvalidFrontMatter(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("sqlite-vec initialization error: {0}")]
    SqliteVec(String),
    #[error("front matter parse error: {0}")]
    FrontMatter(#[from] toml::de::Error),
    #[error("front matter serialize error: {0}")]
    FrontMatterSerialize(#[from] toml::ser::Error),
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type VaultResult<T> = Result<T, VaultError>;
