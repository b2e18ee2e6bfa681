use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A markdown document addressed by its vault-relative path.
///
/// `content` is the body without the front-matter block; the optional front
/// matter is a TOML table delimited by `+++` lines on disk. The path is the
/// document's identity: normalized, forward-slash, case-sensitive.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub front_matter: Option<toml::Table>,
    pub modified_at: DateTime<Utc>,
}

impl Document {
    /// Build a new document with empty front matter, stamped now.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            front_matter: None,
            modified_at: Utc::now(),
        }
    }
}

/// How a `write` treats an existing document at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace content and front matter wholesale.
    Overwrite,
    /// Keep the on-disk front-matter block and append to the body.
    Append,
}

/// A directed wikilink edge extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReference {
    /// Vault-relative path of the document containing the link.
    pub source: String,
    /// 1-based line number of the link occurrence.
    pub line: usize,
    /// Raw target title as written, without alias.
    pub target: String,
    /// Resolved vault-relative path, when the title matches a document.
    pub resolved: Option<String>,
    /// Trimmed, length-capped text of the line containing the link.
    pub context: String,
}

/// A wikilink whose title matched no document. Recorded, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub source: String,
    pub line: usize,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Backlinks,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchGranularity {
    Excerpt,
    Document,
}

/// One ranked semantic search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub distance: f32,
    /// Present for excerpt-granularity queries only.
    pub excerpt: Option<ExcerptSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcerptSpan {
    pub text: String,
    /// Byte offsets into the document body.
    pub start: usize,
    pub end: usize,
}

/// Read-only derived counters for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub excerpts: usize,
    pub last_rebuild: Option<DateTime<Utc>>,
}

/// Progress notification emitted between documents during batch indexing.
#[derive(Debug, Clone)]
pub struct IndexProgress {
    /// 1-based position of the document about to be processed.
    pub current: usize,
    pub total: usize,
    pub path: String,
}

/// Outcome of a batch index operation. Per-document failures are recorded
/// here instead of aborting the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: usize,
    /// Documents skipped via the content-hash short circuit.
    pub skipped: usize,
    /// Stale index rows removed for documents no longer in the vault.
    pub removed: usize,
    pub failed: Vec<IndexFailure>,
    pub cancelled: bool,
    /// Paths whose index entries changed; the facade invalidates the
    /// matching graph nodes.
    pub touched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFailure {
    pub path: String,
    pub message: String,
}

/// In/out degree of one graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeReport {
    pub path: String,
    pub in_degree: usize,
    pub out_degree: usize,
    /// True for referenced-but-nonexistent targets.
    pub missing: bool,
}

/// Full degree report over the link graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetrics {
    /// Per-node degrees, sorted by path; missing targets included and
    /// flagged.
    pub documents: Vec<DegreeReport>,
    /// Highest combined-degree documents, descending, lexical tie-break.
    pub hubs: Vec<String>,
    /// Documents with zero in- and out-degree, sorted.
    pub orphans: Vec<String>,
    pub unresolved: Vec<ResolutionWarning>,
}
