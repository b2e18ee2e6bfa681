use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{VaultError, VaultResult};
use crate::models::{DegreeReport, GraphMetrics, LinkReference, ResolutionWarning};
use crate::parser;
use crate::paths;
use crate::store::DocumentStore;

/// Directed wikilink graph over the vault. Depends on the document store
/// only; every piece of state here is recomputable from document content.
///
/// Rebuilds lazily: mutations mark nodes dirty and the affected outgoing
/// edges are recomputed before the next query. The title lookup table is
/// rebuilt and every stored reference re-resolved on each refresh, so a
/// create or delete elsewhere in the vault retroactively fixes or breaks
/// resolution without re-extraction.
pub struct LinkGraphService {
    store: DocumentStore,
    state: RwLock<GraphState>,
}

#[derive(Default)]
struct GraphState {
    /// Outgoing references per source document, in document (line) order.
    outgoing: BTreeMap<String, Vec<LinkReference>>,
    docs: BTreeSet<String>,
    dirty: BTreeSet<String>,
    full_dirty: bool,
    warnings: Vec<ResolutionWarning>,
}

impl LinkGraphService {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            state: RwLock::new(GraphState {
                full_dirty: true,
                ..GraphState::default()
            }),
        }
    }

    /// Scan one document for wikilinks, resolving titles against the
    /// current vault listing. Does not touch the graph.
    pub async fn extract(&self, path: &str) -> VaultResult<Vec<LinkReference>> {
        let path = paths::normalize(path)?;
        let doc = self.store.read(&path).await?;
        let titles = title_table(&self.store.list().await?.into_iter().collect());

        Ok(parser::extract_links(&doc.content)
            .into_iter()
            .map(|raw| LinkReference {
                source: path.clone(),
                line: raw.line,
                resolved: titles.get(&raw.target.to_lowercase()).cloned(),
                target: raw.target,
                context: raw.context,
            })
            .collect())
    }

    /// Recompute the full graph from every document.
    pub async fn rebuild(&self) -> VaultResult<()> {
        self.state.write().await.full_dirty = true;
        self.refresh().await
    }

    /// Mark a node dirty; its outgoing edges are recomputed on next access.
    pub async fn invalidate(&self, path: &str) -> VaultResult<()> {
        let path = paths::normalize(path)?;
        self.state.write().await.dirty.insert(path);
        Ok(())
    }

    /// All references whose resolved target equals `target`, ordered by
    /// source path then line.
    pub async fn backlinks(&self, target: &str) -> VaultResult<Vec<LinkReference>> {
        self.refresh().await?;
        let target = paths::normalize(target)?;
        let state = self.state.read().await;
        if !state.docs.contains(&target) {
            return Err(VaultError::NotFound(target));
        }

        Ok(state
            .outgoing
            .values()
            .flatten()
            .filter(|reference| reference.resolved.as_deref() == Some(target.as_str()))
            .cloned()
            .collect())
    }

    /// A document's outgoing references, in document order.
    pub async fn forward_links(&self, source: &str) -> VaultResult<Vec<LinkReference>> {
        self.refresh().await?;
        let source = paths::normalize(source)?;
        let state = self.state.read().await;
        state
            .outgoing
            .get(&source)
            .cloned()
            .ok_or(VaultError::NotFound(source))
    }

    /// Shortest path from `from` to `to`, bounded by `max_hops` edges.
    /// Breadth-first with a visited set; among equal-length paths the BFS
    /// discovery order wins, with edges expanded in lexical target-title
    /// order. `from == to` yields the zero-hop single-node path. `None`
    /// when unreachable.
    pub async fn find_path(
        &self,
        from: &str,
        to: &str,
        max_hops: usize,
    ) -> VaultResult<Option<Vec<String>>> {
        self.refresh().await?;
        let from = paths::normalize(from)?;
        let to = paths::normalize(to)?;
        let state = self.state.read().await;

        if !state.docs.contains(&from) || !state.docs.contains(&to) {
            return Ok(None);
        }
        if from == to {
            return Ok(Some(vec![from]));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        visited.insert(from.clone());
        queue.push_back((from.clone(), 0));

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            for next in neighbors(&state, &node) {
                if !visited.insert(next.clone()) {
                    continue;
                }
                parent.insert(next.clone(), node.clone());
                if next == to {
                    return Ok(Some(assemble_path(&parent, &from, &to)));
                }
                queue.push_back((next, depth + 1));
            }
        }

        Ok(None)
    }

    /// Degree report over the whole graph, including missing targets.
    pub async fn metrics(&self, hub_count: usize) -> VaultResult<GraphMetrics> {
        self.refresh().await?;
        let state = self.state.read().await;

        let mut in_degree: BTreeMap<&str, usize> =
            state.docs.iter().map(|path| (path.as_str(), 0)).collect();
        let mut missing: BTreeMap<String, usize> = BTreeMap::new();

        for reference in state.outgoing.values().flatten() {
            match &reference.resolved {
                Some(target) => {
                    *in_degree.entry(target.as_str()).or_insert(0) += 1;
                }
                None => {
                    *missing.entry(reference.target.to_lowercase()).or_insert(0) += 1;
                }
            }
        }

        let mut documents: Vec<DegreeReport> = state
            .docs
            .iter()
            .map(|path| DegreeReport {
                path: path.clone(),
                in_degree: in_degree.get(path.as_str()).copied().unwrap_or(0),
                out_degree: state.outgoing.get(path).map(Vec::len).unwrap_or(0),
                missing: false,
            })
            .collect();

        let mut hubs: Vec<(usize, String)> = documents
            .iter()
            .filter(|report| report.in_degree + report.out_degree > 0)
            .map(|report| (report.in_degree + report.out_degree, report.path.clone()))
            .collect();
        hubs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        hubs.truncate(hub_count);

        let orphans: Vec<String> = documents
            .iter()
            .filter(|report| report.in_degree == 0 && report.out_degree == 0)
            .map(|report| report.path.clone())
            .collect();

        // Referenced-but-nonexistent targets participate as flagged nodes.
        documents.extend(missing.into_iter().map(|(title, count)| DegreeReport {
            path: title,
            in_degree: count,
            out_degree: 0,
            missing: true,
        }));

        Ok(GraphMetrics {
            documents,
            hubs: hubs.into_iter().map(|(_, path)| path).collect(),
            orphans,
            unresolved: state.warnings.clone(),
        })
    }

    /// Degrees for a single document.
    pub async fn document_metrics(&self, path: &str) -> VaultResult<DegreeReport> {
        self.refresh().await?;
        let path = paths::normalize(path)?;
        let state = self.state.read().await;

        if !state.docs.contains(&path) {
            return Err(VaultError::NotFound(path));
        }

        let in_degree = state
            .outgoing
            .values()
            .flatten()
            .filter(|reference| reference.resolved.as_deref() == Some(path.as_str()))
            .count();

        Ok(DegreeReport {
            out_degree: state.outgoing.get(&path).map(Vec::len).unwrap_or(0),
            in_degree,
            path,
            missing: false,
        })
    }

    /// Unresolved-reference warnings recorded during the last refresh.
    pub async fn warnings(&self) -> VaultResult<Vec<ResolutionWarning>> {
        self.refresh().await?;
        Ok(self.state.read().await.warnings.clone())
    }

    /// Recompute outgoing edges for dirty nodes, then re-resolve every
    /// stored reference against a fresh title table.
    async fn refresh(&self) -> VaultResult<()> {
        {
            let state = self.state.read().await;
            if !state.full_dirty && state.dirty.is_empty() {
                return Ok(());
            }
        }

        let mut state = self.state.write().await;
        if !state.full_dirty && state.dirty.is_empty() {
            return Ok(());
        }

        let docs: BTreeSet<String> = self.store.list().await?.into_iter().collect();

        let to_extract: Vec<String> = if state.full_dirty {
            docs.iter().cloned().collect()
        } else {
            state
                .dirty
                .iter()
                .filter(|path| docs.contains(*path))
                .cloned()
                .collect()
        };
        debug!(nodes = to_extract.len(), full = state.full_dirty, "refreshing link graph");

        state.outgoing.retain(|path, _| docs.contains(path));

        for path in &to_extract {
            match self.store.read(path).await {
                Ok(doc) => {
                    let refs = parser::extract_links(&doc.content)
                        .into_iter()
                        .map(|raw| LinkReference {
                            source: path.clone(),
                            line: raw.line,
                            target: raw.target,
                            resolved: None,
                            context: raw.context,
                        })
                        .collect();
                    state.outgoing.insert(path.clone(), refs);
                }
                Err(VaultError::NotFound(_)) => {
                    state.outgoing.remove(path);
                }
                Err(err) => return Err(err),
            }
        }

        let titles = title_table(&docs);
        let mut warnings = Vec::new();
        for refs in state.outgoing.values_mut() {
            for reference in refs.iter_mut() {
                reference.resolved = titles.get(&reference.target.to_lowercase()).cloned();
                if reference.resolved.is_none() {
                    warnings.push(ResolutionWarning {
                        source: reference.source.clone(),
                        line: reference.line,
                        target: reference.target.clone(),
                    });
                }
            }
        }

        state.docs = docs;
        state.warnings = warnings;
        state.dirty.clear();
        state.full_dirty = false;

        Ok(())
    }
}

/// Lowercased title to path; sorted iteration makes the lexically smallest
/// path win on duplicate titles.
fn title_table(docs: &BTreeSet<String>) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    for path in docs {
        titles
            .entry(paths::title_of(path).to_lowercase())
            .or_insert_with(|| path.clone());
    }
    titles
}

/// Resolved neighbor paths of one node, in lexical target-title order,
/// deduplicated.
fn neighbors(state: &GraphState, node: &str) -> Vec<String> {
    let Some(refs) = state.outgoing.get(node) else {
        return Vec::new();
    };

    let mut resolved: Vec<&LinkReference> =
        refs.iter().filter(|r| r.resolved.is_some()).collect();
    resolved.sort_by(|a, b| {
        a.target
            .to_lowercase()
            .cmp(&b.target.to_lowercase())
            .then_with(|| a.line.cmp(&b.line))
    });

    let mut seen = HashSet::new();
    resolved
        .into_iter()
        .filter_map(|r| r.resolved.clone())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn assemble_path(parent: &HashMap<String, String>, from: &str, to: &str) -> Vec<String> {
    let mut path = vec![to.to_string()];
    let mut current = to;
    while current != from {
        let Some(previous) = parent.get(current) else {
            break;
        };
        path.push(previous.clone());
        current = previous;
    }
    path.reverse();
    path
}
