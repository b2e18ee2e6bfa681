use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::embeddings::EmbeddingProvider;
use crate::engine::KnowledgeEngine;
use crate::errors::VaultResult;

/// Watch the vault root and run an incremental rebuild after each quiet
/// period. Events under hidden directories (the engine's own data dir
/// included) are ignored so index writes do not retrigger the loop.
pub async fn watch_vault<P: EmbeddingProvider>(engine: &KnowledgeEngine<P>) -> VaultResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let root = engine.store().root().to_path_buf();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res
                && event
                    .paths
                    .iter()
                    .any(|path| !is_hidden_path(path.strip_prefix(&root).unwrap_or(path)))
            {
                let _ = tx.send(());
            }
        })?;

    watcher.watch(engine.store().root(), RecursiveMode::Recursive)?;

    let debounce = Duration::from_secs(engine.settings().watch_debounce_secs.max(1));
    let mut pending = false;

    loop {
        tokio::select! {
            received = rx.recv() => {
                if received.is_none() {
                    break;
                }
                pending = true;
            }
            _ = tokio::time::sleep(debounce), if pending => {
                pending = false;
                if let Err(err) = engine.rebuild(false, None).await {
                    warn!("vault sweep failed: {err}");
                }
            }
        }
    }

    Ok(())
}

fn is_hidden_path(path: &std::path::Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name.len() > 1 && name != "..")
    })
}
