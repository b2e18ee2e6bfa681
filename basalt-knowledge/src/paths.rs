use std::path::{Component, Path, PathBuf};

use crate::errors::{VaultError, VaultResult};

/// Directory inside the vault root holding derived engine state.
pub const DATA_DIR: &str = ".basalt";

/// Normalize a vault-relative path: forward slashes, no `.` / `..`
/// components, never escaping the vault root. Fails with `PathTraversal`
/// before any I/O.
pub fn normalize(path: &str) -> VaultResult<String> {
    let candidate = path.replace('\\', "/");
    let mut parts: Vec<String> = Vec::new();

    for component in Path::new(&candidate).components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| VaultError::PathTraversal(PathBuf::from(path)))?;
                parts.push(part.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(VaultError::PathTraversal(PathBuf::from(path)));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(VaultError::PathTraversal(PathBuf::from(path)));
            }
        }
    }

    if parts.is_empty() {
        return Err(VaultError::PathTraversal(PathBuf::from(path)));
    }

    Ok(parts.join("/"))
}

/// Resolve a vault-relative path against the vault root.
pub fn resolve(root: &Path, path: &str) -> VaultResult<PathBuf> {
    Ok(root.join(normalize(path)?))
}

/// Document title: the extension-stripped file name of a vault path.
pub fn title_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

pub fn default_index_db_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join("index.sqlite3")
}
