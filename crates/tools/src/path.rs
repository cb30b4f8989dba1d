//! Path-traversal containment for the Tool Executor (§4.11): every file
//! tool resolves its `path` argument against a trusted `worktree_path`
//! root and refuses anything that would escape it.

use std::path::{Component, Path, PathBuf};

/// Resolve `requested` against `root`, rejecting absolute paths, raw
/// `..` components, and any resolution that escapes `root`.
///
/// `root` need not exist yet on disk in every caller, but in practice
/// it always does here: it's the universe's worktree directory.
pub fn resolve_within(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!("Path traversal blocked: {requested} (absolute paths are not allowed)"));
    }

    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("Path traversal blocked: {requested}"));
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve worktree root '{}': {e}", root.display()))?;

    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| format!("cannot resolve ancestor of '{}': {e}", candidate.display()))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!("Path traversal blocked: {requested}"));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_parent_traversal() {
        let ws = TempDir::new().unwrap();
        let err = resolve_within(ws.path(), "../etc/passwd").unwrap_err();
        assert!(err.starts_with("Path traversal blocked"));
    }

    #[test]
    fn rejects_absolute_path() {
        let ws = TempDir::new().unwrap();
        let abs = if cfg!(windows) { "C:\\Windows" } else { "/etc/passwd" };
        let err = resolve_within(ws.path(), abs).unwrap_err();
        assert!(err.starts_with("Path traversal blocked"));
    }

    #[test]
    fn accepts_nested_new_file() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("sub")).unwrap();
        assert!(resolve_within(ws.path(), "sub/new.txt").is_ok());
    }
}
