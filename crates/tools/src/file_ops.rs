//! File/directory tools (§4.11). Each returns a single string — success
//! or an `"Error: ..."` message — never an error across the tool
//! boundary, so the Agent Loop's error surface stays flat.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::path::resolve_within;

pub async fn read_file(worktree_path: &Path, path: &str) -> String {
    let resolved = match resolve_within(worktree_path, path) {
        Ok(p) => p,
        Err(e) => return format!("Error: {e}"),
    };
    match fs::read_to_string(&resolved).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "file not found".to_string(),
        Err(e) => format!("Error: failed to read '{path}': {e}"),
    }
}

pub async fn write_file(worktree_path: &Path, path: &str, content: &str) -> String {
    let resolved = match resolve_within(worktree_path, path) {
        Ok(p) => p,
        Err(e) => return format!("Error: {e}"),
    };

    if let Some(parent) = resolved.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            return format!("Error: failed to create parent directory: {e}");
        }
    }

    match fs::File::create(&resolved).await {
        Ok(mut file) => {
            if let Err(e) = file.write_all(content.as_bytes()).await {
                return format!("Error: failed to write '{path}': {e}");
            }
            if let Err(e) = file.flush().await {
                return format!("Error: failed to flush '{path}': {e}");
            }
            format!("wrote {} bytes to {path}", content.len())
        }
        Err(e) => format!("Error: failed to create '{path}': {e}"),
    }
}

pub async fn list_files(worktree_path: &Path, path: &str) -> String {
    let resolved = match resolve_within(worktree_path, path) {
        Ok(p) => p,
        Err(e) => return format!("Error: {e}"),
    };

    let mut read_dir = match fs::read_dir(&resolved).await {
        Ok(rd) => rd,
        Err(e) => return format!("Error: failed to read directory '{path}': {e}"),
    };

    let mut names = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().to_string();
                if let Ok(metadata) = entry.metadata().await {
                    if metadata.is_dir() {
                        name.push('/');
                    }
                }
                names.push(name);
            }
            Ok(None) => break,
            Err(e) => return format!("Error: failed to read directory entry: {e}"),
        }
    }

    names.sort();
    names.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_missing_file_reports_not_found() {
        let ws = TempDir::new().unwrap();
        let out = read_file(ws.path(), "nope.txt").await;
        assert_eq!(out, "file not found");
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let ws = TempDir::new().unwrap();
        write_file(ws.path(), "a/b.txt", "hello").await;
        assert_eq!(read_file(ws.path(), "a/b.txt").await, "hello");
    }

    #[tokio::test]
    async fn write_rejects_escape() {
        let ws = TempDir::new().unwrap();
        let out = write_file(ws.path(), "../escape.txt", "x").await;
        assert!(out.starts_with("Error: Path traversal blocked"));
    }

    #[tokio::test]
    async fn read_rejects_deep_escape() {
        let ws = TempDir::new().unwrap();
        let out = read_file(ws.path(), "../../../../etc/passwd").await;
        assert!(out.starts_with("Error: Path traversal blocked"));
    }

    #[tokio::test]
    async fn list_files_sorted() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("b.txt"), "").unwrap();
        std::fs::write(ws.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(ws.path().join("sub")).unwrap();
        let out = list_files(ws.path(), ".").await;
        assert_eq!(out, "a.txt\nb.txt\nsub/");
    }
}
