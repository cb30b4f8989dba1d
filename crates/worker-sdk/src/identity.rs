//! Worker identity persistence (§6): a stable id survives restarts so
//! re-registration reuses the same `worker_id` and the control plane
//! can recognize "the same worker came back".

use std::path::PathBuf;

use am_domain::error::{Error, Result};
use tokio::fs;

const IDENTITY_DIR: &str = ".jarvis";
const IDENTITY_FILE: &str = "worker_id";

fn identity_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
    Ok(home.join(IDENTITY_DIR).join(IDENTITY_FILE))
}

/// Load the worker's persisted id, generating and saving a fresh one on
/// first start.
pub async fn load_or_create() -> Result<String> {
    let path = identity_path()?;

    match fs::read_to_string(&path).await {
        Ok(contents) => {
            let id = contents.trim().to_string();
            if id.is_empty() {
                generate_and_save(&path).await
            } else {
                Ok(id)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => generate_and_save(&path).await,
        Err(e) => Err(Error::Io(e)),
    }
}

async fn generate_and_save(path: &PathBuf) -> Result<String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let id = uuid::Uuid::new_v4().to_string();
    fs::write(path, &id).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_and_save_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("worker_id");
        let id = generate_and_save(&path).await.unwrap();
        let read_back = fs::read_to_string(&path).await.unwrap();
        assert_eq!(read_back.trim(), id);
    }
}
