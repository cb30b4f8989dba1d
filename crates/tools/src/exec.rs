//! `run_command` (§4.11): spawn a shell rooted at the universe's
//! worktree, capture combined stdout+stderr, enforce a hard wall-clock
//! timeout, kill on expiry.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

const RUN_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run_command(worktree_path: &Path, command: &str) -> String {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(worktree_path)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null());

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return format!("Error: failed to spawn command: {e}"),
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let wait = async {
        let read_out = async {
            let mut out = String::new();
            if let Some(s) = stdout.as_mut() {
                let _ = s.read_to_string(&mut out).await;
            }
            out
        };
        let read_err = async {
            let mut err = String::new();
            if let Some(s) = stderr.as_mut() {
                let _ = s.read_to_string(&mut err).await;
            }
            err
        };
        let (out, err) = tokio::join!(read_out, read_err);
        let status = child.wait().await;
        (status, out, err)
    };

    match tokio::time::timeout(RUN_COMMAND_TIMEOUT, wait).await {
        Ok((Ok(status), out, err)) => {
            let mut combined = out;
            if !err.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(&err);
            }
            if let Some(code) = status.code() {
                if code != 0 {
                    combined.push_str(&format!("\n[exit code {code}]"));
                }
            }
            combined
        }
        Ok((Err(e), ..)) => format!("Error: command wait failed: {e}"),
        Err(_) => {
            let _ = child.kill().await;
            "Error: command timed out after 60s".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_stdout() {
        let ws = TempDir::new().unwrap();
        let out = run_command(ws.path(), "echo hello").await;
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn includes_nonzero_exit_code() {
        let ws = TempDir::new().unwrap();
        let out = run_command(ws.path(), "exit 3").await;
        assert!(out.contains("[exit code 3]"));
    }

    #[tokio::test]
    async fn runs_in_worktree_cwd() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("marker.txt"), "x").unwrap();
        let out = run_command(ws.path(), "ls").await;
        assert!(out.contains("marker.txt"));
    }
}
