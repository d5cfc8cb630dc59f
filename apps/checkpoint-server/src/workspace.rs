use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

const WORKDIR_MODE: u32 = 0o700;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace {path} did not appear after {attempts} attempts")]
    Missing { path: PathBuf, attempts: u32 },
    #[error("failed to run chown on {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("chown on {path} exited with {status}")]
    Chown {
        path: PathBuf,
        status: std::process::ExitStatus,
    },
    #[error("failed to set permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Polls until `path` exists. The embedding platform may populate the
/// workspace after the server has started.
pub async fn wait_for_directory(path: &Path, policy: WaitPolicy) -> Result<(), WorkspaceError> {
    for attempt in 1..=policy.attempts {
        if tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_dir()) {
            return Ok(());
        }
        info!(
            path = %path.display(),
            attempt,
            attempts = policy.attempts,
            "waiting for workspace directory"
        );
        tokio::time::sleep(policy.backoff).await;
    }
    if tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_dir()) {
        return Ok(());
    }
    Err(WorkspaceError::Missing {
        path: path.to_path_buf(),
        attempts: policy.attempts,
    })
}

/// Hands the workspace to `user` and closes it to everyone else.
pub async fn secure_directory(path: &Path, user: &str) -> Result<(), WorkspaceError> {
    let status = Command::new("chown")
        .arg("-R")
        .arg(format!("{user}:{user}"))
        .arg(path)
        .status()
        .await
        .map_err(|source| WorkspaceError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
    if !status.success() {
        return Err(WorkspaceError::Chown {
            path: path.to_path_buf(),
            status,
        });
    }
    set_mode(path, WORKDIR_MODE).await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|source| WorkspaceError::Permissions {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), WorkspaceError> {
    Ok(())
}

/// Waits for and secures the workspace. Every failure is logged and
/// swallowed; the session starts regardless.
pub async fn prepare(path: &Path, user: &str, policy: WaitPolicy) -> bool {
    if let Err(err) = wait_for_directory(path, policy).await {
        warn!(error = %err, "workspace unavailable; continuing without it");
        return false;
    }
    match secure_directory(path, user).await {
        Ok(()) => {
            info!(path = %path.display(), user, "workspace permissions set");
            true
        }
        Err(err) => {
            warn!(error = %err, "failed to secure workspace");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn finds_directory_created_late() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("work");
        let creator = {
            let target = target.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                std::fs::create_dir(&target).unwrap();
            })
        };
        wait_for_directory(&target, WaitPolicy::default())
            .await
            .unwrap();
        creator.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("never");
        let started = tokio::time::Instant::now();
        let err = wait_for_directory(
            &target,
            WaitPolicy {
                attempts: 3,
                backoff: Duration::from_millis(100),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkspaceError::Missing { attempts: 3, .. }));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_reports_missing_workspace_softly() {
        let root = tempfile::tempdir().unwrap();
        let ready = prepare(
            &root.path().join("missing"),
            "nobody",
            WaitPolicy {
                attempts: 1,
                backoff: Duration::from_millis(10),
            },
        )
        .await;
        assert!(!ready);
    }
}
