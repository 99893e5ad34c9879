//! Best-effort git replication of the question file.
//!
//! After a successful append the file is committed and pushed in the
//! background. Replication never affects the append result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::intake::QuestionRecord;
use crate::store::{QuestionStore, StoreError};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitReplicator {
    repo_dir: PathBuf,
    /// The file's path relative to `repo_dir`.
    file: PathBuf,
    timeout: Duration,
    /// One git run at a time.
    running: Mutex<()>,
}

impl GitReplicator {
    /// Replicate `file`, committing from the directory that contains it.
    pub fn for_file(file: impl Into<PathBuf>) -> Self {
        let path = file.into();
        let repo_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        // git runs with `-C repo_dir`, so it must see the bare file name.
        let file = path.file_name().map(PathBuf::from).unwrap_or(path);
        Self {
            repo_dir,
            file,
            timeout: GIT_TIMEOUT,
            running: Mutex::new(()),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<(), String> {
        let child = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| format!("git {} timed out", args[0]))?
            .map_err(|e| format!("failed to run git {}: {e}", args[0]))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("git {} failed: {}", args[0], stderr.trim()))
        }
    }

    /// Commit the file and push it.
    pub async fn push(&self, message: &str) -> Result<(), String> {
        let _guard = self.running.lock().await;
        let file = self.file.to_string_lossy().into_owned();
        let file = file.as_str();
        self.git(&["add", "--", file]).await?;
        self.git(&["commit", "-m", message, "--", file]).await?;
        self.git(&["push"]).await?;
        info!("Replicated {:?} in {:?} via git", self.file, self.repo_dir);
        Ok(())
    }
}

/// A store whose successful appends trigger a background git push.
pub struct ReplicatedStore<S> {
    inner: S,
    replicator: Arc<GitReplicator>,
}

impl<S: QuestionStore> ReplicatedStore<S> {
    pub fn new(inner: S, replicator: GitReplicator) -> Self {
        Self {
            inner,
            replicator: Arc::new(replicator),
        }
    }
}

#[async_trait]
impl<S: QuestionStore> QuestionStore for ReplicatedStore<S> {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.inner.initialize().await
    }

    async fn append(&self, record: &QuestionRecord) -> Result<(), StoreError> {
        self.inner.append(record).await?;

        let replicator = self.replicator.clone();
        let message = format!("Add question from {} at {}", record.sender_id(), record.timestamp_string());
        tokio::spawn(async move {
            if let Err(e) = replicator.push(&message).await {
                warn!("Replication failed: {e}");
            }
        });
        Ok(())
    }

    async fn all(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        self.inner.all().await
    }

    fn describe(&self) -> String {
        format!("{} (git replicated)", self.inner.describe())
    }
}
