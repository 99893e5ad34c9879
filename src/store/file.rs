//! Flat-file question store.
//!
//! Layout: a fixed header line, a blank line, then one
//! [`QuestionRecord::to_entry`] per question. An entry runs until the next
//! line that starts a new one, so multi-line questions are kept as written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::intake::record::{continuation_line, starts_entry};
use crate::intake::QuestionRecord;
use crate::store::{QuestionStore, StoreError};

/// First line of every question file.
pub const FILE_HEADER: &str = "=== Вопросы учителей ===";

pub struct FileQuestionStore {
    path: PathBuf,
    /// Serializes appends from this process.
    write_lock: Mutex<()>,
}

impl FileQuestionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> StoreError {
    let message = format!("failed to {action} '{}': {e}", path.display());
    match e.kind() {
        ErrorKind::PermissionDenied | ErrorKind::InvalidData => StoreError::unknown(message),
        _ => StoreError::unavailable(message),
    }
}

fn header_block() -> String {
    format!("{FILE_HEADER}\n\n")
}

#[async_trait]
impl QuestionStore for FileQuestionStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", &self.path, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error("open", &self.path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| io_error("stat", &self.path, e))?
            .len();

        if len == 0 {
            file.write_all(header_block().as_bytes())
                .await
                .map_err(|e| io_error("write header to", &self.path, e))?;
            file.sync_data()
                .await
                .map_err(|e| io_error("sync", &self.path, e))?;
            info!("Created question file {:?}", self.path);
        }
        Ok(())
    }

    async fn append(&self, record: &QuestionRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error("open", &self.path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| io_error("stat", &self.path, e))?
            .len();

        // Header and line go out in one write so a failure leaves no half record.
        let mut buf = if len == 0 {
            warn!("Question file {:?} was missing, recreating header", self.path);
            header_block()
        } else {
            String::new()
        };
        buf.push_str(&record.to_entry());
        buf.push('\n');

        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| io_error("append to", &self.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| io_error("sync", &self.path, e))?;

        debug!("Appended question from {} to {:?}", record.sender_id(), self.path);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read", &self.path, e)),
        };

        // (first line number, entry text)
        let mut entries: Vec<(usize, String)> = Vec::new();
        for (idx, line) in content.split('\n').enumerate() {
            if starts_entry(line) {
                entries.push((idx + 1, line.to_string()));
            } else if let Some((_, entry)) = entries.last_mut() {
                entry.push('\n');
                entry.push_str(continuation_line(line));
            } else if !line.trim().is_empty() && line.trim_end() != FILE_HEADER {
                warn!("Skipping unparsable line {} in {:?}", idx + 1, self.path);
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for (line_no, entry) in entries {
            match QuestionRecord::from_entry(&entry) {
                Some(record) => records.push(record),
                None => warn!("Skipping unparsable entry at line {} in {:?}", line_no, self.path),
            }
        }
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
