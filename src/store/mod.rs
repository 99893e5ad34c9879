//! Append-only question storage.
//!
//! Backends:
//! - [`FileQuestionStore`] – one line per question in a local text file
//! - [`SheetQuestionStore`] – one row per question in a Google spreadsheet
//!
//! [`ReplicatedStore`] wraps either one with a best-effort git push.

pub mod auth;
pub mod file;
pub mod replicate;
pub mod sheet;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::intake::QuestionRecord;

pub use auth::{ServiceAccountKey, ServiceAccountTokens, TokenSource};
pub use file::FileQuestionStore;
pub use replicate::{GitReplicator, ReplicatedStore};
pub use sheet::SheetQuestionStore;

/// Broad failure class of a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Backing medium unreachable (network, timeout, I/O).
    Unavailable,
    /// Credentials missing, rejected or expired.
    AuthFailure,
    Unknown,
}

/// Error returned by every [`QuestionStore`] operation.
#[derive(Debug, Clone)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::AuthFailure, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unknown, message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StoreErrorKind::Unavailable => write!(f, "store unavailable: {}", self.message),
            StoreErrorKind::AuthFailure => write!(f, "store auth failure: {}", self.message),
            StoreErrorKind::Unknown => write!(f, "store error: {}", self.message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable append-only log of questions.
///
/// `append` either makes the record visible to every later `all` or returns
/// an error; there is no partial success.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Prepare the backing medium. Idempotent; call once before first use.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Persist one record.
    async fn append(&self, record: &QuestionRecord) -> Result<(), StoreError>;

    /// Every record in append order, oldest first.
    async fn all(&self) -> Result<Vec<QuestionRecord>, StoreError>;

    /// Human-readable backend description for logs.
    fn describe(&self) -> String;
}

/// Build the configured backend. Does not touch the medium; call
/// [`QuestionStore::initialize`] before first use.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn QuestionStore>, StoreError> {
    match config {
        StorageConfig::File { path, git_replicate: false } => Ok(Arc::new(FileQuestionStore::new(path))),
        StorageConfig::File { path, git_replicate: true } => Ok(Arc::new(ReplicatedStore::new(
            FileQuestionStore::new(path),
            GitReplicator::for_file(path),
        ))),
        StorageConfig::Sheet { spreadsheet_id, sheet_name, credentials, timeout } => {
            let key = ServiceAccountKey::from_json(credentials)?;
            let http = reqwest::Client::builder()
                .timeout(*timeout)
                .build()
                .map_err(|e| StoreError::unknown(format!("failed to build HTTP client: {e}")))?;
            let tokens = Arc::new(ServiceAccountTokens::new(key, http.clone()));
            Ok(Arc::new(SheetQuestionStore::new(
                spreadsheet_id.clone(),
                sheet_name.clone(),
                http,
                tokens,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_backends() {
        let plain = open(&StorageConfig::File { path: "q.txt".into(), git_replicate: false }).unwrap();
        assert_eq!(plain.describe(), "file q.txt");
        let replicated = open(&StorageConfig::File { path: "q.txt".into(), git_replicate: true }).unwrap();
        assert_eq!(replicated.describe(), "file q.txt (git replicated)");
    }

    #[test]
    fn test_open_sheet_rejects_bad_credentials() {
        let config = StorageConfig::Sheet {
            spreadsheet_id: "abc".to_string(),
            sheet_name: "Sheet1".to_string(),
            credentials: "not json".to_string(),
            timeout: std::time::Duration::from_secs(5),
        };
        match open(&config) {
            Ok(_) => panic!("expected error"),
            Err(e) => assert_eq!(e.kind, StoreErrorKind::AuthFailure),
        }
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = StoreError::auth("token expired");
        assert_eq!(err.kind, StoreErrorKind::AuthFailure);
        assert_eq!(err.to_string(), "store auth failure: token expired");
        assert!(StoreError::unavailable("x").to_string().contains("unavailable"));
    }
}
