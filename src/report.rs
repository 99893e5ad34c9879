//! Failure classification for store and transport errors.
//!
//! Every failure is logged and counted; none of them is allowed to stop
//! message processing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use teloxide::RequestError;
use tracing::{error, warn};

use crate::store::{StoreError, StoreErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Network,
    RateLimited,
    Api,
    Other,
}

/// Failure delivering a reply to the chat platform.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl From<&RequestError> for TransportError {
    fn from(e: &RequestError) -> Self {
        let kind = match e {
            RequestError::Network(_) | RequestError::Io(_) => TransportErrorKind::Network,
            RequestError::RetryAfter(_) => TransportErrorKind::RateLimited,
            RequestError::Api(_) | RequestError::MigrateToChatId(_) => TransportErrorKind::Api,
            _ => TransportErrorKind::Other,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport {:?} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Store(StoreErrorKind),
    Transport(TransportErrorKind),
}

#[derive(Default)]
pub struct ErrorReporter {
    counts: Mutex<HashMap<FailureKind, u64>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, kind: FailureKind) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(kind).or_insert(0) += 1;
    }

    /// Record a failed store operation (`op` is e.g. "append").
    pub fn store(&self, op: &str, err: &StoreError) -> FailureKind {
        match err.kind {
            StoreErrorKind::Unavailable => warn!("Store {op} failed: {err}"),
            StoreErrorKind::AuthFailure | StoreErrorKind::Unknown => error!("Store {op} failed: {err}"),
        }
        let kind = FailureKind::Store(err.kind);
        self.bump(kind);
        kind
    }

    /// Record a failed delivery to `chat_id`.
    pub fn transport(&self, chat_id: i64, err: &TransportError) -> FailureKind {
        warn!("Failed to deliver reply to chat {chat_id}: {err}");
        let kind = FailureKind::Transport(err.kind);
        self.bump(kind);
        kind
    }

    pub fn count(&self, kind: FailureKind) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.values().sum()
    }
}
