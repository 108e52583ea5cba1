//! Typed error sum type shared by every library module.
//!
//! CLI boundaries (the two binaries) fold this into `anyhow::Result`; library
//! code propagates `QError` with `?` so call sites can match on the taxonomy
//! from the error-handling design (parse failures fall back, rate limits
//! retry, permission/not-found propagate, schema migration is fatal).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QError {
    #[error("failed to parse {path}: {detail}")]
    ParseFailure { path: String, detail: String },

    #[error("file missing")]
    Missing,

    #[error("history query failed: {0}")]
    HistoryQueryFailure(String),

    #[error("rate limited, retry after {:?}", .retry_after)]
    RateLimited { retry_after: Duration },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote id {remote_id} claimed by multiple nodes: {node_ids:?}")]
    DuplicateMapping {
        remote_id: i64,
        node_ids: Vec<String>,
    },

    #[error("refusing to reopen #{remote_id}: closed by another mapped node")]
    PhantomReopen { remote_id: i64 },

    #[error("refusing to back-fill remote id {remote_id} onto node {node_id}: already claimed")]
    DedupBackfillConflict { node_id: String, remote_id: i64 },

    #[error("schema migration failed: {0}")]
    SchemaMigration(String),

    #[error("lock held by another process: {0}")]
    LockHeld(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type QResult<T> = Result<T, QError>;

impl QError {
    /// Classifies a remote-tracker failure's text against the fixed
    /// rate-limit pattern list (spec §5/§7). Anything else is `Unknown`.
    pub fn classify_remote_failure(status: u32, body: &str) -> QError {
        let lowered = body.to_lowercase();
        if status == 429 || lowered.contains("rate limit") {
            return QError::RateLimited {
                retry_after: Duration::from_secs(2),
            };
        }
        if status == 401 || status == 403 {
            return QError::PermissionDenied(body.to_string());
        }
        if status == 404 {
            return QError::NotFound(body.to_string());
        }
        QError::HistoryQueryFailure(format!("http {status}: {body}"))
    }
}
