//! Embedded relational cache: schema, scan lifecycle, bulk upserts, retention.
//!
//! Ported column-for-column from `weave_quality/db.py`'s `_SCHEMA`, generalized
//! per SPEC_FULL §3/§4.1 (an added `complexity_trend` table; `file_metrics`
//! additionally carries `FunctionCC` rows alongside `CKMetrics` rows).

mod cochange;
mod files;
mod filestate;
mod gitstats;
mod metrics;
mod scan;
mod trend;

pub use cochange::*;
pub use files::*;
pub use filestate::*;
pub use gitstats::*;
pub use metrics::*;
pub use scan::*;
pub use trend::*;

use crate::error::QResult;
use rusqlite::Connection;
use std::path::Path;

/// `scan_meta`/`complexity_trend` retention window. One of the spec's open
/// questions (§9); fixed here as a named constant per its own instruction.
pub const MAX_SCANS: i64 = 5;
/// `files`/`file_metrics` retention window. Narrower than `MAX_SCANS` because
/// only the current and previous scan are ever read by report commands.
pub const MAX_FILE_SCANS: i64 = 2;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scan_meta (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    scanned_at  TEXT NOT NULL,
    git_head    TEXT NOT NULL,
    files_count INTEGER,
    duration_ms INTEGER
);

CREATE TABLE IF NOT EXISTS files (
    path          TEXT NOT NULL,
    scan_id       INTEGER NOT NULL,
    language      TEXT NOT NULL,
    loc           INTEGER,
    complexity    REAL,
    functions     INTEGER,
    max_nesting   INTEGER,
    avg_fn_len    REAL,
    essential_complexity REAL,
    indent_sd     REAL,
    PRIMARY KEY (path, scan_id),
    FOREIGN KEY (scan_id) REFERENCES scan_meta(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS file_metrics (
    path     TEXT NOT NULL,
    scan_id  INTEGER NOT NULL,
    metric   TEXT NOT NULL,
    value    REAL,
    detail   TEXT,
    PRIMARY KEY (path, scan_id, metric),
    FOREIGN KEY (scan_id) REFERENCES scan_meta(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS git_stats (
    path               TEXT PRIMARY KEY,
    churn              INTEGER,
    authors            INTEGER,
    age_days           INTEGER,
    hotspot            REAL,
    ownership_fraction REAL,
    minor_contributors INTEGER
);

CREATE TABLE IF NOT EXISTS co_change (
    path_a TEXT NOT NULL,
    path_b TEXT NOT NULL,
    count  INTEGER,
    PRIMARY KEY (path_a, path_b)
);

CREATE TABLE IF NOT EXISTS file_state (
    path      TEXT PRIMARY KEY,
    mtime     INTEGER,
    content_id TEXT
);

CREATE TABLE IF NOT EXISTS complexity_trend (
    path                 TEXT NOT NULL,
    scan_id              INTEGER NOT NULL,
    complexity           REAL,
    essential_complexity REAL,
    PRIMARY KEY (path, scan_id),
    FOREIGN KEY (scan_id) REFERENCES scan_meta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_scan ON files(scan_id);
CREATE INDEX IF NOT EXISTS idx_files_complexity ON files(complexity DESC);
CREATE INDEX IF NOT EXISTS idx_fm_scan ON file_metrics(scan_id);
CREATE INDEX IF NOT EXISTS idx_gs_hotspot ON git_stats(hotspot DESC);
CREATE INDEX IF NOT EXISTS idx_trend_scan ON complexity_trend(scan_id);
"#;

/// Opens (creating if absent) the quality database at `path`, applying the
/// WAL/foreign-key pragmas and idempotent schema creation.
pub fn open(path: &Path) -> QResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> QResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> QResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA temp_store = MEMORY;",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    migrate(conn)?;
    Ok(())
}

/// Additive migration: add columns, never drop. Gated on `PRAGMA user_version`
/// so re-running `init` on an up-to-date db is a no-op.
fn migrate(conn: &Connection) -> QResult<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }
    // Schema v1 is the baseline created above; future versions add
    // `ALTER TABLE ... ADD COLUMN` statements here, gated by `current`.
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

pub fn db_exists(path: &Path) -> bool {
    path.exists()
}

pub fn reset_db(path: &Path) -> QResult<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    for suffix in ["-wal", "-shm"] {
        let side = path.with_extension(format!("db{suffix}"));
        let _ = std::fs::remove_file(side);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StalenessInfo {
    pub stale: bool,
    pub reason: Option<&'static str>,
    pub scan_head: Option<String>,
    pub current_head: String,
}

pub fn staleness_info(conn: &Connection, current_head: &str) -> QResult<StalenessInfo> {
    match latest_scan(conn)? {
        None => Ok(StalenessInfo {
            stale: true,
            reason: Some("no_scan_data"),
            scan_head: None,
            current_head: current_head.to_string(),
        }),
        Some(meta) => {
            let stale = meta.is_stale(current_head);
            Ok(StalenessInfo {
                stale,
                reason: if stale { Some("head_moved") } else { None },
                scan_head: Some(meta.head_commit_id),
                current_head: current_head.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn staleness_with_no_scans() {
        let conn = open_in_memory().unwrap();
        let info = staleness_info(&conn, "deadbeef").unwrap();
        assert!(info.stale);
        assert_eq!(info.reason, Some("no_scan_data"));
    }
}
