use super::{MAX_FILE_SCANS, MAX_SCANS};
use crate::error::QResult;
use crate::models::ScanMeta;
use rusqlite::{params, Connection, OptionalExtension};

fn row_to_scan_meta(row: &rusqlite::Row) -> rusqlite::Result<ScanMeta> {
    Ok(ScanMeta {
        id: row.get(0)?,
        scanned_at: row.get(1)?,
        head_commit_id: row.get(2)?,
        files_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        duration_ms: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
    })
}

/// Appends a new `scan_meta` row, prunes retention windows, and returns the
/// new scan id. All writes happen inside the caller's transaction.
pub fn begin_scan(conn: &Connection, head_id: &str, scanned_at: &str) -> QResult<i64> {
    conn.execute(
        "INSERT INTO scan_meta (scanned_at, git_head, files_count, duration_ms) VALUES (?1, ?2, 0, 0)",
        params![scanned_at, head_id],
    )?;
    let scan_id = conn.last_insert_rowid();
    prune_retention(conn)?;
    Ok(scan_id)
}

pub fn finish_scan(conn: &Connection, scan_id: i64, files_count: i64, duration_ms: i64) -> QResult<()> {
    conn.execute(
        "UPDATE scan_meta SET files_count = ?1, duration_ms = ?2 WHERE id = ?3",
        params![files_count, duration_ms, scan_id],
    )?;
    Ok(())
}

/// Two independent retention windows: `scan_meta` (and, via cascade,
/// `complexity_trend`) keep the `MAX_SCANS` most recent; `files` and
/// `file_metrics` keep only the narrower `MAX_FILE_SCANS` most recent.
pub fn prune_retention(conn: &Connection) -> QResult<()> {
    conn.execute(
        "DELETE FROM scan_meta WHERE id NOT IN (SELECT id FROM scan_meta ORDER BY id DESC LIMIT ?1)",
        params![MAX_SCANS],
    )?;
    conn.execute(
        "DELETE FROM files WHERE scan_id NOT IN (SELECT id FROM scan_meta ORDER BY id DESC LIMIT ?1)",
        params![MAX_FILE_SCANS],
    )?;
    conn.execute(
        "DELETE FROM file_metrics WHERE scan_id NOT IN (SELECT id FROM scan_meta ORDER BY id DESC LIMIT ?1)",
        params![MAX_FILE_SCANS],
    )?;
    Ok(())
}

pub fn latest_scan(conn: &Connection) -> QResult<Option<ScanMeta>> {
    Ok(conn
        .query_row(
            "SELECT id, scanned_at, git_head, files_count, duration_ms FROM scan_meta ORDER BY id DESC LIMIT 1",
            [],
            row_to_scan_meta,
        )
        .optional()?)
}

pub fn previous_scan(conn: &Connection) -> QResult<Option<ScanMeta>> {
    Ok(conn
        .query_row(
            "SELECT id, scanned_at, git_head, files_count, duration_ms FROM scan_meta ORDER BY id DESC LIMIT 1 OFFSET 1",
            [],
            row_to_scan_meta,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn retention_keeps_only_max_scans() {
        let conn = db::open_in_memory().unwrap();
        for i in 0..(MAX_SCANS + 3) {
            let id = begin_scan(&conn, &format!("head{i}"), "2024-01-01T00:00:00").unwrap();
            finish_scan(&conn, id, 1, 10).unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scan_meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MAX_SCANS);
    }

    #[test]
    fn latest_and_previous_scan_order() {
        let conn = db::open_in_memory().unwrap();
        let first = begin_scan(&conn, "head1", "2024-01-01T00:00:00").unwrap();
        let second = begin_scan(&conn, "head2", "2024-01-02T00:00:00").unwrap();
        assert_eq!(latest_scan(&conn).unwrap().unwrap().id, second);
        assert_eq!(previous_scan(&conn).unwrap().unwrap().id, first);
    }
}
