use crate::error::QResult;
use crate::models::{FileEntry, Language};
use rusqlite::{params, Connection};

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<FileEntry> {
    Ok(FileEntry {
        path: row.get(0)?,
        scan_id: row.get(1)?,
        language: Language::from_str(&row.get::<_, String>(2)?),
        loc: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        cyclomatic_complexity: row.get::<_, Option<f64>>(4)?.unwrap_or(1.0),
        function_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        max_nesting: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        avg_function_length: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        essential_complexity: row.get::<_, Option<f64>>(8)?.unwrap_or(1.0),
        indent_sd: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
    })
}

const SELECT_COLUMNS: &str =
    "path, scan_id, language, loc, complexity, functions, max_nesting, avg_fn_len, essential_complexity, indent_sd";

pub fn upsert_file_entry(conn: &Connection, e: &FileEntry) -> QResult<()> {
    conn.execute(
        "INSERT INTO files (path, scan_id, language, loc, complexity, functions, max_nesting, avg_fn_len, essential_complexity, indent_sd)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(path, scan_id) DO UPDATE SET
            language = excluded.language, loc = excluded.loc, complexity = excluded.complexity,
            functions = excluded.functions, max_nesting = excluded.max_nesting,
            avg_fn_len = excluded.avg_fn_len, essential_complexity = excluded.essential_complexity,
            indent_sd = excluded.indent_sd",
        params![
            e.path,
            e.scan_id,
            e.language.as_str(),
            e.loc,
            e.cyclomatic_complexity,
            e.function_count,
            e.max_nesting,
            e.avg_function_length,
            e.essential_complexity,
            e.indent_sd,
        ],
    )?;
    Ok(())
}

pub fn bulk_upsert_file_entries(conn: &Connection, entries: &[FileEntry]) -> QResult<()> {
    for e in entries {
        upsert_file_entry(conn, e)?;
    }
    Ok(())
}

pub fn get_file_entries(conn: &Connection, scan_id: i64) -> QResult<Vec<FileEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM files WHERE scan_id = ?1 ORDER BY path"
    ))?;
    let rows = stmt
        .query_map(params![scan_id], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_file_entry(conn: &Connection, path: &str, scan_id: i64) -> QResult<Option<FileEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM files WHERE path = ?1 AND scan_id = ?2"
    ))?;
    let mut rows = stmt.query_map(params![path, scan_id], row_to_entry)?;
    Ok(rows.next().transpose()?)
}

/// Re-inserts `path`'s row from `from_scan_id` under `to_scan_id`, unchanged
/// in every attribute but the scan id. Used for files the scanner decided not
/// to re-analyze.
pub fn carry_forward_file_entry(
    conn: &Connection,
    path: &str,
    from_scan_id: i64,
    to_scan_id: i64,
) -> QResult<bool> {
    let Some(mut entry) = get_file_entry(conn, path, from_scan_id)? else {
        return Ok(false);
    };
    entry.scan_id = to_scan_id;
    upsert_file_entry(conn, &entry)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn sample(path: &str, scan_id: i64, complexity: f64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            scan_id,
            cyclomatic_complexity: complexity,
            ..Default::default()
        }
    }

    #[test]
    fn upsert_then_read_back() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t', 'h')",
            [],
        )
        .unwrap();
        let entry = sample("a.py", 1, 12.0);
        upsert_file_entry(&conn, &entry).unwrap();
        let back = get_file_entries(&conn, 1).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].cyclomatic_complexity, 12.0);
    }

    #[test]
    fn carry_forward_preserves_attributes_under_new_scan() {
        let conn = db::open_in_memory().unwrap();
        conn.execute("INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t','h')", []).unwrap();
        conn.execute("INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t2','h2')", []).unwrap();
        upsert_file_entry(&conn, &sample("a.py", 1, 20.0)).unwrap();
        let moved = carry_forward_file_entry(&conn, "a.py", 1, 2).unwrap();
        assert!(moved);
        let back = get_file_entry(&conn, "a.py", 2).unwrap().unwrap();
        assert_eq!(back.cyclomatic_complexity, 20.0);
        assert_eq!(back.scan_id, 2);
    }
}
