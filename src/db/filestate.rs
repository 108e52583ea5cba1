use crate::error::QResult;
use crate::models::FileState;
use rusqlite::{params, Connection};

pub fn upsert_file_state(conn: &Connection, s: &FileState) -> QResult<()> {
    conn.execute(
        "INSERT INTO file_state (path, mtime, content_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(path) DO UPDATE SET mtime = excluded.mtime, content_id = excluded.content_id",
        params![s.path, s.mtime, s.content_id],
    )?;
    Ok(())
}

pub fn bulk_upsert_file_state(conn: &Connection, states: &[FileState]) -> QResult<()> {
    for s in states {
        upsert_file_state(conn, s)?;
    }
    Ok(())
}

pub fn get_file_state(conn: &Connection, path: &str) -> QResult<Option<FileState>> {
    let mut stmt = conn.prepare("SELECT path, mtime, content_id FROM file_state WHERE path = ?1")?;
    let mut rows = stmt.query_map(params![path], |row| {
        Ok(FileState {
            path: row.get(0)?,
            mtime: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
            content_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        })
    })?;
    Ok(rows.next().transpose()?)
}

/// True when `path` is not yet tracked, or its content id differs
/// (authoritative) or, absent a content id, its mtime differs.
pub fn file_changed(conn: &Connection, path: &str, mtime: i64, content_id: &str) -> QResult<bool> {
    let Some(state) = get_file_state(conn, path)? else {
        return Ok(true);
    };
    if !content_id.is_empty() || !state.content_id.is_empty() {
        return Ok(state.content_id != content_id);
    }
    Ok(state.mtime != mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn unseen_path_is_changed() {
        let conn = db::open_in_memory().unwrap();
        assert!(file_changed(&conn, "a.py", 100, "blob1").unwrap());
    }

    #[test]
    fn blob_id_is_authoritative_over_mtime() {
        let conn = db::open_in_memory().unwrap();
        upsert_file_state(
            &conn,
            &FileState {
                path: "a.py".into(),
                mtime: 100,
                content_id: "blob1".into(),
            },
        )
        .unwrap();
        // mtime changed but blob didn't -> not changed.
        assert!(!file_changed(&conn, "a.py", 999, "blob1").unwrap());
        // blob changed -> changed, regardless of mtime.
        assert!(file_changed(&conn, "a.py", 100, "blob2").unwrap());
    }

    #[test]
    fn falls_back_to_mtime_when_untracked() {
        let conn = db::open_in_memory().unwrap();
        upsert_file_state(
            &conn,
            &FileState {
                path: "a.py".into(),
                mtime: 100,
                content_id: String::new(),
            },
        )
        .unwrap();
        assert!(!file_changed(&conn, "a.py", 100, "").unwrap());
        assert!(file_changed(&conn, "a.py", 200, "").unwrap());
    }
}
