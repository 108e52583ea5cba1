use crate::error::QResult;
use crate::models::CoChange;
use rusqlite::{params, Connection};

/// `co_change` is not scan-versioned: each run replaces the whole table with
/// its freshly computed top-N pairs (the original's delete-then-reinsert
/// pattern — incremental per-row upserts would leave stale pairs from files
/// that co-changed in the past but no longer do).
pub fn bulk_upsert_co_changes(conn: &Connection, pairs: &[CoChange]) -> QResult<()> {
    conn.execute("DELETE FROM co_change", [])?;
    for p in pairs {
        conn.execute(
            "INSERT INTO co_change (path_a, path_b, count) VALUES (?1, ?2, ?3)
             ON CONFLICT(path_a, path_b) DO UPDATE SET count = excluded.count",
            params![p.path_a, p.path_b, p.count],
        )?;
    }
    Ok(())
}

pub fn get_co_changes(conn: &Connection) -> QResult<Vec<CoChange>> {
    let mut stmt = conn.prepare("SELECT path_a, path_b, count FROM co_change ORDER BY count DESC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CoChange {
                path_a: row.get(0)?,
                path_b: row.get(1)?,
                count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn replaces_stale_pairs_on_each_run() {
        let conn = db::open_in_memory().unwrap();
        bulk_upsert_co_changes(&conn, &[CoChange::new("a".into(), "b".into(), 3)]).unwrap();
        bulk_upsert_co_changes(&conn, &[CoChange::new("c".into(), "d".into(), 1)]).unwrap();
        let pairs = get_co_changes(&conn).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].path_a, "c");
    }
}
