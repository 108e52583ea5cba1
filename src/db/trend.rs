use crate::error::QResult;
use crate::models::ComplexityTrend;
use rusqlite::{params, Connection};

pub fn upsert_complexity_trend(conn: &Connection, t: &ComplexityTrend) -> QResult<()> {
    conn.execute(
        "INSERT INTO complexity_trend (path, scan_id, complexity, essential_complexity) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path, scan_id) DO UPDATE SET complexity = excluded.complexity, essential_complexity = excluded.essential_complexity",
        params![t.path, t.scan_id, t.complexity, t.essential_complexity],
    )?;
    Ok(())
}

/// All retained trend points for `path`, oldest first, for slope fitting.
pub fn get_trend_for_path(conn: &Connection, path: &str) -> QResult<Vec<ComplexityTrend>> {
    let mut stmt = conn.prepare(
        "SELECT ct.path, ct.scan_id, ct.complexity, ct.essential_complexity
         FROM complexity_trend ct JOIN scan_meta sm ON sm.id = ct.scan_id
         WHERE ct.path = ?1 ORDER BY sm.id ASC",
    )?;
    let rows = stmt
        .query_map(params![path], |row| {
            Ok(ComplexityTrend {
                path: row.get(0)?,
                scan_id: row.get(1)?,
                complexity: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                essential_complexity: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
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
    fn trend_points_ordered_oldest_first() {
        let conn = db::open_in_memory().unwrap();
        conn.execute("INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t','h1')", []).unwrap();
        conn.execute("INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t','h2')", []).unwrap();
        upsert_complexity_trend(&conn, &ComplexityTrend { path: "a".into(), scan_id: 1, complexity: 5.0, essential_complexity: 1.0 }).unwrap();
        upsert_complexity_trend(&conn, &ComplexityTrend { path: "a".into(), scan_id: 2, complexity: 8.0, essential_complexity: 1.0 }).unwrap();
        let points = get_trend_for_path(&conn, "a").unwrap();
        assert_eq!(points.iter().map(|p| p.complexity).collect::<Vec<_>>(), vec![5.0, 8.0]);
    }
}
