use crate::error::QResult;
use crate::models::GitStats;
use rusqlite::{params, Connection};

fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<GitStats> {
    Ok(GitStats {
        path: row.get(0)?,
        churn: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        authors: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        age_days: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        hotspot: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        ownership_fraction: row.get::<_, Option<f64>>(5)?.unwrap_or(1.0),
        minor_contributors: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
    })
}

const SELECT_COLUMNS: &str = "path, churn, authors, age_days, hotspot, ownership_fraction, minor_contributors";

pub fn upsert_git_stats(conn: &Connection, s: &GitStats) -> QResult<()> {
    conn.execute(
        "INSERT INTO git_stats (path, churn, authors, age_days, hotspot, ownership_fraction, minor_contributors)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(path) DO UPDATE SET
            churn = excluded.churn, authors = excluded.authors, age_days = excluded.age_days,
            hotspot = excluded.hotspot, ownership_fraction = excluded.ownership_fraction,
            minor_contributors = excluded.minor_contributors",
        params![
            s.path,
            s.churn,
            s.authors,
            s.age_days,
            s.hotspot,
            s.ownership_fraction,
            s.minor_contributors,
        ],
    )?;
    Ok(())
}

pub fn bulk_upsert_git_stats(conn: &Connection, stats: &[GitStats]) -> QResult<()> {
    for s in stats {
        upsert_git_stats(conn, s)?;
    }
    Ok(())
}

pub fn get_git_stats(conn: &Connection, path: &str) -> QResult<Option<GitStats>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM git_stats WHERE path = ?1"))?;
    let mut rows = stmt.query_map(params![path], row_to_stats)?;
    Ok(rows.next().transpose()?)
}

pub fn get_all_git_stats(conn: &Connection) -> QResult<Vec<GitStats>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM git_stats"))?;
    let rows = stmt.query_map([], row_to_stats)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn top_hotspots(conn: &Connection, top_n: usize, threshold: f64) -> QResult<Vec<GitStats>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM git_stats WHERE hotspot > ?1 ORDER BY hotspot DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![threshold, top_n as i64], row_to_stats)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn upsert_overwrites_current_state() {
        let conn = db::open_in_memory().unwrap();
        upsert_git_stats(
            &conn,
            &GitStats {
                path: "a.py".into(),
                churn: 5,
                ..Default::default()
            },
        )
        .unwrap();
        upsert_git_stats(
            &conn,
            &GitStats {
                path: "a.py".into(),
                churn: 9,
                ..Default::default()
            },
        )
        .unwrap();
        let back = get_git_stats(&conn, "a.py").unwrap().unwrap();
        assert_eq!(back.churn, 9);
    }

    #[test]
    fn top_hotspots_respects_threshold_and_order() {
        let conn = db::open_in_memory().unwrap();
        bulk_upsert_git_stats(
            &conn,
            &[
                GitStats { path: "a".into(), hotspot: 0.9, ..Default::default() },
                GitStats { path: "b".into(), hotspot: 0.2, ..Default::default() },
                GitStats { path: "c".into(), hotspot: 0.6, ..Default::default() },
            ],
        )
        .unwrap();
        let top = top_hotspots(&conn, 10, 0.5).unwrap();
        assert_eq!(top.iter().map(|s| s.path.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
