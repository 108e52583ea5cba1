//! `file_metrics` EAV table: carries both [`CKMetrics`] (one row per metric
//! name) and [`FunctionCC`] (one row per function, `metric` prefixed `fn::`,
//! the remaining attributes packed into the `detail` JSON column).

use crate::error::QResult;
use crate::models::{CKMetrics, FunctionCC, CK_METRIC_NAMES};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

const FN_PREFIX: &str = "fn::";

#[derive(Serialize, Deserialize)]
struct FunctionDetail {
    line_end: i64,
    essential_complexity: f64,
    is_dispatch: bool,
}

pub fn upsert_ck_metrics(conn: &Connection, ck: &CKMetrics) -> QResult<()> {
    for (path, scan_id, metric, value) in ck.to_rows() {
        conn.execute(
            "INSERT INTO file_metrics (path, scan_id, metric, value, detail) VALUES (?1, ?2, ?3, ?4, NULL)
             ON CONFLICT(path, scan_id, metric) DO UPDATE SET value = excluded.value, detail = NULL",
            params![path, scan_id, metric, value],
        )?;
    }
    Ok(())
}

pub fn get_ck_metrics(conn: &Connection, path: &str, scan_id: i64) -> QResult<Option<CKMetrics>> {
    let placeholders: Vec<String> = CK_METRIC_NAMES.iter().map(|m| format!("'{m}'")).collect();
    let sql = format!(
        "SELECT path, scan_id, metric, value FROM file_metrics
         WHERE path = ?1 AND scan_id = ?2 AND metric IN ({})",
        placeholders.join(",")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, i64, String, f64)> = stmt
        .query_map(params![path, scan_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CKMetrics::from_rows(&rows))
}

pub fn upsert_function_cc(conn: &Connection, f: &FunctionCC) -> QResult<()> {
    let metric = format!("{FN_PREFIX}{}::{}", f.function_name, f.line_start);
    let detail = serde_json::to_string(&FunctionDetail {
        line_end: f.line_end,
        essential_complexity: f.essential_complexity,
        is_dispatch: f.is_dispatch,
    })
    .unwrap_or_default();
    conn.execute(
        "INSERT INTO file_metrics (path, scan_id, metric, value, detail) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path, scan_id, metric) DO UPDATE SET value = excluded.value, detail = excluded.detail",
        params![f.path, f.scan_id, metric, f.complexity, detail],
    )?;
    Ok(())
}

pub fn bulk_upsert_function_cc(conn: &Connection, rows: &[FunctionCC]) -> QResult<()> {
    for f in rows {
        upsert_function_cc(conn, f)?;
    }
    Ok(())
}

pub fn get_function_cc(conn: &Connection, path: &str, scan_id: i64) -> QResult<Vec<FunctionCC>> {
    let mut stmt = conn.prepare(
        "SELECT metric, value, detail FROM file_metrics
         WHERE path = ?1 AND scan_id = ?2 AND metric LIKE ?3",
    )?;
    let like = format!("{FN_PREFIX}%");
    let rows = stmt.query_map(params![path, scan_id, like], |row| {
        let metric: String = row.get(0)?;
        let value: f64 = row.get::<_, Option<f64>>(1)?.unwrap_or(1.0);
        let detail_raw: Option<String> = row.get(2)?;
        Ok((metric, value, detail_raw))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (metric, value, detail_raw) = row?;
        let rest = &metric[FN_PREFIX.len()..];
        let Some(sep) = rest.rfind("::") else {
            continue;
        };
        let function_name = rest[..sep].to_string();
        let line_start: i64 = rest[sep + 2..].parse().unwrap_or(0);
        let detail: FunctionDetail = detail_raw
            .and_then(|d| serde_json::from_str(&d).ok())
            .unwrap_or(FunctionDetail {
                line_end: line_start,
                essential_complexity: 1.0,
                is_dispatch: false,
            });
        out.push(FunctionCC {
            path: path.to_string(),
            scan_id,
            function_name,
            line_start,
            line_end: detail.line_end,
            complexity: value,
            essential_complexity: detail.essential_complexity,
            is_dispatch: detail.is_dispatch,
        });
    }
    out.sort_by(|a, b| a.line_start.cmp(&b.line_start));
    Ok(out)
}

/// Carries forward every `file_metrics` row for `path` from one scan to
/// another, alongside [`super::carry_forward_file_entry`].
pub fn carry_forward_file_metrics(
    conn: &Connection,
    path: &str,
    from_scan_id: i64,
    to_scan_id: i64,
) -> QResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_metrics (path, scan_id, metric, value, detail)
         SELECT path, ?3, metric, value, detail FROM file_metrics WHERE path = ?1 AND scan_id = ?2",
        params![path, from_scan_id, to_scan_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::collections::BTreeMap;

    fn with_scan(conn: &Connection, head: &str) -> i64 {
        conn.execute(
            "INSERT INTO scan_meta (scanned_at, git_head) VALUES ('t', ?1)",
            params![head],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn ck_metrics_round_trip_through_db() {
        let conn = db::open_in_memory().unwrap();
        let scan_id = with_scan(&conn, "h1");
        let mut metrics = BTreeMap::new();
        metrics.insert("wmc".to_string(), 10.0);
        metrics.insert("cbo".to_string(), 2.0);
        let ck = CKMetrics {
            path: "a.py".into(),
            scan_id,
            metrics,
        };
        upsert_ck_metrics(&conn, &ck).unwrap();
        let back = get_ck_metrics(&conn, "a.py", scan_id).unwrap().unwrap();
        assert_eq!(back.metrics.get("wmc"), Some(&10.0));
    }

    #[test]
    fn function_cc_round_trip_through_db() {
        let conn = db::open_in_memory().unwrap();
        let scan_id = with_scan(&conn, "h1");
        let f = FunctionCC {
            path: "a.py".into(),
            scan_id,
            function_name: "handle".into(),
            line_start: 10,
            line_end: 25,
            complexity: 7.0,
            essential_complexity: 2.0,
            is_dispatch: false,
        };
        upsert_function_cc(&conn, &f).unwrap();
        let back = get_function_cc(&conn, "a.py", scan_id).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], f);
    }

    #[test]
    fn carry_forward_copies_all_metric_rows() {
        let conn = db::open_in_memory().unwrap();
        let s1 = with_scan(&conn, "h1");
        let s2 = with_scan(&conn, "h2");
        upsert_function_cc(
            &conn,
            &FunctionCC {
                path: "a.py".into(),
                scan_id: s1,
                function_name: "f".into(),
                line_start: 1,
                line_end: 3,
                complexity: 2.0,
                essential_complexity: 1.0,
                is_dispatch: false,
            },
        )
        .unwrap();
        carry_forward_file_metrics(&conn, "a.py", s1, s2).unwrap();
        let back = get_function_cc(&conn, "a.py", s2).unwrap();
        assert_eq!(back.len(), 1);
    }
}
