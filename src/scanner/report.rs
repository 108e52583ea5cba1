//! Read-side report commands over the persisted scan state: `hotspots`,
//! `diff`, `functions`, `promote`, `health-info`, `context-files`, `reset`.
//!
//! Grounded on `weave_quality/__main__.py`'s corresponding subcommands,
//! generalized to the richer persistence model this system builds.

use crate::config;
use crate::db;
use crate::error::{QError, QResult};
use crate::graphclient::GraphClient;
use crate::hotspot::{self, TrendDirection};
use crate::models::{EdgeType, NodeMetadata, NodeType};
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct HotspotRow {
    pub path: String,
    pub hotspot: f64,
    pub churn: i64,
    pub authors: i64,
    pub trend: &'static str,
}

fn trend_str(d: TrendDirection) -> &'static str {
    match d {
        TrendDirection::Deteriorating => "deteriorating",
        TrendDirection::Refactored => "refactored",
        TrendDirection::Stable => "stable",
    }
}

pub fn hotspots(conn: &Connection, top_n: usize) -> QResult<Vec<HotspotRow>> {
    let top = db::top_hotspots(conn, top_n, hotspot::HOTSPOT_THRESHOLD)?;
    top.into_iter()
        .map(|s| {
            let points = db::get_trend_for_path(conn, &s.path)?;
            Ok(HotspotRow {
                path: s.path,
                hotspot: s.hotspot,
                churn: s.churn,
                authors: s.authors,
                trend: trend_str(hotspot::trend_direction(&points)),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub new_files: Vec<String>,
    pub removed_files: Vec<String>,
    pub improved: Vec<String>,
    pub degraded: Vec<String>,
    pub quality_score_delta: i64,
}

const IMPROVED_DELTA: f64 = -0.5;
const DEGRADED_DELTA: f64 = 0.5;

/// Categorizes the current scan's `FileEntry` set against the previous one.
pub fn diff(conn: &Connection) -> QResult<DiffReport> {
    let Some(current_meta) = db::latest_scan(conn)? else {
        return Ok(DiffReport {
            new_files: Vec::new(),
            removed_files: Vec::new(),
            improved: Vec::new(),
            degraded: Vec::new(),
            quality_score_delta: 0,
        });
    };
    let Some(previous_meta) = db::previous_scan(conn)? else {
        let current = db::get_file_entries(conn, current_meta.id)?;
        return Ok(DiffReport {
            new_files: current.into_iter().map(|e| e.path).collect(),
            removed_files: Vec::new(),
            improved: Vec::new(),
            degraded: Vec::new(),
            quality_score_delta: 0,
        });
    };

    let current = db::get_file_entries(conn, current_meta.id)?;
    let previous = db::get_file_entries(conn, previous_meta.id)?;

    let mut new_files = Vec::new();
    let mut improved = Vec::new();
    let mut degraded = Vec::new();

    for c in &current {
        match previous.iter().find(|p| p.path == c.path) {
            None => new_files.push(c.path.clone()),
            Some(p) => {
                let delta = c.cyclomatic_complexity - p.cyclomatic_complexity;
                if delta <= IMPROVED_DELTA {
                    improved.push(c.path.clone());
                } else if delta >= DEGRADED_DELTA {
                    degraded.push(c.path.clone());
                }
            }
        }
    }
    let removed_files: Vec<String> = previous
        .iter()
        .filter(|p| !current.iter().any(|c| c.path == p.path))
        .map(|p| p.path.clone())
        .collect();

    let current_stats = db::get_all_git_stats(conn)?;
    let current_score = hotspot::compute_quality_score(&current, &current_stats);
    let previous_score = hotspot::compute_quality_score(&previous, &current_stats);

    Ok(DiffReport {
        new_files,
        removed_files,
        improved,
        degraded,
        quality_score_delta: current_score - previous_score,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionRow {
    pub function_name: String,
    pub line_start: i64,
    pub line_end: i64,
    pub complexity: f64,
    pub exceeds_threshold: bool,
    pub is_dispatch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionsReport {
    pub functions: Vec<FunctionRow>,
    pub histogram: Vec<i64>,
    pub exceeding_count: usize,
}

/// Per-function complexity for one file, sorted descending by complexity.
pub fn functions(conn: &Connection, path: &str, scan_id: i64) -> QResult<FunctionsReport> {
    let mut rows = db::get_function_cc(conn, path, scan_id)?;
    rows.sort_by(|a, b| b.complexity.partial_cmp(&a.complexity).unwrap());
    let histogram = hotspot::cc_histogram(&rows);
    let exceeding_count = rows.iter().filter(|f| hotspot::function_exceeds_threshold(f)).count();
    let functions = rows
        .into_iter()
        .map(|f| FunctionRow {
            exceeds_threshold: hotspot::function_exceeds_threshold(&f),
            function_name: f.function_name,
            line_start: f.line_start,
            line_end: f.line_end,
            complexity: f.complexity,
            is_dispatch: f.is_dispatch,
        })
        .collect();
    Ok(FunctionsReport {
        functions,
        histogram,
        exceeding_count,
    })
}

/// Stable finding id: first 12 hex chars of `sha256(path + ":" + metric)`.
pub fn finding_id(path: &str, metric: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(metric.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromoteReport {
    pub promoted: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub parent: String,
}

/// Promotes the top-N hotspots into the issue graph as children of `parent`,
/// linked with a `references` edge (never `implements`). Existing nodes
/// carrying a matching `finding_id` are skipped by default, or updated in
/// place when `upsert` is set. `dry_run` computes and reports the plan
/// without mutating the graph.
pub fn promote(
    conn: &Connection,
    graph: &dyn GraphClient,
    parent: &str,
    top_n: usize,
    upsert: bool,
    dry_run: bool,
) -> QResult<PromoteReport> {
    let top = db::top_hotspots(conn, top_n, hotspot::HOTSPOT_THRESHOLD)?;
    let existing = graph.list_nodes()?;

    let mut report = PromoteReport {
        parent: parent.to_string(),
        ..Default::default()
    };

    for stat in top {
        let fid = finding_id(&stat.path, "hotspot");
        let match_node = existing
            .iter()
            .find(|n| n.metadata.extra.get("finding_id").map(|s| s.as_str()) == Some(fid.as_str()));

        match match_node {
            Some(node) if upsert => {
                report.updated.push(stat.path.clone());
                if !dry_run {
                    graph.update_text(&node.id, &hotspot_node_text(&stat.path, stat.hotspot))?;
                }
            }
            Some(_) => {
                report.skipped.push(stat.path.clone());
            }
            None => {
                report.promoted.push(stat.path.clone());
                if !dry_run {
                    let mut metadata = NodeMetadata {
                        node_type: Some(NodeType::Task),
                        ..Default::default()
                    };
                    metadata.extra.insert("finding_id".to_string(), fid);
                    let node_id = graph.create_node(&hotspot_node_text(&stat.path, stat.hotspot), &metadata)?;
                    graph.add_edge(&node_id, parent, EdgeType::References)?;
                }
            }
        }
    }
    Ok(report)
}

fn hotspot_node_text(path: &str, hotspot: f64) -> String {
    format!("Quality hotspot: {path} (score {hotspot:.4})")
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotspot_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<String>,
}

pub fn health_info(conn: &Connection, current_head: &str) -> QResult<HealthInfo> {
    let staleness = db::staleness_info(conn, current_head)?;
    let Some(meta) = db::latest_scan(conn)? else {
        return Ok(HealthInfo {
            available: false,
            score: None,
            hotspot_count: None,
            total_files: None,
            git_head: None,
            scanned_at: None,
        });
    };
    let entries = db::get_file_entries(conn, meta.id)?;
    let stats = db::get_all_git_stats(conn)?;
    let score = hotspot::compute_quality_score(&entries, &stats);
    let hotspot_count = stats.iter().filter(|s| s.hotspot > hotspot::HOTSPOT_THRESHOLD).count() as i64;
    Ok(HealthInfo {
        available: !staleness.stale,
        score: Some(score),
        hotspot_count: Some(hotspot_count),
        total_files: Some(entries.len() as i64),
        git_head: Some(meta.head_commit_id),
        scanned_at: Some(meta.scanned_at),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeQualityEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotspot: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextFilesReport {
    pub code_quality: Vec<CodeQualityEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_as_of: Option<String>,
}

/// Looks up quality data for the newline-delimited paths read from `reader`.
/// A path with no recorded state is skipped, not reported with nulls.
pub fn context_files(conn: &Connection, reader: impl BufRead) -> QResult<ContextFilesReport> {
    let latest = db::latest_scan(conn)?;
    let mut code_quality = Vec::new();
    for line in reader.lines() {
        let Ok(path) = line else { continue };
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        let stats = db::get_git_stats(conn, path)?;
        let entry = latest
            .as_ref()
            .map(|m| db::get_file_entry(conn, path, m.id))
            .transpose()?
            .flatten();
        if stats.is_none() && entry.is_none() {
            continue;
        }
        code_quality.push(CodeQualityEntry {
            path: path.to_string(),
            hotspot: stats.as_ref().map(|s| s.hotspot),
            churn: stats.as_ref().map(|s| s.churn),
            complexity: entry.as_ref().map(|e| e.cyclomatic_complexity),
        });
    }
    Ok(ContextFilesReport {
        code_quality,
        quality_as_of: latest.map(|m| m.scanned_at),
    })
}

pub fn reset(hot_zone: &Path) -> QResult<()> {
    let path = config::quality_db_path(hot_zone);
    db::reset_db(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, GitStats};

    struct FakeGraph {
        nodes: std::cell::RefCell<Vec<crate::models::GraphNode>>,
    }

    impl GraphClient for FakeGraph {
        fn list_nodes(&self) -> QResult<Vec<crate::models::GraphNode>> {
            Ok(self.nodes.borrow().clone())
        }
        fn edges_for_node(&self, _id: &str) -> QResult<Vec<Edge>> {
            Ok(Vec::new())
        }
        fn edges_for_nodes(&self, _ids: &[String]) -> QResult<Vec<Edge>> {
            Ok(Vec::new())
        }
        fn create_node(&self, text: &str, metadata: &NodeMetadata) -> QResult<String> {
            let id = format!("ta-{:04}", self.nodes.borrow().len());
            self.nodes.borrow_mut().push(crate::models::GraphNode {
                id: id.clone(),
                text: text.to_string(),
                status: crate::models::NodeStatus::Todo,
                metadata: metadata.clone(),
                alias: None,
            });
            Ok(id)
        }
        fn set_remote_issue_id(&self, _node_id: &str, _remote_issue_id: i64) -> QResult<()> {
            Ok(())
        }
        fn add_edge(&self, _source: &str, _target: &str, _edge_type: EdgeType) -> QResult<()> {
            Ok(())
        }
        fn mark_done(&self, _node_id: &str) -> QResult<()> {
            Ok(())
        }
        fn update_text(&self, _node_id: &str, _text: &str) -> QResult<()> {
            Ok(())
        }
    }

    #[test]
    fn finding_id_is_stable_and_path_specific() {
        let a = finding_id("src/a.py", "hotspot");
        let b = finding_id("src/b.py", "hotspot");
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
        assert_eq!(a, finding_id("src/a.py", "hotspot"));
    }

    #[test]
    fn promote_skips_already_promoted_by_default() {
        let conn = db::open_in_memory().unwrap();
        db::bulk_upsert_git_stats(
            &conn,
            &[GitStats {
                path: "a.py".into(),
                hotspot: 0.9,
                ..Default::default()
            }],
        )
        .unwrap();
        let graph = FakeGraph {
            nodes: std::cell::RefCell::new(Vec::new()),
        };

        let first = promote(&conn, &graph, "ep-0001", 10, false, false).unwrap();
        assert_eq!(first.promoted, vec!["a.py".to_string()]);

        let second = promote(&conn, &graph, "ep-0001", 10, false, false).unwrap();
        assert_eq!(second.skipped, vec!["a.py".to_string()]);
        assert!(second.promoted.is_empty());
    }

    #[test]
    fn diff_with_single_scan_reports_all_new() {
        let conn = db::open_in_memory().unwrap();
        let scan_id = db::begin_scan(&conn, "h1", "t").unwrap();
        db::upsert_file_entry(
            &conn,
            &crate::models::FileEntry {
                path: "a.py".into(),
                scan_id,
                ..Default::default()
            },
        )
        .unwrap();
        let report = diff(&conn).unwrap();
        assert_eq!(report.new_files, vec!["a.py".to_string()]);
    }
}
