//! Wrapper around the local issue-graph store.
//!
//! Mutations go through the graph-store CLI (a separate binary this crate
//! does not own, analogous to the original's `wv` tool) so the store's own
//! invariants (auto-prune, id generation) stay centralized. Direct,
//! read-only queries against the store's sqlite file are allowed by spec.md
//! §5's shared-resource policy, provided any interpolated id is validated
//! against the strict node-id regex first — parameterized queries make that
//! defensive even where it isn't strictly required.
//!
//! Grounded on `weave_gh/data.py` (`get_edges_for_node`, `_is_valid_node_id`,
//! the `sqlite3 -json` direct-query pattern) translated to a native
//! `rusqlite` read and a CLI wrapper for writes.

use crate::config;
use crate::error::{QError, QResult};
use crate::models::{is_valid_node_id, Edge, EdgeType, GraphNode, NodeMetadata, NodeStatus};
use crate::util::subprocess::{run_with_timeout, SUBPROCESS_TIMEOUT};
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

pub trait GraphClient {
    fn list_nodes(&self) -> QResult<Vec<GraphNode>>;
    fn edges_for_node(&self, id: &str) -> QResult<Vec<Edge>>;
    fn edges_for_nodes(&self, ids: &[String]) -> QResult<Vec<Edge>>;
    fn create_node(&self, text: &str, metadata: &NodeMetadata) -> QResult<String>;
    fn set_remote_issue_id(&self, node_id: &str, remote_issue_id: i64) -> QResult<()>;
    fn add_edge(&self, source: &str, target: &str, edge_type: EdgeType) -> QResult<()>;
    fn mark_done(&self, node_id: &str) -> QResult<()>;
    fn update_text(&self, node_id: &str, text: &str) -> QResult<()>;
}

pub struct CliGraphClient {
    binary: String,
    db_path: PathBuf,
}

impl CliGraphClient {
    pub fn new(hot_zone: &Path) -> CliGraphClient {
        CliGraphClient {
            binary: std::env::var("WV_GRAPH_CLI").unwrap_or_else(|_| "wv".to_string()),
            db_path: config::graph_db_path(hot_zone),
        }
    }

    fn run(&self, args: &[&str]) -> QResult<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        let out = run_with_timeout(&mut cmd, SUBPROCESS_TIMEOUT)?;
        if !out.success {
            return Err(QError::HistoryQueryFailure(format!(
                "{} {:?} failed: {}",
                self.binary, args, out.stderr
            )));
        }
        Ok(out.stdout.trim().to_string())
    }

    fn read_conn(&self) -> QResult<Option<Connection>> {
        if !self.db_path.exists() {
            return Ok(None);
        }
        Ok(Some(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?))
    }
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    text: String,
    status: String,
    metadata: serde_json::Value,
    alias: Option<String>,
}

fn parse_metadata(raw: &serde_json::Value) -> NodeMetadata {
    let obj = match raw {
        serde_json::Value::String(s) => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        other => other.clone(),
    };
    serde_json::from_value(obj).unwrap_or_default()
}

fn parse_status(s: &str) -> NodeStatus {
    match s {
        "active" => NodeStatus::Active,
        "blocked" => NodeStatus::Blocked,
        "done" => NodeStatus::Done,
        _ => NodeStatus::Todo,
    }
}

impl GraphClient for CliGraphClient {
    fn list_nodes(&self) -> QResult<Vec<GraphNode>> {
        let raw = self.run(&["list", "--all", "--json"])?;
        if raw.is_empty() || raw == "[]" {
            return Ok(Vec::new());
        }
        let items: Vec<RawNode> = serde_json::from_str(&raw)
            .map_err(|e| QError::HistoryQueryFailure(format!("parsing node list: {e}")))?;
        Ok(items
            .into_iter()
            .map(|n| GraphNode {
                id: n.id,
                text: n.text,
                status: parse_status(&n.status),
                metadata: parse_metadata(&n.metadata),
                alias: n.alias,
            })
            .collect())
    }

    fn edges_for_node(&self, id: &str) -> QResult<Vec<Edge>> {
        if !is_valid_node_id(id) {
            return Ok(Vec::new());
        }
        let Some(conn) = self.read_conn()? else {
            return Ok(Vec::new());
        };
        query_edges(&conn, "source = ?1 OR target = ?1", &[&id])
    }

    fn edges_for_nodes(&self, ids: &[String]) -> QResult<Vec<Edge>> {
        let valid: Vec<&String> = ids.iter().filter(|id| is_valid_node_id(id)).collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }
        let Some(conn) = self.read_conn()? else {
            return Ok(Vec::new());
        };
        let placeholders: Vec<String> = (1..=valid.len()).map(|i| format!("?{i}")).collect();
        let in_clause = placeholders.join(",");
        let sql = format!(
            "SELECT source, target, type, weight FROM edges WHERE source IN ({in_clause}) OR target IN ({in_clause})"
        );
        let params: Vec<&dyn rusqlite::ToSql> = valid
            .iter()
            .map(|id| *id as &dyn rusqlite::ToSql)
            .chain(valid.iter().map(|id| *id as &dyn rusqlite::ToSql))
            .collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params.as_slice(), row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_node(&self, text: &str, metadata: &NodeMetadata) -> QResult<String> {
        let meta_json = serde_json::to_string(metadata).unwrap_or_default();
        let out = self.run(&["add", text, &format!("--metadata={meta_json}")])?;
        let id = out.lines().last().unwrap_or("").trim().to_string();
        if id.is_empty() {
            return Err(QError::HistoryQueryFailure("graph CLI returned no node id".into()));
        }
        Ok(id)
    }

    fn set_remote_issue_id(&self, node_id: &str, remote_issue_id: i64) -> QResult<()> {
        if !is_valid_node_id(node_id) {
            return Err(QError::HistoryQueryFailure(format!("invalid node id: {node_id}")));
        }
        self.run(&[
            "set-metadata",
            node_id,
            "remote_issue_id",
            &remote_issue_id.to_string(),
        ])?;
        Ok(())
    }

    fn add_edge(&self, source: &str, target: &str, edge_type: EdgeType) -> QResult<()> {
        if !is_valid_node_id(source) || !is_valid_node_id(target) {
            return Err(QError::HistoryQueryFailure("invalid node id in edge".into()));
        }
        self.run(&["link", source, target, "--type", edge_type_str(edge_type)])?;
        Ok(())
    }

    fn mark_done(&self, node_id: &str) -> QResult<()> {
        self.run(&["done", node_id])?;
        Ok(())
    }

    fn update_text(&self, node_id: &str, text: &str) -> QResult<()> {
        self.run(&["edit", node_id, text])?;
        Ok(())
    }
}

fn edge_type_str(t: EdgeType) -> &'static str {
    match t {
        EdgeType::Implements => "implements",
        EdgeType::Blocks => "blocks",
        EdgeType::References => "references",
    }
}

fn parse_edge_type(s: &str) -> EdgeType {
    match s {
        "implements" => EdgeType::Implements,
        "blocks" => EdgeType::Blocks,
        _ => EdgeType::References,
    }
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        source: row.get(0)?,
        target: row.get(1)?,
        edge_type: parse_edge_type(&row.get::<_, String>(2)?),
        weight: row.get::<_, Option<f64>>(3)?.unwrap_or(1.0),
    })
}

fn query_edges(conn: &Connection, predicate: &str, id: &[&str]) -> QResult<Vec<Edge>> {
    let sql = format!("SELECT source, target, type, weight FROM edges WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(id), row_to_edge)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Children of `node_id`: sources of `implements` edges targeting it.
pub fn children_of(edges: &[Edge], node_id: &str) -> Vec<String> {
    edges
        .iter()
        .filter(|e| e.target == node_id && e.edge_type == EdgeType::Implements)
        .map(|e| e.source.clone())
        .collect()
}

/// Blockers of `node_id`: sources of `blocks` edges targeting it.
pub fn blockers_of(edges: &[Edge], node_id: &str) -> Vec<String> {
    edges
        .iter()
        .filter(|e| e.target == node_id && e.edge_type == EdgeType::Blocks)
        .map(|e| e.source.clone())
        .collect()
}

/// Parent of `node_id`: target of the `implements` edge from it.
pub fn parent_of(edges: &[Edge], node_id: &str) -> Option<String> {
    edges
        .iter()
        .find(|e| e.source == node_id && e.edge_type == EdgeType::Implements)
        .map(|e| e.target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_and_parent_are_symmetric() {
        let edges = vec![Edge {
            source: "ta-0001".into(),
            target: "ep-0002".into(),
            edge_type: EdgeType::Implements,
            weight: 1.0,
        }];
        assert_eq!(children_of(&edges, "ep-0002"), vec!["ta-0001".to_string()]);
        assert_eq!(parent_of(&edges, "ta-0001"), Some("ep-0002".to_string()));
    }
}
