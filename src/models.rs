//! Shared data model for the quality scanner and the issue-graph reconciler.
//!
//! Mirrors the dataclass shapes of the original `weave_quality`/`weave_gh` scripts,
//! generalized per the richer attribute set this system requires (essential
//! complexity, ownership fraction, dispatch-function exemption, tagged node
//! metadata).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static-analysis record for one file in one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub scan_id: i64,
    pub language: Language,
    pub loc: i64,
    pub cyclomatic_complexity: f64,
    pub function_count: i64,
    pub max_nesting: i64,
    pub avg_function_length: f64,
    pub essential_complexity: f64,
    pub indent_sd: f64,
}

impl Default for FileEntry {
    fn default() -> Self {
        FileEntry {
            path: String::new(),
            scan_id: 0,
            language: Language::Unknown,
            loc: 0,
            cyclomatic_complexity: 1.0,
            function_count: 0,
            max_nesting: 0,
            avg_function_length: 0.0,
            essential_complexity: 1.0,
            indent_sd: 0.0,
        }
    }
}

/// Which analyzer family produced a [`FileEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Structured,
    Heuristic,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Structured => "structured",
            Language::Heuristic => "heuristic",
            Language::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Language {
        match s {
            "structured" => Language::Structured,
            "heuristic" => Language::Heuristic,
            _ => Language::Unknown,
        }
    }
}

/// Per-function complexity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCC {
    pub path: String,
    pub scan_id: i64,
    pub function_name: String,
    pub line_start: i64,
    pub line_end: i64,
    pub complexity: f64,
    pub essential_complexity: f64,
    pub is_dispatch: bool,
}

/// Recognized CK metric names. New metrics need no schema change — they are
/// carried as EAV rows keyed by name.
pub const CK_METRIC_NAMES: &[&str] = &["wmc", "cbo", "direct_bases", "rfc", "lcom"];

/// Class-level OO metrics for one file in one scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CKMetrics {
    pub path: String,
    pub scan_id: i64,
    pub metrics: BTreeMap<String, f64>,
}

impl CKMetrics {
    pub fn to_rows(&self) -> Vec<(String, i64, String, f64)> {
        self.metrics
            .iter()
            .filter(|(k, _)| CK_METRIC_NAMES.contains(&k.as_str()))
            .map(|(k, v)| (self.path.clone(), self.scan_id, k.clone(), *v))
            .collect()
    }

    pub fn from_rows(rows: &[(String, i64, String, f64)]) -> Option<CKMetrics> {
        let (path, scan_id) = rows.first().map(|r| (r.0.clone(), r.1))?;
        let metrics = rows.iter().map(|r| (r.2.clone(), r.3)).collect();
        Some(CKMetrics {
            path,
            scan_id,
            metrics,
        })
    }
}

/// History-derived record per file. Not scan-versioned: one current-state row
/// per path, overwritten on each scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitStats {
    pub path: String,
    pub churn: i64,
    pub authors: i64,
    pub age_days: i64,
    pub hotspot: f64,
    pub ownership_fraction: f64,
    pub minor_contributors: i64,
}

impl Default for GitStats {
    fn default() -> Self {
        GitStats {
            path: String::new(),
            churn: 0,
            authors: 0,
            age_days: 0,
            hotspot: 0.0,
            ownership_fraction: 1.0,
            minor_contributors: 0,
        }
    }
}

/// Two files that changed together in a commit window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChange {
    pub path_a: String,
    pub path_b: String,
    pub count: i64,
}

impl CoChange {
    /// Construct with `path_a < path_b` enforced lexicographically.
    pub fn new(a: String, b: String, count: i64) -> CoChange {
        if a <= b {
            CoChange {
                path_a: a,
                path_b: b,
                count,
            }
        } else {
            CoChange {
                path_a: b,
                path_b: a,
                count,
            }
        }
    }
}

/// Incremental-scan tracking state for one file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub mtime: i64,
    pub content_id: String,
}

/// Metadata for one scan run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanMeta {
    pub id: i64,
    pub scanned_at: String,
    pub head_commit_id: String,
    pub files_count: i64,
    pub duration_ms: i64,
}

impl ScanMeta {
    pub fn is_stale(&self, current_head: &str) -> bool {
        self.head_commit_id != current_head
    }
}

/// One row per file per retained scan, used for trend fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityTrend {
    pub path: String,
    pub scan_id: i64,
    pub complexity: f64,
    pub essential_complexity: f64,
}

/// Computed, non-persisted aggregate view over a scan's entries and stats.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub total_files: i64,
    pub total_loc: i64,
    pub avg_complexity: f64,
    pub max_complexity: f64,
    pub avg_churn: f64,
    pub hotspot_count: i64,
    pub top_hotspots: Vec<(String, f64)>,
}

impl ProjectMetrics {
    pub fn from_entries_and_stats(
        entries: &[FileEntry],
        stats: &[GitStats],
        hotspot_threshold: f64,
        top_n: usize,
    ) -> ProjectMetrics {
        if entries.is_empty() {
            return ProjectMetrics::default();
        }
        let stats_by_path: BTreeMap<&str, &GitStats> =
            stats.iter().map(|s| (s.path.as_str(), s)).collect();
        let complexities: Vec<f64> = entries.iter().map(|e| e.cyclomatic_complexity).collect();
        let churns: Vec<f64> = entries
            .iter()
            .filter_map(|e| stats_by_path.get(e.path.as_str()).map(|s| s.churn as f64))
            .collect();

        let mut sorted_hotspots: Vec<&GitStats> = stats.iter().collect();
        sorted_hotspots.sort_by(|a, b| b.hotspot.partial_cmp(&a.hotspot).unwrap());
        let above_threshold = sorted_hotspots
            .iter()
            .filter(|s| s.hotspot > hotspot_threshold)
            .count();

        ProjectMetrics {
            total_files: entries.len() as i64,
            total_loc: entries.iter().map(|e| e.loc).sum(),
            avg_complexity: complexities.iter().sum::<f64>() / complexities.len() as f64,
            max_complexity: complexities.iter().cloned().fold(f64::MIN, f64::max),
            avg_churn: if churns.is_empty() {
                0.0
            } else {
                churns.iter().sum::<f64>() / churns.len() as f64
            },
            hotspot_count: above_threshold as i64,
            top_hotspots: sorted_hotspots
                .into_iter()
                .take(top_n)
                .map(|s| (s.path.clone(), s.hotspot))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Issue-graph reconciler model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Todo,
    Active,
    Blocked,
    Done,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Todo => "todo",
            NodeStatus::Active => "active",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Task,
    Feature,
    Epic,
    Bug,
    Fix,
    Audit,
    Learning,
    Test,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Task => "task",
            NodeType::Feature => "feature",
            NodeType::Epic => "epic",
            NodeType::Bug => "bug",
            NodeType::Fix => "fix",
            NodeType::Audit => "audit",
            NodeType::Learning => "learning",
            NodeType::Test => "test",
        }
    }

    pub fn from_str(s: &str) -> Option<NodeType> {
        Some(match s {
            "task" => NodeType::Task,
            "feature" => NodeType::Feature,
            "epic" => NodeType::Epic,
            "bug" => NodeType::Bug,
            "fix" => NodeType::Fix,
            "audit" => NodeType::Audit,
            "learning" => NodeType::Learning,
            "test" => NodeType::Test,
            _ => return None,
        })
    }
}

/// Tagged metadata fields recognized by name, plus a free-form long tail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub remote_issue_id: Option<i64>,
    pub priority: Option<i64>,
    pub node_type: Option<NodeType>,
    pub description: Option<String>,
    pub no_sync: bool,
    pub source: Option<String>,
    pub decision: Option<String>,
    pub pattern: Option<String>,
    pub pitfall: Option<String>,
    pub learning: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl NodeMetadata {
    /// The learning annotations present on this node, keyed by field name.
    pub fn learning_parts(&self) -> Vec<(&'static str, &str)> {
        let mut parts = Vec::new();
        if let Some(v) = &self.decision {
            parts.push(("decision", v.as_str()));
        }
        if let Some(v) = &self.pattern {
            parts.push(("pattern", v.as_str()));
        }
        if let Some(v) = &self.pitfall {
            parts.push(("pitfall", v.as_str()));
        }
        if let Some(v) = &self.learning {
            parts.push(("learning", v.as_str()));
        }
        parts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub text: String,
    pub status: NodeStatus,
    pub metadata: NodeMetadata,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: i64,
    pub title: String,
    pub state: RemoteState,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Implements,
    Blocks,
    References,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub weight: f64,
}

/// Validates the opaque node-id format `^[a-z]{2}-[a-f0-9]{4,64}$` before any
/// string interpolation into a query.
pub fn is_valid_node_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    let Some(dash) = id.find('-') else {
        return false;
    };
    if dash != 2 {
        return false;
    }
    if !bytes[..2].iter().all(|b| b.is_ascii_lowercase()) {
        return false;
    }
    let suffix = &id[3..];
    (4..=64).contains(&suffix.len())
        && suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_change_orders_paths() {
        let cc = CoChange::new("b.py".into(), "a.py".into(), 3);
        assert_eq!(cc.path_a, "a.py");
        assert_eq!(cc.path_b, "b.py");
    }

    #[test]
    fn ck_metrics_round_trip() {
        let mut metrics = BTreeMap::new();
        metrics.insert("wmc".to_string(), 12.0);
        metrics.insert("cbo".to_string(), 3.0);
        let ck = CKMetrics {
            path: "a.py".into(),
            scan_id: 1,
            metrics,
        };
        let rows = ck.to_rows();
        let back = CKMetrics::from_rows(&rows).unwrap();
        assert_eq!(back, ck);
    }

    #[test]
    fn node_id_validation() {
        assert!(is_valid_node_id("lx-abcd"));
        assert!(is_valid_node_id("ta-0123456789abcdef"));
        assert!(!is_valid_node_id("LX-abcd"));
        assert!(!is_valid_node_id("lx-abc"));
        assert!(!is_valid_node_id("lx-ABCD"));
        assert!(!is_valid_node_id("lxx-abcd"));
    }

    #[test]
    fn scan_meta_staleness() {
        let meta = ScanMeta {
            head_commit_id: "abc".into(),
            ..Default::default()
        };
        assert!(!meta.is_stale("abc"));
        assert!(meta.is_stale("def"));
    }
}
