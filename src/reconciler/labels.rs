//! Label constants and derivation/reconciliation for the remote tracker.
//!
//! Grounded on `weave_gh/labels.py`. The fixed synced-label, type and
//! priority mappings, and the reconcile-only-status-labels rule are ported
//! unchanged; label strings are renamed off the original tool's name.

use crate::models::{GraphNode, NodeStatus, NodeType};
use std::collections::BTreeSet;

pub const SYNCED_LABEL: &str = "synced";
pub const ACTIVE_LABEL: &str = "status:active";
pub const BLOCKED_LABEL: &str = "status:blocked";

fn status_label(status: NodeStatus) -> Option<&'static str> {
    match status {
        NodeStatus::Active => Some(ACTIVE_LABEL),
        NodeStatus::Blocked => Some(BLOCKED_LABEL),
        NodeStatus::Todo | NodeStatus::Done => None,
    }
}

fn type_label(node_type: Option<NodeType>) -> &'static str {
    match node_type {
        Some(NodeType::Bug) | Some(NodeType::Fix) => "bug",
        Some(NodeType::Feature) => "enhancement",
        Some(NodeType::Epic) => "epic",
        Some(NodeType::Audit) => "maintenance",
        Some(NodeType::Learning) => "documentation",
        _ => "task",
    }
}

fn priority_label(priority: Option<i64>) -> &'static str {
    match priority {
        Some(0) | Some(1) => "P1",
        Some(2) => "P2",
        Some(3) => "P3",
        Some(4) => "P4",
        _ => "P2",
    }
}

/// The full set of labels `node` should carry on the remote tracker.
pub fn labels_for_node(node: &GraphNode) -> Vec<String> {
    let mut labels = vec![SYNCED_LABEL.to_string()];
    labels.push(type_label(node.metadata.node_type).to_string());
    labels.push(priority_label(node.metadata.priority).to_string());
    if let Some(status) = status_label(node.status) {
        labels.push(status.to_string());
    }
    labels
}

/// Labels to add and (status-only) labels to remove to reconcile `current`
/// toward `desired`. Never touches non-status labels present on the issue
/// but absent from `desired`.
pub fn label_diff(desired: &[String], current: &[String]) -> (Vec<String>, Vec<String>) {
    let desired_set: BTreeSet<&str> = desired.iter().map(|s| s.as_str()).collect();
    let current_set: BTreeSet<&str> = current.iter().map(|s| s.as_str()).collect();

    let to_add: Vec<String> = desired_set.difference(&current_set).map(|s| s.to_string()).collect();

    let status_labels: BTreeSet<&str> = [ACTIVE_LABEL, BLOCKED_LABEL].into_iter().collect();
    let to_remove: Vec<String> = current_set
        .intersection(&status_labels)
        .filter(|l| !desired_set.contains(*l))
        .map(|s| s.to_string())
        .collect();

    (to_add, to_remove)
}

/// Parses remote labels back into partial node metadata: priority from a
/// `P1`-`P4` label, type from a type label (first match wins).
pub fn metadata_from_labels(labels: &[String]) -> (Option<i64>, Option<NodeType>) {
    let priority = labels.iter().find_map(|l| match l.as_str() {
        "P1" => Some(1),
        "P2" => Some(2),
        "P3" => Some(3),
        "P4" => Some(4),
        _ => None,
    });
    let node_type = labels.iter().find_map(|l| match l.as_str() {
        "bug" => Some(NodeType::Bug),
        "enhancement" => Some(NodeType::Feature),
        "epic" => Some(NodeType::Epic),
        "maintenance" => Some(NodeType::Audit),
        "documentation" => Some(NodeType::Learning),
        "task" => Some(NodeType::Task),
        _ => None,
    });
    (priority, node_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeMetadata;

    fn node(status: NodeStatus, node_type: Option<NodeType>, priority: Option<i64>) -> GraphNode {
        GraphNode {
            id: "ta-0001".into(),
            text: "do thing".into(),
            status,
            metadata: NodeMetadata {
                node_type,
                priority,
                ..Default::default()
            },
            alias: None,
        }
    }

    #[test]
    fn todo_node_has_no_status_label() {
        let n = node(NodeStatus::Todo, Some(NodeType::Bug), Some(1));
        let labels = labels_for_node(&n);
        assert_eq!(labels, vec!["synced".to_string(), "bug".to_string(), "P1".to_string()]);
    }

    #[test]
    fn diff_only_removes_stale_status_labels() {
        let desired = vec!["synced".to_string(), "task".to_string(), "P2".to_string()];
        let current = vec![
            "synced".to_string(),
            "task".to_string(),
            "P2".to_string(),
            "status:active".to_string(),
            "custom-label".to_string(),
        ];
        let (add, remove) = label_diff(&desired, &current);
        assert!(add.is_empty());
        assert_eq!(remove, vec!["status:active".to_string()]);
    }
}
