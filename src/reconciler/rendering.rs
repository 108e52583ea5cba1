//! Machine-block body rendering, Mermaid dependency graphs, and close
//! comments with learnings and commit links.
//!
//! Grounded on `weave_gh/rendering.py`; the close marker and trailer are
//! renamed off the original tool's name but their format is unchanged.

use crate::graphclient::{blockers_of, children_of, parent_of};
use crate::models::{Edge, GraphNode, NodeStatus};
use crate::util::subprocess::{run_with_timeout, SUBPROCESS_TIMEOUT};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::process::Command;

pub const MERMAID_NODE_THRESHOLD: usize = 15;
const MAX_COMMITS: usize = 10;

/// SHA-256 of `text`, truncated to its first 12 hex characters.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().iter().take(6).map(|b| format!("{b:02x}")).collect()
}

/// Renders the structured machine block for `node`, wrapped in content-hash
/// markers. Human content written above the block on the remote issue is
/// preserved by the caller, not by this function.
pub fn render_issue_body(node: &GraphNode, nodes_by_id: &BTreeMap<String, GraphNode>, edges: &[Edge]) -> String {
    let mut lines = Vec::new();
    lines.push("## Context".to_string());
    lines.push(String::new());

    let type_str = node
        .metadata
        .node_type
        .map(|t| {
            let s = t.as_str();
            let mut c = s.chars();
            c.next().map(|f| f.to_uppercase().to_string() + c.as_str()).unwrap_or_default()
        })
        .unwrap_or_else(|| "Task".to_string());
    let priority_str = format!("P{}", node.metadata.priority.unwrap_or(2));
    let mut context_line = format!("**Local ID:** `{}` | **Type:** {type_str} | **Priority:** {priority_str}", node.id);
    if let Some(alias) = &node.alias {
        context_line.push_str(&format!(" | **Alias:** `{alias}`"));
    }
    lines.push(context_line);

    if let Some(parent_id) = parent_of(edges, &node.id) {
        if let Some(parent) = nodes_by_id.get(&parent_id) {
            if let Some(remote_id) = parent.metadata.remote_issue_id {
                lines.push(format!("**Part of:** #{remote_id} ({})", parent.text));
            } else {
                lines.push(format!("**Part of:** {} (`{parent_id}`)", parent.text));
            }
        }
    }

    let blocker_ids = blockers_of(edges, &node.id);
    if !blocker_ids.is_empty() {
        let parts: Vec<String> = blocker_ids
            .iter()
            .filter_map(|bid| nodes_by_id.get(bid))
            .map(|b| match b.metadata.remote_issue_id {
                Some(remote_id) => format!("#{remote_id} ({})", b.text),
                None => format!("{} (`{}`)", b.text, b.id),
            })
            .collect();
        if !parts.is_empty() {
            lines.push(format!("**Blocked by:** {}", parts.join(", ")));
        }
    }
    lines.push(String::new());

    if let Some(desc) = &node.metadata.description {
        lines.push("## Goal".to_string());
        lines.push(String::new());
        lines.push(desc.clone());
        lines.push(String::new());
    }

    let child_ids = children_of(edges, &node.id);
    if !child_ids.is_empty() {
        lines.push("## Tasks".to_string());
        lines.push(String::new());
        for cid in &child_ids {
            match nodes_by_id.get(cid) {
                Some(child) => {
                    let check = if child.status == NodeStatus::Done { "x" } else { " " };
                    let remote_ref = child.metadata.remote_issue_id.map(|n| format!(" (#{n})")).unwrap_or_default();
                    lines.push(format!("- [{check}] {}{remote_ref}", child.text));
                }
                None => lines.push(format!("- [ ] `{cid}` (unresolved)")),
            }
        }
        lines.push(String::new());

        let is_epic_like = matches!(
            node.metadata.node_type,
            Some(crate::models::NodeType::Epic) | Some(crate::models::NodeType::Feature)
        );
        if is_epic_like {
            if let Some(mermaid) = render_mermaid_graph(node, &child_ids, nodes_by_id, edges) {
                lines.push("## Dependency Graph".to_string());
                lines.push(String::new());
                lines.push("```mermaid".to_string());
                lines.push(mermaid);
                lines.push("```".to_string());
                lines.push(String::new());
            }
        }
    }

    let body = lines.join("\n");
    let hash = content_hash(&body);
    format!("<!-- MACHINE:BEGIN hash={hash} -->\n{body}<!-- MACHINE:END -->")
}

fn mermaid_id(node_id: &str) -> String {
    node_id.replace('-', "_")
}

fn mermaid_label(text: &str) -> String {
    let truncated: String = text.chars().take(60).collect();
    let escaped = truncated.replace('"', "'").replace('[', "(").replace(']', ")");
    format!("\"{escaped}\"")
}

/// Mermaid `graph TD` for `node`'s children, filtered to non-done children
/// when the full set exceeds [`MERMAID_NODE_THRESHOLD`] (unless all are done).
fn render_mermaid_graph(
    node: &GraphNode,
    child_ids: &[String],
    nodes_by_id: &BTreeMap<String, GraphNode>,
    edges: &[Edge],
) -> Option<String> {
    let mut children: Vec<&GraphNode> = child_ids.iter().filter_map(|id| nodes_by_id.get(id)).collect();
    if children.is_empty() {
        return None;
    }
    if children.len() > MERMAID_NODE_THRESHOLD {
        let active: Vec<&GraphNode> = children.iter().filter(|c| c.status != NodeStatus::Done).cloned().collect();
        if !active.is_empty() {
            children = active;
        }
    }
    let child_set: std::collections::BTreeSet<&str> = children.iter().map(|c| c.id.as_str()).collect();

    let mut lines = vec!["graph TD".to_string()];
    lines.push("    classDef done fill:#2da44e,stroke:#1a7f37,color:white".to_string());
    lines.push("    classDef active fill:#bf8700,stroke:#9a6700,color:white".to_string());
    lines.push("    classDef blocked fill:#cf222e,stroke:#a40e26,color:white".to_string());
    lines.push("    classDef todo fill:#656d76,stroke:#424a53,color:white".to_string());
    lines.push(String::new());

    let pid = mermaid_id(&node.id);
    lines.push(format!("    {pid}[{}]", mermaid_label(node.alias.as_deref().unwrap_or(&node.text))));

    for child in &children {
        let cid = mermaid_id(&child.id);
        let status_class = match child.status {
            NodeStatus::Done => "done",
            NodeStatus::Active => "active",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Todo => "todo",
        };
        lines.push(format!(
            "    {cid}[{}]:::{status_class}",
            mermaid_label(child.alias.as_deref().unwrap_or(&child.text))
        ));
    }
    lines.push(String::new());

    for child in &children {
        lines.push(format!("    {pid} --> {}", mermaid_id(&child.id)));
    }

    for edge in edges {
        if edge.edge_type == crate::models::EdgeType::Blocks
            && child_set.contains(edge.source.as_str())
            && child_set.contains(edge.target.as_str())
        {
            lines.push(format!("    {} -.->|blocks| {}", mermaid_id(&edge.source), mermaid_id(&edge.target)));
        }
    }

    Some(lines.join("\n"))
}

/// Comment posted when closing a remote issue on behalf of a completed node;
/// also the marker [`crate::reconciler::phases::CLOSE_MARKER`] looks for.
pub fn build_close_comment(node: &GraphNode, repo_url: &str) -> String {
    let mut parts = vec![format!("Completed. Local node `{}` closed.", node.id)];

    let learnings = node.metadata.learning_parts();
    if !learnings.is_empty() {
        parts.push(String::new());
        parts.push("**Learnings:**".to_string());
        for (key, val) in learnings {
            let mut c = key.chars();
            let cap = c.next().map(|f| f.to_uppercase().to_string() + c.as_str()).unwrap_or_default();
            parts.push(format!("- **{cap}:** {val}"));
        }
    }

    if let Some(commits) = build_commit_links(&node.id, repo_url) {
        parts.push(commits);
    }

    parts.join("\n")
}

fn git_log(args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    let out = run_with_timeout(&mut cmd, SUBPROCESS_TIMEOUT).ok()?;
    if !out.success {
        return None;
    }
    Some(out.stdout.trim().to_string())
}

/// Commits mentioning `node_id` in the last 90 days, as a markdown list.
/// Searches `--grep=<id>` first, falling back to the `Local-ID:` trailer.
fn build_commit_links(node_id: &str, repo_url: &str) -> Option<String> {
    let grep = format!("--grep={node_id}");
    let raw = git_log(&["log", "--format=%H", &grep, "--since=90 days ago"]).unwrap_or_default();
    let mut shas: Vec<&str> = raw.lines().filter(|s| !s.is_empty()).collect();

    if shas.is_empty() {
        let trailer_grep = format!("--grep=Local-ID: {node_id}");
        let raw2 = git_log(&["log", "--format=%H", &trailer_grep, "--since=90 days ago"]).unwrap_or_default();
        shas = raw2.lines().filter(|s| !s.is_empty()).collect();
        if shas.is_empty() {
            return None;
        }
        let owned: Vec<String> = shas.into_iter().map(|s| s.to_string()).collect();
        return format_commit_links(&owned, repo_url);
    }
    let owned: Vec<String> = shas.into_iter().map(|s| s.to_string()).collect();
    format_commit_links(&owned, repo_url)
}

fn format_commit_links(shas: &[String], repo_url: &str) -> Option<String> {
    if shas.is_empty() {
        return None;
    }
    let mut lines = vec![String::new(), "**Commits:**".to_string()];
    for sha in shas.iter().take(MAX_COMMITS) {
        let short = &sha[..sha.len().min(7)];
        let subject = git_log(&["log", "--format=%s", "-1", sha]).unwrap_or_default();
        if repo_url.is_empty() {
            lines.push(format!("- `{short}` {subject}"));
        } else {
            lines.push(format!("- [`{short}`]({repo_url}/commit/{sha}) {subject}"));
        }
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_twelve_hex_chars() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 12);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn close_comment_includes_learnings() {
        let node = GraphNode {
            id: "ta-0001".into(),
            text: "fix bug".into(),
            status: NodeStatus::Done,
            metadata: crate::models::NodeMetadata {
                learning: Some("always check null".into()),
                ..Default::default()
            },
            alias: None,
        };
        let comment = build_close_comment(&node, "");
        assert!(comment.starts_with("Completed. Local node `ta-0001` closed."));
        assert!(comment.contains("**Learning:** always check null"));
    }
}
