//! Three-phase bidirectional sync between the local issue graph and the
//! remote tracker, plus the targeted single-node parent-body refresh.
//!
//! Grounded on `weave_gh/phases.py`. Phase boundaries, guard conditions
//! (duplicate-mapping, phantom-reopen, local-closed, re-imported-no-children)
//! and the single-writer-per-remote-issue rule are ported unchanged; the
//! close marker and ID trailer are renamed off the original tool's name.

use crate::error::QResult;
use crate::graphclient::GraphClient;
use crate::models::{EdgeType, GraphNode, NodeMetadata, NodeStatus, NodeType, RemoteIssue, RemoteState};
use crate::reconciler::body::{
    compose_issue_body, extract_human_content, parse_body_description, parse_issue_template_fields, should_update_body,
};
use crate::reconciler::labels::{label_diff, labels_for_node, metadata_from_labels, SYNCED_LABEL};
use crate::reconciler::remote::RemoteTracker;
use crate::reconciler::rendering::{build_close_comment, render_issue_body};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Marker left by both the closing notification and Phase 1 when a remote
/// issue is closed on a node's behalf. Detecting it prevents a later phase
/// from treating that closure as human action and reopening the issue.
pub const CLOSE_MARKER: &str = "Completed. Local node";

#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub created_remote: i64,
    pub updated_remote: i64,
    pub closed_remote: i64,
    pub reopened_remote: i64,
    pub created_local: i64,
    pub closed_local: i64,
    pub already_synced: i64,
    pub skipped: i64,
}

fn local_id_markers(id: &str) -> (String, String) {
    (format!("**Local ID:** `{id}`"), format!("**Local ID**: `{id}`"))
}

fn all_known_nodes(nodes_by_id: &BTreeMap<String, GraphNode>) -> Vec<GraphNode> {
    nodes_by_id.values().cloned().collect()
}

/// Backfills `node`'s remote id, refusing when another node already claims
/// it (first writer wins; later duplicates are left unmapped and reported).
fn backfill_remote_id(
    graph: &dyn GraphClient,
    node: &mut GraphNode,
    remote_num: i64,
    all_nodes: &[GraphNode],
    dry_run: bool,
) -> QResult<()> {
    if dry_run {
        return Ok(());
    }
    if let Some(existing) = all_nodes
        .iter()
        .find(|n| n.metadata.remote_issue_id == Some(remote_num) && n.id != node.id)
    {
        warn!(
            "skipping backfill of remote issue #{remote_num} onto {} — already claimed by {}",
            node.id, existing.id
        );
        return Ok(());
    }
    graph.set_remote_issue_id(&node.id, remote_num)?;
    node.metadata.remote_issue_id = Some(remote_num);
    Ok(())
}

/// Fail-open: an error checking the last comment is treated as "not closed
/// by us", permitting the reopen rather than silently suppressing it.
fn was_closed_locally(remote: &dyn RemoteTracker, repo: &str, number: i64) -> bool {
    match remote.last_comment_body(repo, number) {
        Ok(body) => body.contains(CLOSE_MARKER),
        Err(_) => false,
    }
}

fn is_reimported_without_children(node: &GraphNode, edges: &[crate::models::Edge]) -> bool {
    let is_reimported = node.metadata.source.as_deref() == Some("remote");
    let has_children = edges.iter().any(|e| e.target == node.id && e.edge_type == EdgeType::Implements);
    is_reimported && !has_children
}

/// Phase 1: create/update/close remote issues from local nodes. Returns the
/// issue list, including any newly created, with in-memory state updated so
/// later phases see a consistent view.
pub fn sync_local_to_remote(
    graph: &dyn GraphClient,
    remote: &dyn RemoteTracker,
    nodes: &mut [GraphNode],
    mut issues: Vec<RemoteIssue>,
    repo: &str,
    repo_url: &str,
    stats: &mut SyncStats,
    dry_run: bool,
) -> QResult<Vec<RemoteIssue>> {
    let all_nodes_snapshot = nodes.to_vec();
    let nodes_by_id: BTreeMap<String, GraphNode> = all_nodes_snapshot.iter().map(|n| (n.id.clone(), n.clone())).collect();

    let mut remote_to_nodes: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for n in nodes.iter() {
        if let Some(r) = n.metadata.remote_issue_id {
            remote_to_nodes.entry(r).or_default().push(n.id.clone());
        }
    }
    let dupes: BTreeMap<i64, Vec<String>> = remote_to_nodes.into_iter().filter(|(_, v)| v.len() > 1).collect();
    let done_remote: std::collections::BTreeSet<i64> = nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Done)
        .filter_map(|n| n.metadata.remote_issue_id)
        .collect();

    let mut processed: std::collections::BTreeSet<i64> = std::collections::BTreeSet::new();

    for idx in 0..nodes.len() {
        let node_id = nodes[idx].id.clone();

        if nodes[idx].metadata.no_sync {
            stats.skipped += 1;
            continue;
        }

        let mut gh_match = issues
            .iter()
            .find(|i| Some(i.number) == nodes[idx].metadata.remote_issue_id)
            .map(|i| i.number);

        if gh_match.is_none() {
            let (bold, plain) = local_id_markers(&node_id);
            gh_match = issues.iter().find(|i| i.body.contains(&bold) || i.body.contains(&plain)).map(|i| i.number);
        }

        match gh_match {
            None => {
                handle_new_issue(graph, remote, &mut nodes[idx], &nodes_by_id, &mut issues, repo, repo_url, stats, dry_run)?;
            }
            Some(number) => {
                if dupes.contains_key(&number) && processed.contains(&number) {
                    info!("skipping {node_id} — remote #{number} already processed by another node");
                    stats.skipped += 1;
                    continue;
                }
                processed.insert(number);
                handle_existing_issue(
                    graph,
                    remote,
                    &mut nodes[idx],
                    number,
                    &nodes_by_id,
                    &mut issues,
                    repo,
                    repo_url,
                    stats,
                    &done_remote,
                    dry_run,
                )?;
            }
        }
    }

    Ok(issues)
}

#[allow(clippy::too_many_arguments)]
fn handle_new_issue(
    graph: &dyn GraphClient,
    remote: &dyn RemoteTracker,
    node: &mut GraphNode,
    nodes_by_id: &BTreeMap<String, GraphNode>,
    issues: &mut Vec<RemoteIssue>,
    repo: &str,
    repo_url: &str,
    stats: &mut SyncStats,
    dry_run: bool,
) -> QResult<()> {
    if !matches!(node.status, NodeStatus::Todo | NodeStatus::Active | NodeStatus::Done) {
        stats.skipped += 1;
        return Ok(());
    }

    if let Some(existing) = issues.iter().find(|i| i.title == node.text) {
        if existing.labels.iter().any(|l| l == SYNCED_LABEL) {
            let number = existing.number;
            backfill_remote_id(graph, node, number, &all_known_nodes(nodes_by_id), dry_run)?;
            stats.already_synced += 1;
            return Ok(());
        }
    }

    let edges = graph.edges_for_node(&node.id)?;
    if is_reimported_without_children(node, &edges) {
        stats.skipped += 1;
        return Ok(());
    }
    let body = render_issue_body(node, nodes_by_id, &edges);
    let labels = labels_for_node(node);

    if dry_run {
        stats.created_remote += 1;
        return Ok(());
    }

    let number = remote.create_issue(repo, &node.text, &body, &labels)?;
    issues.push(RemoteIssue {
        number,
        title: node.text.clone(),
        state: RemoteState::Open,
        body,
        labels,
    });
    backfill_remote_id(graph, node, number, &all_known_nodes(nodes_by_id), dry_run)?;
    stats.created_remote += 1;

    if node.status == NodeStatus::Done {
        let comment = build_close_comment(node, repo_url);
        remote.close_issue(repo, number, &comment)?;
        if let Some(i) = issues.iter_mut().find(|i| i.number == number) {
            i.state = RemoteState::Closed;
        }
        stats.closed_remote += 1;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_existing_issue(
    graph: &dyn GraphClient,
    remote: &dyn RemoteTracker,
    node: &mut GraphNode,
    number: i64,
    nodes_by_id: &BTreeMap<String, GraphNode>,
    issues: &mut [RemoteIssue],
    repo: &str,
    repo_url: &str,
    stats: &mut SyncStats,
    done_remote: &std::collections::BTreeSet<i64>,
    dry_run: bool,
) -> QResult<()> {
    let about_to_close = node.status == NodeStatus::Done
        && issues.iter().find(|i| i.number == number).map(|i| i.state) == Some(RemoteState::Open);

    let edges = graph.edges_for_node(&node.id)?;
    if !is_reimported_without_children(node, &edges) {
        let new_block = render_issue_body(node, nodes_by_id, &edges);
        let existing_body = issues.iter().find(|i| i.number == number).map(|i| i.body.clone()).unwrap_or_default();
        if should_update_body(&existing_body, &new_block) {
            let human = extract_human_content(&existing_body);
            let new_body = compose_issue_body(&human, &new_block);
            if !dry_run {
                remote.edit_body(repo, number, &new_body)?;
            }
            stats.updated_remote += 1;
        }
    }

    let desired_labels = labels_for_node(node);
    let current_labels = issues.iter().find(|i| i.number == number).map(|i| i.labels.clone()).unwrap_or_default();
    let (to_add, to_remove) = label_diff(&desired_labels, &current_labels);
    if !dry_run {
        for label in &to_add {
            remote.add_label(repo, number, label)?;
        }
        for label in &to_remove {
            remote.remove_label(repo, number, label)?;
        }
    }

    if about_to_close {
        let comment = build_close_comment(node, repo_url);
        if !dry_run {
            remote.close_issue(repo, number, &comment)?;
            if let Some(i) = issues.iter_mut().find(|i| i.number == number) {
                i.state = RemoteState::Closed;
            }
        }
        stats.closed_remote += 1;
    } else if node.status != NodeStatus::Done
        && issues.iter().find(|i| i.number == number).map(|i| i.state) == Some(RemoteState::Closed)
    {
        if done_remote.contains(&number) {
            info!("skipping reopen of #{number} — another node with this remote id is done");
            stats.skipped += 1;
        } else if was_closed_locally(remote, repo, number) {
            info!("skipping reopen of #{number} — closed by the local graph");
            stats.skipped += 1;
        } else if dry_run {
            stats.reopened_remote += 1;
        } else {
            let comment = format!("Reopening — local node `{}` is still open.", node.id);
            remote.reopen_issue(repo, number, &comment)?;
            if let Some(i) = issues.iter_mut().find(|i| i.number == number) {
                i.state = RemoteState::Open;
            }
            stats.reopened_remote += 1;
        }
    } else {
        stats.already_synced += 1;
    }

    if node.metadata.remote_issue_id.is_none() {
        backfill_remote_id(graph, node, number, &all_known_nodes(nodes_by_id), dry_run)?;
    }
    Ok(())
}

/// Phase 2: create local nodes from untracked open remote issues.
pub fn sync_remote_to_local(
    graph: &dyn GraphClient,
    issues: &[RemoteIssue],
    stats: &mut SyncStats,
    dry_run: bool,
) -> QResult<Vec<GraphNode>> {
    let tracked: std::collections::BTreeSet<i64> =
        graph.list_nodes()?.iter().filter_map(|n| n.metadata.remote_issue_id).collect();
    let local_ids: std::collections::BTreeSet<String> = graph.list_nodes()?.iter().map(|n| n.id.clone()).collect();

    let mut created = Vec::new();
    for issue in issues {
        if issue.labels.iter().any(|l| l == "test") {
            stats.skipped += 1;
            continue;
        }
        if tracked.contains(&issue.number) {
            continue;
        }
        let already_marked = local_ids.iter().any(|id| {
            let (bold, plain) = local_id_markers(id);
            issue.body.contains(&bold) || issue.body.contains(&plain)
        });
        if already_marked {
            continue;
        }

        if issue.state != RemoteState::Open {
            stats.skipped += 1;
            continue;
        }

        let (priority, node_type) = metadata_from_labels(&issue.labels);
        let form = parse_issue_template_fields(&issue.body);
        let node_type = form
            .get("type")
            .and_then(|t| NodeType::from_str(t))
            .or(node_type);
        let priority = form
            .get("priority")
            .and_then(|p| p.chars().nth(1))
            .and_then(|c| c.to_digit(10))
            .map(|d| d as i64)
            .or(priority);
        let description = form.get("description").cloned().filter(|s| !s.is_empty()).or_else(|| {
            let d = parse_body_description(&issue.body);
            if d.is_empty() {
                None
            } else {
                Some(d)
            }
        });

        let metadata = NodeMetadata {
            remote_issue_id: Some(issue.number),
            priority,
            node_type,
            description,
            source: Some("remote".to_string()),
            ..Default::default()
        };

        if dry_run {
            stats.created_local += 1;
            continue;
        }
        let id = graph.create_node(&issue.title, &metadata)?;
        created.push(GraphNode {
            id,
            text: issue.title.clone(),
            status: NodeStatus::Todo,
            metadata,
            alias: None,
        });
        stats.created_local += 1;
    }
    Ok(created)
}

/// Phase 3: mark local nodes done whose linked remote issue is closed.
pub fn sync_closed_to_local(
    graph: &dyn GraphClient,
    nodes: &[GraphNode],
    issues: &[RemoteIssue],
    stats: &mut SyncStats,
    dry_run: bool,
) -> QResult<()> {
    let issues_by_number: BTreeMap<i64, &RemoteIssue> = issues.iter().map(|i| (i.number, i)).collect();
    for node in nodes {
        if node.status == NodeStatus::Done {
            continue;
        }
        let Some(remote_id) = node.metadata.remote_issue_id else {
            continue;
        };
        let Some(issue) = issues_by_number.get(&remote_id) else {
            continue;
        };
        if issue.state == RemoteState::Closed {
            if !dry_run {
                graph.mark_done(&node.id)?;
            }
            stats.closed_local += 1;
        }
    }
    Ok(())
}

/// Re-renders a node's parent epic body and updates it if the content hash
/// changed. Called after a single node's status changes (e.g. from the
/// `--notify done` CLI path) so the parent doesn't wait for a full sync.
pub fn refresh_parent_body(
    graph: &dyn GraphClient,
    remote: &dyn RemoteTracker,
    child_id: &str,
    dry_run: bool,
) -> QResult<bool> {
    let edges = graph.edges_for_node(child_id)?;
    let Some(parent_id) = crate::graphclient::parent_of(&edges, child_id) else {
        return Ok(false);
    };
    let all_nodes = graph.list_nodes()?;
    let nodes_by_id: BTreeMap<String, GraphNode> = all_nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();
    let Some(parent) = nodes_by_id.get(&parent_id) else {
        return Ok(false);
    };
    let Some(remote_id) = parent.metadata.remote_issue_id else {
        return Ok(false);
    };

    let repo = remote.repo()?;
    let existing_body = remote.view_body(&repo, remote_id)?;
    if existing_body.is_empty() {
        return Ok(false);
    }

    let parent_edges = graph.edges_for_node(&parent_id)?;
    let new_block = render_issue_body(parent, &nodes_by_id, &parent_edges);
    if !should_update_body(&existing_body, &new_block) {
        return Ok(false);
    }

    if dry_run {
        return Ok(true);
    }
    let human = extract_human_content(&existing_body);
    let new_body = compose_issue_body(&human, &new_block);
    remote.edit_body(&repo, remote_id, &new_body)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeMetadata;
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    struct FakeGraph {
        set_remote_issue_id_calls: RefCell<Vec<(String, i64)>>,
    }

    impl FakeGraph {
        fn new() -> FakeGraph {
            FakeGraph {
                set_remote_issue_id_calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl GraphClient for FakeGraph {
        fn list_nodes(&self) -> QResult<Vec<GraphNode>> {
            Ok(Vec::new())
        }
        fn edges_for_node(&self, _id: &str) -> QResult<Vec<crate::models::Edge>> {
            Ok(Vec::new())
        }
        fn edges_for_nodes(&self, _ids: &[String]) -> QResult<Vec<crate::models::Edge>> {
            Ok(Vec::new())
        }
        fn create_node(&self, _text: &str, _metadata: &NodeMetadata) -> QResult<String> {
            Ok("ta-0099".to_string())
        }
        fn set_remote_issue_id(&self, node_id: &str, remote_issue_id: i64) -> QResult<()> {
            self.set_remote_issue_id_calls.borrow_mut().push((node_id.to_string(), remote_issue_id));
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

    struct FakeRemote {
        last_comment: RefCell<Option<String>>,
        reopen_calls: RefCell<Vec<i64>>,
        close_calls: RefCell<Vec<i64>>,
    }

    impl FakeRemote {
        fn new(last_comment: Option<&str>) -> FakeRemote {
            FakeRemote {
                last_comment: RefCell::new(last_comment.map(|s| s.to_string())),
                reopen_calls: RefCell::new(Vec::new()),
                close_calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl RemoteTracker for FakeRemote {
        fn repo(&self) -> QResult<String> {
            Ok("owner/repo".to_string())
        }
        fn repo_url(&self) -> QResult<String> {
            Ok("https://example.com/owner/repo".to_string())
        }
        fn list_issues(&self, _repo: &str) -> QResult<Vec<RemoteIssue>> {
            Ok(Vec::new())
        }
        fn create_issue(&self, _repo: &str, _title: &str, _body: &str, _labels: &[String]) -> QResult<i64> {
            Ok(1)
        }
        fn edit_body(&self, _repo: &str, _number: i64, _body: &str) -> QResult<()> {
            Ok(())
        }
        fn close_issue(&self, _repo: &str, number: i64, _comment: &str) -> QResult<()> {
            self.close_calls.borrow_mut().push(number);
            Ok(())
        }
        fn reopen_issue(&self, _repo: &str, number: i64, _comment: &str) -> QResult<()> {
            self.reopen_calls.borrow_mut().push(number);
            Ok(())
        }
        fn add_label(&self, _repo: &str, _number: i64, _label: &str) -> QResult<()> {
            Ok(())
        }
        fn remove_label(&self, _repo: &str, _number: i64, _label: &str) -> QResult<()> {
            Ok(())
        }
        fn post_comment(&self, _repo: &str, _number: i64, _body: &str) -> QResult<()> {
            Ok(())
        }
        fn last_comment_body(&self, _repo: &str, _number: i64) -> QResult<String> {
            Ok(self.last_comment.borrow().clone().unwrap_or_default())
        }
        fn view_body(&self, _repo: &str, _number: i64) -> QResult<String> {
            Ok(String::new())
        }
    }

    fn node(id: &str, status: NodeStatus, remote_issue_id: Option<i64>) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            text: format!("node {id}"),
            status,
            metadata: NodeMetadata {
                remote_issue_id,
                ..Default::default()
            },
            alias: None,
        }
    }

    fn open_issue(number: i64, state: RemoteState) -> RemoteIssue {
        RemoteIssue {
            number,
            title: format!("issue {number}"),
            state,
            body: String::new(),
            labels: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_existing(
        node: &mut GraphNode,
        number: i64,
        issues: &mut [RemoteIssue],
        remote: &dyn RemoteTracker,
        done_remote: &BTreeSet<i64>,
        dry_run: bool,
    ) -> SyncStats {
        let graph = FakeGraph::new();
        let nodes_by_id = BTreeMap::new();
        let mut stats = SyncStats::default();
        handle_existing_issue(
            &graph,
            remote,
            node,
            number,
            &nodes_by_id,
            issues,
            "owner/repo",
            "https://example.com/owner/repo",
            &mut stats,
            done_remote,
            dry_run,
        )
        .unwrap();
        stats
    }

    #[test]
    fn phantom_reopen_guard_skips_reopen_when_another_mapped_node_is_done() {
        let mut n = node("ta-0001", NodeStatus::Active, Some(7));
        let mut issues = vec![open_issue(7, RemoteState::Closed)];
        let remote = FakeRemote::new(None);
        let mut done_remote = BTreeSet::new();
        done_remote.insert(7);

        let stats = run_existing(&mut n, 7, &mut issues, &remote, &done_remote, false);

        assert_eq!(stats.reopened_remote, 0);
        assert_eq!(stats.skipped, 1);
        assert!(remote.reopen_calls.borrow().is_empty());
        assert_eq!(issues[0].state, RemoteState::Closed);
    }

    #[test]
    fn local_closed_guard_skips_reopen_when_last_comment_has_close_marker() {
        let mut n = node("ta-0002", NodeStatus::Active, Some(9));
        let mut issues = vec![open_issue(9, RemoteState::Closed)];
        let remote = FakeRemote::new(Some("Completed. Local node `ta-0002` closed."));
        let done_remote = BTreeSet::new();

        let stats = run_existing(&mut n, 9, &mut issues, &remote, &done_remote, false);

        assert_eq!(stats.reopened_remote, 0);
        assert_eq!(stats.skipped, 1);
        assert!(remote.reopen_calls.borrow().is_empty());
        assert_eq!(issues[0].state, RemoteState::Closed);
    }

    #[test]
    fn reopens_when_neither_guard_applies() {
        let mut n = node("ta-0003", NodeStatus::Active, Some(11));
        let mut issues = vec![open_issue(11, RemoteState::Closed)];
        let remote = FakeRemote::new(Some("unrelated comment"));
        let done_remote = BTreeSet::new();

        let stats = run_existing(&mut n, 11, &mut issues, &remote, &done_remote, false);

        assert_eq!(stats.reopened_remote, 1);
        assert_eq!(remote.reopen_calls.borrow().clone(), vec![11]);
        assert_eq!(issues[0].state, RemoteState::Open);
    }

    #[test]
    fn duplicate_mapping_skips_second_node_claiming_same_remote_issue() {
        let mut nodes = [
            node("ta-0010", NodeStatus::Active, Some(20)),
            node("ta-0011", NodeStatus::Active, Some(20)),
        ];
        let mut issues = vec![open_issue(20, RemoteState::Open)];
        let graph = FakeGraph::new();
        let remote = FakeRemote::new(None);
        let mut stats = SyncStats::default();

        let issues_out = sync_local_to_remote(
            &graph,
            &remote,
            &mut nodes,
            std::mem::take(&mut issues),
            "owner/repo",
            "https://example.com/owner/repo",
            &mut stats,
            false,
        )
        .unwrap();

        assert_eq!(issues_out.len(), 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn backfill_conflict_leaves_second_node_unmapped() {
        let claimant = node("ta-0020", NodeStatus::Active, Some(30));
        let mut nodes_by_id = BTreeMap::new();
        nodes_by_id.insert(claimant.id.clone(), claimant);

        let mut contender = node("ta-0021", NodeStatus::Active, None);
        let graph = FakeGraph::new();

        backfill_remote_id(&graph, &mut contender, 30, &all_known_nodes(&nodes_by_id), false).unwrap();

        assert_eq!(contender.metadata.remote_issue_id, None);
        assert!(graph.set_remote_issue_id_calls.borrow().is_empty());
    }

    #[test]
    fn backfill_succeeds_when_no_conflict() {
        let nodes_by_id: BTreeMap<String, GraphNode> = BTreeMap::new();
        let mut n = node("ta-0030", NodeStatus::Active, None);
        let graph = FakeGraph::new();

        backfill_remote_id(&graph, &mut n, 40, &all_known_nodes(&nodes_by_id), false).unwrap();

        assert_eq!(n.metadata.remote_issue_id, Some(40));
        assert_eq!(graph.set_remote_issue_id_calls.borrow().clone(), vec![("ta-0030".to_string(), 40)]);
    }

    #[test]
    fn reimported_node_without_children_is_flagged() {
        let mut n = node("ta-0040", NodeStatus::Todo, None);
        n.metadata.source = Some("remote".to_string());
        assert!(is_reimported_without_children(&n, &[]));
    }

    #[test]
    fn marker_body_import_does_not_duplicate_existing_local_node() {
        let mut stats = SyncStats::default();
        let issues = vec![RemoteIssue {
            number: 50,
            title: "already tracked".to_string(),
            state: RemoteState::Open,
            body: "**Local ID:** `ta-0050`\n".to_string(),
            labels: Vec::new(),
        }];

        struct MarkerGraph;
        impl GraphClient for MarkerGraph {
            fn list_nodes(&self) -> QResult<Vec<GraphNode>> {
                Ok(vec![GraphNode {
                    id: "ta-0050".to_string(),
                    text: "already tracked".to_string(),
                    status: NodeStatus::Todo,
                    metadata: NodeMetadata::default(),
                    alias: None,
                }])
            }
            fn edges_for_node(&self, _id: &str) -> QResult<Vec<crate::models::Edge>> {
                Ok(Vec::new())
            }
            fn edges_for_nodes(&self, _ids: &[String]) -> QResult<Vec<crate::models::Edge>> {
                Ok(Vec::new())
            }
            fn create_node(&self, _text: &str, _metadata: &NodeMetadata) -> QResult<String> {
                panic!("should not create a new node for an already-marked issue");
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

        let created = sync_remote_to_local(&MarkerGraph, &issues, &mut stats, false).unwrap();

        assert!(created.is_empty());
        assert_eq!(stats.created_local, 0);
    }

    #[test]
    fn untracked_issue_without_marker_creates_local_node() {
        struct EmptyGraph;
        impl GraphClient for EmptyGraph {
            fn list_nodes(&self) -> QResult<Vec<GraphNode>> {
                Ok(Vec::new())
            }
            fn edges_for_node(&self, _id: &str) -> QResult<Vec<crate::models::Edge>> {
                Ok(Vec::new())
            }
            fn edges_for_nodes(&self, _ids: &[String]) -> QResult<Vec<crate::models::Edge>> {
                Ok(Vec::new())
            }
            fn create_node(&self, _text: &str, _metadata: &NodeMetadata) -> QResult<String> {
                Ok("ta-0099".to_string())
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

        let mut stats = SyncStats::default();
        let issues = vec![open_issue(60, RemoteState::Open)];
        let created = sync_remote_to_local(&EmptyGraph, &issues, &mut stats, false).unwrap();

        assert_eq!(stats.created_local, 1);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].metadata.remote_issue_id, Some(60));
    }
}
